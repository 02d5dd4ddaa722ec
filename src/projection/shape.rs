//! Shaping of upstream render contexts into JSON documents.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use super::upstream::{Folder, Photo, RenderContext};
use crate::core::ArcStr;
use crate::document::{Document, DocumentBuilder};
use crate::error::{ExtractError, ProjectionError, TaskError};

/// How the context of a page is turned into a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    /// A page listing entities, e.g. an index or a tag page.
    List,
    Gallery,
    /// A page showing a single entity.
    Entity,
    /// Context data is written as is.
    PassThrough,
}

/// What happens to pages rendered with a template missing from the table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Fallback {
    #[default]
    PassThrough,
    /// The page gets no JSON twin.
    Skip,
}

/// Maps template identifiers to shapes.
#[derive(Debug, Clone)]
pub struct ShapeTable {
    shapes: HashMap<String, Shape>,
    fallback: Fallback,
}

impl Default for ShapeTable {
    fn default() -> Self {
        Self::empty()
            .with("index.tmpl", Shape::List)
            .with("tag.tmpl", Shape::List)
            .with("author.tmpl", Shape::List)
            .with("archiveindex.tmpl", Shape::List)
            .with("gallery.tmpl", Shape::Gallery)
            .with("post.tmpl", Shape::Entity)
            .with("page.tmpl", Shape::Entity)
            .with("story.tmpl", Shape::Entity)
    }
}

impl ShapeTable {
    pub fn empty() -> Self {
        Self {
            shapes: HashMap::new(),
            fallback: Fallback::default(),
        }
    }

    pub fn with(mut self, template: impl Into<String>, shape: Shape) -> Self {
        self.shapes.insert(template.into(), shape);
        self
    }

    pub fn with_fallback(mut self, fallback: Fallback) -> Self {
        self.fallback = fallback;
        self
    }

    /// Shape for `template`, `None` if pages rendered with it are skipped.
    pub fn shape_of(&self, template: &str) -> Option<Shape> {
        match self.shapes.get(template) {
            Some(&shape) => Some(shape),
            None => match self.fallback {
                Fallback::PassThrough => Some(Shape::PassThrough),
                Fallback::Skip => None,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListDocument {
    pub id: String,
    pub lang: ArcStr,
    pub posts: Vec<Arc<Document>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct GalleryDocument {
    pub id: String,
    pub lang: ArcStr,
    pub title: String,
    pub permalink: String,
    pub photos: Vec<Photo>,
    pub folders: Vec<Folder>,
    pub post: Option<Arc<Document>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct PassThroughDocument {
    pub id: String,
    pub lang: ArcStr,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A shaped document, serialized without a tag.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Shaped {
    List(ListDocument),
    Gallery(GalleryDocument),
    Entity(Arc<Document>),
    PassThrough(PassThroughDocument),
}

pub(crate) fn shape(
    shape: Shape,
    id: &str,
    context: RenderContext,
    builder: &DocumentBuilder,
    task: &str,
) -> Result<Shaped, TaskError> {
    let RenderContext {
        lang,
        posts,
        post,
        gallery,
        extra,
    } = context;

    let missing = |field| ProjectionError::MissingContext {
        task: task.to_string(),
        field,
    };

    let shaped = match shape {
        Shape::List => {
            let posts: Vec<Arc<Document>> = posts
                .ok_or_else(|| missing("posts"))?
                .iter()
                .map(|post| builder.build(post, &lang))
                .collect::<Result<_, ExtractError>>()?;

            Shaped::List(ListDocument {
                id: id.to_string(),
                extra: without(extra, &["id", "lang", "posts"]),
                lang,
                posts,
            })
        }
        Shape::Gallery => {
            let gallery = gallery.ok_or_else(|| missing("gallery"))?;
            let post = post.map(|post| builder.build(&post, &lang)).transpose()?;

            Shaped::Gallery(GalleryDocument {
                id: id.to_string(),
                extra: without(
                    extra,
                    &["id", "lang", "title", "permalink", "photos", "folders", "post"],
                ),
                lang,
                title: gallery.title,
                permalink: gallery.permalink,
                photos: gallery.photos,
                folders: gallery.folders,
                post,
            })
        }
        Shape::Entity => {
            let post = post.ok_or_else(|| missing("post"))?;
            Shaped::Entity(builder.build(&post, &lang)?)
        }
        Shape::PassThrough => Shaped::PassThrough(PassThroughDocument {
            id: id.to_string(),
            extra: without(extra, &["id", "lang"]),
            lang,
        }),
    };

    Ok(shaped)
}

/// Drops the keys a shaped document defines itself, so they aren't emitted
/// twice.
fn without(mut extra: Map<String, Value>, keys: &[&str]) -> Map<String, Value> {
    for key in keys {
        extra.remove(*key);
    }
    extra
}

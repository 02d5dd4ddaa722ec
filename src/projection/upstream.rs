//! The task model of the upstream page renderer, as seen by the projection.

use std::fmt::Debug;
use std::sync::Arc;

use camino::Utf8PathBuf;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::core::{ArcStr, Hash32};
use crate::site::Post;

/// One element of the sequence produced by an upstream generator.
pub enum UpstreamNode {
    /// A no-op node grouping the tasks that follow it.
    Group { name: String },
    Task(UpstreamTask),
}

/// A render task of the upstream graph.
pub struct UpstreamTask {
    pub name: String,
    /// The file this task renders.
    pub target: Utf8PathBuf,
    pub file_deps: Vec<Utf8PathBuf>,
    /// Upstream staleness fingerprint.
    pub fingerprint: Hash32,
    /// Template identifier the page is rendered with.
    pub template: String,
    /// Name of the action that renders the page, e.g. `render_page`.
    pub action: String,
    /// The data the page would be rendered with.
    pub context: Arc<dyn ContextProvider>,
}

impl Debug for UpstreamTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamTask")
            .field("name", &self.name)
            .field("target", &self.target)
            .field("template", &self.template)
            .field("action", &self.action)
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}

/// A component of the host generator producing render tasks.
pub trait TaskGenerator {
    /// Name of the component, e.g. `render_posts`.
    fn name(&self) -> &str;

    /// Lazily produced tasks. The first node is a [`UpstreamNode::Group`].
    fn gen_tasks(&self) -> Box<dyn Iterator<Item = UpstreamNode> + '_>;
}

/// Hands out the render context of an upstream task on demand.
pub trait ContextProvider: Send + Sync {
    fn context(&self) -> anyhow::Result<RenderContext>;
}

impl<F> ContextProvider for F
where
    F: Fn() -> anyhow::Result<RenderContext> + Send + Sync,
{
    fn context(&self) -> anyhow::Result<RenderContext> {
        self()
    }
}

/// The data an upstream page is rendered with.
#[derive(Debug, Clone)]
pub struct RenderContext {
    pub lang: ArcStr,
    /// Entities of a list page.
    pub posts: Option<Vec<Arc<Post>>>,
    /// The entity of an entity page, or the one attached to a gallery.
    pub post: Option<Arc<Post>>,
    pub gallery: Option<Gallery>,
    /// Every other JSON-compatible value of the context.
    pub extra: Map<String, Value>,
}

impl RenderContext {
    pub fn new(lang: impl Into<ArcStr>) -> Self {
        Self {
            lang: lang.into(),
            posts: None,
            post: None,
            gallery: None,
            extra: Map::new(),
        }
    }

    pub fn with_posts(mut self, posts: Vec<Arc<Post>>) -> Self {
        self.posts = Some(posts);
        self
    }

    pub fn with_post(mut self, post: Arc<Post>) -> Self {
        self.post = Some(post);
        self
    }

    pub fn with_gallery(mut self, gallery: Gallery) -> Self {
        self.gallery = Some(gallery);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Gallery {
    pub title: String,
    pub permalink: String,
    pub photos: Vec<Photo>,
    /// Sub-galleries.
    pub folders: Vec<Folder>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Photo {
    pub url: String,
    pub url_thumb: String,
    pub title: String,
    pub size: Size,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Size {
    pub w: u32,
    pub h: u32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Folder {
    pub name: String,
    pub permalink: String,
}

//! Per-entity JSON documents and their build-scoped cache.

use std::fmt::Write;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, FixedOffset};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::core::{ArcStr, json_id};
use crate::error::ExtractError;
use crate::rewrite::{LinkRewriter, strip_markup};
use crate::site::{Localized, Post, Site};

/// Markers separating the teaser from the rest of a body.
const TEASER_MARKERS: [&str; 2] = ["<!-- TEASER_END -->", "<!--more-->"];

/// Link kind used to resolve tag pages.
const TAG_KIND: &str = "tag";

/// A translation of the entity into another locale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Translation {
    pub lang: ArcStr,
    pub permalink: String,
    pub id: String,
}

/// The previous or next entity in the timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Neighbor {
    pub title: String,
    pub permalink: String,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagRef {
    pub name: String,
    pub link: String,
    pub id: String,
}

/// The JSON twin of one entity in one locale.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub abs_permalink: String,
    pub author: String,
    pub date: DateTime<FixedOffset>,
    pub formatted_date: String,
    pub id: String,
    pub id_comments: String,
    pub is_draft: bool,
    pub is_mathjax: bool,
    pub is_private: bool,
    pub iso_date: String,
    pub meta: Map<String, Value>,
    pub permalink: String,
    pub sourcelink: String,
    pub template_name: String,
    pub text: String,
    pub text_stripped: String,
    pub text_teaser: Option<String>,
    pub translated_to: Vec<Translation>,
    pub prev_post: Option<Neighbor>,
    pub next_post: Option<Neighbor>,
    pub enable_comments: bool,
    pub tags: Vec<TagRef>,
    pub use_in_feeds: bool,
}

type Slot<V> = Arc<Mutex<Option<Arc<V>>>>;

/// Memoizes fallible computations per key.
///
/// Every key owns a slot guarded by its own mutex, so concurrent first access
/// to one key computes the value once while other keys proceed in parallel.
/// A failed computation leaves the slot empty.
pub struct Memo<K, V> {
    slots: DashMap<K, Slot<V>>,
}

impl<K, V> Default for Memo<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }
}

impl<K, V> Memo<K, V>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_try_init<E, F>(&self, key: K, init: F) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        // The shard lock is released before the slot is locked.
        let slot = self.slots.entry(key).or_default().clone();
        let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(value) = guard.as_ref() {
            return Ok(value.clone());
        }

        let value = Arc::new(init()?);
        *guard = Some(value.clone());
        Ok(value)
    }

    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        let slot = self.slots.get(key)?.clone();
        let guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
        guard.clone()
    }

    /// Number of computed values.
    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| {
                slot.value()
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .is_some()
            })
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Documents of one build invocation, keyed by entity source path and locale.
pub type DocumentCache = Memo<(Utf8PathBuf, ArcStr), Document>;

/// Builds entity documents, caching them in a shared [`DocumentCache`].
#[derive(Clone)]
pub struct DocumentBuilder {
    site: Arc<Site>,
    cache: Arc<DocumentCache>,
}

impl DocumentBuilder {
    pub fn new(site: Arc<Site>, cache: Arc<DocumentCache>) -> Self {
        Self { site, cache }
    }

    pub fn site(&self) -> &Arc<Site> {
        &self.site
    }

    /// Document of `post` in `lang`. Repeated calls for the same entity and
    /// locale return the same allocation.
    pub fn build(&self, post: &Post, lang: &str) -> Result<Arc<Document>, ExtractError> {
        let key = (post.source.clone(), ArcStr::from(lang));
        self.cache
            .get_or_try_init(key, || self.extract(post, lang))
    }

    fn extract(&self, post: &Post, lang: &str) -> Result<Document, ExtractError> {
        let settings = &self.site.settings;
        let data = post.localized(lang, settings)?;
        let permalink = data.permalink.clone();

        let text = if settings.rewrite_links {
            let base = json_id(&format!(
                "/{}{}",
                settings.json_folder.as_str().trim_matches('/'),
                permalink
            ));
            LinkRewriter::new(&self.site).rewrite_html(&data.text, &base, lang)?
        } else {
            data.text.clone()
        };

        let text_stripped = strip_markup(&text);
        let text_teaser = settings.index_teasers.then(|| teaser(&text).to_string());

        let mut formatted_date = String::new();
        let format = settings.date_format(lang);
        match settings.date_locale(lang)? {
            Some(locale) => write!(formatted_date, "{}", post.date.format_localized(format, locale)),
            None => write!(formatted_date, "{}", post.date.format(format)),
        }
        .map_err(|_| ExtractError::DateFormat(format.to_string()))?;

        let author = meta_str(data, "author")
            .map(str::to_string)
            .unwrap_or_else(|| settings.blog_author.clone());

        let id_comments = meta_str(data, "comment_id")
            .map(str::to_string)
            .unwrap_or_else(|| post.base_path().to_string());

        let is_mathjax = data.meta.get("mathjax").and_then(Value::as_bool) == Some(true)
            || data.tags.iter().any(|tag| tag == "mathjax");

        let translated_to = settings
            .translations
            .iter()
            .filter(|other| other.as_ref() != lang)
            .filter_map(|other| {
                post.locales.get(other).map(|data| Translation {
                    lang: other.clone(),
                    permalink: data.permalink.clone(),
                    id: json_id(&data.permalink),
                })
            })
            .collect();

        let tags = data
            .tags
            .iter()
            .map(|name| {
                let link = self
                    .site
                    .resolver
                    .resolve(TAG_KIND, name, lang)
                    .map_err(|source| ExtractError::Tag {
                        tag: name.clone(),
                        source,
                    })?;

                Ok(TagRef {
                    name: name.clone(),
                    id: json_id(&link),
                    link,
                })
            })
            .collect::<Result<_, ExtractError>>()?;

        Ok(Document {
            abs_permalink: self.site.abs_url(&permalink),
            author,
            date: post.date,
            formatted_date,
            id: json_id(&permalink),
            id_comments,
            is_draft: post.is_draft,
            is_mathjax,
            is_private: post.is_private,
            iso_date: post.date.to_rfc3339(),
            meta: data.meta.clone(),
            sourcelink: source_link(&permalink, &post.source),
            permalink,
            template_name: post.template.clone(),
            text,
            text_stripped,
            text_teaser,
            translated_to,
            prev_post: self.neighbor(post, post.prev.as_deref(), lang)?,
            next_post: self.neighbor(post, post.next.as_deref(), lang)?,
            enable_comments: post.use_in_feeds || settings.comments_in_stories,
            tags,
            use_in_feeds: post.use_in_feeds,
        })
    }

    fn neighbor(
        &self,
        from: &Post,
        target: Option<&Utf8Path>,
        lang: &str,
    ) -> Result<Option<Neighbor>, ExtractError> {
        let Some(target) = target else {
            return Ok(None);
        };

        let post = self
            .site
            .timeline
            .get(target)
            .ok_or_else(|| ExtractError::UnresolvedEntity {
                from: from.source.clone(),
                target: target.to_owned(),
            })?;

        let data = post.localized(lang, &self.site.settings)?;

        Ok(Some(Neighbor {
            title: data.title.clone(),
            permalink: data.permalink.clone(),
            id: json_id(&data.permalink),
        }))
    }
}

fn meta_str<'a>(data: &'a Localized, key: &str) -> Option<&'a str> {
    data.meta
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// The body up to the first teaser marker, or the whole body.
fn teaser(text: &str) -> &str {
    TEASER_MARKERS
        .iter()
        .filter_map(|marker| text.find(marker))
        .min()
        .map_or(text, |end| &text[..end])
}

/// Permalink pointing at the source file instead of the rendered page.
fn source_link(permalink: &str, source: &Utf8Path) -> String {
    let ext = source
        .extension()
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default();

    if permalink.ends_with('/') {
        return format!("{permalink}index{ext}");
    }

    let (dir, file) = permalink.rsplit_once('/').unwrap_or(("", permalink));
    let stem = file.rsplit_once('.').map_or(file, |(stem, _)| stem);

    format!("{dir}/{stem}{ext}")
}

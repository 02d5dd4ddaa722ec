//! The read-only view of the site this crate works with.
//!
//! Content entities are owned by the upstream content system. They are handed
//! over as shared [`Post`] values, and the link resolution and template
//! dependency machinery of the generator is reached through the
//! [`LinkResolver`] and [`TemplateDeps`] traits.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::anyhow;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, FixedOffset};
use serde_json::{Map, Value};

use crate::config::{GlobalConfig, Settings};
use crate::core::ArcStr;
use crate::error::ExtractError;

/// Locale-specific data of a content entity.
#[derive(Debug, Clone, Default)]
pub struct Localized {
    pub title: String,
    /// Metadata mapping from the front matter.
    pub meta: Map<String, Value>,
    /// Tags in declaration order, duplicates included.
    pub tags: Vec<String>,
    /// Rendered body markup.
    pub text: String,
    /// Permalink relative to the site root, e.g. `/posts/hello.html`.
    pub permalink: String,
}

/// A single content entity (post or page).
#[derive(Debug, Clone)]
pub struct Post {
    /// Path of the source file, identifies the entity.
    pub source: Utf8PathBuf,
    pub template: String,
    pub date: DateTime<FixedOffset>,
    pub is_draft: bool,
    pub is_private: bool,
    pub use_in_feeds: bool,
    pub locales: HashMap<ArcStr, Localized>,
    /// Source path of the previous entity in the timeline.
    pub prev: Option<Utf8PathBuf>,
    /// Source path of the next entity in the timeline.
    pub next: Option<Utf8PathBuf>,
}

impl Post {
    pub fn new(
        source: impl Into<Utf8PathBuf>,
        template: impl Into<String>,
        date: DateTime<FixedOffset>,
    ) -> Self {
        Self {
            source: source.into(),
            template: template.into(),
            date,
            is_draft: false,
            is_private: false,
            use_in_feeds: true,
            locales: HashMap::new(),
            prev: None,
            next: None,
        }
    }

    pub fn with_locale(mut self, lang: impl Into<ArcStr>, data: Localized) -> Self {
        self.locales.insert(lang.into(), data);
        self
    }

    pub fn is_translation_available(&self, lang: &str) -> bool {
        self.locales.contains_key(lang)
    }

    /// Data for `lang`. Entities without a translation fall back to the
    /// default locale when the site shows untranslated posts.
    pub fn localized(&self, lang: &str, settings: &Settings) -> Result<&Localized, ExtractError> {
        self.locales
            .get(lang)
            .or_else(|| {
                settings
                    .show_untranslated_posts
                    .then(|| self.locales.get(&settings.default_lang))
                    .flatten()
            })
            .ok_or_else(|| ExtractError::MissingLocale {
                entity: self.source.clone(),
                lang: lang.into(),
            })
    }

    /// Path of the source file without its extension.
    pub fn base_path(&self) -> Utf8PathBuf {
        self.source.with_extension("")
    }
}

/// Every entity of the site, in timeline order.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    posts: Vec<Arc<Post>>,
    index: HashMap<Utf8PathBuf, usize>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, post: impl Into<Arc<Post>>) -> Arc<Post> {
        let post = post.into();
        self.index.insert(post.source.clone(), self.posts.len());
        self.posts.push(post.clone());
        post
    }

    pub fn get(&self, source: &Utf8Path) -> Option<&Arc<Post>> {
        self.index.get(source).map(|&i| &self.posts[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Post>> {
        self.posts.iter()
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }
}

impl FromIterator<Post> for Timeline {
    fn from_iter<I: IntoIterator<Item = Post>>(iter: I) -> Self {
        let mut timeline = Timeline::new();
        for post in iter {
            timeline.push(post);
        }
        timeline
    }
}

/// The link resolution machinery of the site generator.
pub trait LinkResolver: Send + Sync {
    /// Whether `kind` is a link kind this resolver understands.
    fn knows(&self, kind: &str) -> bool;

    /// Absolute site path (starting with `/`) of the `name` page of `kind`.
    fn resolve(&self, kind: &str, name: &str, lang: &str) -> anyhow::Result<String>;
}

/// Resolves links by filling in path patterns.
///
/// A pattern may contain `{name}` and `{lang}`, which is replaced with
/// `/<lang>` for non-default locales and with nothing for the default one,
/// e.g. `{lang}/categories/{name}.html`.
#[derive(Debug, Clone, Default)]
pub struct PatternResolver {
    default_lang: ArcStr,
    patterns: HashMap<String, String>,
}

impl PatternResolver {
    pub fn new(default_lang: impl Into<ArcStr>) -> Self {
        Self {
            default_lang: default_lang.into(),
            patterns: HashMap::new(),
        }
    }

    pub fn kind(mut self, kind: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.patterns.insert(kind.into(), pattern.into());
        self
    }
}

impl LinkResolver for PatternResolver {
    fn knows(&self, kind: &str) -> bool {
        self.patterns.contains_key(kind)
    }

    fn resolve(&self, kind: &str, name: &str, lang: &str) -> anyhow::Result<String> {
        let pattern = self
            .patterns
            .get(kind)
            .ok_or_else(|| anyhow!("no pattern for link kind '{kind}'"))?;

        let prefix = if lang == self.default_lang.as_ref() {
            String::new()
        } else {
            format!("/{lang}")
        };

        let path = pattern.replace("{lang}", &prefix).replace("{name}", name);

        if path.starts_with('/') {
            Ok(path)
        } else {
            Ok(format!("/{path}"))
        }
    }
}

/// The dependency query of the templating engine.
pub trait TemplateDeps: Send + Sync {
    /// Files the template `name` is built from.
    fn template_deps(&self, name: &str) -> Vec<Utf8PathBuf>;
}

/// Everything the builders need to know about the site.
pub struct Site {
    pub settings: Settings,
    pub config: GlobalConfig,
    pub timeline: Timeline,
    pub resolver: Arc<dyn LinkResolver>,
    pub templates: Option<Arc<dyn TemplateDeps>>,
}

impl Site {
    pub fn new(settings: Settings, resolver: Arc<dyn LinkResolver>) -> Self {
        Self {
            settings,
            config: GlobalConfig::default(),
            timeline: Timeline::default(),
            resolver,
            templates: None,
        }
    }

    pub fn with_config(mut self, config: GlobalConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_timeline(mut self, timeline: Timeline) -> Self {
        self.timeline = timeline;
        self
    }

    pub fn with_templates(mut self, templates: Arc<dyn TemplateDeps>) -> Self {
        self.templates = Some(templates);
        self
    }

    /// Absolute URL of a site-root-relative path.
    pub fn abs_url(&self, path: &str) -> String {
        let base = self.settings.site_url.trim_end_matches('/');
        format!("{base}{path}")
    }
}

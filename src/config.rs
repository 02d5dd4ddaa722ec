//! Site settings and the global configuration model.
//!
//! [`Settings`] holds the typed knobs this crate itself reads. [`GlobalConfig`]
//! is the open-ended mapping that ends up in the global context document. Its
//! values are tagged when the configuration is loaded, so the serializer
//! never has to guess whether a value is plain data, a per-locale setting, or
//! something that cannot be serialized at all.

use std::any::type_name;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::fs;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Locale;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::ArcStr;
use crate::error::ConfigError;

/// Locales written right to left. The direction flag of the global context is
/// decided from this list unless [`Settings::rtl`] overrides it.
pub const RTL_LANGUAGES: &[&str] = &["ar", "dv", "fa", "he", "ku", "ps", "sd", "ug", "ur", "yi"];

/// How resolved internal links are written into documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlType {
    /// Relative to the location of the JSON artifact.
    #[default]
    Relative,
    /// Absolute path from the site root, e.g. `/posts/hello.html`.
    Absolute,
    /// Full URL including the site address.
    FullPath,
}

/// A setting that is either shared by every locale, or given per locale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LocaleValue<T> {
    Single(T),
    PerLocale(BTreeMap<ArcStr, T>),
}

impl<T> LocaleValue<T> {
    /// Value for `lang`, falling back to the value of `default_lang`.
    pub fn get(&self, lang: &str, default_lang: &str) -> Option<&T> {
        match self {
            LocaleValue::Single(value) => Some(value),
            LocaleValue::PerLocale(map) => map.get(lang).or_else(|| map.get(default_lang)),
        }
    }
}

/// Settings consumed by the projection itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Public address of the site, used for absolute permalinks.
    pub site_url: String,
    /// Root folder of the generated site, e.g. `output`.
    pub output_folder: Utf8PathBuf,
    /// Subtree of the output folder holding the JSON twins. May be nested.
    pub json_folder: Utf8PathBuf,
    /// The default locale.
    pub default_lang: ArcStr,
    /// Every configured locale, in order.
    pub translations: Vec<ArcStr>,
    /// Author used when an entity doesn't name one.
    pub blog_author: String,
    /// strftime-style format used for `formatted_date`.
    pub date_format: LocaleValue<String>,
    /// POSIX locale (e.g. `de_DE`) naming months and days in `formatted_date`.
    /// English names are used when unset.
    pub date_locale: Option<LocaleValue<String>>,
    /// Whether teasers are generated.
    pub index_teasers: bool,
    /// Whether comments are enabled on entities excluded from feeds.
    pub comments_in_stories: bool,
    /// Use the default locale's data for entities missing a translation.
    pub show_untranslated_posts: bool,
    /// Rewrite scheme-qualified references inside body markup.
    pub rewrite_links: bool,
    pub url_type: UrlType,
    /// Overrides the text direction derived from the default locale.
    pub rtl: Option<bool>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            site_url: "https://example.com".into(),
            output_folder: "output".into(),
            json_folder: "spa".into(),
            default_lang: "en".into(),
            translations: vec!["en".into()],
            blog_author: String::new(),
            date_format: LocaleValue::Single("%Y-%m-%d %H:%M".into()),
            date_locale: None,
            index_teasers: false,
            comments_in_stories: false,
            show_untranslated_posts: true,
            rewrite_links: true,
            url_type: UrlType::default(),
            rtl: None,
        }
    }
}

impl Settings {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let settings: Settings = serde_json::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_path(path: impl AsRef<Utf8Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.translations.is_empty() {
            return Err(ConfigError::NoLocales);
        }

        if !self.translations.contains(&self.default_lang) {
            return Err(ConfigError::DefaultLocale(self.default_lang.clone()));
        }

        // Link depth is counted from these segments.
        let plain = self
            .json_folder
            .as_str()
            .trim_end_matches('/')
            .split('/')
            .all(|segment| !matches!(segment, "" | "." | ".."));

        if !plain {
            return Err(ConfigError::JsonFolder(self.json_folder.clone()));
        }

        for lang in &self.translations {
            self.date_locale(lang)?;
        }

        Ok(())
    }

    pub fn is_rtl(&self) -> bool {
        self.rtl
            .unwrap_or_else(|| RTL_LANGUAGES.contains(&self.default_lang.as_ref()))
    }

    pub fn date_format(&self, lang: &str) -> &str {
        self.date_format
            .get(lang, &self.default_lang)
            .map(String::as_str)
            .unwrap_or("%Y-%m-%d %H:%M")
    }

    pub fn date_locale(&self, lang: &str) -> Result<Option<Locale>, ConfigError> {
        let Some(name) = self
            .date_locale
            .as_ref()
            .and_then(|value| value.get(lang, &self.default_lang))
        else {
            return Ok(None);
        };

        Locale::try_from(name.as_str())
            .map(Some)
            .map_err(|_| ConfigError::DateLocale(name.clone()))
    }
}

/// A per-locale lookup table of strings, like the message catalogue of a theme.
///
/// It can be called like a function (`lookup`), but unlike other callables it
/// is plain data and is serialized as its tables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Functionary {
    default_lang: ArcStr,
    tables: BTreeMap<ArcStr, BTreeMap<String, String>>,
}

impl Functionary {
    pub fn new(default_lang: impl Into<ArcStr>) -> Self {
        Self {
            default_lang: default_lang.into(),
            tables: BTreeMap::new(),
        }
    }

    pub fn insert(
        &mut self,
        lang: impl Into<ArcStr>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> &mut Self {
        self.tables
            .entry(lang.into())
            .or_default()
            .insert(key.into(), value.into());
        self
    }

    /// Looks up `key` in `lang`, then in the default locale, then returns the
    /// key itself.
    pub fn lookup<'a>(&'a self, key: &'a str, lang: &str) -> &'a str {
        self.tables
            .get(lang)
            .and_then(|table| table.get(key))
            .or_else(|| {
                self.tables
                    .get(&self.default_lang)
                    .and_then(|table| table.get(key))
            })
            .map(String::as_str)
            .unwrap_or(key)
    }

    pub fn to_value(&self) -> Value {
        let map = self
            .tables
            .iter()
            .map(|(lang, table)| {
                let table = table
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect();
                (lang.to_string(), Value::Object(table))
            })
            .collect();

        Value::Object(map)
    }
}

type CallableFn = Arc<dyn Fn(&[Value]) -> Value + Send + Sync>;

/// A live function stored in the configuration. Never serialized.
#[derive(Clone)]
pub struct Callable {
    type_name: &'static str,
    func: CallableFn,
}

impl Callable {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&[Value]) -> Value + Send + Sync + 'static,
    {
        Self {
            type_name: type_name::<F>(),
            func: Arc::new(func),
        }
    }

    pub fn call(&self, args: &[Value]) -> Value {
        (self.func)(args)
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl Debug for Callable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Callable({})", self.type_name)
    }
}

/// A configuration value, tagged when the configuration is loaded.
#[derive(Debug, Clone)]
pub enum ConfigValue {
    /// Plain JSON-compatible data.
    Scalar(Value),
    /// A translatable setting, one value per locale.
    PerLocale(BTreeMap<ArcStr, Value>),
    /// A lookup table that is also callable.
    FunctionTable(Functionary),
    /// Anything else that can be called.
    Callable(Callable),
}

impl From<Value> for ConfigValue {
    fn from(value: Value) -> Self {
        ConfigValue::Scalar(value)
    }
}

impl From<Functionary> for ConfigValue {
    fn from(value: Functionary) -> Self {
        ConfigValue::FunctionTable(value)
    }
}

impl From<Callable> for ConfigValue {
    fn from(value: Callable) -> Self {
        ConfigValue::Callable(value)
    }
}

/// The global configuration of the site, sorted by key.
#[derive(Debug, Clone, Default)]
pub struct GlobalConfig {
    entries: BTreeMap<String, ConfigValue>,
}

impl GlobalConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a configuration object. An object whose keys are all configured
    /// locales becomes a per-locale value, everything else is kept as a scalar.
    pub fn from_json(value: Value, locales: &[ArcStr]) -> Result<Self, ConfigError> {
        let Value::Object(map) = value else {
            return Err(ConfigError::NotAnObject);
        };

        let mut config = Self::new();

        for (key, value) in map {
            let value = match value {
                Value::Object(inner) if is_locale_map(&inner, locales) => ConfigValue::PerLocale(
                    inner
                        .into_iter()
                        .map(|(lang, value)| (ArcStr::from(lang), value))
                        .collect(),
                ),
                other => ConfigValue::Scalar(other),
            };

            config.entries.insert(key, value);
        }

        Ok(config)
    }

    pub fn from_json_str(text: &str, locales: &[ArcStr]) -> Result<Self, ConfigError> {
        Self::from_json(serde_json::from_str(text)?, locales)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ConfigValue>) -> &mut Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.entries.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfigValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn is_locale_map(map: &serde_json::Map<String, Value>, locales: &[ArcStr]) -> bool {
    !map.is_empty()
        && map
            .keys()
            .all(|key| locales.iter().any(|lang| lang.as_ref() == key))
}

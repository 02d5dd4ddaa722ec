//! The site-wide context document read by the client on startup.

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::ConfigValue;
use crate::core::Hash32;
use crate::site::Site;

/// Configuration keys that only make sense inside the generator.
const RESERVED_KEYS: [&str; 3] = ["template_hooks", "get_post_data", "timezone"];

/// A configuration value left out of the context because it can't be
/// represented as JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dropped {
    pub key: String,
    pub type_name: &'static str,
}

/// The global context document.
#[derive(Debug, Clone)]
pub struct GlobalContext {
    values: Map<String, Value>,
    dropped: Vec<Dropped>,
}

impl GlobalContext {
    /// Builds the context from the site configuration. `extensions` are added
    /// last and override any key of the same name.
    pub fn build(site: &Site, extensions: Map<String, Value>) -> Self {
        let settings = &site.settings;

        let mut values = Map::new();
        let mut dropped = Vec::new();
        let mut translated: Map<String, Value> = settings
            .translations
            .iter()
            .map(|lang| (lang.to_string(), Value::Object(Map::new())))
            .collect();

        for (key, value) in site.config.iter() {
            if RESERVED_KEYS.contains(&key) {
                debug!(key, "skipping reserved configuration key");
                continue;
            }

            match value {
                ConfigValue::Scalar(value) => {
                    values.insert(key.to_string(), value.clone());
                }
                ConfigValue::PerLocale(map) => {
                    for lang in &settings.translations {
                        let value = map
                            .get(lang.as_ref())
                            .or_else(|| map.get(settings.default_lang.as_ref()))
                            .cloned()
                            .unwrap_or(Value::Null);

                        if let Some(Value::Object(table)) = translated.get_mut(lang.as_ref()) {
                            table.insert(key.to_string(), value);
                        }
                    }
                }
                ConfigValue::FunctionTable(table) => {
                    values.insert(key.to_string(), table.to_value());
                }
                ConfigValue::Callable(callable) => {
                    warn!(
                        key,
                        type_name = callable.type_name(),
                        "dropping non-serializable value from global context"
                    );
                    dropped.push(Dropped {
                        key: key.to_string(),
                        type_name: callable.type_name(),
                    });
                }
            }
        }

        values.insert("translated_settings".into(), Value::Object(translated));
        values.insert("is_rtl".into(), Value::Bool(settings.is_rtl()));
        values.insert(
            "default_lang".into(),
            Value::String(settings.default_lang.to_string()),
        );
        values.extend(extensions);

        Self { values, dropped }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Values that were left out, in key order.
    pub fn dropped(&self) -> &[Dropped] {
        &self.dropped
    }

    pub fn fingerprint(&self) -> serde_json::Result<Hash32> {
        Hash32::hash_json(&self.values)
    }
}

impl Serialize for GlobalContext {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.values.serialize(serializer)
    }
}

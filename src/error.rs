use camino::Utf8PathBuf;
use thiserror::Error;

use crate::core::ArcStr;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Couldn't parse configuration.\n{0}")]
    Json(#[from] serde_json::Error),

    #[error("Couldn't read configuration.\n{0}")]
    Io(#[from] std::io::Error),

    #[error("Global configuration must be a JSON object")]
    NotAnObject,

    #[error("No locales configured")]
    NoLocales,

    #[error("Default locale '{0}' is not listed in translations")]
    DefaultLocale(ArcStr),

    #[error("Invalid JSON output folder '{0}', expected a relative path of plain segments")]
    JsonFolder(Utf8PathBuf),

    #[error("Unknown date locale '{0}'")]
    DateLocale(String),
}

#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("Unknown link kind '{kind}' in reference '{reference}'")]
    UnknownKind { kind: String, reference: String },

    #[error("Couldn't resolve reference '{reference}'.\n{source}")]
    Resolve {
        reference: String,
        source: anyhow::Error,
    },

    #[error("Couldn't rewrite markup.\n{0}")]
    Markup(String),
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Entity '{entity}' has no data for locale '{lang}'")]
    MissingLocale { entity: Utf8PathBuf, lang: ArcStr },

    #[error("Entity '{from}' refers to unknown entity '{target}'")]
    UnresolvedEntity {
        from: Utf8PathBuf,
        target: Utf8PathBuf,
    },

    #[error("Invalid date format '{0}'")]
    DateFormat(String),

    #[error("Couldn't resolve tag '{tag}'.\n{source}")]
    Tag { tag: String, source: anyhow::Error },

    #[error(transparent)]
    Rewrite(#[from] RewriteError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("Generator '{0}' did not start with a group task")]
    MissingGroup(String),

    #[error("Target '{target}' is not inside the output folder '{root}'")]
    OutsideOutput {
        target: Utf8PathBuf,
        root: Utf8PathBuf,
    },

    #[error("Task '{task}' has no '{field}' in its render context")]
    MissingContext { task: String, field: &'static str },

    #[error("Task '{task}' couldn't provide its render context.\n{source}")]
    Context { task: String, source: anyhow::Error },

    #[error("Target '{0}' is produced by more than one task")]
    DuplicateTarget(Utf8PathBuf),

    #[error("Couldn't fingerprint task.\n{0}")]
    Fingerprint(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("Couldn't write '{path}'.\n{source}")]
    Io {
        path: Utf8PathBuf,
        source: std::io::Error,
    },

    #[error("Couldn't serialize '{path}'.\n{source}")]
    Serialize {
        path: Utf8PathBuf,
        source: serde_json::Error,
    },
}

/// Error returned by the producer of a projected task.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Projection(#[from] ProjectionError),

    #[error(transparent)]
    Write(#[from] WriteError),
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Error while building the JSON plan.\n{0}")]
    Plan(#[from] ProjectionError),

    #[error("Task '{0}':\n{1}")]
    Task(String, TaskError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

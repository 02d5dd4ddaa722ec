#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

pub mod config;
pub mod context;
mod core;
pub mod document;
mod error;
pub mod output;
pub mod plan;
pub mod plugin;
pub mod projection;
pub mod rewrite;
pub mod site;
mod utils;

pub use crate::config::{GlobalConfig, Settings, UrlType};
pub use crate::context::GlobalContext;
pub use crate::core::{ArcStr, Hash32, json_id};
pub use crate::document::{Document, DocumentBuilder, DocumentCache};
pub use crate::error::*;
pub use crate::plan::{Diagnostics, Plan};
pub use crate::plugin::{ClientTemplates, SpaPlugin};
pub use crate::projection::{Filter, Projector, TaskGenerator, TaskNode};
pub use crate::site::{LinkResolver, Post, Site, TemplateDeps, Timeline};
#[cfg(feature = "logging")]
pub use crate::utils::init_logging;

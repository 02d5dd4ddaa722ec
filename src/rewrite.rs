//! Rewriting of scheme-qualified internal references in body markup.
//!
//! Bodies may contain references like `link://tag/rust` or `tag://rust`
//! instead of concrete paths. They are resolved by the site's
//! [`LinkResolver`] and written relative to the location of the JSON
//! document the body ends up in, which sits deeper than the HTML page it
//! mirrors.

use lol_html::errors::RewritingError;
use lol_html::{RewriteStrSettings, element, rewrite_str};
use scraper::Html;

use crate::config::UrlType;
use crate::error::RewriteError;
use crate::site::{LinkResolver, Site};
use crate::utils::relative_url;

/// The scheme that carries the link kind in its first path segment.
const LINK_SCHEME: &str = "link";

/// Attributes that may hold a reference.
const LINK_ATTRIBUTES: [&str; 3] = ["href", "src", "data"];

#[derive(Clone, Copy)]
pub struct LinkRewriter<'a> {
    resolver: &'a dyn LinkResolver,
    url_type: UrlType,
    site_url: &'a str,
}

impl<'a> LinkRewriter<'a> {
    pub fn new(site: &'a Site) -> Self {
        Self {
            resolver: site.resolver.as_ref(),
            url_type: site.settings.url_type,
            site_url: &site.settings.site_url,
        }
    }

    /// Rewrites a single reference for a document living at `base`.
    ///
    /// Returns `None` when the reference is not an internal one, e.g. a plain
    /// path or an `https://` URL.
    pub fn rewrite_reference(
        &self,
        reference: &str,
        base: &str,
        lang: &str,
    ) -> Result<Option<String>, RewriteError> {
        let Some((kind, name, suffix)) = self.parse(reference)? else {
            return Ok(None);
        };

        let path = self
            .resolver
            .resolve(kind, name, lang)
            .map_err(|source| RewriteError::Resolve {
                reference: reference.to_string(),
                source,
            })?;

        let target = format!("{path}{suffix}");

        let url = match self.url_type {
            UrlType::Relative => relative_url(base, &target),
            UrlType::Absolute => target,
            UrlType::FullPath => format!("{}{}", self.site_url.trim_end_matches('/'), target),
        };

        Ok(Some(url))
    }

    /// Rewrites every reference found in the markup fragments of `html`.
    pub fn rewrite_html(&self, html: &str, base: &str, lang: &str) -> Result<String, RewriteError> {
        rewrite_str(
            html,
            RewriteStrSettings {
                element_content_handlers: vec![element!("[href], [src], [data]", |el| {
                    for attr in LINK_ATTRIBUTES {
                        let Some(value) = el.get_attribute(attr) else {
                            continue;
                        };

                        if let Some(url) = self.rewrite_reference(&value, base, lang)? {
                            el.set_attribute(attr, &url)?;
                        }
                    }
                    Ok(())
                })],
                ..RewriteStrSettings::default()
            },
        )
        .map_err(into_rewrite_error)
    }

    /// Splits a reference into `(kind, name, suffix)`.
    fn parse<'r>(
        &self,
        reference: &'r str,
    ) -> Result<Option<(&'r str, &'r str, &'r str)>, RewriteError> {
        let Some((scheme, rest)) = reference.split_once("://") else {
            return Ok(None);
        };

        let valid = !scheme.is_empty()
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));

        if !valid {
            return Ok(None);
        }

        let split = rest.find(['?', '#']).unwrap_or(rest.len());
        let (rest, suffix) = rest.split_at(split);

        if scheme == LINK_SCHEME {
            let (kind, name) = rest.split_once('/').unwrap_or((rest, ""));

            if !self.resolver.knows(kind) {
                return Err(RewriteError::UnknownKind {
                    kind: kind.to_string(),
                    reference: reference.to_string(),
                });
            }

            return Ok(Some((kind, name, suffix)));
        }

        if self.resolver.knows(scheme) {
            Ok(Some((scheme, rest, suffix)))
        } else {
            Ok(None)
        }
    }
}

/// Plain text of `html`: tags and comments are dropped, character references
/// are decoded.
pub(crate) fn strip_markup(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let text: String = fragment.root_element().text().collect();

    text.trim().to_string()
}

fn into_rewrite_error(err: RewritingError) -> RewriteError {
    match err {
        RewritingError::ContentHandlerError(inner) => match inner.downcast::<RewriteError>() {
            Ok(err) => *err,
            Err(other) => RewriteError::Markup(other.to_string()),
        },
        other => RewriteError::Markup(other.to_string()),
    }
}

//! Source records produced by research sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A fetched web page accepted into a research session.
///
/// Sources are deduplicated by normalized URL; `url` always holds the
/// normalized form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// Normalized URL
    pub url: String,

    /// Page title, or the search result title when the page has none
    pub title: String,

    /// Extracted plain text
    pub raw_text: String,

    /// Source type label (e.g. "academic", "government", "web")
    pub source_type: String,

    /// Reliability weight in [0, 1]
    pub reliability_score: f32,

    /// Whether the source type is listed as trusted in the domain profile
    pub trusted: bool,

    /// When the page was fetched
    pub fetched_at: DateTime<Utc>,

    /// Search query that surfaced the page
    pub query: String,
}

impl Source {
    /// Host part of the URL, if it parses.
    pub fn host(&self) -> Option<&str> {
        let rest = self.url.split_once("://").map(|(_, r)| r)?;
        let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
        let host = &rest[..end];
        (!host.is_empty()).then_some(host)
    }

    /// Title when present, otherwise the URL.
    pub fn label(&self) -> &str {
        if self.title.trim().is_empty() {
            &self.url
        } else {
            &self.title
        }
    }
}

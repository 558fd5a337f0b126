//! Source type classification by host.

use std::collections::BTreeMap;

use crate::normalize::host_matches;

/// Fallback source type.
pub const WEB: &str = "web";

const ENCYCLOPEDIAS: &[&str] = &["wikipedia.org", "britannica.com", "scholarpedia.org"];
const RESEARCH_SITES: &[&str] = &[
    "arxiv.org",
    "researchgate.net",
    "doi.org",
    "semanticscholar.org",
];
const PUBLISHERS: &[&str] = &[
    "nature.com",
    "sciencedirect.com",
    "springer.com",
    "wiley.com",
    "plos.org",
    "jstor.org",
    "tandfonline.com",
];

/// Classify `host` into a source type.
///
/// Profile overrides are tried first (longest matching suffix wins), then
/// the built-in rules.
pub fn classify_host(host: &str, overrides: &BTreeMap<String, String>) -> String {
    let host = host.to_ascii_lowercase();

    if let Some((_, source_type)) = overrides
        .iter()
        .filter(|(suffix, _)| host_matches(&host, suffix))
        .max_by_key(|(suffix, _)| suffix.len())
    {
        return source_type.clone();
    }

    builtin_type(&host).to_string()
}

fn builtin_type(host: &str) -> &'static str {
    let labels: Vec<&str> = host.split('.').collect();
    let has_label = |label: &str| labels.iter().any(|l| *l == label);

    if ENCYCLOPEDIAS.iter().any(|d| host_matches(host, d)) {
        return "encyclopedia";
    }
    if RESEARCH_SITES.iter().any(|d| host_matches(host, d)) {
        return "research_institute";
    }
    if has_label("edu") || has_label("ac") || host.contains("university") {
        return "university";
    }
    if has_label("gov") || host.ends_with(".int") || host.ends_with(".mil") {
        return "government";
    }
    if host.contains("journal") || PUBLISHERS.iter().any(|d| host_matches(host, d)) {
        return "journal";
    }
    if host.contains("institute") || host.contains("research") {
        return "research_institute";
    }

    WEB
}

//! Domain profiles and the profile catalog.
//!
//! A profile describes how a subject domain is researched: which questions
//! are asked, which source types are trusted and how much each source type
//! is worth. Profiles are immutable once loaded and are borrowed by the
//! orchestrator for the duration of a session.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use viincci_core::{AppError, AppResult};
use walkdir::WalkDir;

/// Placeholder substituted with the research topic.
pub const TOPIC_PLACEHOLDER: &str = "{topic}";

/// Research profile of a subject domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DomainProfile {
    /// Catalog key (e.g. "botany")
    pub name: String,

    /// Human readable description
    #[serde(default)]
    pub description: String,

    /// Query templates in priority order, each containing `{topic}`
    pub question_templates: Vec<String>,

    /// Source types considered primary for this domain
    pub trusted_source_types: BTreeSet<String>,

    /// Keywords appended to queries
    pub keyword_expansions: Vec<String>,

    /// Weight per source type, in [0, 1]
    pub reliability_weights: BTreeMap<String, f32>,

    /// Host suffix to source type overrides (e.g. "kew.org" -> "botanical_garden")
    #[serde(default)]
    pub source_type_hosts: BTreeMap<String, String>,
}

impl DomainProfile {
    /// Parse and validate a profile from JSON.
    pub fn from_json(json: &str) -> AppResult<Self> {
        let profile: DomainProfile = serde_json::from_str(json)
            .map_err(|e| AppError::Config(format!("Invalid domain profile: {}", e)))?;
        profile.validate()?;
        Ok(profile)
    }

    /// Load and validate a profile file.
    pub fn from_file(path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read domain profile {:?}: {}", path, e))
        })?;

        Self::from_json(&contents)
            .map_err(|e| AppError::Config(format!("{:?}: {}", path, e)))
    }

    /// Fail fast on malformed profiles.
    pub fn validate(&self) -> AppResult<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::Config("Domain profile name is empty".to_string()));
        }

        if self.question_templates.is_empty() {
            return Err(AppError::Config(format!(
                "Domain profile '{}' has no question templates",
                self.name
            )));
        }

        if let Some(template) = self
            .question_templates
            .iter()
            .find(|t| !t.contains(TOPIC_PLACEHOLDER))
        {
            return Err(AppError::Config(format!(
                "Template '{}' in domain profile '{}' lacks the {} placeholder",
                template, self.name, TOPIC_PLACEHOLDER
            )));
        }

        for (source_type, weight) in &self.reliability_weights {
            if !(0.0..=1.0).contains(weight) {
                return Err(AppError::Config(format!(
                    "Reliability weight for '{}' in domain profile '{}' must be in [0, 1], got {}",
                    source_type, self.name, weight
                )));
            }
        }

        Ok(())
    }

    /// Substitute `topic` into every template, in declared order.
    pub fn render_questions(&self, topic: &str) -> Vec<String> {
        self.question_templates
            .iter()
            .map(|t| t.replace(TOPIC_PLACEHOLDER, topic))
            .collect()
    }

    /// Whether `source_type` is one of this domain's primary source types.
    pub fn is_trusted(&self, source_type: &str) -> bool {
        self.trusted_source_types.contains(source_type)
    }
}

/// Built-in profiles plus any user profiles found in the workspace.
#[derive(Debug, Clone, Default)]
pub struct DomainCatalog {
    profiles: BTreeMap<String, DomainProfile>,
}

impl DomainCatalog {
    /// Catalog containing only the built-in domains.
    pub fn builtin() -> Self {
        let profiles = builtin_profiles()
            .into_iter()
            .map(|p| (p.name.clone(), p))
            .collect();
        Self { profiles }
    }

    /// Built-in domains overridden by every `*.json` profile under `dir`.
    ///
    /// A missing directory is not an error; a malformed profile is.
    pub fn load(dir: &Path) -> AppResult<Self> {
        let mut catalog = Self::builtin();

        if !dir.exists() {
            return Ok(catalog);
        }

        for entry in WalkDir::new(dir)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let profile = DomainProfile::from_file(path)?;
            tracing::debug!("Loaded domain profile '{}' from {:?}", profile.name, path);
            catalog.insert(profile);
        }

        Ok(catalog)
    }

    /// Add or replace a profile.
    pub fn insert(&mut self, profile: DomainProfile) {
        self.profiles.insert(profile.name.clone(), profile);
    }

    /// Look up a profile by name.
    pub fn get(&self, name: &str) -> AppResult<&DomainProfile> {
        self.profiles.get(name).ok_or_else(|| {
            AppError::Config(format!(
                "Unknown domain '{}'. Available: {}",
                name,
                self.names().join(", ")
            ))
        })
    }

    /// Profile names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.profiles.keys().map(String::as_str).collect()
    }

    /// Iterate profiles in name order.
    pub fn iter(&self) -> impl Iterator<Item = &DomainProfile> {
        self.profiles.values()
    }
}

fn weights(pairs: &[(&str, f32)]) -> BTreeMap<String, f32> {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn hosts(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn builtin_profiles() -> Vec<DomainProfile> {
    vec![
        DomainProfile {
            name: "botany".to_string(),
            description: "Plant and flora research".to_string(),
            question_templates: strings(&[
                "{topic} what are the benefits",
                "{topic} interesting facts",
                "{topic} care and cultivation guide",
                "{topic} physical description and characteristics",
            ]),
            trusted_source_types: ["university", "research_institute", "botanical_garden"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            keyword_expansions: strings(&["plant", "botanical", "species"]),
            reliability_weights: weights(&[
                ("university", 0.98),
                ("botanical_garden", 0.97),
                ("research_institute", 0.95),
                ("government", 0.9),
                ("encyclopedia", 0.9),
                ("journal", 0.9),
                ("gardening", 0.75),
            ]),
            source_type_hosts: hosts(&[
                ("sanbi.org", "research_institute"),
                ("plantzafrica.com", "botanical_garden"),
                ("kew.org", "botanical_garden"),
                ("rhs.org.uk", "gardening"),
                ("thespruce.com", "gardening"),
            ]),
        },
        DomainProfile {
            name: "medical".to_string(),
            description: "Medical and healthcare research".to_string(),
            question_templates: strings(&[
                "{topic} what are the symptoms",
                "{topic} what are the treatments",
                "{topic} what causes this condition",
                "{topic} what are the risk factors",
            ]),
            trusted_source_types: [
                "university",
                "hospital",
                "research_institute",
                "medical_journal",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            keyword_expansions: strings(&["medical", "clinical", "health"]),
            reliability_weights: weights(&[
                ("government", 0.98),
                ("medical_journal", 0.98),
                ("university", 0.96),
                ("hospital", 0.95),
                ("research_institute", 0.95),
                ("journal", 0.9),
                ("encyclopedia", 0.8),
                ("health_portal", 0.75),
            ]),
            source_type_hosts: hosts(&[
                ("nejm.org", "medical_journal"),
                ("thelancet.com", "medical_journal"),
                ("bmj.com", "medical_journal"),
                ("mayoclinic.org", "hospital"),
                ("clevelandclinic.org", "hospital"),
                ("webmd.com", "health_portal"),
                ("healthline.com", "health_portal"),
            ]),
        },
        DomainProfile {
            name: "carpentry".to_string(),
            description: "Woodworking techniques and materials".to_string(),
            question_templates: strings(&[
                "{topic} what are the techniques",
                "{topic} what tools are required",
                "{topic} safety considerations",
                "{topic} best practices and tips",
            ]),
            trusted_source_types: ["university", "trade_school", "professional_association"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            keyword_expansions: strings(&["woodworking", "carpentry", "joinery"]),
            reliability_weights: weights(&[
                ("professional_association", 0.95),
                ("trade_school", 0.92),
                ("university", 0.9),
                ("government", 0.9),
                ("encyclopedia", 0.8),
                ("trade_magazine", 0.75),
            ]),
            source_type_hosts: hosts(&[
                ("finewoodworking.com", "trade_magazine"),
                ("woodmagazine.com", "trade_magazine"),
                ("osha.gov", "government"),
            ]),
        },
        DomainProfile {
            name: "mathematics".to_string(),
            description: "Mathematical concepts and formulas".to_string(),
            question_templates: strings(&[
                "{topic} what is the theorem or formula",
                "{topic} what are the applications",
                "{topic} proof and derivation",
                "{topic} historical context and development",
            ]),
            trusted_source_types: ["university", "research_institute", "mathematical_society"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            keyword_expansions: strings(&["mathematics", "theorem", "proof"]),
            reliability_weights: weights(&[
                ("university", 0.98),
                ("mathematical_society", 0.96),
                ("research_institute", 0.95),
                ("reference", 0.95),
                ("journal", 0.92),
                ("encyclopedia", 0.85),
            ]),
            source_type_hosts: hosts(&[
                ("ams.org", "mathematical_society"),
                ("siam.org", "mathematical_society"),
                ("mathworld.wolfram.com", "reference"),
                ("brilliant.org", "reference"),
            ]),
        },
    ]
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Project Specification
//!
//! The single input record handed to the coordinator by the requirements
//! analysis collaborator, plus the fixed Genesis pattern library used to
//! annotate feature tasks.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Project archetype selecting the phase template used by the decomposer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProjectArchetype {
    LandingPage,
    #[default]
    SaasApp,
    /// Treated as [`ProjectArchetype::SaasApp`], the more common case.
    Unknown,
}

impl ProjectArchetype {
    /// Archetype actually used for decomposition (`Unknown` falls back to SaaS).
    pub fn resolved(self) -> Self {
        match self {
            ProjectArchetype::Unknown => ProjectArchetype::SaasApp,
            other => other,
        }
    }

    pub fn template_path(self) -> &'static str {
        match self.resolved() {
            ProjectArchetype::LandingPage => "boilerplate/landing-page",
            _ => "boilerplate/saas-app",
        }
    }

    /// Features used when a specification lists none.
    pub fn suggested_features(self) -> Vec<String> {
        let features: &[&str] = match self.resolved() {
            ProjectArchetype::LandingPage => {
                &["hero section", "features showcase", "contact form", "social proof"]
            }
            _ => &["user authentication", "user dashboard", "settings page", "api routes"],
        };
        features.iter().map(|f| f.to_string()).collect()
    }
}

impl fmt::Display for ProjectArchetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProjectArchetype::LandingPage => "landing_page",
            ProjectArchetype::SaasApp => "saas_app",
            ProjectArchetype::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

impl FromStr for ProjectArchetype {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().replace('-', "_").as_str() {
            "landing_page" => ProjectArchetype::LandingPage,
            "saas_app" | "saas" => ProjectArchetype::SaasApp,
            _ => ProjectArchetype::Unknown,
        })
    }
}

/// Constraints attached to a project specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConstraints {
    /// Upper bound on concurrently executing feature workers.
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    /// Optional wall-clock budget in minutes; reported against, never enforced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_minutes: Option<u64>,
}

impl Default for ProjectConstraints {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
            deadline_minutes: None,
        }
    }
}

fn default_max_parallel() -> usize {
    3
}

/// Project specification supplied to `coordinate_autonomous_project`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSpec {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default, alias = "project_type")]
    pub archetype: ProjectArchetype,

    #[serde(default)]
    pub features: Vec<String>,

    #[serde(default)]
    pub constraints: ProjectConstraints,
}

impl ProjectSpec {
    pub fn new(name: impl Into<String>, archetype: ProjectArchetype) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            archetype,
            features: Vec::new(),
            constraints: ProjectConstraints::default(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_features<I, S>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.features = features.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.constraints.max_parallel = max_parallel;
        self
    }

    /// Features to build: the declared list, or the archetype's suggestions.
    pub fn effective_features(&self) -> Vec<String> {
        if self.features.is_empty() {
            self.archetype.suggested_features()
        } else {
            self.features.clone()
        }
    }
}

/// Entry in the fixed Genesis pattern library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenesisPattern {
    pub id: &'static str,
    pub name: &'static str,
    pub archetype: ProjectArchetype,
    pub keywords: &'static [&'static str],
    pub estimated_minutes: u64,
}

const PATTERNS: &[GenesisPattern] = &[
    GenesisPattern {
        id: "lp_hero_section",
        name: "Hero Section",
        archetype: ProjectArchetype::LandingPage,
        keywords: &["hero", "header", "headline", "banner", "cta", "call to action"],
        estimated_minutes: 15,
    },
    GenesisPattern {
        id: "lp_features_showcase",
        name: "Features Showcase",
        archetype: ProjectArchetype::LandingPage,
        keywords: &["features", "showcase", "benefits"],
        estimated_minutes: 20,
    },
    GenesisPattern {
        id: "lp_lead_capture",
        name: "Lead Capture Form",
        archetype: ProjectArchetype::LandingPage,
        keywords: &["form", "contact", "lead", "signup", "waitlist", "newsletter"],
        estimated_minutes: 25,
    },
    GenesisPattern {
        id: "lp_social_proof",
        name: "Social Proof / Testimonials",
        archetype: ProjectArchetype::LandingPage,
        keywords: &["testimonial", "social proof", "reviews", "logos"],
        estimated_minutes: 15,
    },
    GenesisPattern {
        id: "lp_pricing_table",
        name: "Pricing Table",
        archetype: ProjectArchetype::LandingPage,
        keywords: &["pricing", "plans", "tiers"],
        estimated_minutes: 20,
    },
    GenesisPattern {
        id: "lp_faq",
        name: "FAQ Section",
        archetype: ProjectArchetype::LandingPage,
        keywords: &["faq", "questions"],
        estimated_minutes: 10,
    },
    GenesisPattern {
        id: "saas_authentication",
        name: "User Authentication",
        archetype: ProjectArchetype::SaasApp,
        keywords: &["auth", "authentication", "login", "signup", "register", "password", "session"],
        estimated_minutes: 45,
    },
    GenesisPattern {
        id: "saas_dashboard",
        name: "User Dashboard",
        archetype: ProjectArchetype::SaasApp,
        keywords: &["dashboard", "overview", "stats", "analytics"],
        estimated_minutes: 35,
    },
    GenesisPattern {
        id: "saas_settings",
        name: "User Settings",
        archetype: ProjectArchetype::SaasApp,
        keywords: &["settings", "profile", "preferences", "account"],
        estimated_minutes: 25,
    },
    GenesisPattern {
        id: "saas_team_management",
        name: "Team Management",
        archetype: ProjectArchetype::SaasApp,
        keywords: &["team", "organization", "members", "invite", "roles"],
        estimated_minutes: 40,
    },
    GenesisPattern {
        id: "saas_api_routes",
        name: "API Routes",
        archetype: ProjectArchetype::SaasApp,
        keywords: &["api", "routes", "endpoint", "crud", "backend"],
        estimated_minutes: 30,
    },
    GenesisPattern {
        id: "saas_notifications",
        name: "Notifications System",
        archetype: ProjectArchetype::SaasApp,
        keywords: &["notification", "alerts", "email", "inbox"],
        estimated_minutes: 30,
    },
    GenesisPattern {
        id: "saas_billing",
        name: "Subscription Billing",
        archetype: ProjectArchetype::SaasApp,
        keywords: &["billing", "subscription", "payment", "stripe", "checkout"],
        estimated_minutes: 50,
    },
];

/// Read-only view over the built-in pattern library.
pub struct GenesisPatternLibrary;

impl GenesisPatternLibrary {
    pub fn all() -> &'static [GenesisPattern] {
        PATTERNS
    }

    pub fn get(id: &str) -> Option<&'static GenesisPattern> {
        PATTERNS.iter().find(|p| p.id == id)
    }

    /// Patterns of the given archetype whose keywords occur in `feature`.
    pub fn matching(archetype: ProjectArchetype, feature: &str) -> Vec<&'static GenesisPattern> {
        let archetype = archetype.resolved();
        let feature = feature.to_lowercase();
        PATTERNS
            .iter()
            .filter(|p| p.archetype == archetype)
            .filter(|p| p.keywords.iter().any(|k| feature.contains(k)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_archetype_resolves_to_saas() {
        let archetype: ProjectArchetype = "something-else".parse().unwrap();
        assert_eq!(archetype, ProjectArchetype::Unknown);
        assert_eq!(archetype.resolved(), ProjectArchetype::SaasApp);
        assert_eq!(archetype.template_path(), "boilerplate/saas-app");
    }

    #[test]
    fn test_empty_feature_list_uses_suggestions() {
        let spec = ProjectSpec::new("launch", ProjectArchetype::LandingPage);
        let features = spec.effective_features();
        assert_eq!(features.len(), 4);
        assert!(features.contains(&"hero section".to_string()));
    }

    #[test]
    fn test_pattern_matching_is_archetype_scoped() {
        let saas = GenesisPatternLibrary::matching(ProjectArchetype::SaasApp, "User Authentication");
        assert_eq!(saas.len(), 1);
        assert_eq!(saas[0].id, "saas_authentication");

        let landing = GenesisPatternLibrary::matching(ProjectArchetype::LandingPage, "User Authentication");
        assert!(landing.is_empty());
    }

    #[test]
    fn test_spec_yaml_accepts_project_type_alias() {
        let yaml = r#"
name: taskboard
project_type: saas_app
features: ["user dashboard", "team management"]
constraints:
  max_parallel: 2
"#;
        let spec: ProjectSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.archetype, ProjectArchetype::SaasApp);
        assert_eq!(spec.features.len(), 2);
        assert_eq!(spec.constraints.max_parallel, 2);
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the Genesis CLI

pub mod config;
pub mod plan;
pub mod run;

pub use self::config::ConfigCommand;
pub use self::plan::PlanArgs;
pub use self::run::RunArgs;

use anyhow::{Context, Result};
use genesis_core::domain::project::ProjectSpec;
use std::path::Path;

/// Read a project specification from a YAML (or JSON) file.
pub(crate) fn load_project_spec(path: &Path) -> Result<ProjectSpec> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read project specification {:?}", path))?;
    let spec: ProjectSpec = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse project specification {:?}", path))?;
    if spec.name.trim().is_empty() {
        anyhow::bail!("Project specification {:?} has an empty name", path);
    }
    Ok(spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use genesis_core::domain::project::ProjectArchetype;

    #[test]
    fn test_load_project_spec() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("acme.yaml");
        std::fs::write(
            &path,
            "name: acme\narchetype: landing_page\nfeatures:\n  - hero section\nconstraints:\n  max_parallel: 2\n",
        )
        .unwrap();

        let spec = load_project_spec(&path).unwrap();
        assert_eq!(spec.name, "acme");
        assert_eq!(spec.archetype, ProjectArchetype::LandingPage);
        assert_eq!(spec.features, vec!["hero section".to_string()]);
        assert_eq!(spec.constraints.max_parallel, 2);
    }

    #[test]
    fn test_load_project_spec_rejects_empty_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blank.yaml");
        std::fs::write(&path, "name: ''\n").unwrap();
        assert!(load_project_spec(&path).is_err());
    }
}

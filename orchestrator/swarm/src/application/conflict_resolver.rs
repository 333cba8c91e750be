// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Conflict Resolver
//!
//! Tracks divergent versions of shared files and settles them with one of
//! four strategies. At most one conflict is tracked per path; detecting a
//! new conflict on a path replaces the previous record.
//!
//! The two-way merge is deliberately naive: when neither version's lines are
//! a prefix of the other's, the result is the union of distinct lines in
//! first-seen order (older version first). Repeated lines collapse and
//! interleaving is lost.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Detect and resolve concurrent file edits

use crate::domain::conflict::{
    ConflictKind, ConflictResolution, FileConflict, FileVersion, ResolutionStrategy, StrategyKind,
};
use chrono::Utc;
use genesis_core::domain::agent::AgentId;
use genesis_core::domain::events::CoordinationEventKind;
use genesis_core::infrastructure::event_bus::EventBus;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Default)]
struct ResolverState {
    bases: HashMap<String, FileVersion>,
    conflicts: HashMap<String, FileConflict>,
    detected_total: u64,
    resolutions: BTreeMap<StrategyKind, u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictStats {
    pub tracked: usize,
    pub active: usize,
    pub resolved: usize,
    pub bases: usize,
    pub detected_total: u64,
    pub resolutions_by_strategy: BTreeMap<StrategyKind, u64>,
}

pub struct ConflictResolver {
    state: Mutex<ResolverState>,
    events: EventBus,
}

impl ConflictResolver {
    pub fn new(events: EventBus) -> Self {
        Self {
            state: Mutex::new(ResolverState::default()),
            events,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Record the common ancestor for `path`; `reject` restores it.
    pub fn record_base(&self, path: impl Into<String>, version: FileVersion) {
        self.state.lock().bases.insert(path.into(), version);
    }

    pub fn base_for(&self, path: &str) -> Option<FileVersion> {
        self.state.lock().bases.get(path).cloned()
    }

    /// Returns a conflict when at least two supplied versions differ by
    /// checksum. Several versions by one author collapse to that author's
    /// newest.
    pub fn detect_conflict(&self, path: &str, versions: Vec<FileVersion>) -> Option<FileConflict> {
        if versions.len() < 2 {
            return None;
        }
        let checksums: HashSet<&str> = versions.iter().map(|v| v.checksum.as_str()).collect();
        if checksums.len() < 2 {
            return None;
        }

        let mut by_author: BTreeMap<AgentId, FileVersion> = BTreeMap::new();
        for version in versions {
            match by_author.get(&version.author) {
                Some(existing) if existing.modified_at > version.modified_at => {}
                _ => {
                    by_author.insert(version.author.clone(), version);
                }
            }
        }

        let conflict = {
            let mut state = self.state.lock();
            let base = state.bases.get(path).cloned();
            let kind = match &base {
                Some(base) if by_author.values().all(|v| v.checksum != base.checksum) => ConflictKind::BaseDivergence,
                _ => ConflictKind::ConcurrentModification,
            };
            let conflict = FileConflict {
                id: Uuid::new_v4(),
                path: path.to_string(),
                kind,
                agents: by_author.keys().cloned().collect(),
                detected_at: Utc::now(),
                base,
                versions: by_author,
                resolved: false,
                resolution: None,
            };
            state.conflicts.insert(path.to_string(), conflict.clone());
            state.detected_total += 1;
            conflict
        };

        info!(path = %path, agents = conflict.agents.len(), kind = ?conflict.kind, "File conflict detected");
        metrics::counter!("genesis_conflicts_detected_total").increment(1);
        self.events.publish_system_event(CoordinationEventKind::ConflictDetected {
            path: conflict.path.clone(),
            agents: conflict.agents.clone(),
        });
        Some(conflict)
    }

    /// Settle the conflict on `path`. Returns `None` when no conflict is
    /// tracked there. Resolving again replaces the earlier resolution.
    pub fn resolve(&self, path: &str, strategy: ResolutionStrategy, resolver: &AgentId) -> Option<ConflictResolution> {
        let resolution = {
            let mut state = self.state.lock();
            let conflict = state.conflicts.get_mut(path)?;

            let (content, accepted_version) = match &strategy {
                ResolutionStrategy::Merge if conflict.versions.len() == 2 => {
                    let mut pair: Vec<&FileVersion> = conflict.versions.values().collect();
                    pair.sort_by_key(|v| v.modified_at);
                    merge_two(pair[0], pair[1])
                }
                ResolutionStrategy::Merge | ResolutionStrategy::Overwrite => match conflict.newest_version() {
                    Some(newest) => (newest.content.clone(), Some(newest.author.clone())),
                    None => (String::new(), None),
                },
                ResolutionStrategy::Reject => (
                    conflict.base.as_ref().map(|b| b.content.clone()).unwrap_or_default(),
                    None,
                ),
                ResolutionStrategy::Manual { content } => (content.clone(), None),
            };

            let resolution = ConflictResolution {
                strategy: strategy.kind(),
                content,
                resolver: resolver.clone(),
                resolved_at: Utc::now(),
                accepted_version,
            };
            conflict.resolved = true;
            conflict.resolution = Some(resolution.clone());
            *state.resolutions.entry(strategy.kind()).or_insert(0) += 1;
            resolution
        };

        info!(path = %path, strategy = %resolution.strategy, resolver = %resolver, "File conflict resolved");
        metrics::counter!("genesis_conflicts_resolved_total", "strategy" => resolution.strategy.as_str()).increment(1);
        self.events.publish_agent_event(
            resolver,
            CoordinationEventKind::ConflictResolved {
                path: path.to_string(),
                strategy: resolution.strategy.to_string(),
            },
        );
        Some(resolution)
    }

    pub fn get_conflict(&self, path: &str) -> Option<FileConflict> {
        self.state.lock().conflicts.get(path).cloned()
    }

    /// Unresolved conflicts, oldest first.
    pub fn active_conflicts(&self) -> Vec<FileConflict> {
        let mut active: Vec<FileConflict> = self
            .state
            .lock()
            .conflicts
            .values()
            .filter(|c| !c.resolved)
            .cloned()
            .collect();
        active.sort_by_key(|c| c.detected_at);
        active
    }

    pub fn conflicts_for_agent(&self, agent: &AgentId) -> Vec<FileConflict> {
        let mut involved: Vec<FileConflict> = self
            .state
            .lock()
            .conflicts
            .values()
            .filter(|c| c.agents.contains(agent))
            .cloned()
            .collect();
        involved.sort_by_key(|c| c.detected_at);
        involved
    }

    /// Forget resolved conflicts; returns how many were dropped.
    pub fn clear_resolved(&self) -> usize {
        let mut state = self.state.lock();
        let before = state.conflicts.len();
        state.conflicts.retain(|_, c| !c.resolved);
        let cleared = before - state.conflicts.len();
        debug!(cleared, "Cleared resolved conflicts");
        cleared
    }

    pub fn stats(&self) -> ConflictStats {
        let state = self.state.lock();
        let resolved = state.conflicts.values().filter(|c| c.resolved).count();
        ConflictStats {
            tracked: state.conflicts.len(),
            active: state.conflicts.len() - resolved,
            resolved,
            bases: state.bases.len(),
            detected_total: state.detected_total,
            resolutions_by_strategy: state.resolutions.clone(),
        }
    }
}

/// `older` and `newer` are ordered by modification time.
fn merge_two(older: &FileVersion, newer: &FileVersion) -> (String, Option<AgentId>) {
    let older_lines: Vec<&str> = older.content.lines().collect();
    let newer_lines: Vec<&str> = newer.content.lines().collect();

    if newer_lines.starts_with(&older_lines) {
        return (newer.content.clone(), Some(newer.author.clone()));
    }
    if older_lines.starts_with(&newer_lines) {
        return (older.content.clone(), Some(older.author.clone()));
    }

    let mut seen = BTreeSet::new();
    let merged: Vec<&str> = older_lines
        .iter()
        .chain(newer_lines.iter())
        .filter(|line| seen.insert(**line))
        .copied()
        .collect();
    let mut content = merged.join("\n");
    if older.content.ends_with('\n') || newer.content.ends_with('\n') {
        content.push('\n');
    }
    (content, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn resolver() -> ConflictResolver {
        ConflictResolver::new(EventBus::new(100))
    }

    fn version(content: &str, author: &str, age_secs: i64) -> FileVersion {
        FileVersion::new(content, AgentId::new(author)).with_modified_at(Utc::now() - Duration::seconds(age_secs))
    }

    #[test]
    fn test_no_conflict_for_single_or_identical_versions() {
        let resolver = resolver();
        assert!(resolver.detect_conflict("src/app.ts", vec![version("a", "gfa-1", 0)]).is_none());
        assert!(resolver
            .detect_conflict("src/app.ts", vec![version("a", "gfa-1", 5), version("a", "gfa-2", 0)])
            .is_none());
        assert!(resolver.get_conflict("src/app.ts").is_none());
    }

    #[test]
    fn test_detects_divergent_versions() {
        let resolver = resolver();
        let conflict = resolver
            .detect_conflict("src/app.ts", vec![version("a", "gfa-2", 5), version("b", "gfa-1", 0)])
            .unwrap();
        assert_eq!(conflict.kind, ConflictKind::ConcurrentModification);
        assert_eq!(conflict.agents, vec![AgentId::new("gfa-1"), AgentId::new("gfa-2")]);
        assert_eq!(resolver.active_conflicts().len(), 1);
        assert_eq!(resolver.conflicts_for_agent(&AgentId::new("gfa-2")).len(), 1);
        assert!(resolver.conflicts_for_agent(&AgentId::new("gfa-3")).is_empty());
    }

    #[test]
    fn test_base_divergence() {
        let resolver = resolver();
        resolver.record_base("README.md", version("base", "ca", 60));
        let diverged = resolver
            .detect_conflict("README.md", vec![version("x", "gfa-1", 5), version("y", "gfa-2", 0)])
            .unwrap();
        assert_eq!(diverged.kind, ConflictKind::BaseDivergence);

        let one_kept_base = resolver
            .detect_conflict("README.md", vec![version("base", "gfa-1", 5), version("y", "gfa-2", 0)])
            .unwrap();
        assert_eq!(one_kept_base.kind, ConflictKind::ConcurrentModification);
    }

    #[test]
    fn test_merge_prefers_longer_prefix() {
        let resolver = resolver();
        resolver.detect_conflict(
            "src/routes.ts",
            vec![version("a\nb\n", "gfa-1", 10), version("a\nb\nc\n", "gfa-2", 0)],
        );
        let resolution = resolver
            .resolve("src/routes.ts", ResolutionStrategy::Merge, &AgentId::new("ca"))
            .unwrap();
        assert_eq!(resolution.content, "a\nb\nc\n");
        assert_eq!(resolution.accepted_version, Some(AgentId::new("gfa-2")));
        assert!(resolver.get_conflict("src/routes.ts").unwrap().resolved);
    }

    #[test]
    fn test_merge_takes_line_union() {
        let resolver = resolver();
        resolver.detect_conflict(
            "src/routes.ts",
            vec![version("a\nb\na\n", "gfa-1", 10), version("a\nc\n", "gfa-2", 0)],
        );
        let resolution = resolver
            .resolve("src/routes.ts", ResolutionStrategy::Merge, &AgentId::new("ca"))
            .unwrap();
        // Duplicate lines collapse
        assert_eq!(resolution.content, "a\nb\nc\n");
        assert_eq!(resolution.accepted_version, None);
    }

    #[test]
    fn test_merge_of_three_takes_newest() {
        let resolver = resolver();
        resolver.detect_conflict(
            "src/index.ts",
            vec![version("x", "gfa-1", 20), version("z", "gfa-3", 0), version("y", "gfa-2", 10)],
        );
        let resolution = resolver
            .resolve("src/index.ts", ResolutionStrategy::Merge, &AgentId::new("ca"))
            .unwrap();
        assert_eq!(resolution.content, "z");
        assert_eq!(resolution.strategy, StrategyKind::Merge);
    }

    #[test]
    fn test_overwrite_reject_and_manual() {
        let resolver = resolver();
        let ca = AgentId::new("ca");
        let versions = || vec![version("old", "gfa-1", 10), version("new", "gfa-2", 0)];

        resolver.detect_conflict("a.ts", versions());
        assert_eq!(resolver.resolve("a.ts", ResolutionStrategy::Overwrite, &ca).unwrap().content, "new");

        resolver.detect_conflict("b.ts", versions());
        assert_eq!(resolver.resolve("b.ts", ResolutionStrategy::Reject, &ca).unwrap().content, "");

        resolver.record_base("c.ts", version("base", "ca", 60));
        resolver.detect_conflict("c.ts", versions());
        assert_eq!(resolver.resolve("c.ts", ResolutionStrategy::Reject, &ca).unwrap().content, "base");

        resolver.detect_conflict("d.ts", versions());
        let manual = ResolutionStrategy::Manual {
            content: "hand merged".to_string(),
        };
        assert_eq!(resolver.resolve("d.ts", manual, &ca).unwrap().content, "hand merged");

        let stats = resolver.stats();
        assert_eq!(stats.resolved, 4);
        assert_eq!(stats.resolutions_by_strategy.get(&StrategyKind::Reject), Some(&2));
        assert_eq!(resolver.clear_resolved(), 4);
        assert_eq!(resolver.stats().tracked, 0);
    }

    #[test]
    fn test_resolve_unknown_path_is_noop() {
        let resolver = resolver();
        assert!(resolver
            .resolve("missing.ts", ResolutionStrategy::Overwrite, &AgentId::new("ca"))
            .is_none());
    }
}

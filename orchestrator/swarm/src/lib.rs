// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `genesis-swarm`: Agent Swarm Coordination
//!
//! In-process coordination for a group of autonomous agents building one
//! project together.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | Lock grants, messages, file conflicts, snapshots, agent health, the `TaskExecutor` seam |
//! | [`application`] | Application | `LockManager`, `MessageBus`, `ConflictResolver`, `SnapshotManager`, `HealthMonitor`, `CoordinationAgent`, `CoordinationHub` |
//! | [`infrastructure`] | Infrastructure | JSON snapshot store, dry-run executor |
//!
//! ## Key Concepts
//!
//! - **Lock grant**: read grants share a resource; write and exclusive grants
//!   hold it alone. Grants expire after the configured TTL.
//! - **Wait-for graph**: blocked requesters point at the owners they wait on;
//!   a cycle is a deadlock.
//! - **Mailbox**: per-agent, priority ordered, bounded with oldest-first eviction.
//! - **Snapshot**: immutable capture of files, grants and statuses.
//! - **Coordination agent**: runs an execution plan phase by phase through a
//!   `TaskExecutor`.
//!
//! Everything is in-process. There is no network transport and no
//! multi-host consensus.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::*;
pub use domain::*;

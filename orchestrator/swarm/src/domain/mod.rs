// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Value objects and error types of the five coordination services.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Locks, messages, file conflicts, snapshots, agent health,
//!   task execution seam

pub mod conflict;
pub mod executor;
pub mod health;
pub mod lock;
pub mod message;
pub mod snapshot;

pub use conflict::{ConflictError, ConflictKind, ConflictResolution, FileConflict, FileVersion, ResolutionStrategy, StrategyKind};
pub use executor::{ExecutorError, TaskExecutor, TaskOutcome};
pub use health::{AgentHealth, AgentStatus, HealthCheck, HealthError, RecoveryAction, RecoveryKind, StatusUpdate};
pub use lock::{LockError, LockGrant, LockMode, LockRequest};
pub use message::{AgentMessage, MessageError, MessagePayload, MessagePriority, MessageTarget};
pub use snapshot::{SnapshotDiff, SnapshotError, SnapshotMetadata, StateSnapshot};

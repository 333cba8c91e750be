// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod dry_run_executor;
pub mod snapshot_store;

pub use dry_run_executor::DryRunExecutor;
pub use snapshot_store::FileSnapshotStore;

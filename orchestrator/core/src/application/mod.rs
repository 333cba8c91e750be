// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod execution_planner;
pub mod task_decomposer;

pub use execution_planner::ExecutionPlanner;
pub use task_decomposer::TaskDecomposer;

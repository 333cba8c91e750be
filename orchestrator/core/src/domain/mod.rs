// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Records shared by every coordination service and by the scheduler.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Agents, projects, task trees, execution plans, events, configuration

pub mod agent;
pub mod config;
pub mod events;
pub mod plan;
pub mod project;
pub mod task;

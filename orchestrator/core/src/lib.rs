// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Genesis Core
//!
//! Shared coordination domain plus the scheduling layer that turns a project
//! specification into a phased execution plan.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Domain model, task decomposition, execution planning,
//!   coordination event log and logging setup

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Resource Locks
//!
//! Value objects for the lock manager.
//!
//! - [`LockMode`]: read / write / exclusive; only read+read is compatible.
//! - [`LockRequest`]: a pending acquisition, alive only while the caller waits.
//! - [`LockGrant`]: a held access right with an expiry.
//!
//! A resource holds either a single write/exclusive grant or any number of
//! read grants, each with its own owner and release handle.

use chrono::{DateTime, Utc};
use genesis_core::domain::agent::AgentId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockMode {
    Read,
    Write,
    Exclusive,
}

impl LockMode {
    /// Whether a grant in `self` mode may coexist with one in `other` mode.
    pub fn is_compatible_with(&self, other: LockMode) -> bool {
        matches!((self, other), (LockMode::Read, LockMode::Read))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LockMode::Read => "read",
            LockMode::Write => "write",
            LockMode::Exclusive => "exclusive",
        }
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LockMode {
    type Err = LockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "read" | "shared" => Ok(LockMode::Read),
            "write" => Ok(LockMode::Write),
            "exclusive" => Ok(LockMode::Exclusive),
            other => Err(LockError::UnknownMode(other.to_string())),
        }
    }
}

/// Acquisition waiting on an incompatible grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRequest {
    pub id: Uuid,
    pub resource_id: String,
    pub mode: LockMode,
    pub requester: AgentId,
    pub timeout_ms: u64,
    pub priority: u8,
    pub requested_at: DateTime<Utc>,
}

impl LockRequest {
    pub fn new(resource_id: impl Into<String>, mode: LockMode, requester: AgentId, timeout: Duration, priority: u8) -> Self {
        Self {
            id: Uuid::new_v4(),
            resource_id: resource_id.into(),
            mode,
            requester,
            timeout_ms: timeout.as_millis() as u64,
            priority,
            requested_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockGrant {
    pub id: Uuid,
    pub resource_id: String,
    pub mode: LockMode,
    pub owner: AgentId,
    pub granted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl LockGrant {
    pub fn new(resource_id: impl Into<String>, mode: LockMode, owner: AgentId, ttl: Duration) -> Self {
        let granted_at = Utc::now();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        Self {
            id: Uuid::new_v4(),
            resource_id: resource_id.into(),
            mode,
            owner,
            granted_at,
            expires_at: granted_at.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LockError {
    #[error("agent {agent} already holds {held} locks (max {max})")]
    TooManyLocks { agent: AgentId, held: usize, max: usize },

    #[error("timed out after {waited_ms}ms waiting for lock on '{resource_id}'")]
    Timeout { resource_id: String, waited_ms: u64 },

    #[error("no locks held on resource '{0}'")]
    UnknownResource(String),

    #[error("agent {agent} does not hold a lock on '{resource_id}'")]
    NotLockOwner { resource_id: String, agent: AgentId },

    #[error("unknown lock mode '{0}'")]
    UnknownMode(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_read_read_is_compatible() {
        use LockMode::*;
        for a in [Read, Write, Exclusive] {
            for b in [Read, Write, Exclusive] {
                assert_eq!(a.is_compatible_with(b), a == Read && b == Read, "{a} vs {b}");
            }
        }
    }

    #[test]
    fn test_grant_expiry() {
        let grant = LockGrant::new("db", LockMode::Write, AgentId::new("gsa-1"), Duration::from_secs(60));
        assert!(!grant.is_expired());
        assert!(grant.is_expired_at(grant.expires_at));
        assert_eq!((grant.expires_at - grant.granted_at).num_seconds(), 60);
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("WRITE".parse::<LockMode>().unwrap(), LockMode::Write);
        assert_eq!("shared".parse::<LockMode>().unwrap(), LockMode::Read);
        assert!(matches!("upgrade".parse::<LockMode>(), Err(LockError::UnknownMode(_))));
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Coordination Configuration Types
//
// Kubernetes-style manifest (apiVersion/kind/metadata/spec) holding the
// tunables of every coordination service:
// - Lock manager caps, TTL and sweep cadence
// - Message bus queue bound, expiry and request polling
// - Snapshot retention, persistence directory, auto-snapshot timer
// - Health monitor timeouts, thresholds and auto-recovery
// - Planner role capacities and resource units
// - Coordination fan-out and failure policy

use crate::domain::agent::AgentRole;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const API_VERSION: &str = "genesis.dev/v1";
pub const KIND: &str = "CoordinationConfig";

/// Top-level configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationConfigManifest {
    /// API version (must be "genesis.dev/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "CoordinationConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: CoordinationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Deployment name (unique per coordinator instance)
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

/// Content under `spec:`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoordinationConfig {
    #[serde(default)]
    pub locks: LockConfig,

    #[serde(default)]
    pub messaging: MessagingConfig,

    #[serde(default)]
    pub snapshots: SnapshotConfig,

    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub planner: PlannerConfig,

    #[serde(default)]
    pub coordination: ExecutionConfig,

    #[serde(default)]
    pub events: EventConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    /// Grants an agent may hold at once; further requests fail immediately
    #[serde(default = "default_max_locks_per_agent")]
    pub max_locks_per_agent: usize,

    /// Lifetime of a grant before the expiry sweep reclaims it
    #[serde(default = "default_lock_ttl_ms")]
    pub lock_ttl_ms: u64,

    /// Cadence of the expiration sweep
    #[serde(default = "default_lock_expiration_check_ms")]
    pub expiration_check_ms: u64,

    /// Upper bound between availability checks while waiting for a lock
    #[serde(default = "default_poll_ms")]
    pub wait_poll_ms: u64,
}

impl LockConfig {
    pub fn lock_ttl(&self) -> Duration {
        Duration::from_millis(self.lock_ttl_ms)
    }

    pub fn expiration_check(&self) -> Duration {
        Duration::from_millis(self.expiration_check_ms)
    }

    pub fn wait_poll(&self) -> Duration {
        Duration::from_millis(self.wait_poll_ms)
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            max_locks_per_agent: default_max_locks_per_agent(),
            lock_ttl_ms: default_lock_ttl_ms(),
            expiration_check_ms: default_lock_expiration_check_ms(),
            wait_poll_ms: default_poll_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagingConfig {
    /// Per-mailbox bound; the oldest message is evicted on overflow
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    /// Expiry applied to messages sent without an explicit one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_ttl_ms: Option<u64>,

    /// Cadence of the message expiry sweep
    #[serde(default = "default_message_expiry_check_ms")]
    pub expiry_check_ms: u64,

    /// Upper bound between mailbox checks while awaiting a response
    #[serde(default = "default_poll_ms")]
    pub request_poll_ms: u64,
}

impl MessagingConfig {
    pub fn expiry_check(&self) -> Duration {
        Duration::from_millis(self.expiry_check_ms)
    }

    pub fn request_poll(&self) -> Duration {
        Duration::from_millis(self.request_poll_ms)
    }

    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl_ms.map(Duration::from_millis)
    }
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            max_queue_size: default_max_queue_size(),
            default_ttl_ms: None,
            expiry_check_ms: default_message_expiry_check_ms(),
            request_poll_ms: default_poll_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Retention bound; oldest snapshots are pruned past it
    #[serde(default = "default_max_snapshots")]
    pub max_snapshots: usize,

    /// Directory for persisted snapshots (one JSON file per snapshot)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,

    /// Interval of the auto-snapshot trigger; disabled when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_snapshot_interval_secs: Option<u64>,
}

impl SnapshotConfig {
    pub fn auto_snapshot_interval(&self) -> Option<Duration> {
        self.auto_snapshot_interval_secs.map(Duration::from_secs)
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            max_snapshots: default_max_snapshots(),
            directory: None,
            auto_snapshot_interval_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Silence longer than this marks an agent unhealthy
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,

    /// Cadence of the check-then-recover loop
    #[serde(default = "default_health_check_interval_ms")]
    pub check_interval_ms: u64,

    /// Error count at which a status update forces `unhealthy`
    #[serde(default = "default_error_threshold")]
    pub error_threshold: u32,

    #[serde(default = "default_true")]
    pub auto_recovery: bool,

    /// Health checks retained per agent
    #[serde(default = "default_max_checks_per_agent")]
    pub max_checks_per_agent: usize,
}

impl HealthConfig {
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            check_interval_ms: default_health_check_interval_ms(),
            error_threshold: default_error_threshold(),
            auto_recovery: true,
            max_checks_per_agent: default_max_checks_per_agent(),
        }
    }
}

/// Scheduling capability of one role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleCapacity {
    /// Whether ready tasks of this role may be batched into parallel groups
    pub parallel: bool,

    /// Concurrent tasks (and CPU units) available to the role
    pub capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    #[serde(default = "default_role_capacities")]
    pub roles: BTreeMap<AgentRole, RoleCapacity>,

    /// Memory-equivalent charged per task
    #[serde(default = "default_memory_unit_mb")]
    pub memory_unit_mb: u64,

    /// Context-budget-equivalent charged per task
    #[serde(default = "default_context_unit_tokens")]
    pub context_unit_tokens: u64,
}

impl PlannerConfig {
    /// Capacity for `role`; roles missing from the table run sequentially.
    pub fn capacity_for(&self, role: AgentRole) -> RoleCapacity {
        self.roles.get(&role).copied().unwrap_or(RoleCapacity {
            parallel: false,
            capacity: 1,
        })
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            roles: default_role_capacities(),
            memory_unit_mb: default_memory_unit_mb(),
            context_unit_tokens: default_context_unit_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Ceiling applied on top of a group's own max concurrency
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    /// Stop scheduling later phases once a phase reports failures
    #[serde(default = "default_true")]
    pub halt_on_failure: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
            halt_on_failure: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventConfig {
    /// Ring buffer size of each service's event log
    #[serde(default = "default_event_capacity")]
    pub capacity: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            capacity: default_event_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Output format ("json" or "text")
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl Default for CoordinationConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "genesis-coordinator".to_string(),
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: CoordinationConfig::default(),
        }
    }
}

impl CoordinationConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Discover configuration file using precedence order
    /// 1. GENESIS_CONFIG_PATH environment variable
    /// 2. ./genesis-config.yaml (working directory)
    /// 3. ~/.genesis/config.yaml (user home)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("GENESIS_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./genesis-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".genesis").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            Self::from_yaml_file(&path)?
        } else if let Some(path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", path);
            Self::from_yaml_file(path)?
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            Self::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("GENESIS_AUTO_RECOVERY") {
            match val.to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => {
                    tracing::info!("Environment override: GENESIS_AUTO_RECOVERY=true");
                    self.spec.health.auto_recovery = true;
                }
                "false" | "0" | "no" | "off" => {
                    tracing::info!("Environment override: GENESIS_AUTO_RECOVERY=false");
                    self.spec.health.auto_recovery = false;
                }
                _ => {
                    tracing::warn!(
                        "Invalid value for GENESIS_AUTO_RECOVERY: '{}'. Expected true/false. Ignoring.",
                        val
                    );
                }
            }
        }

        if let Ok(val) = std::env::var("GENESIS_MAX_PARALLEL") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => {
                    tracing::info!("Environment override: GENESIS_MAX_PARALLEL={}", n);
                    self.spec.coordination.max_parallel = n;
                }
                _ => tracing::warn!(
                    "Invalid value for GENESIS_MAX_PARALLEL: '{}'. Expected a positive integer. Ignoring.",
                    val
                ),
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.api_version != API_VERSION {
            return invalid(format!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version, API_VERSION
            ));
        }
        if self.kind != KIND {
            return invalid(format!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND));
        }
        if self.metadata.name.is_empty() {
            return invalid("metadata.name cannot be empty".to_string());
        }

        let spec = &self.spec;
        if spec.locks.max_locks_per_agent == 0 {
            return invalid("spec.locks.max_locks_per_agent must be > 0".to_string());
        }
        if spec.locks.wait_poll_ms == 0 || spec.messaging.request_poll_ms == 0 {
            return invalid("poll intervals must be > 0".to_string());
        }
        if spec.locks.expiration_check_ms == 0
            || spec.messaging.expiry_check_ms == 0
            || spec.health.check_interval_ms == 0
            || spec.snapshots.auto_snapshot_interval_secs == Some(0)
        {
            return invalid("background loop intervals must be > 0".to_string());
        }
        if spec.messaging.max_queue_size == 0 {
            return invalid("spec.messaging.max_queue_size must be > 0".to_string());
        }
        if spec.snapshots.max_snapshots == 0 {
            return invalid("spec.snapshots.max_snapshots must be > 0".to_string());
        }
        if spec.coordination.max_parallel == 0 {
            return invalid("spec.coordination.max_parallel must be > 0".to_string());
        }
        if spec.events.capacity == 0 {
            return invalid("spec.events.capacity must be > 0".to_string());
        }
        for (role, capacity) in &spec.planner.roles {
            if capacity.capacity == 0 {
                return invalid(format!("spec.planner.roles.{} capacity must be > 0", role));
            }
        }

        Ok(())
    }
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_max_locks_per_agent() -> usize {
    10
}

fn default_lock_ttl_ms() -> u64 {
    300_000
}

fn default_lock_expiration_check_ms() -> u64 {
    30_000
}

fn default_poll_ms() -> u64 {
    100
}

fn default_max_queue_size() -> usize {
    1000
}

fn default_message_expiry_check_ms() -> u64 {
    60_000
}

fn default_max_snapshots() -> usize {
    50
}

fn default_heartbeat_timeout_ms() -> u64 {
    30_000
}

fn default_health_check_interval_ms() -> u64 {
    10_000
}

fn default_error_threshold() -> u32 {
    5
}

fn default_max_checks_per_agent() -> usize {
    100
}

fn default_role_capacities() -> BTreeMap<AgentRole, RoleCapacity> {
    BTreeMap::from([
        (AgentRole::Coordinator, RoleCapacity { parallel: false, capacity: 1 }),
        (AgentRole::Setup, RoleCapacity { parallel: false, capacity: 1 }),
        (AgentRole::Feature, RoleCapacity { parallel: true, capacity: 3 }),
        (AgentRole::Integration, RoleCapacity { parallel: false, capacity: 1 }),
        (AgentRole::Testing, RoleCapacity { parallel: true, capacity: 2 }),
        (AgentRole::Deployment, RoleCapacity { parallel: false, capacity: 1 }),
    ])
}

fn default_memory_unit_mb() -> u64 {
    512
}

fn default_context_unit_tokens() -> u64 {
    8_000
}

fn default_max_parallel() -> usize {
    3
}

fn default_event_capacity() -> usize {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

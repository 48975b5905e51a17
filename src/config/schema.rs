//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Upstream target URL every request is forwarded to.
    pub target: String,

    /// Authorization context extraction settings.
    pub auth: AuthConfig,

    /// Access policy.
    pub rbac: RbacConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Body size limits.
    pub security: SecurityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Where the identity of a request comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IdentitySource {
    /// Headers set by a fronting identity-aware proxy.
    #[default]
    Headers,
    /// Claims of a JWT carried as `Authorization: Bearer <token>`.
    Bearer,
}

/// Authorization context extraction settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    pub source: IdentitySource,

    /// Header carrying the user name (headers source).
    pub user_header: String,

    /// Header carrying comma-separated group names (headers source).
    pub groups_header: String,

    /// Claim holding the user name (bearer source).
    pub user_claim: String,

    /// Claim holding the group list (bearer source).
    pub groups_claim: String,

    /// Snapshot the request body into the trace record.
    pub capture_body: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            source: IdentitySource::Headers,
            user_header: "x-forwarded-user".to_string(),
            groups_header: "x-forwarded-groups".to_string(),
            user_claim: "sub".to_string(),
            groups_claim: "groups".to_string(),
            capture_body: false,
        }
    }
}

/// Access policy configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RbacConfig {
    /// Let requests without an identity reach rule evaluation.
    pub allow_anonymous: bool,

    /// Rules granting access. Access is denied when no rule matches.
    pub rules: Vec<RuleConfig>,
}

/// A single access rule. Empty lists match anything.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuleConfig {
    /// Rule identifier, reported in the access list of the trace.
    pub name: String,

    #[serde(default)]
    pub users: Vec<String>,

    #[serde(default)]
    pub groups: Vec<String>,

    #[serde(default)]
    pub methods: Vec<String>,

    /// Path prefix to match.
    pub path_prefix: Option<String>,
}

/// Timeout configuration for upstream calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Upstream round trip timeout (including body decoding) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit line-delimited JSON instead of human-readable logs.
    pub json_logging: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logging: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Body size limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum buffered body size in bytes, applied to request body
    /// snapshots and to decompressed upstream responses.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

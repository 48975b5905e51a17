//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check the upstream target is a usable absolute http URL
//! - Validate value ranges (timeouts > 0, limits > 0)
//! - Check policy rules are named uniquely and use real HTTP methods
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use axum::http::{HeaderName, Method};

use crate::config::schema::{GatewayConfig, IdentitySource};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid bind address '{0}'")]
    BindAddress(String),
    #[error("invalid upstream target '{0}': {1}")]
    Target(String, String),
    #[error("{0} must be greater than zero")]
    NotPositive(&'static str),
    #[error("invalid header name '{0}'")]
    HeaderName(String),
    #[error("rule #{0} has an empty name")]
    UnnamedRule(usize),
    #[error("duplicate rule name '{0}'")]
    DuplicateRule(String),
    #[error("rule '{0}' has invalid method '{1}'")]
    Method(String, String),
    #[error("invalid metrics address '{0}'")]
    MetricsAddress(String),
}

/// Validate a parsed configuration, collecting every problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }

    if let Err(reason) = check_target(&config.target) {
        errors.push(ValidationError::Target(config.target.clone(), reason));
    }

    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::NotPositive("timeouts.connect_secs"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::NotPositive("timeouts.request_secs"));
    }
    if config.security.max_body_size == 0 {
        errors.push(ValidationError::NotPositive("security.max_body_size"));
    }

    if config.auth.source == IdentitySource::Headers {
        for name in [&config.auth.user_header, &config.auth.groups_header] {
            if HeaderName::from_bytes(name.as_bytes()).is_err() {
                errors.push(ValidationError::HeaderName(name.clone()));
            }
        }
    }

    let mut seen = HashSet::new();
    for (index, rule) in config.rbac.rules.iter().enumerate() {
        if rule.name.trim().is_empty() {
            errors.push(ValidationError::UnnamedRule(index));
        } else if !seen.insert(rule.name.as_str()) {
            errors.push(ValidationError::DuplicateRule(rule.name.clone()));
        }
        for method in &rule.methods {
            if Method::from_bytes(method.as_bytes()).is_err() {
                errors.push(ValidationError::Method(rule.name.clone(), method.clone()));
            }
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_target(target: &str) -> Result<(), String> {
    let url = url::Url::parse(target).map_err(|e| e.to_string())?;
    if url.scheme() != "http" {
        return Err(format!("unsupported scheme '{}'", url.scheme()));
    }
    if url.host_str().is_none() {
        return Err("missing host".to_string());
    }
    Ok(())
}

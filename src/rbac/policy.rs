//! Rule-based access policy.
//!
//! A request is allowed when at least one rule matches it. A rule matches
//! when every condition it sets holds: the user is listed or shares a group
//! with the rule, the method is listed, and the path lies under the prefix.
//! Unset conditions match anything.
//!
//! Prefixes match whole path segments: `/billing` covers `/billing` and
//! `/billing/7` but not `/billing-secrets`. Paths carrying `.` or `..`
//! segments never match a prefix, since the upstream may resolve them to a
//! location outside it.

use axum::http::Method;

use crate::auth::AuthContext;
use crate::config::{RbacConfig, RuleConfig};

/// Failure to evaluate the policy for a context.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RbacError {
    #[error("request carries no identity")]
    Unauthenticated,
}

/// Outcome of a policy evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    /// Names of the rules that matched.
    pub access: Vec<String>,
}

/// Decides allow/deny for an authorization context.
pub trait RbacEvaluator: Send + Sync {
    fn evaluate(&self, context: &AuthContext) -> Result<Decision, RbacError>;
}

#[derive(Debug, Clone)]
struct Rule {
    name: String,
    users: Vec<String>,
    groups: Vec<String>,
    methods: Vec<Method>,
    path_prefix: Option<String>,
}

impl Rule {
    fn from_config(config: &RuleConfig) -> Self {
        Self {
            name: config.name.clone(),
            users: config.users.clone(),
            groups: config.groups.clone(),
            // Invalid methods are rejected by config validation.
            methods: config
                .methods
                .iter()
                .filter_map(|m| Method::from_bytes(m.to_ascii_uppercase().as_bytes()).ok())
                .collect(),
            path_prefix: config.path_prefix.clone(),
        }
    }

    fn matches(&self, context: &AuthContext) -> bool {
        self.matches_principal(context)
            && (self.methods.is_empty() || self.methods.contains(&context.method))
            && self
                .path_prefix
                .as_deref()
                .map_or(true, |prefix| under_prefix(&context.path, prefix))
    }

    fn matches_principal(&self, context: &AuthContext) -> bool {
        if self.users.is_empty() && self.groups.is_empty() {
            return true;
        }
        let user_listed = context
            .user
            .as_ref()
            .map_or(false, |user| self.users.contains(user));
        user_listed || context.groups.iter().any(|g| self.groups.contains(g))
    }
}

/// Policy compiled from `rbac` configuration.
#[derive(Debug, Clone)]
pub struct PolicyEvaluator {
    rules: Vec<Rule>,
    allow_anonymous: bool,
}

impl PolicyEvaluator {
    pub fn from_config(config: &RbacConfig) -> Self {
        Self {
            rules: config.rules.iter().map(Rule::from_config).collect(),
            allow_anonymous: config.allow_anonymous,
        }
    }

}

fn under_prefix(path: &str, prefix: &str) -> bool {
    if has_dot_segment(path) {
        return false;
    }
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// True for `.` and `..` segments, including percent-encoded dots.
fn has_dot_segment(path: &str) -> bool {
    path.split('/').any(|segment| {
        let segment = segment.to_ascii_lowercase().replace("%2e", ".");
        segment == "." || segment == ".."
    })
}

impl RbacEvaluator for PolicyEvaluator {
    fn evaluate(&self, context: &AuthContext) -> Result<Decision, RbacError> {
        if context.is_anonymous() && !self.allow_anonymous {
            return Err(RbacError::Unauthenticated);
        }

        let access: Vec<String> = self
            .rules
            .iter()
            .filter(|rule| rule.matches(context))
            .map(|rule| rule.name.clone())
            .collect();

        Ok(Decision {
            allowed: !access.is_empty(),
            access,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(name: &str) -> RuleConfig {
        RuleConfig {
            name: name.into(),
            users: vec![],
            groups: vec![],
            methods: vec![],
            path_prefix: None,
        }
    }

    fn context(user: Option<&str>, groups: &[&str], method: Method, path: &str) -> AuthContext {
        AuthContext {
            user: user.map(str::to_string),
            groups: groups.iter().map(|g| g.to_string()).collect(),
            method,
            path: path.into(),
        }
    }

    fn evaluator() -> PolicyEvaluator {
        let mut readers = rule("readers");
        readers.groups = vec!["dev".into()];
        readers.methods = vec!["get".into(), "HEAD".into()];

        let mut admins = rule("admins");
        admins.groups = vec!["admin".into()];

        let mut owner = rule("owner");
        owner.users = vec!["carol".into()];
        owner.path_prefix = Some("/billing".into());

        PolicyEvaluator::from_config(&RbacConfig {
            allow_anonymous: false,
            rules: vec![readers, admins, owner],
        })
    }

    #[test]
    fn test_group_and_method() {
        let policy = evaluator();

        let decision = policy
            .evaluate(&context(Some("alice"), &["dev"], Method::GET, "/api"))
            .unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.access, vec!["readers"]);

        let decision = policy
            .evaluate(&context(Some("alice"), &["dev"], Method::POST, "/api"))
            .unwrap();
        assert!(!decision.allowed);
        assert!(decision.access.is_empty());
    }

    #[test]
    fn test_all_matching_rules_reported() {
        let decision = evaluator()
            .evaluate(&context(Some("carol"), &["admin", "dev"], Method::GET, "/billing/1"))
            .unwrap();
        assert_eq!(decision.access, vec!["readers", "admins", "owner"]);
    }

    #[test]
    fn test_user_and_path_prefix() {
        let policy = evaluator();
        assert!(policy
            .evaluate(&context(Some("carol"), &[], Method::PUT, "/billing/7"))
            .unwrap()
            .allowed);
        assert!(!policy
            .evaluate(&context(Some("carol"), &[], Method::PUT, "/accounts"))
            .unwrap()
            .allowed);
    }

    #[test]
    fn test_path_prefix_matches_whole_segments() {
        let policy = evaluator();
        let allowed = |path: &str| {
            policy
                .evaluate(&context(Some("carol"), &[], Method::GET, path))
                .unwrap()
                .allowed
        };

        assert!(allowed("/billing"));
        assert!(allowed("/billing/"));
        assert!(allowed("/billing/invoices/7"));
        assert!(!allowed("/billing-secrets"));
        assert!(!allowed("/billingX"));
        assert!(!allowed("/bill"));
    }

    #[test]
    fn test_dot_segments_never_match_prefix() {
        let policy = evaluator();
        for path in [
            "/billing/../admin",
            "/billing/./7",
            "/billing/%2E%2E/admin",
            "/billing/.%2e",
            "/billing/..",
        ] {
            let decision = policy
                .evaluate(&context(Some("carol"), &[], Method::GET, path))
                .unwrap();
            assert!(!decision.allowed, "allowed {path}");
        }

        // Dots inside a segment are ordinary characters.
        assert!(policy
            .evaluate(&context(Some("carol"), &[], Method::GET, "/billing/report..v2"))
            .unwrap()
            .allowed);
    }

    #[test]
    fn test_root_prefix_covers_everything() {
        let mut everything = rule("everything");
        everything.users = vec!["carol".into()];
        everything.path_prefix = Some("/".into());
        let policy = PolicyEvaluator::from_config(&RbacConfig {
            allow_anonymous: false,
            rules: vec![everything],
        });

        assert!(policy
            .evaluate(&context(Some("carol"), &[], Method::GET, "/any/thing"))
            .unwrap()
            .allowed);
        assert!(!policy
            .evaluate(&context(Some("carol"), &[], Method::GET, "/any/../thing"))
            .unwrap()
            .allowed);
    }

    #[test]
    fn test_anonymous() {
        let anon = AuthContext::anonymous(Method::GET, "/");
        assert_eq!(evaluator().evaluate(&anon), Err(RbacError::Unauthenticated));

        let open = PolicyEvaluator::from_config(&RbacConfig {
            allow_anonymous: true,
            rules: vec![rule("public")],
        });
        assert_eq!(open.evaluate(&anon).unwrap().access, vec!["public"]);
    }

    #[test]
    fn test_no_rules_denies() {
        let policy = PolicyEvaluator::from_config(&RbacConfig::default());
        let decision = policy
            .evaluate(&context(Some("alice"), &["admin"], Method::GET, "/"))
            .unwrap();
        assert!(!decision.allowed);
    }
}

//! Role based access policy.
//!
//! The model is a small line format:
//!
//! ```text
//! p, <role>, <path pattern>, <METHOD|METHOD>
//! g, <role>, <inherited role>
//! ```
//!
//! Patterns are matched segment by segment: `:name` matches exactly one
//! non-empty segment and a trailing `*` matches the rest of the path. The
//! role `any` matches every caller, anonymous ones included.

use std::{
    collections::{HashMap, HashSet},
    fs,
    path::Path,
};

use http::Method;
use thiserror::Error;
use tracing::{debug, info};

pub const ANY_ROLE: &str = "any";

const DEFAULT_POLICY: &str = include_str!("../../config/policy.csv");

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("policy line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("failed reading policy file: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
struct Rule {
    role: String,
    pattern: String,
    methods: Vec<Method>,
}

#[derive(Debug, Clone, Default)]
pub struct Policy {
    rules: Vec<Rule>,
    /// role -> roles it inherits from
    parents: HashMap<String, Vec<String>>,
}

impl Policy {
    /// The policy shipped with the service.
    pub fn builtin() -> Result<Self, PolicyError> {
        Self::parse(DEFAULT_POLICY)
    }

    /// Loads the policy from `path`, falling back to the built-in one.
    pub fn load(path: Option<&Path>) -> Result<Self, PolicyError> {
        match path {
            Some(path) => {
                info!(path = %path.display(), "loading policy file");
                Self::parse(&fs::read_to_string(path)?)
            }
            None => Self::builtin(),
        }
    }

    pub fn parse(source: &str) -> Result<Self, PolicyError> {
        let mut policy = Policy::default();

        for (idx, raw) in source.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let err = |reason: &str| PolicyError::Parse {
                line: idx + 1,
                reason: reason.to_string(),
            };

            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            match fields.as_slice() {
                ["p", role, pattern, methods] => {
                    let methods = methods
                        .split('|')
                        .map(|m| Method::from_bytes(m.trim().as_bytes()))
                        .collect::<Result<Vec<_>, _>>()
                        .map_err(|_| err("invalid method"))?;
                    if !pattern.starts_with('/') {
                        return Err(err("path pattern must start with '/'"));
                    }
                    policy.rules.push(Rule {
                        role: role.to_string(),
                        pattern: pattern.to_string(),
                        methods,
                    });
                }
                ["g", role, parent] => {
                    policy
                        .parents
                        .entry(role.to_string())
                        .or_default()
                        .push(parent.to_string());
                }
                _ => return Err(err("expected 'p, role, path, methods' or 'g, role, parent'")),
            }
        }

        Ok(policy)
    }

    /// Decides whether a caller holding `roles` may call `method` on `path`.
    pub fn enforce(&self, roles: &[String], path: &str, method: &Method) -> bool {
        let effective = self.expand(roles);

        let allowed = self.rules.iter().any(|rule| {
            (rule.role == ANY_ROLE || effective.contains(rule.role.as_str()))
                && rule.methods.contains(method)
                && path_matches(&rule.pattern, path)
        });

        if !allowed {
            debug!(?roles, path, %method, "policy denied request");
        }
        allowed
    }

    /// Roles plus everything they inherit, transitively.
    fn expand<'a>(&'a self, roles: &'a [String]) -> HashSet<&'a str> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = roles.iter().map(String::as_str).collect();

        while let Some(role) = stack.pop() {
            if seen.insert(role) {
                if let Some(parents) = self.parents.get(role) {
                    stack.extend(parents.iter().map(String::as_str));
                }
            }
        }
        seen
    }
}

pub fn path_matches(pattern: &str, path: &str) -> bool {
    let path = path.trim_end_matches('/');
    let pattern = pattern.trim_end_matches('/');

    let mut path_segments = path.split('/');
    let mut pattern_segments = pattern.split('/');

    loop {
        match (pattern_segments.next(), path_segments.next()) {
            (Some("*"), _) => return true,
            (Some(p), Some(s)) if p.starts_with(':') => {
                if s.is_empty() {
                    return false;
                }
            }
            (Some(p), Some(s)) => {
                if p != s {
                    return false;
                }
            }
            (None, None) => return true,
            _ => return false,
        }
    }
}

//! Enforcement policy and task patterns

use std::collections::HashSet;

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::task::TaskId;

/// Error compiling a task pattern
#[derive(Debug, thiserror::Error)]
#[error("Invalid task pattern '{pattern}': {message}")]
pub struct PatternError {
    pub pattern: String,
    pub message: String,
}

/// Matches task ids against exact ids and `*`/`?` glob patterns.
///
/// Patterns are written in the textual id form (`recipe:task`,
/// `mc:<ns>:recipe:task`). Exact ids are normalized like parsed ids; glob
/// patterns are matched against the id's display form as written.
#[derive(Debug, Clone, Default)]
pub struct TaskMatcher {
    exact: HashSet<TaskId>,
    globs: Option<GlobSet>,
    patterns: Vec<String>,
}

impl TaskMatcher {
    /// Compile a list of patterns
    pub fn new<I, S>(patterns: I) -> Result<Self, PatternError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut exact = HashSet::new();
        let mut builder = GlobSetBuilder::new();
        let mut has_globs = false;
        let mut kept = Vec::new();

        for pattern in patterns {
            let pattern = pattern.as_ref().trim();
            if pattern.is_empty() {
                continue;
            }
            kept.push(pattern.to_string());

            if pattern.contains(['*', '?', '[']) {
                let glob = Glob::new(pattern).map_err(|e| PatternError {
                    pattern: pattern.to_string(),
                    message: e.to_string(),
                })?;
                builder.add(glob);
                has_globs = true;
            } else {
                let id = TaskId::parse(pattern).ok_or_else(|| PatternError {
                    pattern: pattern.to_string(),
                    message: "expected 'recipe:task' or 'mc:<namespace>:recipe:task'".to_string(),
                })?;
                exact.insert(id);
            }
        }

        let globs = if has_globs {
            Some(builder.build().map_err(|e| PatternError {
                pattern: kept.join(", "),
                message: e.to_string(),
            })?)
        } else {
            None
        };

        Ok(Self {
            exact,
            globs,
            patterns: kept,
        })
    }

    /// Whether a task matches any pattern
    pub fn matches(&self, id: &TaskId) -> bool {
        if self.exact.contains(id) {
            return true;
        }
        match &self.globs {
            Some(globs) => globs.is_match(id.to_string()),
            None => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Restricts which uncovered tasks may run in Real form.
///
/// Only the allow-list is consulted here; hard-edge forcing and requests
/// are applied by the closure engine on top of this answer.
#[derive(Debug, Clone, Default)]
pub struct EnforcementPolicy {
    enabled: bool,
    allow: TaskMatcher,
}

impl EnforcementPolicy {
    /// Policy that permits every task
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Policy permitting Real form only for tasks matching `allow`
    pub fn enforcing<I, S>(allow: I) -> Result<Self, PatternError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(Self {
            enabled: true,
            allow: TaskMatcher::new(allow)?,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether the task may run in Real form without a hard demand
    pub fn permits_real(&self, id: &TaskId) -> bool {
        !self.enabled || self.allow.matches(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_permits_everything() {
        let policy = EnforcementPolicy::disabled();
        assert!(!policy.is_enabled());
        assert!(policy.permits_real(&TaskId::new("a1", "compile")));
    }

    #[test]
    fn test_enforcing_allow_list() {
        let policy = EnforcementPolicy::enforcing(["a1:package_write_rpm", "a1:do_build"]).unwrap();
        assert!(policy.permits_real(&TaskId::new("a1", "package_write_rpm")));
        assert!(policy.permits_real(&TaskId::new("a1", "build")));
        assert!(!policy.permits_real(&TaskId::new("a1", "compile")));
    }

    #[test]
    fn test_glob_patterns() {
        let matcher = TaskMatcher::new(["*:package_write_*", "mc:mc1:*"]).unwrap();
        assert!(matcher.matches(&TaskId::new("b1", "package_write_ipk")));
        assert!(matcher.matches(&TaskId::in_namespace("mc1", "a1", "fetch")));
        assert!(!matcher.matches(&TaskId::new("b1", "package")));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(TaskMatcher::new(["nocolon"]).is_err());
        assert!(TaskMatcher::new(["a1:[oops"]).is_err());
    }

    #[test]
    fn test_empty_patterns_ignored() {
        let matcher = TaskMatcher::new(["", "  "]).unwrap();
        assert!(matcher.is_empty());
        assert!(!matcher.matches(&TaskId::new("a1", "fetch")));
    }
}

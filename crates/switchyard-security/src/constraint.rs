use crate::sanitizer::Sanitizer;
use serde::{Deserialize, Serialize};

/// A backend-specific restriction on call parameters.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Constraint {
    /// Absolute file references must live under one of these roots.
    /// Relative references are resolved by the backend in its own workspace.
    FileScope {
        /// Directory prefixes absolute paths must start with.
        allowed_roots: Vec<String>,
    },
    /// Maximum prompt length in characters.
    MaxPromptLength {
        /// Character limit.
        chars: usize,
    },
    /// Maximum number of file references per call.
    MaxFileRefs {
        /// Reference limit.
        count: usize,
    },
}

/// The constraints configured for one backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConstraintSet {
    constraints: Vec<Constraint>,
}

impl ConstraintSet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `constraint` unless it is already present.
    pub fn add(&mut self, constraint: Constraint) {
        if !self.constraints.contains(&constraint) {
            self.constraints.push(constraint);
        }
    }

    /// Whether `constraint` is present.
    pub fn has(&self, constraint: &Constraint) -> bool {
        self.constraints.contains(constraint)
    }

    /// Whether no constraint is configured.
    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// The constraints in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints.iter()
    }

    /// Whether an absolute path falls inside a configured file scope.
    /// Without a `FileScope` constraint every path is in scope.
    pub fn check_file_scope(&self, path: &str) -> bool {
        if !is_absolute(path) {
            return true;
        }
        let mut scoped = false;
        for c in &self.constraints {
            if let Constraint::FileScope { allowed_roots } = c {
                scoped = true;
                if allowed_roots.iter().any(|root| within_root(path, root)) {
                    return true;
                }
            }
        }
        !scoped
    }

    /// Validate a call against every constraint. Traversal and control
    /// character checks from the sanitizer always apply.
    pub fn validate(
        &self,
        sanitizer: &Sanitizer,
        prompt: &str,
        file_refs: &[String],
    ) -> Result<(), String> {
        sanitizer.check_prompt(prompt)?;

        for c in &self.constraints {
            match c {
                Constraint::MaxPromptLength { chars } => {
                    let len = prompt.chars().count();
                    if len > *chars {
                        return Err(format!("prompt length {len} exceeds backend limit {chars}"));
                    }
                }
                Constraint::MaxFileRefs { count } => {
                    if file_refs.len() > *count {
                        return Err(format!(
                            "{} file references exceed backend limit {count}",
                            file_refs.len()
                        ));
                    }
                }
                Constraint::FileScope { .. } => {}
            }
        }

        for path in file_refs {
            sanitizer.check_file_ref(path)?;
            if !self.check_file_scope(path) {
                return Err(format!("file reference '{path}' is outside the allowed roots"));
            }
        }
        Ok(())
    }
}

impl FromIterator<Constraint> for ConstraintSet {
    fn from_iter<I: IntoIterator<Item = Constraint>>(iter: I) -> Self {
        let mut set = Self::new();
        for c in iter {
            set.add(c);
        }
        set
    }
}

fn is_absolute(path: &str) -> bool {
    path.starts_with('/') || path.starts_with('\\') || path.chars().nth(1) == Some(':')
}

fn within_root(path: &str, root: &str) -> bool {
    let root = root.trim_end_matches(['/', '\\']);
    match path.strip_prefix(root) {
        Some(rest) => rest.is_empty() || rest.starts_with(['/', '\\']),
        None => false,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn refs(paths: &[&str]) -> Vec<String> {
        paths.iter().map(|p| (*p).to_string()).collect()
    }

    #[test]
    fn test_file_scope() {
        let mut set = ConstraintSet::new();
        set.add(Constraint::FileScope {
            allowed_roots: vec!["/srv/repo/".to_string()],
        });
        assert!(set.check_file_scope("/srv/repo/src/main.rs"));
        assert!(set.check_file_scope("src/main.rs"));
        assert!(!set.check_file_scope("/srv/repository/secret"));
        assert!(!set.check_file_scope("/etc/passwd"));
    }

    #[test]
    fn test_unscoped_allows_absolute_paths() {
        let set = ConstraintSet::new();
        assert!(set.is_empty());
        assert!(set.check_file_scope("/etc/hosts"));
    }

    #[test]
    fn test_validate_limits() {
        let mut set = ConstraintSet::new();
        set.add(Constraint::MaxPromptLength { chars: 5 });
        set.add(Constraint::MaxFileRefs { count: 1 });
        let s = Sanitizer::default();

        assert!(set.validate(&s, "short", &refs(&["a.rs"])).is_ok());
        assert!(set.validate(&s, "too long", &[]).is_err());
        assert!(set.validate(&s, "ok", &refs(&["a.rs", "b.rs"])).is_err());
    }

    #[test]
    fn test_validate_rejects_traversal_even_without_constraints() {
        let set = ConstraintSet::new();
        let err = set
            .validate(&Sanitizer::default(), "read", &refs(&["../../etc/passwd"]))
            .unwrap_err();
        assert!(err.contains("traversal"));
    }

    #[test]
    fn test_duplicate_constraints_ignored() {
        let mut set = ConstraintSet::new();
        set.add(Constraint::MaxFileRefs { count: 3 });
        set.add(Constraint::MaxFileRefs { count: 3 });
        assert_eq!(set.iter().count(), 1);
        assert!(set.has(&Constraint::MaxFileRefs { count: 3 }));
    }

    #[test]
    fn test_constraint_config_shape() {
        let json = r#"{"type": "file_scope", "allowed_roots": ["/repo"]}"#;
        let c: Constraint = serde_json::from_str(json).unwrap();
        assert_eq!(
            c,
            Constraint::FileScope {
                allowed_roots: vec!["/repo".to_string()]
            }
        );
    }
}

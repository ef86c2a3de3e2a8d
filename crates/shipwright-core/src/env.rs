//! Environment variable access.
//!
//! Everything that reads the process environment goes through [`Environment`]
//! so CI detection and `env` injection can be exercised without touching the
//! real environment.

use std::collections::HashMap;

pub trait Environment: Send + Sync {
    /// Raw lookup. An empty value is still `Some("")`.
    fn var(&self, name: &str) -> Option<String>;

    /// Lookup that treats an empty value as unset.
    fn non_empty(&self, name: &str) -> Option<String> {
        self.var(name).filter(|v| !v.is_empty())
    }

    /// All variables, used to build child-process environments.
    fn vars(&self) -> HashMap<String, String>;
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl Environment for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }

    fn vars(&self) -> HashMap<String, String> {
        std::env::vars().collect()
    }
}

/// A fixed set of variables.
#[derive(Debug, Clone, Default)]
pub struct MapEnv {
    vars: HashMap<String, String>,
}

impl MapEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }
}

impl Environment for MapEnv {
    fn var(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }

    fn vars(&self) -> HashMap<String, String> {
        self.vars.clone()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MapEnv {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_empty_filters_blank_values() {
        let env = MapEnv::new().with("GITHUB_HEAD_REF", "").with("GITHUB_REF", "refs/heads/main");
        assert_eq!(env.var("GITHUB_HEAD_REF").as_deref(), Some(""));
        assert_eq!(env.non_empty("GITHUB_HEAD_REF"), None);
        assert_eq!(env.non_empty("GITHUB_REF").as_deref(), Some("refs/heads/main"));
    }
}

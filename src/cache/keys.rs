//! Cache key definitions.

use std::fmt;

use crate::config::DEFAULT_CACHE_NAMESPACE;

const USER_RECOMMENDATIONS_SEGMENT: &str = "user_recommendations";

/// Key namespace owned by this service, e.g. `trendline:recommendation`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheNamespace(String);

impl CacheNamespace {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self(namespace.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `{namespace}:user_recommendations:{user_id}`
    pub fn user_recommendations_key(&self, user_id: &str) -> String {
        format!("{}{user_id}", self.user_recommendations_prefix())
    }

    /// Literal prefix shared by every per-user recommendation key.
    pub fn user_recommendations_prefix(&self) -> String {
        format!("{}:{USER_RECOMMENDATIONS_SEGMENT}:", self.0)
    }
}

impl Default for CacheNamespace {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_NAMESPACE)
    }
}

impl fmt::Display for CacheNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

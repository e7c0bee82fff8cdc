//! Allow-list of service-provider apps.

use crate::identity::PackageName;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An SP app the IDP is willing to sign in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpConfig {
    pub package_name: PackageName,
    /// Human-readable app name.
    pub app_name: String,
    /// OAuth client id the login artifact is minted for.
    pub client_id: String,
    /// Redirect URL registered for `client_id`.
    pub callback_url: String,
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// Fixed set of trusted SPs, keyed by package name.
///
/// Built once and never mutated, so it can be shared freely.
#[derive(Debug, Clone, Default)]
pub struct TrustRegistry {
    entries: HashMap<PackageName, SpConfig>,
}

impl TrustRegistry {
    /// Build a registry. Later entries for the same package win.
    pub fn new(configs: impl IntoIterator<Item = SpConfig>) -> Self {
        Self {
            entries: configs
                .into_iter()
                .map(|config| (config.package_name.clone(), config))
                .collect(),
        }
    }

    pub fn is_allowed(&self, package: &PackageName) -> bool {
        self.entries.contains_key(package)
    }

    pub fn config_for(&self, package: &PackageName) -> Option<&SpConfig> {
        self.entries.get(package)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries sorted by package name.
    pub fn iter(&self) -> impl Iterator<Item = &SpConfig> {
        let mut configs: Vec<_> = self.entries.values().collect();
        configs.sort_by(|a, b| a.package_name.cmp(&b.package_name));
        configs.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sp(package: &str) -> SpConfig {
        SpConfig {
            package_name: package.parse().unwrap(),
            app_name: package.to_string(),
            client_id: format!("{package}.client"),
            callback_url: format!("{package}://done"),
            scopes: vec!["api".to_string()],
        }
    }

    #[test]
    fn lookup() {
        let registry = TrustRegistry::new([sp("com.example.mail"), sp("com.example.chat")]);
        let mail: PackageName = "com.example.mail".parse().unwrap();
        let other: PackageName = "com.evil.app".parse().unwrap();

        assert!(registry.is_allowed(&mail));
        assert!(!registry.is_allowed(&other));
        assert_eq!(
            registry.config_for(&mail).map(|c| c.client_id.as_str()),
            Some("com.example.mail.client")
        );
        assert!(registry.config_for(&other).is_none());
    }

    #[test]
    fn iter_is_sorted() {
        let registry = TrustRegistry::new([sp("com.b"), sp("com.a")]);
        let names: Vec<_> = registry.iter().map(|c| c.package_name.as_str()).collect();
        assert_eq!(names, ["com.a", "com.b"]);
        assert_eq!(registry.len(), 2);
    }
}

//! TOML configuration.
//!
//! ```toml
//! [idp]
//! package = "com.example.idp"
//! response_timeout_secs = 30
//!
//! [[sp]]
//! package_name = "com.example.sp"
//! app_name = "Example SP"
//! client_id = "client-123"
//! callback_url = "example://oauth/done"
//! scopes = ["api", "refresh_token"]
//! ```

use handoff_core::{PackageName, SpConfig, TrustRegistry};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Component the IDP brings forward for SP-initiated requests.
pub const DEFAULT_LAUNCH_COMPONENT: &str = "handoff.IdpLoginSurface";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffConfig {
    pub idp: IdpConfig,
    /// Trusted SP apps.
    #[serde(default, rename = "sp")]
    pub sps: Vec<SpConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdpConfig {
    /// The one IDP app SPs accept pushes from and send requests to.
    pub package: PackageName,
    #[serde(default = "default_response_timeout_secs")]
    pub response_timeout_secs: u64,
    #[serde(default = "default_launch_component")]
    pub launch_component: String,
}

fn default_response_timeout_secs() -> u64 {
    30
}

fn default_launch_component() -> String {
    DEFAULT_LAUNCH_COMPONENT.into()
}

impl HandoffConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: HandoffConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.idp.response_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        let mut seen = HashSet::new();
        for sp in &self.sps {
            if !seen.insert(&sp.package_name) {
                return Err(ConfigError::DuplicateSp(sp.package_name.clone()));
            }
        }
        Ok(())
    }

    pub fn trust_registry(&self) -> TrustRegistry {
        TrustRegistry::new(self.sps.iter().cloned())
    }

    pub fn idp_package(&self) -> &PackageName {
        &self.idp.package
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.idp.response_timeout_secs)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("SP {0} is listed more than once")]
    DuplicateSp(PackageName),
    #[error("response_timeout_secs must be greater than zero")]
    ZeroTimeout,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[idp]
package = "com.example.idp"

[[sp]]
package_name = "com.example.mail"
app_name = "Mail"
client_id = "mail-client"
callback_url = "mail://oauth/done"
scopes = ["api", "refresh_token"]

[[sp]]
package_name = "com.example.chat"
app_name = "Chat"
client_id = "chat-client"
callback_url = "chat://oauth/done"
"#;

    #[test]
    fn parse_with_defaults() {
        let config = HandoffConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.idp_package().as_str(), "com.example.idp");
        assert_eq!(config.response_timeout(), Duration::from_secs(30));
        assert_eq!(config.idp.launch_component, DEFAULT_LAUNCH_COMPONENT);

        let registry = config.trust_registry();
        assert_eq!(registry.len(), 2);
        let chat: PackageName = "com.example.chat".parse().unwrap();
        assert!(registry.config_for(&chat).unwrap().scopes.is_empty());
    }

    #[test]
    fn rejects_bad_package_name() {
        let content = SAMPLE.replace("com.example.idp", "not a package");
        assert!(matches!(
            HandoffConfig::from_toml_str(&content),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn rejects_duplicate_sp() {
        let content = SAMPLE.replace("com.example.chat", "com.example.mail");
        assert!(matches!(
            HandoffConfig::from_toml_str(&content),
            Err(ConfigError::DuplicateSp(_))
        ));
    }

    #[test]
    fn rejects_zero_timeout() {
        let content = SAMPLE.replace(
            "package = \"com.example.idp\"",
            "package = \"com.example.idp\"\nresponse_timeout_secs = 0",
        );
        assert!(matches!(
            HandoffConfig::from_toml_str(&content),
            Err(ConfigError::ZeroTimeout)
        ));
    }

    #[test]
    fn missing_file() {
        let err = HandoffConfig::load(Path::new("/nonexistent/handoff.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}

//! Agent configuration.
//!
//! Loaded from TOML; every section and field has a default, so an empty
//! file is a valid (if anonymous) configuration.
//!
//! ```toml
//! state_dir = "/var/lib/stratus/client"
//!
//! [node]
//! name = "worker-1"
//! datacenter = "dc1"
//! node_class = "batch"
//! meta = { rack = "r12" }
//!
//! [auth]
//! anonymous_policy = "read"
//! tokens = { "3f1c0b9e" = "write" }
//!
//! [propagation]
//! retry_backoff_ms = 500
//! max_attempts = 5
//! shutdown_grace_ms = 2000
//!
//! [log]
//! format = "json"
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use stratus_auth::{AclDisabled, NodePolicy, StaticTokenResolver, TokenResolver};
use stratus_core::Meta;

use crate::error::ConfigError;

/// Top-level agent configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Identity and static attributes of this node.
    pub node: NodeConfig,
    /// Directory holding durable node state.
    pub state_dir: PathBuf,
    /// Token resolution for the metadata endpoint.
    pub auth: AuthConfig,
    /// Delivery of node updates to the control plane.
    pub propagation: PropagationConfig,
    /// Logging.
    pub log: stratus_log::Config,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            node: NodeConfig::default(),
            state_dir: PathBuf::from("data/client"),
            auth: AuthConfig::default(),
            propagation: PropagationConfig::default(),
            log: stratus_log::Config::default(),
        }
    }
}

impl ClientConfig {
    /// Parse a TOML document. Does not validate.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values the agent cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node.name.trim().is_empty() {
            return Err(ConfigError::invalid("node.name", "must not be empty"));
        }
        if self.node.datacenter.trim().is_empty() {
            return Err(ConfigError::invalid("node.datacenter", "must not be empty"));
        }
        if self.node.meta.keys().any(String::is_empty) {
            return Err(ConfigError::invalid("node.meta", "keys must not be empty"));
        }
        if self.state_dir.as_os_str().is_empty() {
            return Err(ConfigError::invalid("state_dir", "must not be empty"));
        }
        if self.auth.timeout_ms == 0 {
            return Err(ConfigError::invalid("auth.timeout_ms", "must be greater than zero"));
        }
        if self.propagation.max_attempts == 0 {
            return Err(ConfigError::invalid(
                "propagation.max_attempts",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Identity and static attributes of this node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Node name.
    pub name: String,
    /// Datacenter the node belongs to.
    pub datacenter: String,
    /// Scheduling class.
    pub node_class: String,
    /// Metadata seeded on first start. Keys already present in the state
    /// store keep their stored value.
    pub meta: Meta,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: default_node_name(),
            datacenter: "dc1".to_owned(),
            node_class: String::new(),
            meta: Meta::new(),
        }
    }
}

fn default_node_name() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.trim().is_empty())
        .unwrap_or_else(|| "stratus-client".to_owned())
}

/// Token resolution settings.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// When `false`, every caller is allowed everything.
    pub enabled: bool,
    /// Upper bound on a single token resolution.
    pub timeout_ms: u64,
    /// Policy of callers presenting an empty token.
    pub anonymous_policy: NodePolicy,
    /// Known tokens and their policies.
    pub tokens: HashMap<String, NodePolicy>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: 5_000,
            anonymous_policy: NodePolicy::Deny,
            tokens: HashMap::new(),
        }
    }
}

impl AuthConfig {
    /// Resolution timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Build the resolver described by this section.
    pub fn resolver(&self) -> Arc<dyn TokenResolver> {
        if !self.enabled {
            return Arc::new(AclDisabled);
        }
        Arc::new(
            StaticTokenResolver::new(self.anonymous_policy)
                .with_tokens(self.tokens.iter().map(|(t, p)| (t.clone(), *p))),
        )
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("enabled", &self.enabled)
            .field("timeout_ms", &self.timeout_ms)
            .field("anonymous_policy", &self.anonymous_policy)
            .field("tokens", &self.tokens.len())
            .finish()
    }
}

/// Control plane delivery settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropagationConfig {
    /// Pause between failed delivery attempts.
    pub retry_backoff_ms: u64,
    /// Attempts per snapshot before it is dropped.
    pub max_attempts: u32,
    /// How long shutdown waits for the last snapshot to be delivered.
    pub shutdown_grace_ms: u64,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            retry_backoff_ms: 1_000,
            max_attempts: 3,
            shutdown_grace_ms: 5_000,
        }
    }
}

impl PropagationConfig {
    /// Backoff as a [`Duration`].
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Shutdown grace period as a [`Duration`].
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::io::Write;

    #[test]
    fn empty_document_uses_defaults() {
        let config = ClientConfig::from_toml_str("").unwrap();
        assert_eq!(config.node.datacenter, "dc1");
        assert!(config.auth.enabled);
        assert_eq!(config.auth.anonymous_policy, NodePolicy::Deny);
        assert_eq!(config.propagation.max_attempts, 3);
        config.validate().unwrap();
    }

    #[test]
    fn full_document_parses() {
        let config = ClientConfig::from_toml_str(
            r#"
            state_dir = "/tmp/stratus"

            [node]
            name = "worker-1"
            node_class = "batch"
            meta = { rack = "r12" }

            [auth]
            timeout_ms = 250
            anonymous_policy = "read"
            tokens = { "secret" = "write" }

            [propagation]
            retry_backoff_ms = 10
            max_attempts = 5
            shutdown_grace_ms = 750

            [log]
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.node.name, "worker-1");
        assert_eq!(config.node.meta["rack"], "r12");
        assert_eq!(config.state_dir, PathBuf::from("/tmp/stratus"));
        assert_eq!(config.auth.timeout(), Duration::from_millis(250));
        assert_eq!(config.auth.tokens["secret"], NodePolicy::Write);
        assert_eq!(config.propagation.retry_backoff(), Duration::from_millis(10));
        assert_eq!(config.propagation.shutdown_grace(), Duration::from_millis(750));
        assert_eq!(config.log.format, stratus_log::Format::Json);
    }

    #[test]
    fn unknown_policy_is_a_parse_error() {
        let err = ClientConfig::from_toml_str("[auth]\nanonymous_policy = \"root\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[rstest]
    #[case("[node]\nname = \"\"", "node.name")]
    #[case("[node]\ndatacenter = \" \"", "node.datacenter")]
    #[case("[node]\nmeta = { \"\" = \"x\" }", "node.meta")]
    #[case("state_dir = \"\"", "state_dir")]
    #[case("[auth]\ntimeout_ms = 0", "auth.timeout_ms")]
    #[case("[propagation]\nmax_attempts = 0", "propagation.max_attempts")]
    fn validate_rejects(#[case] toml: &str, #[case] expected: &str) {
        let config = ClientConfig::from_toml_str(toml).unwrap();
        match config.validate() {
            Err(ConfigError::InvalidValue { field, .. }) => assert_eq!(field, expected),
            other => panic!("expected invalid {expected}, got {other:?}"),
        }
    }

    #[test]
    fn load_reads_and_validates_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[node]\nname = \"from-file\"").unwrap();

        let config = ClientConfig::load(file.path()).unwrap();
        assert_eq!(config.node.name, "from-file");
    }

    #[test]
    fn load_missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ClientConfig::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[tokio::test]
    async fn resolver_follows_auth_section() {
        let disabled = AuthConfig {
            enabled: false,
            ..AuthConfig::default()
        };
        assert!(disabled.resolver().resolve("anything").await.unwrap().is_none());

        let mut enabled = AuthConfig::default();
        enabled.tokens.insert("secret".into(), NodePolicy::Write);
        let cap = enabled.resolver().resolve("secret").await.unwrap().unwrap();
        assert!(cap.allow_node_write());
    }

    #[test]
    fn debug_hides_tokens() {
        let mut auth = AuthConfig::default();
        auth.tokens.insert("super-secret".into(), NodePolicy::Write);
        assert!(!format!("{auth:?}").contains("super-secret"));
    }
}

//! Core configuration with validation.
//!
//! Sources are layered: defaults, then an optional TOML file, then
//! environment overrides. Call [`ContinuumConfig::validate`] last.
//!
//! ```toml
//! [session]
//! timeout = "30m"
//! kdf_iterations = 10000
//!
//! [rpc]
//! request_timeout = "30s"
//!
//! [authorization.role_grants.auditor]
//! subscribe = ["stream://*@audit/**"]
//! ```

pub use crate::error::ConfigError;
use crate::domain::policy::expand_template;
use continuum_types::{CriPattern, Participant};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Role that may subscribe to unscoped service addresses.
pub const SERVICE_PROVIDER_ROLE: &str = "service-provider";

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContinuumConfig {
    pub session: SessionConfig,
    pub rpc: RpcConfig,
    pub authorization: AuthorizationConfig,
    pub bus: BusConfig,
}

impl ContinuumConfig {
    /// Parse TOML text. Missing sections and fields take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    /// Apply `CONTINUUM_*` environment overrides.
    ///
    /// - `CONTINUUM_SESSION_TIMEOUT_SECS`
    /// - `CONTINUUM_RPC_TIMEOUT_SECS`
    /// - `CONTINUUM_KDF_ITERATIONS`
    /// - `CONTINUUM_NODE_PARTICIPANT`
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(secs) = parse_override::<u64>(&lookup, "CONTINUUM_SESSION_TIMEOUT_SECS")? {
            self.session.timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_override::<u64>(&lookup, "CONTINUUM_RPC_TIMEOUT_SECS")? {
            self.rpc.request_timeout = Duration::from_secs(secs);
        }
        if let Some(iterations) = parse_override::<u32>(&lookup, "CONTINUUM_KDF_ITERATIONS")? {
            self.session.kdf_iterations = iterations;
        }
        if let Some(node) = lookup("CONTINUUM_NODE_PARTICIPANT") {
            self.rpc.node_participant = node;
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "session timeout cannot be 0".into(),
            ));
        }
        if self.rpc.request_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "rpc request_timeout cannot be 0".into(),
            ));
        }
        if self.session.kdf_iterations == 0 {
            return Err(ConfigError::InvalidSession(
                "kdf_iterations cannot be 0".into(),
            ));
        }
        if self.session.salt_len < MIN_SALT_LEN {
            return Err(ConfigError::InvalidSession(format!(
                "salt_len must be at least {MIN_SALT_LEN} bytes"
            )));
        }
        if self.rpc.reply_resource.trim().is_empty() {
            return Err(ConfigError::InvalidRpc("reply_resource cannot be blank".into()));
        }
        if self.rpc.node_participant.trim().is_empty() {
            return Err(ConfigError::InvalidRpc("node_participant cannot be blank".into()));
        }
        if self.bus.channel_capacity == 0 {
            return Err(ConfigError::InvalidBus("channel_capacity cannot be 0".into()));
        }

        self.authorization.validate()
    }
}

fn parse_override<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>, ConfigError> {
    lookup(name)
        .map(|value| {
            value.trim().parse().map_err(|_| ConfigError::InvalidOverride {
                name: name.to_string(),
                value,
            })
        })
        .transpose()
}

const MIN_SALT_LEN: usize = 8;

/// Session lifecycle and session id derivation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Idle time after which a session expires.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// PBKDF2 rounds for session id derivation.
    pub kdf_iterations: u32,
    /// Random salt length in bytes.
    pub salt_len: usize,
    /// How often the session store drops expired sessions.
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30 * 60),
            kdf_iterations: 10_000,
            salt_len: 16,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl SessionConfig {
    /// Touch timer period: half the session timeout.
    #[must_use]
    pub fn touch_interval(&self) -> Duration {
        (self.timeout / 2).max(Duration::from_millis(1))
    }
}

/// RPC invocation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Resource name of the reply address proxies listen on.
    pub reply_resource: String,
    pub default_content_type: String,
    /// Identity this node uses as RPC caller.
    pub node_participant: String,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            reply_resource: "continuum.rpc.reply".to_string(),
            default_content_type: crate::rpc::codec::JSON_CONTENT_TYPE.to_string(),
            node_participant: "continuum-node".to_string(),
        }
    }
}

/// Extra patterns granted to holders of a role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleGrant {
    pub send: Vec<String>,
    pub subscribe: Vec<String>,
}

/// Static authorization templates.
///
/// Templates are CRI patterns that may contain `{participant}` and
/// `{tenant}` placeholders, expanded per session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorizationConfig {
    pub send: Vec<String>,
    pub subscribe: Vec<String>,
    pub role_grants: BTreeMap<String, RoleGrant>,
}

impl Default for AuthorizationConfig {
    fn default() -> Self {
        let mut role_grants = BTreeMap::new();
        role_grants.insert(
            SERVICE_PROVIDER_ROLE.to_string(),
            RoleGrant {
                send: Vec::new(),
                subscribe: vec!["srv://*".to_string(), "srv://*/**".to_string()],
            },
        );

        Self {
            send: vec![
                "srv://*".to_string(),
                "srv://*/**".to_string(),
                "stream://{tenant}@**".to_string(),
            ],
            subscribe: vec![
                "srv://{participant}@**".to_string(),
                "srv://{participant}:*@**".to_string(),
                "stream://{tenant}@**".to_string(),
            ],
            role_grants,
        }
    }
}

impl AuthorizationConfig {
    /// Every template must compile once placeholders are filled.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sample = Participant::new("sample").with_tenant("sample");
        let grants = self
            .role_grants
            .values()
            .flat_map(|grant| grant.send.iter().chain(&grant.subscribe));

        for template in self.send.iter().chain(&self.subscribe).chain(grants) {
            let invalid = |reason: String| ConfigError::InvalidTemplate {
                template: template.clone(),
                reason,
            };
            let expanded = expand_template(template, &sample)
                .ok_or_else(|| invalid("unknown placeholder".to_string()))?;
            CriPattern::new(&expanded).map_err(|e| invalid(e.to_string()))?;
        }
        Ok(())
    }
}

/// In-memory bus sizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub channel_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: continuum_bus::DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

//! Engine, auth and swarm options supplied by the caller.
//!
//! All three are plain data deserialized from the host profile. The
//! provisioner never mutates the caller's copies; it derives updated values
//! as the pipeline progresses.

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::EnginestrapError;

/// Image the caller gets when it does not ask for a specific swarm image.
pub const DEFAULT_SWARM_IMAGE: &str = "swarm:latest";

/// Port the swarm manager listens on inside its container.
pub const SWARM_MANAGER_PORT: u16 = 3376;

/// Options controlling how the Docker daemon is started.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Storage driver; the variant's default applies when unset.
    pub storage_driver: Option<String>,
    /// `key=value` daemon labels.
    pub labels: Vec<String>,
    pub insecure_registry: Vec<String>,
    pub registry_mirror: Vec<String>,
    /// Extra daemon flags without the leading `--` (e.g. `debug`).
    pub arbitrary_flags: Vec<String>,
    /// `KEY=value` environment for the daemon (systemd layouts only).
    pub env: Vec<String>,
}

impl EngineOptions {
    /// Checks that every value can be spliced into the daemon options file
    /// as exactly one argument.
    ///
    /// The default-file layout is sourced by a shell inside single quotes and
    /// the systemd layout is line based, so quotes, backslashes, whitespace
    /// and control characters are rejected.
    pub fn check_values(&self) -> Result<(), EnginestrapError> {
        if let Some(driver) = &self.storage_driver {
            check_value("engine.storage_driver", driver)?;
        }
        for (field, values) in [
            ("engine.labels", &self.labels),
            ("engine.insecure_registry", &self.insecure_registry),
            ("engine.registry_mirror", &self.registry_mirror),
            ("engine.arbitrary_flags", &self.arbitrary_flags),
            ("engine.env", &self.env),
        ] {
            for value in values {
                check_value(field, value)?;
            }
        }
        Ok(())
    }
}

fn check_value(field: &str, value: &str) -> Result<(), EnginestrapError> {
    if value.is_empty() {
        return Err(EnginestrapError::Validation(format!(
            "{} entries must not be empty",
            field
        )));
    }
    if let Some(c) = value
        .chars()
        .find(|c| matches!(c, '\'' | '"' | '\\') || c.is_whitespace() || c.is_control())
    {
        return Err(EnginestrapError::Validation(format!(
            "{} entry {:?} contains forbidden character {:?}",
            field, value, c
        )));
    }
    Ok(())
}

/// Locations of the TLS material on this machine and on the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthOptions {
    pub ca_cert_path: Option<Utf8PathBuf>,
    pub server_cert_path: Option<Utf8PathBuf>,
    pub server_key_path: Option<Utf8PathBuf>,
    pub ca_cert_remote_path: Utf8PathBuf,
    pub server_cert_remote_path: Utf8PathBuf,
    pub server_key_remote_path: Utf8PathBuf,
}

impl AuthOptions {
    /// Returns a copy whose remote paths live under `options_dir`.
    pub fn with_remote_dir(&self, options_dir: &Utf8Path) -> Self {
        Self {
            ca_cert_remote_path: options_dir.join("ca.pem"),
            server_cert_remote_path: options_dir.join("server.pem"),
            server_key_remote_path: options_dir.join("server-key.pem"),
            ..self.clone()
        }
    }

    /// Local/remote pairs for every certificate with a local source.
    pub fn cert_pairs(&self) -> Vec<(&Utf8Path, &Utf8Path)> {
        [
            (&self.ca_cert_path, &self.ca_cert_remote_path),
            (&self.server_cert_path, &self.server_cert_remote_path),
            (&self.server_key_path, &self.server_key_remote_path),
        ]
        .into_iter()
        .filter_map(|(local, remote)| local.as_deref().map(|l| (l, remote.as_path())))
        .collect()
    }
}

fn default_swarm_image() -> String {
    DEFAULT_SWARM_IMAGE.to_string()
}

fn default_swarm_strategy() -> String {
    "spread".to_string()
}

/// Cluster membership options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwarmOptions {
    pub is_swarm: bool,
    pub master: bool,
    #[serde(default = "default_swarm_image")]
    pub image: String,
    /// Discovery backend URL (e.g. `token://…`, `consul://…`).
    pub discovery: String,
    /// Address advertised to the cluster; defaults to the SSH address.
    pub host: Option<String>,
    #[serde(default = "default_swarm_strategy")]
    pub strategy: String,
    /// Extra manager flags without the leading `--`.
    pub arbitrary_flags: Vec<String>,
}

impl Default for SwarmOptions {
    fn default() -> Self {
        Self {
            is_swarm: false,
            master: false,
            image: default_swarm_image(),
            discovery: String::new(),
            host: None,
            strategy: default_swarm_strategy(),
            arbitrary_flags: Vec::new(),
        }
    }
}

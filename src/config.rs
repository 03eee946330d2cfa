//! Host profile loading and validation.
//!
//! A profile is a YAML file describing one host: how to reach it, what to
//! call it and how its daemon should be configured. Relative paths inside
//! the profile are resolved against the directory containing the file.

use std::fs::File;
use std::io::BufReader;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::error::EnginestrapError;
use crate::executor::SshTarget;
use crate::options::{AuthOptions, EngineOptions, SwarmOptions};
use crate::poll::PollPolicy;
use crate::privilege::PrivilegeMethod;
use crate::provisioner::{DEFAULT_ENGINE_PORT, MachineInfo, ProvisionSettings};
use crate::registry::Registry;
use crate::scripts::validate_hostname;

fn default_engine_port() -> u16 {
    DEFAULT_ENGINE_PORT
}

fn default_settle_delay_ms() -> u64 {
    2_000
}

fn default_driver() -> String {
    "generic".to_string()
}

/// The machine being provisioned.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct MachineConfig {
    /// Hostname to give the machine.
    pub name: String,
    /// Driver that created the machine (default: generic)
    #[serde(default = "default_driver")]
    pub driver: String,
}

/// A host profile.
#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    /// Directory the profile was loaded from.
    #[serde(skip)]
    pub dir: Utf8PathBuf,
    pub host: SshTarget,
    pub machine: MachineConfig,
    /// Forces a variant instead of detecting one. The host is still probed.
    #[serde(default)]
    pub variant: Option<String>,
    #[serde(default = "default_engine_port")]
    pub engine_port: u16,
    #[serde(default)]
    pub engine: EngineOptions,
    #[serde(default)]
    pub auth: AuthOptions,
    #[serde(default)]
    pub swarm: SwarmOptions,
    #[serde(default)]
    pub privilege: PrivilegeMethod,
    #[serde(default)]
    pub readiness: PollPolicy,
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
}

impl Profile {
    /// Identity of the machine for the provisioner.
    pub fn machine_info(&self) -> MachineInfo {
        MachineInfo {
            name: self.machine.name.clone(),
            driver_name: self.machine.driver.clone(),
        }
    }

    /// Run settings for the provisioner.
    pub fn settings(&self) -> ProvisionSettings {
        ProvisionSettings {
            privilege: self.privilege,
            engine_port: self.engine_port,
            readiness: self.readiness,
            settle_delay: Duration::from_millis(self.settle_delay_ms),
        }
    }

    /// Address the swarm agent advertises.
    pub fn advertise_host(&self) -> &str {
        self.swarm.host.as_deref().unwrap_or(&self.host.address)
    }

    /// Checks every constraint that does not need the host.
    pub fn validate(&self) -> Result<(), EnginestrapError> {
        if self.host.address.trim().is_empty() {
            return Err(EnginestrapError::Validation(
                "host.address must not be empty".to_string(),
            ));
        }
        if self.host.user.trim().is_empty() {
            return Err(EnginestrapError::Validation("host.user must not be empty".to_string()));
        }
        if self.host.port == 0 || self.engine_port == 0 {
            return Err(EnginestrapError::Validation(
                "host.port and engine_port must be non-zero".to_string(),
            ));
        }
        if let Some(identity) = &self.host.identity_file {
            require_file(identity, "host.identity_file")?;
        }

        validate_hostname(&self.machine.name)?;
        if self.machine.driver.trim().is_empty() {
            return Err(EnginestrapError::Validation(
                "machine.driver must not be empty".to_string(),
            ));
        }

        if let Some(name) = &self.variant {
            Registry::builtin()
                .get(name)
                .ok_or_else(|| EnginestrapError::UnknownVariant(name.clone()))?;
        }

        self.validate_engine()?;

        for (local, label) in [
            (&self.auth.ca_cert_path, "auth.ca_cert_path"),
            (&self.auth.server_cert_path, "auth.server_cert_path"),
            (&self.auth.server_key_path, "auth.server_key_path"),
        ] {
            if let Some(path) = local {
                require_file(path, label)?;
            }
        }

        if self.swarm.is_swarm {
            parse_url(&self.swarm.discovery, "swarm.discovery")?;
        }

        if self.readiness.interval_ms == 0 {
            return Err(EnginestrapError::Validation(
                "readiness.interval_ms must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    fn validate_engine(&self) -> Result<(), EnginestrapError> {
        self.engine.check_values()?;
        if let Some(label) = self.engine.labels.iter().find(|l| !l.contains('=')) {
            return Err(EnginestrapError::Validation(format!(
                "engine label {:?} must have the form key=value",
                label
            )));
        }
        if let Some(entry) = self.engine.env.iter().find(|e| !e.contains('=')) {
            return Err(EnginestrapError::Validation(format!(
                "engine env entry {:?} must have the form KEY=value",
                entry
            )));
        }
        if let Some(flag) = self.engine.arbitrary_flags.iter().find(|f| f.starts_with('-')) {
            return Err(EnginestrapError::Validation(format!(
                "engine flag {:?} must be given without leading dashes",
                flag
            )));
        }
        for mirror in &self.engine.registry_mirror {
            parse_url(mirror, "engine.registry_mirror")?;
        }
        Ok(())
    }

    /// Makes relative local paths absolute against the profile directory.
    fn resolve_paths(&mut self) {
        let dir = self.dir.clone();
        let resolve = |path: &mut Option<Utf8PathBuf>| {
            if let Some(p) = path.as_mut()
                && p.is_relative()
            {
                *p = dir.join(&*p);
            }
        };
        resolve(&mut self.host.identity_file);
        resolve(&mut self.auth.ca_cert_path);
        resolve(&mut self.auth.server_cert_path);
        resolve(&mut self.auth.server_key_path);
    }
}

fn require_file(path: &Utf8Path, label: &str) -> Result<(), EnginestrapError> {
    if !path.is_file() {
        return Err(EnginestrapError::Validation(format!(
            "{} {} does not exist or is not a file",
            label, path
        )));
    }
    Ok(())
}

fn parse_url(value: &str, label: &str) -> Result<Url, EnginestrapError> {
    Url::parse(value).map_err(|e| {
        EnginestrapError::Validation(format!("{} {:?} is not a URL: {}", label, value, e))
    })
}

/// Loads a profile and resolves its relative paths.
pub fn load_profile(path: &Utf8Path) -> Result<Profile, EnginestrapError> {
    let file = File::open(path)
        .map_err(|e| EnginestrapError::io(format!("failed to load file: {}", path), e))?;
    let reader = BufReader::new(file);
    let mut profile: Profile = serde_yaml::from_reader(reader)
        .map_err(|e| EnginestrapError::Config(format!("failed to parse yaml {}: {}", path, e)))?;

    profile.dir = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent.to_path_buf(),
        _ => Utf8PathBuf::from("."),
    };
    profile.resolve_paths();
    debug!("loaded profile for {} from {}", profile.machine.name, path);
    Ok(profile)
}

//! A variant bound to a host, ready to provision it.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::error::EnginestrapError;
use crate::executor::{RemoteCommand, RemoteExecutor};
use crate::options::{AuthOptions, EngineOptions, SwarmOptions};
use crate::os_release::OsRelease;
use crate::pipeline::{Collaborators, Pipeline, ProvisionReport, ProvisionState};
use crate::poll::PollPolicy;
use crate::privilege::PrivilegeMethod;
use crate::render::{DaemonOptions, render};
use crate::steps::{Session, service_status_command};
use crate::variant::{RUNTIME_SERVICE, VariantSpec};

/// Port the daemon's TLS endpoint listens on unless configured otherwise.
pub const DEFAULT_ENGINE_PORT: u16 = 2376;

/// Identity of the machine being provisioned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineInfo {
    /// Hostname given to the machine.
    pub name: String,
    /// Name of the driver that created it; becomes the `provider` label.
    pub driver_name: String,
}

/// Knobs that are not part of the caller's engine/auth/swarm options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProvisionSettings {
    pub privilege: PrivilegeMethod,
    pub engine_port: u16,
    /// How long to wait for the daemon to answer after it was started.
    pub readiness: PollPolicy,
    /// Pause after auth configuration, letting the restarted daemon settle.
    pub settle_delay: Duration,
}

impl Default for ProvisionSettings {
    fn default() -> Self {
        Self {
            privilege: PrivilegeMethod::default(),
            engine_port: DEFAULT_ENGINE_PORT,
            readiness: PollPolicy::default(),
            settle_delay: Duration::from_secs(2),
        }
    }
}

/// Provisions one host with one variant.
///
/// Instances share no mutable state; several provisioners may run in
/// parallel against different hosts.
pub struct Provisioner {
    spec: VariantSpec,
    executor: Arc<dyn RemoteExecutor>,
    os_release: OsRelease,
    machine: MachineInfo,
    settings: ProvisionSettings,
}

impl Provisioner {
    pub fn new(
        spec: VariantSpec,
        executor: Arc<dyn RemoteExecutor>,
        os_release: OsRelease,
        machine: MachineInfo,
        settings: ProvisionSettings,
    ) -> Self {
        Self {
            spec,
            executor,
            os_release,
            machine,
            settings,
        }
    }

    pub fn spec(&self) -> &VariantSpec {
        &self.spec
    }

    pub fn os_release(&self) -> &OsRelease {
        &self.os_release
    }

    pub fn machine(&self) -> &MachineInfo {
        &self.machine
    }

    pub fn settings(&self) -> &ProvisionSettings {
        &self.settings
    }

    pub fn executor(&self) -> &dyn RemoteExecutor {
        self.executor.as_ref()
    }

    /// Step primitives bound to this provisioner's host and variant.
    pub fn session(&self) -> Session<'_> {
        Session::new(self.executor.as_ref(), &self.spec, self.settings.privilege)
    }

    /// Whether the engine binary is on the host's `PATH`.
    pub fn runtime_installed(&self) -> bool {
        self.session()
            .succeeds(&RemoteCommand::new("type", [RUNTIME_SERVICE]))
    }

    /// Whether the init system reports the engine service as running.
    pub fn runtime_running(&self) -> bool {
        self.session().succeeds(&service_status_command(
            self.spec.init_system,
            self.settings.privilege,
            RUNTIME_SERVICE,
        ))
    }

    /// Whether the daemon answers API requests.
    pub fn runtime_responding(&self) -> bool {
        let session = self.session();
        session.succeeds(&session.privileged("docker", ["version"]))
    }

    /// Engine options as the daemon will see them: the `provider` label is
    /// present exactly once and the storage driver is always set.
    pub fn effective_engine_options(&self, engine: &EngineOptions) -> EngineOptions {
        let mut effective = engine.clone();
        let provider = format!("provider={}", self.machine.driver_name);
        if !effective.labels.contains(&provider) {
            effective.labels.push(provider);
        }
        if effective.storage_driver.is_none() {
            effective.storage_driver = Some(self.spec.storage_driver.clone());
        }
        effective
    }

    /// Renders the daemon options file for this variant.
    ///
    /// Pure apart from reading the provisioner's own fields: the caller's
    /// options are not modified, and repeated calls return identical output.
    pub fn generate_docker_options(
        &self,
        docker_port: u16,
        auth: &AuthOptions,
        engine: &EngineOptions,
    ) -> Result<DaemonOptions, EnginestrapError> {
        let effective = self.effective_engine_options(engine);
        let content = render(self.spec.options_layout, docker_port, auth, &effective)?;
        debug!(
            "rendered {} bytes of daemon options for {}",
            content.len(),
            self.spec.daemon_options_path
        );
        Ok(DaemonOptions {
            path: self.spec.daemon_options_path.clone(),
            content,
        })
    }

    /// Runs the full provisioning pipeline.
    pub fn provision(
        &self,
        swarm: &SwarmOptions,
        auth: &AuthOptions,
        engine: &EngineOptions,
        collaborators: &Collaborators<'_>,
    ) -> Result<ProvisionReport, EnginestrapError> {
        let state = ProvisionState::new(&self.spec, swarm, auth, engine);
        Pipeline::new(self, collaborators).run(state)
    }
}

impl std::fmt::Debug for Provisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provisioner")
            .field("variant", &self.spec.name)
            .field("target", &self.executor.target())
            .field("machine", &self.machine)
            .field("settings", &self.settings)
            .finish()
    }
}

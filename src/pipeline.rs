//! Ordered provisioning pipeline.
//!
//! The pipeline runs twelve steps in a fixed order:
//!
//! 1. **configure-hostname**: running hostname, `/etc/hosts`, boot config
//! 2. **bootstrap-transport**: package needed to reach the repository
//! 3. **register-repository**: the engine's external package source
//! 4. **queue-runtime**: queue the engine package when it is missing
//! 5. **install-packages**: variant packages, then queued ones
//! 6. **start-runtime**: start the service when it is not running
//! 7. **wait-for-daemon**: poll until the daemon answers
//! 8. **prepare-options-dir**: create the remote options directory
//! 9. **resolve-auth-paths**: point remote cert paths into that directory
//! 10. **configure-auth**: render daemon options, hand off to auth
//! 11. **settle**: let the restarted daemon come up
//! 12. **configure-swarm**: hand off to swarm
//!
//! State moves between steps as an explicit [`ProvisionState`] value. The
//! first failing step aborts the run with [`EnginestrapError::StepFailed`];
//! nothing is retried or rolled back, and every step is safe to repeat on a
//! later run.

use std::thread;

use anyhow::Result;
use strum::Display;
use tracing::{debug, info};
use uuid::Uuid;

use crate::auth::AuthConfigurator;
use crate::error::EnginestrapError;
use crate::options::{AuthOptions, EngineOptions, SwarmOptions};
use crate::poll::wait_for;
use crate::provisioner::Provisioner;
use crate::render::DaemonOptions;
use crate::scripts::{boot_config_hostname_command, hostname_commands, repository_command};
use crate::steps::{PackageAction, ServiceAction};
use crate::swarm::SwarmConfigurator;
use crate::variant::{RUNTIME_PACKAGE, RUNTIME_SERVICE, VariantSpec};

/// One pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Step {
    ConfigureHostname,
    BootstrapTransport,
    RegisterRepository,
    QueueRuntime,
    InstallPackages,
    StartRuntime,
    WaitForDaemon,
    PrepareOptionsDir,
    ResolveAuthPaths,
    ConfigureAuth,
    Settle,
    ConfigureSwarm,
}

impl Step {
    /// Every step, in execution order.
    pub const ALL: [Step; 12] = [
        Step::ConfigureHostname,
        Step::BootstrapTransport,
        Step::RegisterRepository,
        Step::QueueRuntime,
        Step::InstallPackages,
        Step::StartRuntime,
        Step::WaitForDaemon,
        Step::PrepareOptionsDir,
        Step::ResolveAuthPaths,
        Step::ConfigureAuth,
        Step::Settle,
        Step::ConfigureSwarm,
    ];
}

/// External collaborators the pipeline delegates to.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub auth: &'a dyn AuthConfigurator,
    pub swarm: &'a dyn SwarmConfigurator,
}

/// Values produced and consumed by the steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionState {
    pub engine: EngineOptions,
    pub auth: AuthOptions,
    pub swarm: SwarmOptions,
    /// Packages still to be installed, in order.
    pub pending_packages: Vec<String>,
    pub daemon_options: Option<DaemonOptions>,
}

impl ProvisionState {
    /// Initial state: the caller's options and the variant's own packages.
    pub fn new(
        spec: &VariantSpec,
        swarm: &SwarmOptions,
        auth: &AuthOptions,
        engine: &EngineOptions,
    ) -> Self {
        Self {
            engine: engine.clone(),
            auth: auth.clone(),
            swarm: swarm.clone(),
            pending_packages: spec.packages.clone(),
            daemon_options: None,
        }
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionReport {
    /// Name of the variant that provisioned the host.
    pub variant: String,
    /// Steps that ran, in order.
    pub completed: Vec<Step>,
    pub daemon_options: Option<DaemonOptions>,
    /// Options as they were applied, after the pipeline's derivations.
    pub engine: EngineOptions,
    pub auth: AuthOptions,
    pub swarm: SwarmOptions,
}

/// Runs the steps for one provisioner.
pub struct Pipeline<'a> {
    provisioner: &'a Provisioner,
    collaborators: &'a Collaborators<'a>,
}

impl<'a> Pipeline<'a> {
    pub fn new(provisioner: &'a Provisioner, collaborators: &'a Collaborators<'a>) -> Self {
        Self {
            provisioner,
            collaborators,
        }
    }

    /// Runs every step in order, stopping at the first failure.
    #[tracing::instrument(
        name = "provision",
        skip_all,
        fields(
            run_id = %Uuid::new_v4(),
            variant = %self.provisioner.spec().name,
            target = %self.provisioner.executor().target(),
        )
    )]
    pub fn run(&self, state: ProvisionState) -> Result<ProvisionReport, EnginestrapError> {
        let total = Step::ALL.len();
        info!("starting provisioning pipeline with {} step(s)", total);

        let mut state = state;
        let mut completed = Vec::with_capacity(total);
        for (index, step) in Step::ALL.into_iter().enumerate() {
            info!("running step {}/{}: {}", index + 1, total, step);
            state = self
                .run_step(step, state)
                .map_err(|source| EnginestrapError::StepFailed { step, source })?;
            completed.push(step);
        }

        info!("provisioning pipeline completed successfully");
        Ok(ProvisionReport {
            variant: self.provisioner.spec().name.clone(),
            completed,
            daemon_options: state.daemon_options,
            engine: state.engine,
            auth: state.auth,
            swarm: state.swarm,
        })
    }

    fn run_step(&self, step: Step, state: ProvisionState) -> Result<ProvisionState> {
        match step {
            Step::ConfigureHostname => self.configure_hostname(state),
            Step::BootstrapTransport => self.bootstrap_transport(state),
            Step::RegisterRepository => self.register_repository(state),
            Step::QueueRuntime => self.queue_runtime(state),
            Step::InstallPackages => self.install_packages(state),
            Step::StartRuntime => self.start_runtime(state),
            Step::WaitForDaemon => self.wait_for_daemon(state),
            Step::PrepareOptionsDir => self.prepare_options_dir(state),
            Step::ResolveAuthPaths => self.resolve_auth_paths(state),
            Step::ConfigureAuth => self.configure_auth(state),
            Step::Settle => self.settle(state),
            Step::ConfigureSwarm => self.configure_swarm(state),
        }
    }

    fn configure_hostname(&self, state: ProvisionState) -> Result<ProvisionState> {
        let session = self.provisioner.session();
        let name = &self.provisioner.machine().name;
        let privilege = session.privilege();

        for command in hostname_commands(name, privilege)? {
            session.run(&command)?;
        }
        if let Some(config) = &session.spec().hostname_boot_config {
            session.run(&boot_config_hostname_command(config, name, privilege)?)?;
        }
        Ok(state)
    }

    fn bootstrap_transport(&self, state: ProvisionState) -> Result<ProvisionState> {
        let session = self.provisioner.session();
        match &session.spec().transport_package {
            Some(package) => session.package(package, PackageAction::Install)?,
            None => debug!("no transport package for {}", session.spec().name),
        }
        Ok(state)
    }

    fn register_repository(&self, state: ProvisionState) -> Result<ProvisionState> {
        let session = self.provisioner.session();
        let spec = session.spec();
        match &spec.repository {
            Some(repository) => {
                let command = repository_command(
                    repository,
                    spec.package_manager,
                    session.privilege(),
                    &self.provisioner.os_release().version_codename,
                )?;
                session.run(&command)?;
            }
            None => debug!("no external repository for {}", spec.name),
        }
        Ok(state)
    }

    fn queue_runtime(&self, mut state: ProvisionState) -> Result<ProvisionState> {
        if self.provisioner.runtime_installed() {
            debug!("{} is already installed", RUNTIME_PACKAGE);
        } else if !state.pending_packages.iter().any(|p| p == RUNTIME_PACKAGE) {
            info!("{} not found, queueing install", RUNTIME_PACKAGE);
            state.pending_packages.push(RUNTIME_PACKAGE.to_string());
        }
        Ok(state)
    }

    fn install_packages(&self, mut state: ProvisionState) -> Result<ProvisionState> {
        let session = self.provisioner.session();
        for package in &state.pending_packages {
            session.package(package, PackageAction::Install)?;
        }
        state.pending_packages.clear();
        Ok(state)
    }

    fn start_runtime(&self, state: ProvisionState) -> Result<ProvisionState> {
        if self.provisioner.runtime_running() {
            debug!("{} service is already running", RUNTIME_SERVICE);
        } else {
            self.provisioner
                .session()
                .service(RUNTIME_SERVICE, ServiceAction::Start)?;
        }
        Ok(state)
    }

    fn wait_for_daemon(&self, state: ProvisionState) -> Result<ProvisionState> {
        let policy = self.provisioner.settings().readiness;
        let attempts = wait_for("docker daemon", policy, || self.provisioner.runtime_responding())?;
        debug!("docker daemon answered after {} attempt(s)", attempts);
        Ok(state)
    }

    fn prepare_options_dir(&self, state: ProvisionState) -> Result<ProvisionState> {
        let session = self.provisioner.session();
        let dir = &session.spec().options_dir;
        session.run(&session.privileged("mkdir", ["-p", dir.as_str()]))?;
        Ok(state)
    }

    fn resolve_auth_paths(&self, mut state: ProvisionState) -> Result<ProvisionState> {
        state.auth = state
            .auth
            .with_remote_dir(&self.provisioner.spec().options_dir);
        debug!(
            "remote TLS material: {}, {}, {}",
            state.auth.ca_cert_remote_path,
            state.auth.server_cert_remote_path,
            state.auth.server_key_remote_path
        );
        Ok(state)
    }

    fn configure_auth(&self, mut state: ProvisionState) -> Result<ProvisionState> {
        let port = self.provisioner.settings().engine_port;
        let options = self
            .provisioner
            .generate_docker_options(port, &state.auth, &state.engine)?;
        self.collaborators
            .auth
            .configure_auth(&self.provisioner.session(), &state.auth, &options)?;
        state.engine = self.provisioner.effective_engine_options(&state.engine);
        state.daemon_options = Some(options);
        Ok(state)
    }

    fn settle(&self, state: ProvisionState) -> Result<ProvisionState> {
        let delay = self.provisioner.settings().settle_delay;
        if !delay.is_zero() {
            debug!("waiting {:?} for the daemon to settle", delay);
            thread::sleep(delay);
        }
        Ok(state)
    }

    fn configure_swarm(&self, mut state: ProvisionState) -> Result<ProvisionState> {
        let image = self.provisioner.spec().swarm_image_for(&state.swarm.image);
        if image != state.swarm.image {
            info!("using {} instead of {}", image, state.swarm.image);
            state.swarm.image = image;
        }
        self.collaborators.swarm.configure_swarm(
            &self.provisioner.session(),
            &state.swarm,
            &state.auth,
        )?;
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_order_and_names() {
        let names: Vec<String> = Step::ALL.iter().map(|s| s.to_string()).collect();
        assert_eq!(
            names,
            vec![
                "configure-hostname",
                "bootstrap-transport",
                "register-repository",
                "queue-runtime",
                "install-packages",
                "start-runtime",
                "wait-for-daemon",
                "prepare-options-dir",
                "resolve-auth-paths",
                "configure-auth",
                "settle",
                "configure-swarm",
            ]
        );
    }

    #[test]
    fn test_initial_state_takes_variant_packages() {
        let mut spec = VariantSpec::debian();
        spec.packages = vec!["curl".to_string()];
        let state = ProvisionState::new(
            &spec,
            &SwarmOptions::default(),
            &AuthOptions::default(),
            &EngineOptions::default(),
        );
        assert_eq!(state.pending_packages, vec!["curl"]);
        assert!(state.daemon_options.is_none());
    }
}

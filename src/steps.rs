//! Step primitives shared by every variant.
//!
//! Package and service management are "fire and check once": each command
//! runs a single time and its exit status decides the outcome. Re-running an
//! install of an installed package is a no-op success on the host, which is
//! what makes the pipeline safe to repeat.
//!
//! The `*_commands` builders are pure, so the exact command sequence for any
//! variant can be inspected without a host.

use camino::Utf8Path;
use strum::Display;
use tracing::{debug, info};

use crate::error::EnginestrapError;
use crate::executor::{RemoteCommand, RemoteExecutor, quote, run_checked, succeeds};
use crate::privilege::PrivilegeMethod;
use crate::variant::{InitSystem, PackageManager, VariantSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum PackageAction {
    Install,
    Remove,
    Upgrade,
}

impl PackageAction {
    /// Whether package metadata must be refreshed before the action.
    ///
    /// Removal works from the local package database and never needs a
    /// network round-trip.
    pub fn refreshes_metadata(self) -> bool {
        !matches!(self, Self::Remove)
    }

    fn verb(self, manager: PackageManager) -> &'static str {
        match (self, manager) {
            (Self::Install, _) => "install",
            (Self::Remove, _) => "remove",
            // apt-get upgrade would upgrade everything; install upgrades one package.
            (Self::Upgrade, PackageManager::Apt) => "install",
            (Self::Upgrade, _) => "upgrade",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ServiceAction {
    Start,
    Stop,
    Restart,
    Enable,
    Disable,
    DaemonReload,
}

/// Builds the commands for a package action, in execution order.
pub fn package_commands(
    manager: PackageManager,
    privilege: PrivilegeMethod,
    package: &str,
    action: PackageAction,
) -> Vec<RemoteCommand> {
    let mut commands = Vec::with_capacity(2);
    let verb = action.verb(manager);

    match manager {
        PackageManager::Apt => {
            if action.refreshes_metadata() {
                commands.push(
                    RemoteCommand::new("apt-get", ["update"])
                        .with_privilege(Some(privilege))
                        .preserving_env(),
                );
            }
            commands.push(
                RemoteCommand::new("apt-get", [verb, "-y", package])
                    .with_env("DEBIAN_FRONTEND", "noninteractive")
                    .with_privilege(Some(privilege))
                    .preserving_env(),
            );
        }
        PackageManager::Yum | PackageManager::Dnf => {
            let program = manager.to_string();
            if action.refreshes_metadata() {
                commands.push(
                    RemoteCommand::new(program.clone(), ["-y", "makecache"])
                        .with_privilege(Some(privilege))
                        .preserving_env(),
                );
            }
            commands.push(
                RemoteCommand::new(program, [verb, "-y", package])
                    .with_privilege(Some(privilege))
                    .preserving_env(),
            );
        }
    }

    commands
}

/// Builds the command for a service action, or `None` when the init system
/// has nothing to do for it.
pub fn service_command(
    init: InitSystem,
    privilege: PrivilegeMethod,
    service: &str,
    action: ServiceAction,
) -> Option<RemoteCommand> {
    let verb = action.to_string();
    let command = match (init, action) {
        (InitSystem::SysV, ServiceAction::DaemonReload) => return None,
        (InitSystem::SysV, ServiceAction::Enable | ServiceAction::Disable) => {
            RemoteCommand::new("update-rc.d", [service, verb.as_str()])
        }
        (InitSystem::SysV, _) => RemoteCommand::new("service", [service, verb.as_str()]),
        (InitSystem::Systemd, ServiceAction::DaemonReload) => {
            RemoteCommand::new("systemctl", [verb.as_str()])
        }
        (InitSystem::Systemd, _) => RemoteCommand::new("systemctl", [verb.as_str(), service]),
    };
    Some(command.with_privilege(Some(privilege)))
}

/// Probe asking the init system whether a service is running.
pub fn service_status_command(
    init: InitSystem,
    privilege: PrivilegeMethod,
    service: &str,
) -> RemoteCommand {
    match init {
        InitSystem::SysV => RemoteCommand::new("service", [service, "status"]),
        InitSystem::Systemd => RemoteCommand::new("systemctl", ["is-active", service]),
    }
    .with_privilege(Some(privilege))
}

/// A variant bound to a live host: the step primitives plus helpers shared
/// with the auth and swarm collaborators.
#[derive(Clone, Copy)]
pub struct Session<'a> {
    executor: &'a dyn RemoteExecutor,
    spec: &'a VariantSpec,
    privilege: PrivilegeMethod,
}

impl<'a> Session<'a> {
    pub fn new(
        executor: &'a dyn RemoteExecutor,
        spec: &'a VariantSpec,
        privilege: PrivilegeMethod,
    ) -> Self {
        Self {
            executor,
            spec,
            privilege,
        }
    }

    pub fn executor(&self) -> &'a dyn RemoteExecutor {
        self.executor
    }

    pub fn spec(&self) -> &'a VariantSpec {
        self.spec
    }

    pub fn privilege(&self) -> PrivilegeMethod {
        self.privilege
    }

    /// Builds an escalated command.
    pub fn privileged<I, S>(&self, program: &str, args: I) -> RemoteCommand
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RemoteCommand::new(program, args).with_privilege(Some(self.privilege))
    }

    /// Runs a command, failing on any error.
    pub fn run(&self, command: &RemoteCommand) -> Result<String, EnginestrapError> {
        run_checked(self.executor, command)
    }

    /// Runs a probe; failure is a negative answer.
    pub fn succeeds(&self, command: &RemoteCommand) -> bool {
        succeeds(self.executor, command)
    }

    /// Installs, removes or upgrades a package.
    ///
    /// Generic names are translated through the variant's aliases first.
    pub fn package(&self, name: &str, action: PackageAction) -> Result<(), EnginestrapError> {
        let package = self.spec.resolve_package(name);
        info!("{} package {}", action, package);
        for command in package_commands(self.spec.package_manager, self.privilege, package, action)
        {
            self.run(&command)?;
        }
        Ok(())
    }

    /// Applies an action to a service.
    pub fn service(&self, name: &str, action: ServiceAction) -> Result<(), EnginestrapError> {
        match service_command(self.spec.init_system, self.privilege, name, action) {
            Some(command) => {
                info!("{} service {}", action, name);
                self.run(&command).map(|_| ())
            }
            None => {
                debug!("{} is a no-op for {} services", action, self.spec.init_system);
                Ok(())
            }
        }
    }

    /// Writes `content` to a root-owned file, creating its directory.
    ///
    /// `tee` copies its input to stdout; that copy is dropped on the host so
    /// file content (private keys included) never comes back as output.
    pub fn write_file(&self, path: &Utf8Path, content: &str) -> Result<(), EnginestrapError> {
        if let Some(parent) = path.parent() {
            self.run(&self.privileged("mkdir", ["-p", parent.as_str()]))?;
        }
        debug!("writing {} ({} bytes)", path, content.len());
        let tee = RemoteCommand::script(format!("tee {} >/dev/null", quote(path.as_str())?))
            .with_privilege(Some(self.privilege))
            .with_stdin(content);
        self.run(&tee).map(|_| ())
    }
}

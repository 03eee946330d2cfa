pub mod auth;
pub mod cli;
pub mod config;
pub mod detect;
pub mod error;
pub mod executor;
pub mod options;
pub mod os_release;
pub mod pipeline;
pub mod poll;
pub mod privilege;
pub mod provisioner;
pub mod registry;
pub mod render;
pub mod scripts;
pub mod steps;
pub mod swarm;
pub mod variant;

pub use error::EnginestrapError;

use std::io;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::CommandFactory;
use tracing::{debug, info};
use tracing_subscriber::{FmtSubscriber, filter::LevelFilter};

use crate::auth::CertInstaller;
use crate::executor::{RemoteExecutor, SshExecutor};
use crate::pipeline::{Collaborators, ProvisionReport};
use crate::provisioner::Provisioner;
use crate::registry::{Detection, Registry};
use crate::render::DaemonOptions;
use crate::swarm::DockerSwarm;

pub fn init_logging(log_level: cli::LogLevel) -> Result<()> {
    let filter = match log_level {
        cli::LogLevel::Trace => LevelFilter::TRACE,
        cli::LogLevel::Debug => LevelFilter::DEBUG,
        cli::LogLevel::Info => LevelFilter::INFO,
        cli::LogLevel::Warn => LevelFilter::WARN,
        cli::LogLevel::Error => LevelFilter::ERROR,
    };

    tracing::subscriber::set_global_default(
        FmtSubscriber::builder()
            .with_max_level(filter)
            .with_writer(io::stderr)
            .finish(),
    )
    .context("failed to set global default tracing subscriber")
}

/// Loads and validates the profile named on the command line.
pub fn load_validated_profile(opts: &cli::CommonArgs) -> Result<config::Profile> {
    let profile = config::load_profile(opts.file.as_path())
        .with_context(|| format!("failed to load profile from {}", opts.file))?;
    profile.validate().context("profile validation failed")?;
    Ok(profile)
}

/// Builds the `ssh` executor for a profile's host.
pub fn ssh_executor(profile: &config::Profile, dry_run: bool) -> Arc<dyn RemoteExecutor> {
    Arc::new(SshExecutor::new(profile.host.clone(), dry_run))
}

/// Builds the provisioner a profile asks for: the forced variant when one is
/// named, otherwise the detected one.
fn provisioner_for_profile(
    profile: &config::Profile,
    registry: &Registry,
    executor: Arc<dyn RemoteExecutor>,
) -> Result<Provisioner> {
    let provisioner = match &profile.variant {
        Some(name) => {
            registry.provisioner_for(name, executor, profile.machine_info(), profile.settings())
        }
        None => registry.detect_provisioner(executor, profile.machine_info(), profile.settings()),
    };
    Ok(provisioner?)
}

/// Detects which variant the profile's host runs.
pub fn run_detect(
    profile: &config::Profile,
    executor: Arc<dyn RemoteExecutor>,
) -> Result<Detection> {
    debug!("detecting variant for machine {}", profile.machine.name);
    let detection = Registry::builtin()
        .detect(executor.as_ref())
        .with_context(|| format!("failed to detect variant of {}", executor.target()))?;
    info!(
        "{} runs {} (matched: {})",
        executor.target(),
        detection.variant.name,
        detection.matched.join(", ")
    );
    Ok(detection)
}

/// Provisions the profile's host end to end.
pub fn run_provision(
    profile: &config::Profile,
    executor: Arc<dyn RemoteExecutor>,
) -> Result<ProvisionReport> {
    let target = executor.target().to_string();
    let provisioner = provisioner_for_profile(profile, &Registry::builtin(), executor)
        .with_context(|| format!("failed to select a provisioner for {}", target))?;

    let swarm = DockerSwarm::new(profile.advertise_host(), profile.engine_port);
    let collaborators = Collaborators {
        auth: &CertInstaller,
        swarm: &swarm,
    };
    let report = provisioner
        .provision(&profile.swarm, &profile.auth, &profile.engine, &collaborators)
        .with_context(|| format!("failed to provision {}", target))?;

    info!(
        "provisioned {} with {} ({} step(s))",
        target,
        report.variant,
        report.completed.len()
    );
    Ok(report)
}

/// Renders the daemon options for the profile without contacting the host.
pub fn run_render(opts: &cli::RenderArgs) -> Result<DaemonOptions> {
    let profile = load_validated_profile(&opts.common)?;
    let name = opts
        .variant
        .as_deref()
        .or(profile.variant.as_deref())
        .ok_or_else(|| {
            EnginestrapError::Validation(
                "render needs a variant: set `variant` in the profile or pass --variant"
                    .to_string(),
            )
        })?;
    let spec = Registry::builtin()
        .get(name)
        .cloned()
        .ok_or_else(|| EnginestrapError::UnknownVariant(name.to_string()))?;

    let auth = profile.auth.with_remote_dir(&spec.options_dir);
    let provisioner = Provisioner::new(
        spec,
        ssh_executor(&profile, true),
        Default::default(),
        profile.machine_info(),
        profile.settings(),
    );
    Ok(provisioner.generate_docker_options(profile.engine_port, &auth, &profile.engine)?)
}

pub fn run_validate(opts: &cli::ValidateArgs) -> Result<()> {
    let profile = load_validated_profile(&opts.common)?;
    info!("validation successful:\n{:#?}", profile);
    Ok(())
}

pub fn run_completions(opts: &cli::CompletionsArgs) -> Result<()> {
    let mut command = cli::Cli::command();
    let name = command.get_name().to_string();
    clap_complete::generate(opts.shell, &mut command, name, &mut io::stdout());
    Ok(())
}

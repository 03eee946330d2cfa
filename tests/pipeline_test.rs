//! Tests for the provisioning pipeline's ordering and failure semantics.

mod helpers;

use std::sync::Arc;

use enginestrap::EnginestrapError;
use enginestrap::auth::CertInstaller;
use enginestrap::options::{AuthOptions, EngineOptions, SwarmOptions};
use enginestrap::pipeline::{Collaborators, Step};
use enginestrap::swarm::DockerSwarm;
use enginestrap::variant::VariantSpec;
use helpers::{
    DEBIAN_OS_RELEASE, HYPRIOT_OS_RELEASE, ScriptedExecutor, debian_host, hypriot_host, provisioner,
};

fn provision(
    spec: VariantSpec,
    host: &Arc<ScriptedExecutor>,
    os_release: &str,
    swarm: &SwarmOptions,
) -> Result<enginestrap::pipeline::ProvisionReport, EnginestrapError> {
    let swarm_configurator = DockerSwarm::new("10.0.0.7", 2376);
    let collaborators = Collaborators {
        auth: &CertInstaller,
        swarm: &swarm_configurator,
    };
    provisioner(spec, Arc::clone(host), os_release).provision(
        swarm,
        &AuthOptions::default(),
        &EngineOptions::default(),
        &collaborators,
    )
}

#[test]
fn test_hypriot_command_sequence() {
    let host = Arc::new(hypriot_host());
    let report = provision(
        VariantSpec::hypriot(),
        &host,
        HYPRIOT_OS_RELEASE,
        &SwarmOptions::default(),
    )
    .unwrap();

    let calls = host.calls();
    assert_eq!(calls[0], "sudo hostname node1 && echo node1 | sudo tee /etc/hostname");
    assert!(calls[1].contains("/etc/hosts"));
    assert_eq!(
        calls[2],
        "if [ -f /boot/occidentalis.txt ]; then sudo sed -i \
's/^hostname.*=.*/hostname=node1/g' /boot/occidentalis.txt; fi"
    );
    assert_eq!(
        &calls[3..5],
        [
            "sudo -E apt-get update",
            "DEBIAN_FRONTEND=noninteractive sudo -E apt-get install -y apt-transport-https",
        ]
    );
    assert!(calls[5].starts_with("if [ ! -f /etc/apt/sources.list.d/hypriot.list ]"));
    assert_eq!(
        &calls[6..],
        [
            "type docker",
            "sudo -E apt-get update",
            "DEBIAN_FRONTEND=noninteractive sudo -E apt-get install -y docker-hypriot",
            "sudo service docker status",
            "sudo service docker start",
            "sudo docker version",
            "sudo mkdir -p /etc/docker",
            "sudo mkdir -p /etc/default",
            "sudo sh -c 'tee /etc/default/docker >/dev/null'",
            "sudo service docker restart",
        ]
    );

    assert_eq!(report.variant, "hypriot");
    assert_eq!(report.completed, Step::ALL.to_vec());
}

#[test]
fn test_installed_and_running_engine_is_left_alone() {
    let host = Arc::new(debian_host());
    provision(VariantSpec::debian(), &host, DEBIAN_OS_RELEASE, &SwarmOptions::default()).unwrap();

    let calls = host.calls();
    assert!(calls.contains(&"type docker".to_string()));
    assert!(calls.contains(&"sudo systemctl is-active docker".to_string()));
    assert!(!calls.iter().any(|c| c.contains("install -y docker-ce")));
    assert!(!calls.iter().any(|c| c.contains("systemctl start docker")));
    assert!(calls.contains(&"sudo systemctl daemon-reload".to_string()));
    assert!(calls.contains(&"sudo systemctl restart docker".to_string()));
}

#[test]
fn test_first_failure_aborts_remaining_steps() {
    // Call 4 installs the transport package.
    let host = Arc::new(hypriot_host().failing_on(4));
    let err = provision(
        VariantSpec::hypriot(),
        &host,
        HYPRIOT_OS_RELEASE,
        &SwarmOptions::default(),
    )
    .unwrap_err();

    assert_eq!(err.failed_step(), Some(Step::BootstrapTransport));
    assert_eq!(host.call_count(), 5);
}

#[test]
fn test_failure_after_readiness_stops_before_auth() {
    // Call 12 creates the options directory, after the daemon answered.
    let host = Arc::new(hypriot_host().failing_on(12));
    let err = provision(
        VariantSpec::hypriot(),
        &host,
        HYPRIOT_OS_RELEASE,
        &SwarmOptions::default(),
    )
    .unwrap_err();

    assert_eq!(err.failed_step(), Some(Step::PrepareOptionsDir));
    let calls = host.calls();
    assert_eq!(calls.len(), 13);
    assert_eq!(calls[11], "sudo docker version");
    assert_eq!(calls[12], "sudo mkdir -p /etc/docker");
}

#[test]
fn test_failed_options_write_skips_restart_and_swarm() {
    let host = Arc::new(hypriot_host().with_response(
        "sudo sh -c 'tee /etc/default/docker >/dev/null'",
        1,
        "tee: /etc/default/docker: Read-only file system",
    ));
    let swarm = SwarmOptions {
        is_swarm: true,
        master: true,
        discovery: "token://abc".to_string(),
        ..Default::default()
    };
    let err = provision(VariantSpec::hypriot(), &host, HYPRIOT_OS_RELEASE, &swarm).unwrap_err();

    assert_eq!(err.failed_step(), Some(Step::ConfigureAuth));
    let calls = host.calls();
    assert_eq!(
        calls.last().map(String::as_str),
        Some("sudo sh -c 'tee /etc/default/docker >/dev/null'")
    );
    assert!(!calls.iter().any(|c| c.contains("service docker restart")));
    assert!(!calls.iter().any(|c| c.contains("swarm")));
}

#[test]
fn test_failed_package_install_names_the_command() {
    let host = Arc::new(hypriot_host().with_response(
        "DEBIAN_FRONTEND=noninteractive sudo -E apt-get install -y docker-hypriot",
        100,
        "E: Unable to locate package",
    ));
    let err = provision(
        VariantSpec::hypriot(),
        &host,
        HYPRIOT_OS_RELEASE,
        &SwarmOptions::default(),
    )
    .unwrap_err();

    let EnginestrapError::StepFailed { step, source } = err else {
        panic!("expected StepFailed");
    };
    assert_eq!(step, Step::InstallPackages);
    match source.downcast_ref::<EnginestrapError>() {
        Some(EnginestrapError::RemoteCommandFailed { command, output, .. }) => {
            assert!(command.ends_with("install -y docker-hypriot"));
            assert_eq!(output, "E: Unable to locate package");
        }
        other => panic!("expected RemoteCommandFailed, got {:?}", other),
    }
    assert_eq!(
        host.calls().last().map(String::as_str),
        Some("DEBIAN_FRONTEND=noninteractive sudo -E apt-get install -y docker-hypriot")
    );
}

#[test]
fn test_unresponsive_daemon_times_out() {
    let host = Arc::new(hypriot_host().with_response("sudo docker version", 1, "Cannot connect"));
    let err = provision(
        VariantSpec::hypriot(),
        &host,
        HYPRIOT_OS_RELEASE,
        &SwarmOptions::default(),
    )
    .unwrap_err();

    let EnginestrapError::StepFailed { step, source } = err else {
        panic!("expected StepFailed");
    };
    assert_eq!(step, Step::WaitForDaemon);
    assert!(matches!(
        source.downcast_ref::<EnginestrapError>(),
        Some(EnginestrapError::Timeout { attempts, .. }) if *attempts >= 1
    ));
    assert!(!host.calls().iter().any(|c| c.contains("mkdir -p /etc/docker")));
}

#[test]
fn test_rerun_sends_the_same_commands() {
    let first = Arc::new(hypriot_host());
    let second = Arc::new(hypriot_host());
    let swarm = SwarmOptions::default();
    let a = provision(VariantSpec::hypriot(), &first, HYPRIOT_OS_RELEASE, &swarm).unwrap();
    let b = provision(VariantSpec::hypriot(), &second, HYPRIOT_OS_RELEASE, &swarm).unwrap();
    assert_eq!(first.calls(), second.calls());
    assert_eq!(a.daemon_options, b.daemon_options);
}

#[test]
fn test_swarm_master_uses_platform_image() {
    let host = Arc::new(hypriot_host());
    let swarm = SwarmOptions {
        is_swarm: true,
        master: true,
        discovery: "token://abc".to_string(),
        ..Default::default()
    };
    let report = provision(VariantSpec::hypriot(), &host, HYPRIOT_OS_RELEASE, &swarm).unwrap();
    assert_eq!(report.swarm.image, "hypriot/rpi-swarm:latest");

    let calls = host.calls();
    let tail: Vec<&String> = calls.iter().rev().take(4).rev().collect();
    assert_eq!(tail[0], "sudo docker rm -f swarm-agent-master");
    assert!(tail[1].contains("hypriot/rpi-swarm:latest manage"));
    assert!(tail[1].contains("--tlscacert /etc/docker/ca.pem"));
    assert_eq!(tail[2], "sudo docker rm -f swarm-agent");
    assert!(
        tail[3].ends_with("hypriot/rpi-swarm:latest join --advertise 10.0.0.7:2376 token://abc")
    );
}

#[test]
fn test_swarm_disabled_runs_no_containers() {
    let host = Arc::new(hypriot_host());
    provision(VariantSpec::hypriot(), &host, HYPRIOT_OS_RELEASE, &SwarmOptions::default()).unwrap();
    assert!(!host.calls().iter().any(|c| c.contains("docker run")));
}

#[test]
fn test_empty_codename_fails_repository_step() {
    let host = Arc::new(debian_host());
    let err = provision(VariantSpec::debian(), &host, "ID=debian\n", &SwarmOptions::default())
        .unwrap_err();
    assert_eq!(err.failed_step(), Some(Step::RegisterRepository));
}

//! Tests for variant detection against scripted hosts.

mod helpers;

use std::sync::Arc;

use enginestrap::EnginestrapError;
use enginestrap::detect::{ProbeOutcome, probe};
use enginestrap::os_release::OsRelease;
use enginestrap::registry::Registry;
use enginestrap::variant::VariantSpec;
use helpers::{
    HYPRIOT_OS_RELEASE, ScriptedExecutor, debian_host, fast_settings, hypriot_host, machine,
};

#[test]
fn test_hypriot_host_selects_hypriot_over_raspbian() {
    let host = hypriot_host();
    let detection = Registry::builtin().detect(&host).unwrap();

    assert_eq!(detection.variant.name, "hypriot");
    assert_eq!(detection.matched, vec!["hypriot", "raspbian"]);
    assert_eq!(detection.os_release.id, "raspbian");
}

#[test]
fn test_selection_does_not_depend_on_registration_order() {
    let mut registry = Registry::new();
    registry.register(VariantSpec::raspbian()).unwrap();
    registry.register(VariantSpec::debian()).unwrap();
    registry.register(VariantSpec::hypriot()).unwrap();

    let detection = registry.detect(&hypriot_host()).unwrap();
    assert_eq!(detection.variant.name, "hypriot");
}

#[test]
fn test_debian_host_selects_debian() {
    let detection = Registry::builtin().detect(&debian_host()).unwrap();
    assert_eq!(detection.variant.name, "debian");
    assert_eq!(detection.matched, vec!["debian"]);
}

#[test]
fn test_detection_reads_os_release_once() {
    let host = hypriot_host();
    Registry::builtin().detect(&host).unwrap();
    let reads = host
        .calls()
        .iter()
        .filter(|line| line.as_str() == "cat /etc/os-release")
        .count();
    assert_eq!(reads, 1);
}

#[test]
fn test_unknown_host_is_no_compatible_provisioner() {
    let host = ScriptedExecutor::new().with_default_status(1);
    let err = Registry::builtin().detect(&host).unwrap_err();
    match err {
        EnginestrapError::NoCompatibleProvisioner { target, probed } => {
            assert_eq!(target, "pi@10.0.0.7");
            assert_eq!(probed.len(), 6);
        }
        other => panic!("expected NoCompatibleProvisioner, got {:?}", other),
    }
}

#[test]
fn test_transport_failure_is_inconclusive_not_error() {
    let spec = VariantSpec::hypriot();
    let broken = ScriptedExecutor::new().failing_on(0);
    let outcome = probe(&spec, &broken, &OsRelease::parse(HYPRIOT_OS_RELEASE));
    assert!(matches!(outcome, ProbeOutcome::Inconclusive(_)));
    assert!(!outcome.is_compatible());
}

#[test]
fn test_missing_marker_is_incompatible() {
    let host = ScriptedExecutor::new().with_default_status(1);
    let outcome = probe(&VariantSpec::hypriot(), &host, &OsRelease::parse(HYPRIOT_OS_RELEASE));
    assert!(matches!(outcome, ProbeOutcome::Incompatible(_)));
}

#[test]
fn test_marker_without_matching_id_is_incompatible() {
    let host = ScriptedExecutor::new();
    let outcome = probe(&VariantSpec::ubuntu(), &host, &OsRelease::parse("ID=debian\n"));
    assert!(matches!(outcome, ProbeOutcome::Incompatible(_)));
}

#[test]
fn test_provisioner_for_unknown_name() {
    let err = Registry::builtin()
        .provisioner_for("plan9", Arc::new(hypriot_host()), machine(), fast_settings())
        .unwrap_err();
    assert!(matches!(err, EnginestrapError::UnknownVariant(name) if name == "plan9"));
}

#[test]
fn test_provisioner_for_still_probes_the_host() {
    let err = Registry::builtin()
        .provisioner_for("ubuntu", Arc::new(debian_host()), machine(), fast_settings())
        .unwrap_err();
    assert!(matches!(err, EnginestrapError::NoCompatibleProvisioner { .. }));

    let provisioner = Registry::builtin()
        .provisioner_for("raspbian", Arc::new(hypriot_host()), machine(), fast_settings())
        .unwrap();
    assert_eq!(provisioner.spec().name, "raspbian");
}

//! Host compatibility probing and variant selection.
//!
//! Probing never fails: a marker that cannot be read is the normal answer
//! from a host running some other OS. Selection is a pure function of the
//! probe results and never depends on registration order.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::error::EnginestrapError;
use crate::executor::{RemoteCommand, RemoteExecutor};
use crate::os_release::OsRelease;
use crate::variant::{Marker, VariantSpec};

/// Outcome of probing one variant against a host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Marker present and `os-release` id matches.
    Compatible,
    /// The host answered and does not match.
    Incompatible(String),
    /// The marker check could not be carried out.
    Inconclusive(String),
}

impl ProbeOutcome {
    /// Collapses the outcome: only `Compatible` counts as a match.
    pub fn is_compatible(&self) -> bool {
        matches!(self, Self::Compatible)
    }
}

/// The probe command checking a marker.
pub fn marker_command(marker: &Marker) -> RemoteCommand {
    match marker {
        Marker::File(path) => RemoteCommand::new("cat", [path.as_str()]),
        Marker::Command(name) => RemoteCommand::new("type", [name.as_str()]),
    }
}

/// Tests whether `spec` matches the host.
///
/// The marker check runs first; the previously fetched `os_release` id must
/// then equal the variant's expected id. Both are required.
pub fn probe(
    spec: &VariantSpec,
    executor: &dyn RemoteExecutor,
    os_release: &OsRelease,
) -> ProbeOutcome {
    let command = marker_command(&spec.signature.marker);
    let outcome = match executor.execute(&command) {
        Err(e) => ProbeOutcome::Inconclusive(format!("{:#}", e)),
        Ok(result) if !result.success() => {
            ProbeOutcome::Incompatible(format!("marker {:?} not found", spec.signature.marker))
        }
        Ok(_) if os_release.id != spec.signature.os_release_id => ProbeOutcome::Incompatible(
            format!(
                "os-release id {:?} is not {:?}",
                os_release.id, spec.signature.os_release_id
            ),
        ),
        Ok(_) => ProbeOutcome::Compatible,
    };

    match &outcome {
        ProbeOutcome::Compatible => debug!("{} matches {}", spec.name, executor.target()),
        ProbeOutcome::Incompatible(reason) => debug!("{} does not match: {}", spec.name, reason),
        ProbeOutcome::Inconclusive(reason) => {
            warn!("{} probe inconclusive, treating as no match: {}", spec.name, reason)
        }
    }
    outcome
}

/// Picks the variant to use from the variants that matched a host.
///
/// A variant refined by another matching variant is dropped, so HypriotOS
/// wins over plain Raspbian on a Hypriot image. Exactly one survivor is
/// selected; zero or several are errors.
pub fn select<'a>(
    target: &str,
    probed: &[&'a VariantSpec],
    matched: &[&'a VariantSpec],
) -> Result<&'a VariantSpec, EnginestrapError> {
    let refined: HashSet<&str> = matched
        .iter()
        .filter_map(|spec| spec.refines.as_deref())
        .collect();
    let survivors: Vec<&VariantSpec> = matched
        .iter()
        .copied()
        .filter(|spec| !refined.contains(spec.name.as_str()))
        .collect();

    match survivors.as_slice() {
        [only] => Ok(*only),
        [] => Err(EnginestrapError::NoCompatibleProvisioner {
            target: target.to_string(),
            probed: probed.iter().map(|s| s.name.clone()).collect(),
        }),
        many => Err(EnginestrapError::AmbiguousProvisioner {
            target: target.to_string(),
            candidates: many.iter().map(|s| s.name.clone()).collect(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_single_match() {
        let debian = VariantSpec::debian();
        let ubuntu = VariantSpec::ubuntu();
        let chosen = select("h", &[&debian, &ubuntu], &[&ubuntu]).unwrap();
        assert_eq!(chosen.name, "ubuntu");
    }

    #[test]
    fn test_select_refinement_wins() {
        let hypriot = VariantSpec::hypriot();
        let raspbian = VariantSpec::raspbian();
        for matched in [[&raspbian, &hypriot], [&hypriot, &raspbian]] {
            let chosen = select("h", &matched, &matched).unwrap();
            assert_eq!(chosen.name, "hypriot");
        }
    }

    #[test]
    fn test_select_none_is_error() {
        let debian = VariantSpec::debian();
        let err = select("h", &[&debian], &[]).unwrap_err();
        assert!(matches!(err, EnginestrapError::NoCompatibleProvisioner { .. }));
    }

    #[test]
    fn test_select_unrelated_matches_are_ambiguous() {
        let debian = VariantSpec::debian();
        let mut clone = VariantSpec::debian();
        clone.name = "debian-custom".to_string();
        let err = select("h", &[&debian, &clone], &[&debian, &clone]).unwrap_err();
        match err {
            EnginestrapError::AmbiguousProvisioner { candidates, .. } => {
                assert_eq!(candidates, vec!["debian", "debian-custom"]);
            }
            other => panic!("expected ambiguity, got {:?}", other),
        }
    }

    #[test]
    fn test_marker_commands() {
        assert_eq!(
            marker_command(&Marker::File("/etc/hypriot_release".into()))
                .render()
                .unwrap(),
            "cat /etc/hypriot_release"
        );
        assert_eq!(
            marker_command(&Marker::Command("raspi-config".to_string()))
                .render()
                .unwrap(),
            "type raspi-config"
        );
    }
}

//! Domain-specific error types for enginestrap.
//!
//! This module defines `EnginestrapError`, a `thiserror`-based enum that
//! provides typed error variants for the failure modes of detection and
//! provisioning. Public API functions return `Result<T, EnginestrapError>`
//! for programmatic error handling, while trait boundaries (executors,
//! collaborators) continue to use `anyhow::Result`.
//!
//! `EnginestrapError` implements `Into<anyhow::Error>`, so the `?` operator
//! converts it automatically at trait boundaries that return `anyhow::Result`.

use std::io;
use std::time::Duration;

use crate::pipeline::Step;

/// Formats an IO error kind into a human-readable message.
///
/// Provides consistent, user-friendly messages for common IO error kinds
/// (e.g., "I/O error: not found") instead of the OS-level messages
/// (e.g., "No such file or directory (os error 2)"). For unrecognized
/// error kinds, falls back to including the OS-level error message
/// directly (e.g., "I/O error: connection refused").
pub(crate) fn io_error_kind_message(err: &io::Error) -> String {
    match err.kind() {
        io::ErrorKind::NotFound => "I/O error: not found".to_string(),
        io::ErrorKind::PermissionDenied => "I/O error: permission denied".to_string(),
        io::ErrorKind::IsADirectory => "I/O error: is a directory".to_string(),
        _ => format!("I/O error: {}", err),
    }
}

/// Domain-specific error type for enginestrap.
///
/// Probe failures are deliberately absent: an inconclusive probe is a
/// negative detection result (see [`crate::detect::ProbeOutcome`]), not an error.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum EnginestrapError {
    /// A validation constraint was violated.
    #[error("validation error: {0}")]
    Validation(String),

    /// A configuration file could not be loaded or parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// A remote command could not be delivered or exited non-zero.
    #[error("remote command failed on {target}: {command}: {output}")]
    RemoteCommandFailed {
        /// The rendered shell line that was sent.
        command: String,
        /// The host the command was sent to.
        target: String,
        /// Raw remote output, or the transport error when nothing ran.
        output: String,
    },

    /// No registered variant matched the host.
    #[error("no compatible provisioner found for {target} (probed: {})", probed.join(", "))]
    NoCompatibleProvisioner {
        target: String,
        /// Names of the variants that were probed.
        probed: Vec<String>,
    },

    /// More than one unrelated variant matched the host.
    #[error("ambiguous provisioner for {target}: {} all match", candidates.join(", "))]
    AmbiguousProvisioner {
        target: String,
        candidates: Vec<String>,
    },

    /// A variant name is not registered.
    #[error("unknown provisioner variant: {0}")]
    UnknownVariant(String),

    /// A readiness poll ran out of time.
    #[error("timed out after {attempts} attempt(s) in {elapsed:?} waiting for {what}")]
    Timeout {
        what: String,
        attempts: usize,
        elapsed: Duration,
    },

    /// The engine options template failed to parse or render.
    #[error("failed to render engine options: {0}")]
    TemplateRender(String),

    /// A provisioning step failed; `source` is the step's own error.
    #[error("provisioning step '{step}' failed")]
    StepFailed {
        step: Step,
        #[source]
        source: anyhow::Error,
    },

    /// An I/O operation failed with contextual information.
    #[error("{context}: {message}")]
    Io {
        /// What was being done when the error occurred (usually a path).
        context: String,
        /// Human-readable description derived from [`io_error_kind_message`].
        message: String,
        /// The underlying I/O error, preserved for programmatic inspection.
        #[source]
        source: std::io::Error,
    },
}

impl EnginestrapError {
    /// Creates an `Io` variant with the `message` field automatically derived
    /// from the `source` via [`io_error_kind_message`].
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            message: io_error_kind_message(&source),
            source,
        }
    }

    /// Returns the step a pipeline error is attributed to, if any.
    pub fn failed_step(&self) -> Option<Step> {
        match self {
            Self::StepFailed { step, .. } => Some(*step),
            _ => None,
        }
    }
}

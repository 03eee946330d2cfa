//! SSH command executor implementation.
//!
//! This module provides [`SshExecutor`], which sends rendered command lines
//! to the host through the system `ssh` client and captures their output.

use std::io::Write;
use std::process::{Command, Stdio};
use std::thread;

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use serde::Deserialize;
use which::which;

use super::{CommandArgsBuilder, ExecutionResult, RemoteCommand, RemoteExecutor};
use crate::error::EnginestrapError;

/// Client options that keep `ssh` non-interactive.
///
/// Freshly created machines have unknown host keys, so host key checking
/// is disabled in the same way machine drivers do it.
const SSH_OPTIONS: &[&str] = &[
    "BatchMode=yes",
    "StrictHostKeyChecking=no",
    "UserKnownHostsFile=/dev/null",
    "LogLevel=quiet",
    "ConnectionAttempts=3",
    "ConnectTimeout=10",
    "ControlMaster=no",
];

/// Exit status `ssh` itself uses for connection and authentication errors.
const SSH_TRANSPORT_FAILURE: i32 = 255;

fn default_port() -> u16 {
    22
}

fn default_user() -> String {
    "root".to_string()
}

/// Where and as whom to connect.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SshTarget {
    /// Host name or IP address.
    pub address: String,
    /// Login user (default: root)
    #[serde(default = "default_user")]
    pub user: String,
    /// SSH port (default: 22)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Private key used for public key authentication.
    #[serde(default)]
    pub identity_file: Option<Utf8PathBuf>,
}

impl SshTarget {
    pub fn new(address: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            user: user.into(),
            port: default_port(),
            identity_file: None,
        }
    }

    /// Returns `user@address`.
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.address)
    }

    /// Builds the `ssh` arguments for running `line` on this target.
    pub fn ssh_args(&self, line: &str) -> Vec<String> {
        let mut builder = CommandArgsBuilder::new();
        for option in SSH_OPTIONS {
            builder.push_flag_value("-o", option);
        }
        builder.push_flag_value("-p", &self.port.to_string());
        if let Some(identity) = &self.identity_file {
            builder.push_flag_value("-o", "IdentitiesOnly=yes");
            builder.push_flag_value("-i", identity.as_str());
        }
        builder.push_arg(self.destination());
        builder.push_arg(line);
        builder.into_args()
    }
}

/// Command executor that runs commands on a host through `ssh`.
///
/// When `dry_run` is true, commands are logged but not sent,
/// and `execute()` returns `Ok(ExecutionResult { status: None, .. })`.
/// An `ssh` exit status of 255 (unreachable host, rejected key) is an `Err`,
/// so probes treat it as inconclusive rather than as a negative answer.
pub struct SshExecutor {
    target: SshTarget,
    destination: String,
    pub dry_run: bool,
}

impl SshExecutor {
    pub fn new(target: SshTarget, dry_run: bool) -> Self {
        let destination = target.destination();
        Self {
            target,
            destination,
            dry_run,
        }
    }
}

impl RemoteExecutor for SshExecutor {
    fn target(&self) -> &str {
        &self.destination
    }

    fn execute(&self, command: &RemoteCommand) -> Result<ExecutionResult> {
        let line = command.render()?;

        if self.dry_run {
            tracing::info!("dry run: {}: {}", self.destination, line);
            return Ok(ExecutionResult::default());
        }

        let ssh = which("ssh").context("command not found: ssh")?;
        tracing::trace!("command found: ssh: {}", ssh.to_string_lossy());

        let mut child = Command::new(ssh)
            .args(self.target.ssh_args(&line))
            .stdin(if command.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to spawn ssh to {}", self.destination))?;

        // Feed stdin from a separate thread so a chatty remote command cannot
        // block on a full stdout pipe while we are still writing.
        let writer = match (child.stdin.take(), command.stdin.clone()) {
            (Some(mut pipe), Some(data)) => Some(
                thread::Builder::new()
                    .name("ssh-stdin-writer".to_string())
                    .spawn(move || pipe.write_all(data.as_bytes()))
                    .context("failed to spawn stdin writer thread")?,
            ),
            _ => None,
        };

        let output = child
            .wait_with_output()
            .with_context(|| format!("failed to wait for ssh to {}", self.destination))?;

        if let Some(handle) = writer {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("failed to write command stdin: {}", e),
                Err(_) => tracing::warn!("stdin writer thread panicked"),
            }
        }

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        for text in combined.lines() {
            tracing::trace!(host = %self.destination, "{}", text);
        }

        let Some(code) = output.status.code() else {
            return Err(EnginestrapError::RemoteCommandFailed {
                command: line,
                target: self.destination.clone(),
                output: format!("ssh terminated by signal: {}", output.status),
            }
            .into());
        };

        delivered(&self.destination, code, combined)
    }
}

/// Splits `ssh` exit statuses: 255 means the command never reached the
/// host, anything else is the remote command's own status.
fn delivered(destination: &str, code: i32, output: String) -> Result<ExecutionResult> {
    if code == SSH_TRANSPORT_FAILURE {
        anyhow::bail!(
            "ssh to {} failed with status {}: {}",
            destination,
            code,
            output.trim_end()
        );
    }
    Ok(ExecutionResult {
        status: Some(code),
        output,
    })
}

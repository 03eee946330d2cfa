//! Remote command execution abstraction for enginestrap.
//!
//! This module provides:
//! - [`RemoteCommand`]: Structured description of a command to run on the host
//! - [`ExecutionResult`]: Result of command execution
//! - [`RemoteExecutor`]: Trait for command transport strategies
//! - [`SshExecutor`]: Production implementation using the system `ssh` client
//!
//! Commands are built from a program plus arguments and only turned into a
//! shell line by [`RemoteCommand::render`], which quotes every dynamic word.
//! Compound guards (`if [ -f … ]; then …; fi`) that cannot be expressed as a
//! single program use [`RemoteCommand::script`] and must be assembled from
//! already-quoted words.

mod args;
mod ssh;

use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;
use tracing::{debug, trace};

use crate::error::EnginestrapError;
use crate::privilege::PrivilegeMethod;

pub use args::CommandArgsBuilder;
pub use ssh::{SshExecutor, SshTarget};

static ENV_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid env name regex"));

/// Quotes a single word for a POSIX shell.
///
/// Words made only of safe characters are returned unchanged, so the
/// rendered commands stay identical to what an operator would type.
pub fn quote(word: &str) -> Result<String, EnginestrapError> {
    shlex::try_quote(word)
        .map(|quoted| quoted.into_owned())
        .map_err(|e| EnginestrapError::Validation(format!("cannot quote {:?}: {}", word, e)))
}

/// What a [`RemoteCommand`] runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandBody {
    /// A program with arguments, each quoted on render.
    Exec { program: String, args: Vec<String> },
    /// A trusted shell script, rendered verbatim.
    Script(String),
}

/// Specification for a command to be executed on the remote host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    /// The program or script to run.
    pub body: CommandBody,
    /// Environment assignments prefixed to the command line.
    pub env: Vec<(String, String)>,
    /// Privilege escalation method to wrap the command.
    pub privilege: Option<PrivilegeMethod>,
    /// Whether the escalated command keeps the caller's environment.
    pub preserve_env: bool,
    /// Data fed to the command's standard input.
    pub stdin: Option<String>,
}

impl RemoteCommand {
    /// Creates a command running `program` with `args`.
    #[must_use]
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_body(CommandBody::Exec {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        })
    }

    /// Creates a command from a trusted shell script.
    #[must_use]
    pub fn script(script: impl Into<String>) -> Self {
        Self::with_body(CommandBody::Script(script.into()))
    }

    fn with_body(body: CommandBody) -> Self {
        Self {
            body,
            env: Vec::new(),
            privilege: None,
            preserve_env: false,
            stdin: None,
        }
    }

    /// Sets the privilege escalation method
    #[must_use]
    pub fn with_privilege(mut self, privilege: Option<PrivilegeMethod>) -> Self {
        self.privilege = privilege;
        self
    }

    /// Keeps the caller's environment across privilege escalation (`sudo -E`).
    #[must_use]
    pub fn preserving_env(mut self) -> Self {
        self.preserve_env = true;
        self
    }

    /// Adds an environment variable
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Feeds `data` to the command's standard input.
    #[must_use]
    pub fn with_stdin(mut self, data: impl Into<String>) -> Self {
        self.stdin = Some(data.into());
        self
    }

    /// Renders the shell line sent to the host.
    ///
    /// Layout is `ENV=value… [sudo [-E]] program args…`. An escalated script
    /// is wrapped in `sh -c`. Environment assignments cannot be combined
    /// with a script.
    pub fn render(&self) -> Result<String, EnginestrapError> {
        let mut words: Vec<String> = Vec::new();

        for (key, value) in &self.env {
            if !ENV_NAME.is_match(key) {
                return Err(EnginestrapError::Validation(format!(
                    "invalid environment variable name: {:?}",
                    key
                )));
            }
            words.push(format!("{}={}", key, quote(value)?));
        }

        let privilege = self
            .privilege
            .map(|method| method.prefix(self.preserve_env))
            .unwrap_or_default();

        match &self.body {
            CommandBody::Exec { program, args } => {
                words.extend(privilege.iter().map(|w| w.to_string()));
                words.push(quote(program)?);
                for arg in args {
                    words.push(quote(arg)?);
                }
            }
            CommandBody::Script(script) => {
                if !self.env.is_empty() {
                    return Err(EnginestrapError::Validation(
                        "environment assignments are not supported for scripts".to_string(),
                    ));
                }
                if privilege.is_empty() {
                    return Ok(script.clone());
                }
                words.extend(privilege.iter().map(|w| w.to_string()));
                words.push("sh".to_string());
                words.push("-c".to_string());
                words.push(quote(script)?);
            }
        }

        Ok(words.join(" "))
    }
}

/// Result of command execution
#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    /// Exit status of the command (None in dry-run mode)
    pub status: Option<i32>,
    /// Combined stdout and stderr of the command.
    pub output: String,
}

impl ExecutionResult {
    /// Returns true if the command executed successfully.
    ///
    /// In dry-run mode (status is None), this always returns true.
    pub fn success(&self) -> bool {
        self.status.is_none_or(|code| code == 0)
    }
}

/// Trait for remote command execution.
///
/// Implementations must be `Send + Sync` so one executor can be shared as
/// `Arc<dyn RemoteExecutor>` between a provisioner and its collaborators.
/// A returned `Err` means the command could not be delivered; a delivered
/// command that fails is reported through [`ExecutionResult::status`].
pub trait RemoteExecutor: Send + Sync {
    /// Describes the host commands are sent to (e.g. `pi@10.0.0.7`).
    fn target(&self) -> &str;

    /// Executes a command on the remote host.
    fn execute(&self, command: &RemoteCommand) -> Result<ExecutionResult>;
}

/// Runs a command and turns any failure into `RemoteCommandFailed`.
///
/// Returns the command's output on success.
pub fn run_checked(
    executor: &dyn RemoteExecutor,
    command: &RemoteCommand,
) -> Result<String, EnginestrapError> {
    let line = command.render()?;
    debug!(target_host = executor.target(), "running: {}", line);

    let failed = |output: String| EnginestrapError::RemoteCommandFailed {
        command: line.clone(),
        target: executor.target().to_string(),
        output,
    };

    match executor.execute(command) {
        Ok(result) if result.success() => {
            trace!("output: {}", result.output.trim_end());
            Ok(result.output)
        }
        Ok(result) => Err(failed(result.output.trim_end().to_string())),
        Err(e) => Err(failed(format!("{:#}", e))),
    }
}

/// Runs a probe command and reports whether it succeeded.
///
/// Failures of any kind are a negative answer, never an error.
pub fn succeeds(executor: &dyn RemoteExecutor, command: &RemoteCommand) -> bool {
    match run_checked(executor, command) {
        Ok(_) => true,
        Err(e) => {
            debug!("probe returned negative: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_plain_command() {
        let cmd = RemoteCommand::new("type", ["docker"]);
        assert_eq!(cmd.render().unwrap(), "type docker");
    }

    #[test]
    fn test_render_env_and_preserved_sudo() {
        let cmd = RemoteCommand::new("apt-get", ["install", "-y", "docker-hypriot"])
            .with_env("DEBIAN_FRONTEND", "noninteractive")
            .with_privilege(Some(PrivilegeMethod::Sudo))
            .preserving_env();
        assert_eq!(
            cmd.render().unwrap(),
            "DEBIAN_FRONTEND=noninteractive sudo -E apt-get install -y docker-hypriot"
        );
    }

    #[test]
    fn test_render_quotes_dangerous_arguments() {
        let cmd = RemoteCommand::new("hostname", ["evil; rm -rf /"]);
        assert_eq!(cmd.render().unwrap(), "hostname 'evil; rm -rf /'");
    }

    #[test]
    fn test_render_rejects_nul_bytes() {
        let cmd = RemoteCommand::new("echo", ["a\0b"]);
        assert!(matches!(cmd.render(), Err(EnginestrapError::Validation(_))));
    }

    #[test]
    fn test_render_rejects_bad_env_name() {
        let cmd = RemoteCommand::new("true", Vec::<String>::new()).with_env("A B", "x");
        assert!(cmd.render().is_err());
    }

    #[test]
    fn test_render_script_verbatim() {
        let script = "if [ -f /boot/x ]; then echo hi; fi";
        assert_eq!(RemoteCommand::script(script).render().unwrap(), script);
    }

    #[test]
    fn test_render_escalated_script_uses_sh_c() {
        let cmd =
            RemoteCommand::script("echo a && echo b").with_privilege(Some(PrivilegeMethod::Sudo));
        assert_eq!(cmd.render().unwrap(), "sudo sh -c 'echo a && echo b'");
    }

    #[test]
    fn test_render_script_rejects_env() {
        let cmd = RemoteCommand::script("echo").with_env("A", "b");
        assert!(cmd.render().is_err());
    }

    #[test]
    fn test_execution_result_success() {
        assert!(ExecutionResult::default().success());
        let failed = ExecutionResult {
            status: Some(1),
            output: String::new(),
        };
        assert!(!failed.success());
    }
}

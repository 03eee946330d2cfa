//! Privilege escalation for remote commands.
//!
//! Remote hosts are reached as an unprivileged login user, so most
//! provisioning commands are wrapped with `sudo` (or `doas`) when rendered.

use serde::{Deserialize, Serialize};

/// Privilege escalation method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivilegeMethod {
    /// Use `sudo` for privilege escalation.
    #[default]
    Sudo,
    /// Use `doas` for privilege escalation.
    Doas,
}

impl PrivilegeMethod {
    /// Returns the command name for this privilege method.
    pub fn command_name(&self) -> &'static str {
        match self {
            Self::Sudo => "sudo",
            Self::Doas => "doas",
        }
    }

    /// Returns the words that prefix an escalated command.
    ///
    /// `sudo -E` keeps the caller's environment (needed for
    /// `DEBIAN_FRONTEND=noninteractive`). `doas` has no such flag and relies
    /// on `keepenv` in doas.conf instead.
    pub fn prefix(&self, preserve_env: bool) -> Vec<&'static str> {
        match (self, preserve_env) {
            (Self::Sudo, true) => vec!["sudo", "-E"],
            _ => vec![self.command_name()],
        }
    }
}

impl std::fmt::Display for PrivilegeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.command_name())
    }
}

//! Guarded shell scripts for host configuration.
//!
//! Each script checks the host's current state before changing it, so
//! running it twice leaves the host as running it once. Every dynamic word
//! is quoted with [`quote`] or validated before being spliced in.

use std::sync::LazyLock;

use camino::Utf8Path;
use regex::Regex;

use crate::error::EnginestrapError;
use crate::executor::{RemoteCommand, quote};
use crate::privilege::PrivilegeMethod;
use crate::variant::{CODENAME_PLACEHOLDER, PackageManager, Repository};

static HOSTNAME_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?$").expect("valid hostname regex")
});

/// Checks a hostname against RFC 1123: dot-separated labels of letters,
/// digits and inner hyphens, at most 253 characters in total.
pub fn validate_hostname(name: &str) -> Result<(), EnginestrapError> {
    if name.is_empty() || name.len() > 253 {
        return Err(EnginestrapError::Validation(format!(
            "hostname must be 1-253 characters, got {}",
            name.len()
        )));
    }
    if let Some(label) = name.split('.').find(|label| !HOSTNAME_LABEL.is_match(label)) {
        return Err(EnginestrapError::Validation(format!(
            "invalid hostname {:?}: bad label {:?}",
            name, label
        )));
    }
    Ok(())
}

/// Sets the running hostname, `/etc/hostname` and the `127.0.1.1` entry of
/// `/etc/hosts`.
pub fn hostname_commands(
    name: &str,
    privilege: PrivilegeMethod,
) -> Result<Vec<RemoteCommand>, EnginestrapError> {
    validate_hostname(name)?;
    let escalate = privilege.command_name();

    let set = RemoteCommand::script(format!(
        "{escalate} hostname {name} && echo {name} | {escalate} tee /etc/hostname"
    ));
    // Validated names only contain `.` as a regex metacharacter.
    let pattern = name.replace('.', "\\.");
    let hosts = RemoteCommand::script(format!(
        "if ! grep -xq '.*\\s{pattern}' /etc/hosts; then \
if grep -xq '127\\.0\\.1\\.1\\s.*' /etc/hosts; then \
{escalate} sed -i 's/^127\\.0\\.1\\.1\\s.*/127.0.1.1 {name}/g' /etc/hosts; \
else echo '127.0.1.1 {name}' | {escalate} tee -a /etc/hosts; fi; fi"
    ));

    Ok(vec![set, hosts])
}

/// Rewrites the `hostname=` line of a boot partition config, if the file
/// exists.
pub fn boot_config_hostname_command(
    config: &Utf8Path,
    name: &str,
    privilege: PrivilegeMethod,
) -> Result<RemoteCommand, EnginestrapError> {
    validate_hostname(name)?;
    let file = quote(config.as_str())?;
    Ok(RemoteCommand::script(format!(
        "if [ -f {file} ]; then {} sed -i 's/^hostname.*=.*/hostname={name}/g' {file}; fi",
        privilege.command_name()
    )))
}

/// Registers an external package repository unless it is already present.
///
/// Apt sources are also rewritten when the list still points at
/// `legacy_host`. `codename` replaces the placeholder in the source line.
pub fn repository_command(
    repository: &Repository,
    manager: PackageManager,
    privilege: PrivilegeMethod,
    codename: &str,
) -> Result<RemoteCommand, EnginestrapError> {
    let escalate = privilege.command_name();

    let script = match repository {
        Repository::Apt {
            key_url,
            list_path,
            source_line,
            legacy_host,
        } => {
            let line = if source_line.contains(CODENAME_PLACEHOLDER) {
                if codename.is_empty() {
                    return Err(EnginestrapError::Validation(format!(
                        "repository line {:?} needs the host's VERSION_CODENAME, which is unknown",
                        source_line
                    )));
                }
                source_line.replace(CODENAME_PLACEHOLDER, codename)
            } else {
                source_line.clone()
            };
            let list = quote(list_path.as_str())?;
            let guard = match legacy_host {
                Some(host) => format!("[ ! -f {list} ] || grep -q {} {list}", quote(host)?),
                None => format!("[ ! -f {list} ]"),
            };
            let key = quote(key_url)?;
            let entry = quote(&line)?;
            format!(
                "if {guard}; then (curl {key} | {escalate} apt-key add -); \
echo {entry} | {escalate} tee {list}; fi"
            )
        }
        Repository::RepoFile {
            repo_url,
            repo_file,
        } => {
            let config_manager = match manager {
                PackageManager::Dnf => "dnf config-manager",
                PackageManager::Yum | PackageManager::Apt => "yum-config-manager",
            };
            let preserve = privilege.prefix(true).join(" ");
            format!(
                "if [ ! -f {} ]; then {preserve} {config_manager} --add-repo {}; fi",
                quote(repo_file.as_str())?,
                quote(repo_url)?,
            )
        }
    };

    Ok(RemoteCommand::script(script))
}

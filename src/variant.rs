//! Provisioner variants.
//!
//! A variant describes one (OS family, package manager, init system)
//! combination as plain data: how to recognise the host, which commands
//! manage packages and services, where the daemon configuration lives and
//! which external repository provides the engine. Everything the pipeline
//! does differently per OS is driven from a [`VariantSpec`]; there is no
//! per-OS code path.

use std::collections::BTreeMap;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use strum::Display;

/// Generic package name the pipeline queues when the engine is missing.
pub const RUNTIME_PACKAGE: &str = "docker";

/// Name of the engine's service.
pub const RUNTIME_SERVICE: &str = "docker";

/// Placeholder in apt source lines replaced with the host's `VERSION_CODENAME`.
pub const CODENAME_PLACEHOLDER: &str = "{codename}";

/// Host-side evidence that must exist for a variant to match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Marker {
    /// A file that is read with `cat`.
    File(Utf8PathBuf),
    /// A command that is looked up with `type`.
    Command(String),
}

/// What a host must show for a variant to be compatible.
///
/// Both halves are required: distributions built on the same base share
/// `os-release` ids, and marker files are often copied between images.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Expected `ID` field of `/etc/os-release`.
    pub os_release_id: String,
    pub marker: Marker,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PackageManager {
    Apt,
    Yum,
    Dnf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum InitSystem {
    /// `service <name> <action>` scripts.
    #[serde(rename = "sysv")]
    #[strum(serialize = "sysv")]
    SysV,
    Systemd,
}

/// Shape of the rendered daemon options file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum OptionsLayout {
    /// `/etc/default/docker` with a single `DOCKER_OPTS='…'` assignment.
    DefaultFile,
    /// A systemd drop-in overriding `ExecStart`.
    SystemdDropIn,
}

/// External package source providing the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Repository {
    /// An apt source list plus its signing key.
    Apt {
        key_url: String,
        list_path: Utf8PathBuf,
        /// May contain [`CODENAME_PLACEHOLDER`].
        source_line: String,
        /// Host of an outdated source that must be replaced when found.
        #[serde(default)]
        legacy_host: Option<String>,
    },
    /// A `.repo` file fetched by the package manager's config-manager.
    RepoFile {
        repo_url: String,
        repo_file: Utf8PathBuf,
    },
}

/// Everything the pipeline needs to know about one variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantSpec {
    /// Registry key and display name.
    pub name: String,
    pub signature: Signature,
    /// Name of the more generic variant this one specializes. When both
    /// match a host, the refining variant wins.
    #[serde(default)]
    pub refines: Option<String>,
    pub package_manager: PackageManager,
    pub init_system: InitSystem,
    pub options_layout: OptionsLayout,
    pub daemon_options_path: Utf8PathBuf,
    pub options_dir: Utf8PathBuf,
    /// Packages installed on every run, before the engine.
    #[serde(default)]
    pub packages: Vec<String>,
    /// Generic package names mapped to distribution package names.
    #[serde(default)]
    pub package_aliases: BTreeMap<String, String>,
    /// Package needed before the external repository can be added.
    #[serde(default)]
    pub transport_package: Option<String>,
    #[serde(default)]
    pub repository: Option<Repository>,
    /// Boot partition file whose `hostname=` line must follow the machine name.
    #[serde(default)]
    pub hostname_boot_config: Option<Utf8PathBuf>,
    /// Replacement for the default swarm image on this platform.
    #[serde(default)]
    pub swarm_image: Option<String>,
    pub storage_driver: String,
}

impl VariantSpec {
    /// Maps a generic package name to this variant's package name.
    pub fn resolve_package<'a>(&'a self, name: &'a str) -> &'a str {
        self.package_aliases
            .get(name)
            .map(String::as_str)
            .unwrap_or(name)
    }

    /// Returns the swarm image to run, swapping the default image for the
    /// platform-specific one when this variant provides it.
    pub fn swarm_image_for(&self, requested: &str) -> String {
        match &self.swarm_image {
            Some(image) if requested == crate::options::DEFAULT_SWARM_IMAGE => image.clone(),
            _ => requested.to_string(),
        }
    }

    /// All built-in variants.
    pub fn builtin() -> Vec<VariantSpec> {
        vec![
            Self::hypriot(),
            Self::raspbian(),
            Self::debian(),
            Self::ubuntu(),
            Self::centos(),
            Self::fedora(),
        ]
    }

    /// HypriotOS: Raspbian with Hypriot's own Docker build.
    pub fn hypriot() -> Self {
        Self {
            name: "hypriot".to_string(),
            signature: Signature {
                os_release_id: "raspbian".to_string(),
                marker: Marker::File("/etc/hypriot_release".into()),
            },
            refines: Some("raspbian".to_string()),
            package_manager: PackageManager::Apt,
            init_system: InitSystem::SysV,
            options_layout: OptionsLayout::DefaultFile,
            daemon_options_path: "/etc/default/docker".into(),
            options_dir: "/etc/docker".into(),
            packages: Vec::new(),
            package_aliases: aliases("docker-hypriot"),
            transport_package: Some("apt-transport-https".to_string()),
            repository: Some(Repository::Apt {
                key_url: "https://packagecloud.io/gpg.key".to_string(),
                list_path: "/etc/apt/sources.list.d/hypriot.list".into(),
                source_line: "deb https://packagecloud.io/Hypriot/Schatzkiste/debian/ wheezy main"
                    .to_string(),
                legacy_host: Some("repository.hypriot.com".to_string()),
            }),
            hostname_boot_config: Some("/boot/occidentalis.txt".into()),
            swarm_image: Some("hypriot/rpi-swarm:latest".to_string()),
            storage_driver: "overlay".to_string(),
        }
    }

    pub fn raspbian() -> Self {
        Self::docker_apt("raspbian", "raspbian", "/etc/debian_version")
    }

    pub fn debian() -> Self {
        Self::docker_apt("debian", "debian", "/etc/debian_version")
    }

    pub fn ubuntu() -> Self {
        Self::docker_apt("ubuntu", "ubuntu", "/etc/lsb-release")
    }

    pub fn centos() -> Self {
        Self::docker_rpm("centos", "/etc/centos-release", PackageManager::Yum, "yum-utils")
    }

    pub fn fedora() -> Self {
        Self::docker_rpm("fedora", "/etc/fedora-release", PackageManager::Dnf, "dnf-plugins-core")
    }

    /// Debian family hosts installing Docker CE from download.docker.com.
    fn docker_apt(name: &str, os_release_id: &str, marker: &str) -> Self {
        Self {
            name: name.to_string(),
            signature: Signature {
                os_release_id: os_release_id.to_string(),
                marker: Marker::File(marker.into()),
            },
            refines: None,
            package_manager: PackageManager::Apt,
            init_system: InitSystem::Systemd,
            options_layout: OptionsLayout::SystemdDropIn,
            daemon_options_path: "/etc/systemd/system/docker.service.d/10-machine.conf".into(),
            options_dir: "/etc/docker".into(),
            packages: Vec::new(),
            package_aliases: aliases("docker-ce"),
            transport_package: Some("apt-transport-https".to_string()),
            repository: Some(Repository::Apt {
                key_url: format!("https://download.docker.com/linux/{}/gpg", os_release_id),
                list_path: "/etc/apt/sources.list.d/docker.list".into(),
                source_line: format!(
                    "deb https://download.docker.com/linux/{} {} stable",
                    os_release_id, CODENAME_PLACEHOLDER
                ),
                legacy_host: None,
            }),
            hostname_boot_config: None,
            swarm_image: None,
            storage_driver: "overlay2".to_string(),
        }
    }

    /// RPM family hosts installing Docker CE from download.docker.com.
    fn docker_rpm(
        name: &str,
        marker: &str,
        package_manager: PackageManager,
        transport: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            signature: Signature {
                os_release_id: name.to_string(),
                marker: Marker::File(marker.into()),
            },
            refines: None,
            package_manager,
            init_system: InitSystem::Systemd,
            options_layout: OptionsLayout::SystemdDropIn,
            daemon_options_path: "/etc/systemd/system/docker.service.d/10-machine.conf".into(),
            options_dir: "/etc/docker".into(),
            packages: Vec::new(),
            package_aliases: aliases("docker-ce"),
            transport_package: Some(transport.to_string()),
            repository: Some(Repository::RepoFile {
                repo_url: format!("https://download.docker.com/linux/{}/docker-ce.repo", name),
                repo_file: "/etc/yum.repos.d/docker-ce.repo".into(),
            }),
            hostname_boot_config: None,
            swarm_image: None,
            storage_driver: "overlay2".to_string(),
        }
    }
}

fn aliases(runtime_package: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(RUNTIME_PACKAGE.to_string(), runtime_package.to_string())])
}

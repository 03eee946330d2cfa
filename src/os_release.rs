//! Parsing of the host's `/etc/os-release`.

use tracing::debug;

use crate::executor::{RemoteCommand, RemoteExecutor, run_checked};

/// Path of the OS identification file on the host.
pub const OS_RELEASE_PATH: &str = "/etc/os-release";

/// Fields of `/etc/os-release` that detection cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OsRelease {
    pub id: String,
    pub id_like: Vec<String>,
    pub name: String,
    pub version_id: String,
    pub version_codename: String,
    pub pretty_name: String,
}

impl OsRelease {
    /// Parses `KEY=value` lines. Values may be single or double quoted;
    /// comments, blank lines and unknown keys are ignored.
    pub fn parse(content: &str) -> Self {
        let mut release = Self::default();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = unquote(value.trim());
            match key.trim() {
                "ID" => release.id = value,
                "ID_LIKE" => {
                    release.id_like = value.split_whitespace().map(str::to_string).collect()
                }
                "NAME" => release.name = value,
                "VERSION_ID" => release.version_id = value,
                "VERSION_CODENAME" => release.version_codename = value,
                "PRETTY_NAME" => release.pretty_name = value,
                _ => {}
            }
        }

        release
    }

    /// Reads and parses the host's os-release file.
    ///
    /// A host without the file yields an empty release, which no variant
    /// matches.
    pub fn fetch(executor: &dyn RemoteExecutor) -> Self {
        match run_checked(executor, &RemoteCommand::new("cat", [OS_RELEASE_PATH])) {
            Ok(content) => Self::parse(&content),
            Err(e) => {
                debug!("could not read {}: {}", OS_RELEASE_PATH, e);
                Self::default()
            }
        }
    }
}

fn unquote(value: &str) -> String {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner.replace("\\\"", "\"");
        }
    }
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RASPBIAN: &str = r#"PRETTY_NAME="Raspbian GNU/Linux 8 (jessie)"
NAME="Raspbian GNU/Linux"
VERSION_ID="8"
VERSION="8 (jessie)"
VERSION_CODENAME=jessie
ID=raspbian
ID_LIKE=debian
HOME_URL="http://www.raspbian.org/"
"#;

    #[test]
    fn test_parse_raspbian() {
        let release = OsRelease::parse(RASPBIAN);
        assert_eq!(release.id, "raspbian");
        assert_eq!(release.id_like, vec!["debian"]);
        assert_eq!(release.name, "Raspbian GNU/Linux");
        assert_eq!(release.version_id, "8");
        assert_eq!(release.version_codename, "jessie");
        assert_eq!(release.pretty_name, "Raspbian GNU/Linux 8 (jessie)");
    }

    #[test]
    fn test_parse_single_quotes_and_comments() {
        let release = OsRelease::parse("# comment\n\nID='centos'\nID_LIKE=\"rhel fedora\"\n");
        assert_eq!(release.id, "centos");
        assert_eq!(release.id_like, vec!["rhel", "fedora"]);
    }

    #[test]
    fn test_parse_garbage_is_empty() {
        assert_eq!(OsRelease::parse("not an os release file"), OsRelease::default());
    }
}

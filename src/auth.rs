//! Installing TLS material and daemon options on the host.

use std::fs;

use anyhow::Result;
use tracing::{info, warn};

use crate::error::EnginestrapError;
use crate::options::AuthOptions;
use crate::render::DaemonOptions;
use crate::steps::{ServiceAction, Session};
use crate::variant::RUNTIME_SERVICE;

/// Configures the daemon's TLS endpoint.
///
/// Called once per run, after the options directory exists and the remote
/// certificate paths are final. Implementations own the restart that makes
/// the daemon pick up `daemon_options`.
pub trait AuthConfigurator {
    fn configure_auth(
        &self,
        session: &Session<'_>,
        auth: &AuthOptions,
        daemon_options: &DaemonOptions,
    ) -> Result<()>;
}

/// Copies existing PEM files to the host and restarts the daemon.
///
/// Certificates must already exist locally; generating them is left to the
/// caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct CertInstaller;

impl AuthConfigurator for CertInstaller {
    fn configure_auth(
        &self,
        session: &Session<'_>,
        auth: &AuthOptions,
        daemon_options: &DaemonOptions,
    ) -> Result<()> {
        let pairs = auth.cert_pairs();
        if pairs.is_empty() {
            warn!("no local certificates configured; TLS material must already be on the host");
        }
        for (local, remote) in pairs {
            let pem = fs::read_to_string(local)
                .map_err(|e| EnginestrapError::io(format!("failed to read {}", local), e))?;
            info!("installing {} as {}", local, remote);
            session.write_file(remote, &pem)?;
        }

        info!("writing daemon options to {}", daemon_options.path);
        session.write_file(&daemon_options.path, &daemon_options.content)?;

        session.service(RUNTIME_SERVICE, ServiceAction::DaemonReload)?;
        session.service(RUNTIME_SERVICE, ServiceAction::Restart)?;
        Ok(())
    }
}

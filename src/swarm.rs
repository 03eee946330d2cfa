//! Joining the host to a swarm cluster.

use anyhow::Result;
use tracing::{debug, info};

use crate::error::EnginestrapError;
use crate::executor::CommandArgsBuilder;
use crate::options::{AuthOptions, SWARM_MANAGER_PORT, SwarmOptions};
use crate::steps::Session;

const MASTER_CONTAINER: &str = "swarm-agent-master";
const AGENT_CONTAINER: &str = "swarm-agent";

/// Configures cluster membership once the daemon is up with TLS.
pub trait SwarmConfigurator {
    fn configure_swarm(
        &self,
        session: &Session<'_>,
        swarm: &SwarmOptions,
        auth: &AuthOptions,
    ) -> Result<()>;
}

/// Runs the swarm manager and agent as containers on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockerSwarm {
    /// Address other members reach this host at, unless the options name one.
    pub advertise_host: String,
    /// Port of the daemon's TLS endpoint.
    pub engine_port: u16,
}

impl DockerSwarm {
    pub fn new(advertise_host: impl Into<String>, engine_port: u16) -> Self {
        Self {
            advertise_host: advertise_host.into(),
            engine_port,
        }
    }

    /// Arguments of `docker run` for the manager container.
    pub fn manager_args(swarm: &SwarmOptions, auth: &AuthOptions) -> Vec<String> {
        let mut builder = CommandArgsBuilder::new();
        builder.push_arg("run");
        builder.push_arg("-d");
        builder.push_flag_value("-p", &format!("{0}:{0}", SWARM_MANAGER_PORT));
        builder.push_arg("--restart=always");
        builder.push_flag_value("--name", MASTER_CONTAINER);

        let mut mounts: Vec<&str> = [
            &auth.ca_cert_remote_path,
            &auth.server_cert_remote_path,
            &auth.server_key_remote_path,
        ]
        .into_iter()
        .filter_map(|path| path.parent().map(|dir| dir.as_str()))
        .filter(|dir| !dir.is_empty())
        .collect();
        mounts.dedup();
        for dir in mounts {
            builder.push_flag_value("-v", &format!("{0}:{0}", dir));
        }

        builder.push_arg(swarm.image.as_str());
        builder.push_arg("manage");
        builder.push_arg("--tlsverify");
        builder.push_flag_value("--tlscacert", auth.ca_cert_remote_path.as_str());
        builder.push_flag_value("--tlscert", auth.server_cert_remote_path.as_str());
        builder.push_flag_value("--tlskey", auth.server_key_remote_path.as_str());
        builder.push_flag_value("-H", &format!("tcp://0.0.0.0:{}", SWARM_MANAGER_PORT));
        builder.push_flag_value("--strategy", &swarm.strategy);
        for flag in &swarm.arbitrary_flags {
            builder.push_arg(format!("--{}", flag));
        }
        builder.push_arg(swarm.discovery.as_str());
        builder.into_args()
    }

    /// Arguments of `docker run` for the agent container.
    pub fn agent_args(&self, swarm: &SwarmOptions) -> Vec<String> {
        let host = swarm.host.as_deref().unwrap_or(&self.advertise_host);
        let mut builder = CommandArgsBuilder::new();
        builder.push_arg("run");
        builder.push_arg("-d");
        builder.push_arg("--restart=always");
        builder.push_flag_value("--name", AGENT_CONTAINER);
        builder.push_arg(swarm.image.as_str());
        builder.push_arg("join");
        builder.push_flag_value("--advertise", &format!("{}:{}", host, self.engine_port));
        builder.push_arg(swarm.discovery.as_str());
        builder.into_args()
    }

    fn replace_container(session: &Session<'_>, name: &str, run_args: Vec<String>) -> Result<()> {
        if session.succeeds(&session.privileged("docker", ["rm", "-f", name])) {
            debug!("removed existing {} container", name);
        }
        info!("starting {} container", name);
        session.run(&session.privileged("docker", run_args))?;
        Ok(())
    }
}

impl SwarmConfigurator for DockerSwarm {
    fn configure_swarm(
        &self,
        session: &Session<'_>,
        swarm: &SwarmOptions,
        auth: &AuthOptions,
    ) -> Result<()> {
        if !swarm.is_swarm {
            debug!("swarm not requested");
            return Ok(());
        }
        if swarm.discovery.trim().is_empty() {
            return Err(EnginestrapError::Validation(
                "swarm discovery must be set when swarm is enabled".to_string(),
            )
            .into());
        }

        if swarm.master {
            Self::replace_container(session, MASTER_CONTAINER, Self::manager_args(swarm, auth))?;
        }
        Self::replace_container(session, AGENT_CONTAINER, self.agent_args(swarm))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8Path;

    fn swarm() -> SwarmOptions {
        SwarmOptions {
            is_swarm: true,
            master: true,
            discovery: "token://abc".to_string(),
            arbitrary_flags: vec!["replication".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_manager_args() {
        let auth = AuthOptions::default().with_remote_dir(Utf8Path::new("/etc/docker"));
        let args = DockerSwarm::manager_args(&swarm(), &auth);
        assert_eq!(
            args.join(" "),
            "run -d -p 3376:3376 --restart=always --name swarm-agent-master \
-v /etc/docker:/etc/docker swarm:latest manage --tlsverify \
--tlscacert /etc/docker/ca.pem --tlscert /etc/docker/server.pem \
--tlskey /etc/docker/server-key.pem -H tcp://0.0.0.0:3376 --strategy spread \
--replication token://abc"
        );
    }

    #[test]
    fn test_agent_args_advertise_host() {
        let configurator = DockerSwarm::new("10.0.0.7", 2376);
        let args = configurator.agent_args(&swarm());
        assert_eq!(
            args.join(" "),
            "run -d --restart=always --name swarm-agent swarm:latest join \
--advertise 10.0.0.7:2376 token://abc"
        );

        let mut options = swarm();
        options.host = Some("node1.lan".to_string());
        assert!(configurator.agent_args(&options).join(" ").contains("--advertise node1.lan:2376"));
    }
}

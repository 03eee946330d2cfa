use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use enginestrap::executor::{ExecutionResult, RemoteCommand, RemoteExecutor};
use enginestrap::os_release::OsRelease;
use enginestrap::poll::PollPolicy;
use enginestrap::provisioner::{MachineInfo, ProvisionSettings, Provisioner};
use enginestrap::variant::VariantSpec;

/// `/etc/os-release` of a HypriotOS image.
#[allow(dead_code)]
pub const HYPRIOT_OS_RELEASE: &str = r#"PRETTY_NAME="Raspbian GNU/Linux 8 (jessie)"
NAME="Raspbian GNU/Linux"
VERSION_ID="8"
VERSION_CODENAME=jessie
ID=raspbian
ID_LIKE=debian
"#;

/// `/etc/os-release` of a Debian 12 host.
#[allow(dead_code)]
pub const DEBIAN_OS_RELEASE: &str = r#"PRETTY_NAME="Debian GNU/Linux 12 (bookworm)"
NAME="Debian GNU/Linux"
VERSION_ID="12"
VERSION_CODENAME=bookworm
ID=debian
"#;

/// Answers commands by the prefix of their rendered line and records every
/// line in order.
///
/// Lines without a scripted answer get `default_status`. The call at
/// `fail_on_call` (0-indexed) fails as if the transport broke.
pub struct ScriptedExecutor {
    responses: Vec<(String, i32, String)>,
    default_status: i32,
    fail_on_call: Option<usize>,
    calls: Mutex<Vec<String>>,
    inputs: Mutex<Vec<(String, String)>>,
}

#[allow(dead_code)]
impl ScriptedExecutor {
    pub fn new() -> Self {
        Self {
            responses: Vec::new(),
            default_status: 0,
            fail_on_call: None,
            calls: Mutex::new(Vec::new()),
            inputs: Mutex::new(Vec::new()),
        }
    }

    /// Answers lines starting with `prefix`. Earlier answers take precedence.
    pub fn with_response(mut self, prefix: &str, status: i32, output: &str) -> Self {
        self.responses
            .push((prefix.to_string(), status, output.to_string()));
        self
    }

    pub fn with_default_status(mut self, status: i32) -> Self {
        self.default_status = status;
        self
    }

    pub fn failing_on(mut self, call_index: usize) -> Self {
        self.fail_on_call = Some(call_index);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// `(line, stdin)` of every command that was fed standard input.
    pub fn inputs(&self) -> Vec<(String, String)> {
        self.inputs.lock().unwrap().clone()
    }
}

impl RemoteExecutor for ScriptedExecutor {
    fn target(&self) -> &str {
        "pi@10.0.0.7"
    }

    fn execute(&self, command: &RemoteCommand) -> Result<ExecutionResult> {
        let line = command.render()?;
        let mut calls = self.calls.lock().unwrap();
        let index = calls.len();
        calls.push(line.clone());
        drop(calls);

        if let Some(stdin) = &command.stdin {
            self.inputs
                .lock()
                .unwrap()
                .push((line.clone(), stdin.clone()));
        }

        if self.fail_on_call == Some(index) {
            anyhow::bail!("simulated failure on call {}", index);
        }

        let (status, output) = self
            .responses
            .iter()
            .find(|(prefix, _, _)| line.starts_with(prefix.as_str()))
            .map(|(_, status, output)| (*status, output.clone()))
            .unwrap_or((self.default_status, String::new()));

        Ok(ExecutionResult {
            status: Some(status),
            output,
        })
    }
}

/// A fresh HypriotOS host: no engine installed, service stopped.
#[allow(dead_code)]
pub fn hypriot_host() -> ScriptedExecutor {
    ScriptedExecutor::new()
        .with_response("cat /etc/os-release", 0, HYPRIOT_OS_RELEASE)
        .with_response("type docker", 1, "docker: not found")
        .with_response("sudo service docker status", 3, "docker is not running")
}

/// A Debian host with the engine already installed and running.
#[allow(dead_code)]
pub fn debian_host() -> ScriptedExecutor {
    ScriptedExecutor::new()
        .with_response("cat /etc/os-release", 0, DEBIAN_OS_RELEASE)
        .with_response("cat /etc/hypriot_release", 1, "No such file or directory")
}

/// Settings that never sleep for long.
#[allow(dead_code)]
pub fn fast_settings() -> ProvisionSettings {
    ProvisionSettings {
        readiness: PollPolicy::new(Duration::from_millis(1), Duration::from_millis(50)),
        settle_delay: Duration::ZERO,
        ..Default::default()
    }
}

#[allow(dead_code)]
pub fn machine() -> MachineInfo {
    MachineInfo {
        name: "node1".to_string(),
        driver_name: "generic".to_string(),
    }
}

/// A provisioner for `spec` built without running detection.
#[allow(dead_code)]
pub fn provisioner(
    spec: VariantSpec,
    executor: Arc<ScriptedExecutor>,
    os_release: &str,
) -> Provisioner {
    Provisioner::new(
        spec,
        executor,
        OsRelease::parse(os_release),
        machine(),
        fast_settings(),
    )
}

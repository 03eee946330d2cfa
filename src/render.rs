//! Rendering of the Docker daemon options file.
//!
//! The file content is produced from fixed `handlebars` templates. Rendering
//! is pure: identical inputs always give byte-identical output, so
//! re-provisioning a host with unchanged options leaves its file untouched.

use camino::Utf8PathBuf;
use handlebars::Handlebars;
use serde::Serialize;

use crate::error::EnginestrapError;
use crate::options::{AuthOptions, EngineOptions};
use crate::variant::OptionsLayout;

/// Storage driver used when neither the caller nor the variant chose one.
pub const DEFAULT_STORAGE_DRIVER: &str = "overlay2";

/// Daemon flags shared by every layout. Each list entry yields exactly one
/// flag followed by a space.
const FLAGS_TEMPLATE: &str = "-H tcp://0.0.0.0:{{docker_port}} -H unix:///var/run/docker.sock \
--storage-driver {{storage_driver}} --tlsverify --tlscacert {{ca_cert}} --tlscert {{server_cert}} \
--tlskey {{server_key}} \
{{#each labels}}--label {{this}} {{/each}}\
{{#each insecure_registry}}--insecure-registry {{this}} {{/each}}\
{{#each registry_mirror}}--registry-mirror {{this}} {{/each}}\
{{#each arbitrary_flags}}--{{this}} {{/each}}";

const DEFAULT_FILE_TEMPLATE: &str = "\nDOCKER_OPTS='{{> flags}}'\n";

const SYSTEMD_DROP_IN_TEMPLATE: &str = "[Service]
ExecStart=
ExecStart=/usr/bin/dockerd {{> flags}}
Environment={{#each env}}{{this}} {{/each}}
";

/// The rendered artifact: where the options file goes and what it contains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonOptions {
    pub path: Utf8PathBuf,
    pub content: String,
}

#[derive(Serialize)]
struct EngineConfigContext<'a> {
    docker_port: u16,
    storage_driver: &'a str,
    ca_cert: &'a str,
    server_cert: &'a str,
    server_key: &'a str,
    labels: &'a [String],
    insecure_registry: &'a [String],
    registry_mirror: &'a [String],
    arbitrary_flags: &'a [String],
    env: Vec<String>,
}

fn template_error(e: impl std::fmt::Display) -> EnginestrapError {
    EnginestrapError::TemplateRender(e.to_string())
}

fn create_handlebars() -> Result<Handlebars<'static>, EnginestrapError> {
    let mut handlebars = Handlebars::new();
    handlebars.register_escape_fn(handlebars::no_escape);
    handlebars.set_strict_mode(true);
    handlebars
        .register_partial("flags", FLAGS_TEMPLATE)
        .map_err(template_error)?;
    handlebars
        .register_template_string(&OptionsLayout::DefaultFile.to_string(), DEFAULT_FILE_TEMPLATE)
        .map_err(template_error)?;
    handlebars
        .register_template_string(
            &OptionsLayout::SystemdDropIn.to_string(),
            SYSTEMD_DROP_IN_TEMPLATE,
        )
        .map_err(template_error)?;
    Ok(handlebars)
}

/// Renders the daemon options file content.
///
/// Labels, registries, mirrors and flags are emitted in list order, one
/// flag per entry. Entries that could break out of their argument are
/// rejected with `Validation`. An unset storage driver falls back to
/// [`DEFAULT_STORAGE_DRIVER`].
pub fn render(
    layout: OptionsLayout,
    docker_port: u16,
    auth: &AuthOptions,
    engine: &EngineOptions,
) -> Result<String, EnginestrapError> {
    engine.check_values()?;
    let context = EngineConfigContext {
        docker_port,
        storage_driver: engine
            .storage_driver
            .as_deref()
            .unwrap_or(DEFAULT_STORAGE_DRIVER),
        ca_cert: auth.ca_cert_remote_path.as_str(),
        server_cert: auth.server_cert_remote_path.as_str(),
        server_key: auth.server_key_remote_path.as_str(),
        labels: &engine.labels,
        insecure_registry: &engine.insecure_registry,
        registry_mirror: &engine.registry_mirror,
        arbitrary_flags: &engine.arbitrary_flags,
        env: engine.env.iter().map(|e| format!("{:?}", e)).collect(),
    };

    create_handlebars()?
        .render(&layout.to_string(), &context)
        .map_err(template_error)
}

//! Registry of known provisioner variants.

use std::sync::Arc;

use tracing::info;

use crate::detect::{probe, select};
use crate::error::EnginestrapError;
use crate::executor::RemoteExecutor;
use crate::os_release::OsRelease;
use crate::provisioner::{MachineInfo, ProvisionSettings, Provisioner};
use crate::variant::VariantSpec;

/// Result of probing every registered variant against a host.
#[derive(Debug, Clone)]
pub struct Detection {
    pub os_release: OsRelease,
    /// The selected variant.
    pub variant: VariantSpec,
    /// Names of every variant whose probe matched, in registration order.
    pub matched: Vec<String>,
}

/// Ordered collection of variants, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    variants: Vec<VariantSpec>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in variant.
    pub fn builtin() -> Self {
        Self {
            variants: VariantSpec::builtin(),
        }
    }

    /// Adds a variant under its name.
    pub fn register(&mut self, spec: VariantSpec) -> Result<(), EnginestrapError> {
        if spec.name.trim().is_empty() {
            return Err(EnginestrapError::Validation(
                "variant name must not be empty".to_string(),
            ));
        }
        if self.get(&spec.name).is_some() {
            return Err(EnginestrapError::Validation(format!(
                "variant '{}' is already registered",
                spec.name
            )));
        }
        self.variants.push(spec);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&VariantSpec> {
        self.variants.iter().find(|spec| spec.name == name)
    }

    /// All variants in registration order.
    pub fn all(&self) -> &[VariantSpec] {
        &self.variants
    }

    /// Probes every variant and selects the one matching the host.
    pub fn detect(&self, executor: &dyn RemoteExecutor) -> Result<Detection, EnginestrapError> {
        let os_release = OsRelease::fetch(executor);
        info!(
            "detecting variant of {} (os-release id: {:?})",
            executor.target(),
            os_release.id
        );

        let probed: Vec<&VariantSpec> = self.variants.iter().collect();
        let matched: Vec<&VariantSpec> = probed
            .iter()
            .copied()
            .filter(|spec| probe(spec, executor, &os_release).is_compatible())
            .collect();

        let variant = select(executor.target(), &probed, &matched)?.clone();
        info!("detected variant: {}", variant.name);

        Ok(Detection {
            matched: matched.iter().map(|s| s.name.clone()).collect(),
            os_release,
            variant,
        })
    }

    /// Builds a provisioner for the detected variant.
    pub fn detect_provisioner(
        &self,
        executor: Arc<dyn RemoteExecutor>,
        machine: MachineInfo,
        settings: ProvisionSettings,
    ) -> Result<Provisioner, EnginestrapError> {
        let detection = self.detect(executor.as_ref())?;
        Ok(Provisioner::new(
            detection.variant,
            executor,
            detection.os_release,
            machine,
            settings,
        ))
    }

    /// Builds a provisioner for a named variant.
    ///
    /// The variant is still probed: provisioning never runs against a host
    /// that does not pass detection for the chosen variant.
    pub fn provisioner_for(
        &self,
        name: &str,
        executor: Arc<dyn RemoteExecutor>,
        machine: MachineInfo,
        settings: ProvisionSettings,
    ) -> Result<Provisioner, EnginestrapError> {
        let spec = self
            .get(name)
            .ok_or_else(|| EnginestrapError::UnknownVariant(name.to_string()))?;
        let os_release = OsRelease::fetch(executor.as_ref());

        if !probe(spec, executor.as_ref(), &os_release).is_compatible() {
            return Err(EnginestrapError::NoCompatibleProvisioner {
                target: executor.target().to_string(),
                probed: vec![spec.name.clone()],
            });
        }

        Ok(Provisioner::new(spec.clone(), executor, os_release, machine, settings))
    }
}

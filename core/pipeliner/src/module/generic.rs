use crate::{item::PipelineItem, pipeline::OutputRelay};

use super::{
    ConfigError, Module, ModuleError, ModuleId, ModuleMetadata, OUTPUT_KIND, OutputModule, ParameterMap,
};

/// Metadata and relay of an output module.
///
/// Concrete modules hold a `GenericOutputModule` and delegate to it. Used on its own,
/// it is an output without parameters, whose sink must be set on the [`relay`](Self::relay).
pub struct GenericOutputModule {
    metadata: ModuleMetadata,
    relay: OutputRelay<PipelineItem>,
}

impl GenericOutputModule {
    pub fn new(name: impl Into<String>, version: impl Into<String>, id: ModuleId) -> Self {
        let relay = OutputRelay::new(id.to_string());
        Self {
            metadata: ModuleMetadata::new(name, version, id, OUTPUT_KIND),
            relay,
        }
    }

    pub fn metadata(&self) -> &ModuleMetadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut ModuleMetadata {
        &mut self.metadata
    }

    pub fn relay(&self) -> &OutputRelay<PipelineItem> {
        &self.relay
    }
}

impl Module for GenericOutputModule {
    fn metadata(&self) -> &ModuleMetadata {
        &self.metadata
    }

    fn parameters(&self) -> ParameterMap {
        ParameterMap::new()
    }

    fn configure(&mut self, params: &ParameterMap) -> Result<(), ConfigError> {
        if let Some((name, _)) = params.iter().next() {
            self.metadata.set_ready(false);
            return Err(ConfigError::InvalidParameter {
                name: name.to_owned(),
                reason: String::from("this module has no parameter"),
            });
        }
        self.metadata.set_ready(true);
        Ok(())
    }
}

impl OutputModule for GenericOutputModule {
    fn relay(&self) -> &OutputRelay<PipelineItem> {
        &self.relay
    }

    /// A generic output is bound to its inbound channel and to a sink that may own
    /// external resources, it cannot be copied.
    fn duplicate(&self, _specific_id: &str) -> Result<Box<dyn OutputModule>, ModuleError> {
        Err(ModuleError::Unsupported {
            module: self.metadata.id.clone(),
            operation: "duplication",
        })
    }
}

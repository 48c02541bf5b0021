//! Output modules.
//!
//! A module is the unit that the application configures, registers and starts.
//! Output modules are built by composition:
//!
//! - a [`ModuleMetadata`] holds the name, version, identifier and readiness of the module;
//! - an [`OutputRelay`] provides the generic relaying logic;
//! - the concrete module provides the configuration and the sink.
//!
//! [`GenericOutputModule`] bundles the first two, concrete modules such as the email output
//! hold one by value and implement [`Module`] and [`OutputModule`] on top of it.
//!
//! ## Module lifecycle
//!
//! 1. **Creation**: the module is created with an identifier, it is not ready.
//! 2. **Registration**: the composition root adds it to a [`ModuleRegistry`](crate::registry::ModuleRegistry).
//! 3. **Configuration**: [`Module::configure`] validates the parameters and marks the module as ready.
//! 4. **Wiring**: the assembler takes the [`inbound_handle`](OutputModule::inbound_handle)
//!    and gives it to the upstream stage.
//! 5. **Operation**: [`start`](OutputModule::start) and [`stop`](OutputModule::stop) may be
//!    called several times.

use std::fmt;

use tokio::sync::mpsc;

use crate::{
    item::PipelineItem,
    pipeline::{CompletionToken, OutputRelay, RelayError},
};

pub mod error;
mod generic;
pub mod params;

pub use error::{ConfigError, ModuleError};
pub use generic::GenericOutputModule;
pub use params::ParameterMap;

/// Kind of every output module.
pub const OUTPUT_KIND: &str = "pipeliner-output";

/// Identifies a module in a [`ModuleRegistry`](crate::registry::ModuleRegistry).
///
/// The `generic` part names the implementation (for instance `email`), the `specific` part
/// names one instance of it. The instance with an empty specific part is the prototype
/// from which other instances are duplicated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId {
    pub generic: String,
    pub specific: String,
}

impl ModuleId {
    pub fn new(generic: impl Into<String>, specific: impl Into<String>) -> Self {
        Self {
            generic: generic.into(),
            specific: specific.into(),
        }
    }

    pub fn prototype(generic: impl Into<String>) -> Self {
        Self::new(generic, "")
    }

    pub fn is_prototype(&self) -> bool {
        self.specific.is_empty()
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.generic, self.specific)
    }
}

/// Static information about a module, and whether it is ready to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleMetadata {
    pub name: String,
    pub version: String,
    pub id: ModuleId,
    pub kind: String,
    ready: bool,
}

impl ModuleMetadata {
    pub fn new(name: impl Into<String>, version: impl Into<String>, id: ModuleId, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            id,
            kind: kind.into(),
            ready: false,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }
}

/// Configuration capabilities, common to every module.
pub trait Module: Send + Sync {
    fn metadata(&self) -> &ModuleMetadata;

    /// Returns the recognized parameters, with their default values.
    fn parameters(&self) -> ParameterMap;

    /// Validates and applies the parameters.
    ///
    /// On success, the module must be marked as ready. On failure, it must not be.
    fn configure(&mut self, params: &ParameterMap) -> Result<(), ConfigError>;

    fn id(&self) -> &ModuleId {
        &self.metadata().id
    }
}

/// Capabilities of a module at the end of the pipeline.
///
/// Implementors only have to give access to their relay and to say how they can be duplicated:
/// the lifecycle methods have default implementations on top of [`relay`](Self::relay).
pub trait OutputModule: Module {
    fn relay(&self) -> &OutputRelay<PipelineItem>;

    /// Creates a new, unconfigured, instance of this module with the given specific id.
    fn duplicate(&self, specific_id: &str) -> Result<Box<dyn OutputModule>, ModuleError>;

    /// See [`OutputRelay::inbound_handle`].
    fn inbound_handle(&self) -> Result<mpsc::Sender<PipelineItem>, RelayError> {
        self.relay().inbound_handle()
    }

    /// Starts the module, see [`OutputRelay::start`].
    ///
    /// A module that has not been configured successfully refuses to start,
    /// and releases the token.
    fn start(&self, token: CompletionToken) -> Result<(), RelayError> {
        if !self.metadata().is_ready() {
            return Err(RelayError::NotReady(self.id().to_string()));
        }
        self.relay().start(token)
    }

    /// Stops the module, see [`OutputRelay::stop`].
    fn stop(&self) -> bool {
        self.relay().stop()
    }
}

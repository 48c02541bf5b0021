//! Output module that sends the items of each run in one email.
//!
//! The items received during a run are collected, one numbered line per item,
//! and the resulting text is sent to a single recipient when the inbound stream ends.
//! A stopped run sends nothing.

use std::sync::Arc;

use pipeliner::{
    PipelineItem,
    module::{
        ConfigError, GenericOutputModule, Module, ModuleError, ModuleId, ModuleMetadata, OutputModule, ParameterMap,
    },
    pipeline::OutputRelay,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

mod body;
pub mod config;
pub mod mailer;
mod sink;

pub use body::MessageBody;
pub use config::EmailConfig;
pub use mailer::{Email, Mailer, SmtpMailer};

pub const MODULE_NAME: &str = "E-Mail Output Module";
pub const GENERIC_ID: &str = "email";

/// Creates the [`Mailer`] of a configured module.
pub type MailerFactory = Arc<dyn Fn(&EmailConfig) -> anyhow::Result<Arc<dyn Mailer>> + Send + Sync>;

pub struct EmailOutputModule {
    base: GenericOutputModule,
    config: Option<Arc<EmailConfig>>,
    mailer_factory: MailerFactory,
}

impl EmailOutputModule {
    /// Creates an email output that sends its messages over SMTP.
    pub fn new(specific_id: &str) -> Self {
        Self::with_mailer_factory(
            specific_id,
            Arc::new(|config: &EmailConfig| -> anyhow::Result<Arc<dyn Mailer>> {
                Ok(Arc::new(SmtpMailer::new(config)?))
            }),
        )
    }

    /// Creates the prototype of the email outputs, to register in a
    /// [`ModuleRegistry`](pipeliner::registry::ModuleRegistry).
    pub fn prototype() -> Self {
        Self::new("")
    }

    /// Creates an email output that uses `factory` to obtain its mailer.
    pub fn with_mailer_factory(specific_id: &str, factory: MailerFactory) -> Self {
        Self {
            base: GenericOutputModule::new(
                MODULE_NAME,
                env!("CARGO_PKG_VERSION"),
                ModuleId::new(GENERIC_ID, specific_id),
            ),
            config: None,
            mailer_factory: factory,
        }
    }

    /// The configuration applied by the last successful call to [`Module::configure`].
    pub fn config(&self) -> Option<&EmailConfig> {
        self.config.as_deref()
    }

    fn apply(&mut self, params: &ParameterMap) -> Result<(), ConfigError> {
        for unknown in params.unknown(&self.parameters()) {
            log::warn!("{}: ignoring unknown parameter {unknown}", self.id());
        }
        let config = Arc::new(EmailConfig::from_parameters(params)?);
        let mailer = (self.mailer_factory)(&config).map_err(|e| ConfigError::InvalidParameter {
            name: String::from(config::SMTP_SERVER),
            reason: format!("{e:#}"),
        })?;

        let sink_config = config.clone();
        self.base.relay().set_sink_adapter(
            move |items: mpsc::Receiver<PipelineItem>, cancel: CancellationToken| {
                sink::collect_and_send(items, cancel, sink_config.clone(), mailer.clone())
            },
        );
        log::debug!(
            "{} configured: {}:{} -> {}",
            self.id(),
            config.smtp_host,
            config.smtp_port,
            config.to
        );
        self.config = Some(config);
        Ok(())
    }
}

impl Module for EmailOutputModule {
    fn metadata(&self) -> &ModuleMetadata {
        self.base.metadata()
    }

    fn parameters(&self) -> ParameterMap {
        config::default_parameters()
    }

    fn configure(&mut self, params: &ParameterMap) -> Result<(), ConfigError> {
        let res = self.apply(params);
        self.base.metadata_mut().set_ready(res.is_ok());
        res
    }
}

impl OutputModule for EmailOutputModule {
    fn relay(&self) -> &OutputRelay<PipelineItem> {
        self.base.relay()
    }

    fn duplicate(&self, specific_id: &str) -> Result<Box<dyn OutputModule>, ModuleError> {
        Ok(Box::new(Self::with_mailer_factory(
            specific_id,
            self.mailer_factory.clone(),
        )))
    }
}

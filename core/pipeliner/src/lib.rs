//! Output stage of a streaming item pipeline.
//!
//! Items produced by an upstream stage arrive on the inbound channel of an [`OutputRelay`](pipeline::OutputRelay),
//! which forwards them, one at a time and in order, to a pluggable [`SinkAdapter`](pipeline::SinkAdapter)
//! running in its own task.
//!
//! ## Overview
//!
//! - [`pipeline`] contains the relay, its cancellation signal, the completion tracker
//!   and the sink contract.
//! - [`module`] contains the metadata, parameters and capability traits of output modules,
//!   plus [`GenericOutputModule`](module::GenericOutputModule), a reusable building block
//!   for concrete modules.
//! - [`registry`] keeps the modules known to the application. Registration is explicit:
//!   the composition root (for instance the agent binary) registers every module it wants to use.

pub mod item;
pub mod module;
pub mod pipeline;
pub mod registry;

pub use item::PipelineItem;

//! Relay between the upstream item stream and the sink of an output stage.
//!
//! ## Data flow
//!
//! ```text
//! upstream --> inbound channel --> relay loop --> per-run channel --> sink task --> external effect
//! ```
//!
//! Every call to [`OutputRelay::start`] spawns a relay loop, which in turn creates a fresh
//! channel and a fresh cancellation token, and spawns the sink task over them.
//!
//! ## Control flow
//!
//! [`OutputRelay::stop`] fires the relay's [`CancelSignal`]. The relay loop observes it,
//! cancels the sink's token, and both tasks exit. Each task holds a [`CompletionToken`],
//! so the [`CompletionTracker`] given to `start` knows when everything has stopped.

pub mod cancel;
pub mod error;
pub mod relay;
pub mod sink;
pub mod tracker;

pub use cancel::{ArmedToken, CancelSignal};
pub use error::{RelayError, SinkFailure};
pub use relay::{InboundStatus, OutputRelay, RelayConfig};
pub use sink::SinkAdapter;
pub use tracker::{CompletionToken, CompletionTracker};

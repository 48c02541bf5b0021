use std::fmt;

/// Connection state of the inbound channel of a relay.
#[derive(Clone, Debug, PartialEq, Eq, Copy)]
#[repr(u8)]
pub enum InboundStatus {
    /// The assembler has not asked for the inbound handle yet.
    Unwired,
    /// The inbound channel is open, the relay can be started.
    Active,
    /// Upstream has closed the inbound channel. The relay cannot consume anything
    /// until it is wired again.
    Closed,
}

impl From<u8> for InboundStatus {
    fn from(value: u8) -> Self {
        const UNWIRED: u8 = InboundStatus::Unwired as u8;
        const ACTIVE: u8 = InboundStatus::Active as u8;

        match value {
            UNWIRED => InboundStatus::Unwired,
            ACTIVE => InboundStatus::Active,
            _ => InboundStatus::Closed,
        }
    }
}

impl fmt::Display for InboundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InboundStatus::Unwired => "unwired",
            InboundStatus::Active => "active",
            InboundStatus::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Why a relay loop stopped.
#[derive(Clone, Debug, PartialEq, Eq, Copy)]
pub(super) enum RunOutcome {
    /// Upstream closed the inbound channel.
    InputClosed,
    /// The relay has been stopped.
    Stopped,
    /// The sink dropped its receiver before the end of the stream.
    SinkGone,
    /// The sink did not accept an item before the forward deadline.
    Stalled,
}

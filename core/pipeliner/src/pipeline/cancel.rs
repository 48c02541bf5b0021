use std::sync::Mutex;

use tokio_util::sync::CancellationToken;

/// One-shot "stop processing" signal of an output relay, that can be re-armed.
///
/// At most one [`CancellationToken`] is armed at any time. [`arm`](Self::arm) hands out a share
/// of the armed token, creating it if needed, and [`fire`](Self::fire) cancels it and clears the slot,
/// so that the next run gets a fresh token. A run that exits on its own gives its share back
/// with [`release`](Self::release): once every share of the armed token is back, the signal is disarmed.
///
/// Arming, firing and releasing happen under the same lock, which makes concurrent or repeated
/// calls to `fire` safe: only the first one cancels something.
#[derive(Default)]
pub struct CancelSignal {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    armed: Option<Armed>,
    generation: u64,
}

struct Armed {
    token: CancellationToken,
    generation: u64,
    holders: usize,
}

/// A share of the token armed by [`CancelSignal::arm`].
#[must_use = "an ArmedToken must be given back with CancelSignal::release"]
pub struct ArmedToken {
    token: CancellationToken,
    generation: u64,
}

impl ArmedToken {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a share of the armed token, or arms a new one.
    pub fn arm(&self) -> ArmedToken {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        let generation = &mut state.generation;
        let armed = state.armed.get_or_insert_with(|| {
            *generation += 1;
            Armed {
                token: CancellationToken::new(),
                generation: *generation,
                holders: 0,
            }
        });
        armed.holders += 1;
        ArmedToken {
            token: armed.token.clone(),
            generation: armed.generation,
        }
    }

    /// Gives back a share obtained from [`arm`](Self::arm), without cancelling anything.
    ///
    /// Returns `true` if it was the last share of the armed token, which is then disarmed.
    /// Shares of a token that has already been fired are ignored.
    pub fn release(&self, share: ArmedToken) -> bool {
        let mut state = self.state.lock().unwrap();
        let disarm = match state.armed.as_mut() {
            Some(armed) if armed.generation == share.generation => {
                armed.holders -= 1;
                armed.holders == 0
            }
            _ => false,
        };
        if disarm {
            state.armed = None;
        }
        disarm
    }

    /// Cancels the armed token.
    ///
    /// Returns `false` if nothing was armed, in which case this call has no effect.
    pub fn fire(&self) -> bool {
        let taken = self.state.lock().unwrap().armed.take();
        match taken {
            Some(armed) => {
                armed.token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.state.lock().unwrap().armed.is_some()
    }
}

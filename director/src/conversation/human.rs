//! Single-slot rendezvous between the scheduler and whoever answers for the
//! human participant.
//!
//! The scheduler opens a slot for a round and waits on it; the UI resolves it
//! through the session API; a timer or the session's cancellation resolves it
//! as a skip. Whichever lands first wins and the slot is consumed, so a second
//! resolution is refused.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The human pressed skip.
    Requested,
    /// Nobody answered within the turn timeout.
    TimedOut,
    /// The session was stopped while waiting.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HumanResolution {
    Speak(String),
    Skip(SkipReason),
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum HumanTurnError {
    #[error("no human turn pending")]
    NoPendingTurn,
    #[error("message must not be empty")]
    EmptyMessage,
}

struct PendingTurn {
    round: u32,
    tx: oneshot::Sender<HumanResolution>,
}

#[derive(Clone, Default)]
pub struct HumanTurnSlot {
    pending: Arc<Mutex<Option<PendingTurn>>>,
}

impl HumanTurnSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the slot for `round`. A stale pending turn, if any, is dropped.
    pub fn open(&self, round: u32) -> HumanTurnWait {
        let (tx, rx) = oneshot::channel();
        *self.lock() = Some(PendingTurn { round, tx });
        debug!(round, "human turn opened");
        HumanTurnWait {
            round,
            rx,
            slot: self.clone(),
        }
    }

    /// Round currently waiting on the human, if any.
    pub fn pending_round(&self) -> Option<u32> {
        self.lock().as_ref().map(|p| p.round)
    }

    /// Deliver a resolution. Returns the round it resolved.
    pub fn resolve(&self, resolution: HumanResolution) -> Result<u32, HumanTurnError> {
        if let HumanResolution::Speak(message) = &resolution {
            if message.trim().is_empty() {
                return Err(HumanTurnError::EmptyMessage);
            }
        }

        // Send under the lock so a concurrent timeout sees either the armed
        // slot or the delivered value, never neither.
        let mut pending = self.lock();
        let Some(turn) = pending.take() else {
            return Err(HumanTurnError::NoPendingTurn);
        };
        let round = turn.round;
        turn.tx
            .send(resolution)
            .map_err(|_| HumanTurnError::NoPendingTurn)?;
        info!(round, "human turn resolved");
        Ok(round)
    }

    /// Consume the slot if it still belongs to `round`.
    fn disarm(&self, round: u32) -> bool {
        let mut pending = self.lock();
        match pending.as_ref() {
            Some(turn) if turn.round == round => {
                pending.take();
                true
            }
            _ => false,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<PendingTurn>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The scheduler's end of an armed slot.
pub struct HumanTurnWait {
    round: u32,
    rx: oneshot::Receiver<HumanResolution>,
    slot: HumanTurnSlot,
}

impl HumanTurnWait {
    pub fn round(&self) -> u32 {
        self.round
    }

    /// Resolve exactly once: explicit answer, timeout, or cancellation.
    pub async fn wait(mut self, timeout: Duration, cancel: &CancellationToken) -> HumanResolution {
        let fallback = tokio::select! {
            resolution = &mut self.rx => {
                return resolution.unwrap_or(HumanResolution::Skip(SkipReason::Cancelled));
            }
            _ = sleep(timeout) => SkipReason::TimedOut,
            _ = cancel.cancelled() => SkipReason::Cancelled,
        };

        if self.slot.disarm(self.round) {
            info!(round = self.round, reason = ?fallback, "human turn resolved as skip");
            return HumanResolution::Skip(fallback);
        }
        // A resolver took the slot first; its value is already in the channel.
        self.rx
            .try_recv()
            .unwrap_or(HumanResolution::Skip(fallback))
    }
}

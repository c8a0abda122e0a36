//! Engine readiness gate
//!
//! Makes sure the engine runtime is initialized exactly once before anything
//! else touches it. The first caller runs `initialize`; concurrent callers
//! subscribe to that attempt and receive its outcome, success or error.
//! Once ready, callers only take the lock.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::engine::Engine;
use crate::error::{CodecError, Result};

/// Lifecycle of the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    NotStarted,
    Initializing,
    Ready,
}

/// Outcome of one initialization attempt, shared by all of its waiters
type Outcome = std::result::Result<(), Arc<CodecError>>;

#[derive(Debug)]
enum Phase {
    NotStarted,
    /// `None` until the attempt finishes
    Initializing(watch::Receiver<Option<Outcome>>),
    Ready,
}

enum Role {
    Leader(watch::Sender<Option<Outcome>>),
    Follower(watch::Receiver<Option<Outcome>>),
}

/// One-time asynchronous readiness gate
#[derive(Debug)]
pub struct EngineGate {
    phase: Mutex<Phase>,
}

impl Default for EngineGate {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineGate {
    pub fn new() -> Self {
        Self {
            phase: Mutex::new(Phase::NotStarted),
        }
    }

    pub fn state(&self) -> GateState {
        match &*self.phase.lock() {
            Phase::NotStarted => GateState::NotStarted,
            Phase::Initializing(_) => GateState::Initializing,
            Phase::Ready => GateState::Ready,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.phase.lock(), Phase::Ready)
    }

    /// Wait until the engine is ready, initializing it if nobody has yet.
    ///
    /// A failed attempt is reported to every caller that waited on it and
    /// puts the gate back to `NotStarted`, so a later call tries again.
    pub async fn wait<E: Engine>(&self, engine: &E) -> Result<()> {
        loop {
            let role = {
                let mut phase = self.phase.lock();
                match &*phase {
                    Phase::Ready => return Ok(()),
                    Phase::Initializing(rx) => Role::Follower(rx.clone()),
                    Phase::NotStarted => match engine.readiness() {
                        None => {
                            return Err(CodecError::ContractViolation(
                                "engine does not expose a readiness flag".into(),
                            ))
                        }
                        Some(true) => {
                            *phase = Phase::Ready;
                            return Ok(());
                        }
                        Some(false) => {
                            let (tx, rx) = watch::channel(None);
                            *phase = Phase::Initializing(rx);
                            Role::Leader(tx)
                        }
                    },
                }
            };

            match role {
                Role::Leader(tx) => return self.initialize(engine, tx).await,
                Role::Follower(mut rx) => match rx.wait_for(Option::is_some).await {
                    Ok(outcome) => {
                        return match outcome.as_ref() {
                            Some(Err(e)) => Err(CodecError::Initialization(e.clone())),
                            _ => Ok(()),
                        }
                    }
                    // The leading caller was dropped mid-attempt.
                    Err(_) => tracing::trace!("initialization abandoned, retrying"),
                },
            }
        }
    }

    async fn initialize<E: Engine>(
        &self,
        engine: &E,
        tx: watch::Sender<Option<Outcome>>,
    ) -> Result<()> {
        let mut attempt = Attempt {
            gate: self,
            tx: Some(tx),
        };
        tracing::debug!("engine initialization started");

        match engine.initialize().await {
            Ok(()) => {
                attempt.finish(Phase::Ready, Ok(()));
                tracing::info!("engine ready");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "engine initialization failed");
                let e = Arc::new(e);
                attempt.finish(Phase::NotStarted, Err(e.clone()));
                Err(CodecError::Initialization(e))
            }
        }
    }
}

/// The running attempt; dropping it unfinished resets the gate.
struct Attempt<'g> {
    gate: &'g EngineGate,
    tx: Option<watch::Sender<Option<Outcome>>>,
}

impl Attempt<'_> {
    fn finish(&mut self, next: Phase, outcome: Outcome) {
        let mut phase = self.gate.phase.lock();
        *phase = next;
        if let Some(tx) = self.tx.take() {
            tx.send_replace(Some(outcome));
        }
    }
}

impl Drop for Attempt<'_> {
    fn drop(&mut self) {
        if self.tx.take().is_some() {
            *self.gate.phase.lock() = Phase::NotStarted;
            tracing::debug!("engine initialization cancelled");
        }
    }
}

//! Tokio dispatch task that owns the autosend loop and the handle used to
//! feed it.

use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::autosend::{Autosend, ProtocolRef, Scheduler, TickToken};
use crate::error::{Error, Result};

/// Work item for the autosend dispatch task.
pub enum AutosendCommand {
    Add(ProtocolRef),
    Remove(ProtocolRef),
    Tick(TickToken),
}

/// Handle for registering connections with the dispatch task.
///
/// Cheap to clone; usable from any thread or task.
#[derive(Clone)]
pub struct AutosendHandle {
    tx: mpsc::UnboundedSender<AutosendCommand>,
}

impl AutosendHandle {
    /// Register a connection with pending output. Registering twice is a no-op.
    pub fn add_protocol(&self, protocol: ProtocolRef) -> Result<()> {
        self.tx
            .send(AutosendCommand::Add(protocol))
            .map_err(|_| Error::DispatcherClosed)
    }

    /// Unregister a connection. Removing an absent connection is a no-op.
    pub fn remove_protocol(&self, protocol: ProtocolRef) -> Result<()> {
        self.tx
            .send(AutosendCommand::Remove(protocol))
            .map_err(|_| Error::DispatcherClosed)
    }

    /// Check if the dispatch task has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Delivers ticks to the dispatch channel from a tokio timer.
///
/// Holds only a weak sender, so a pending timer never keeps the dispatch
/// task alive after every handle is gone.
pub struct TokioScheduler {
    tx: mpsc::WeakUnboundedSender<AutosendCommand>,
}

impl Scheduler for TokioScheduler {
    fn schedule_after(&self, delay: Duration, token: TickToken) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(AutosendCommand::Tick(token));
            }
        });
    }
}

/// Dispatch task owning the autosend registry.
///
/// All registrations and ticks are applied in channel order on this one
/// task, so the registry needs no lock.
pub struct AutosendManager {
    rx: mpsc::UnboundedReceiver<AutosendCommand>,
    autosend: Autosend<TokioScheduler>,
}

impl AutosendManager {
    /// Create a manager ticking every `delay`, and the handle that feeds it.
    pub fn new(delay: Duration) -> (Self, AutosendHandle) {
        let (tx, rx) = mpsc::unbounded_channel();

        let scheduler = TokioScheduler { tx: tx.downgrade() };
        let manager = Self {
            rx,
            autosend: Autosend::new(scheduler, delay),
        };

        (manager, AutosendHandle { tx })
    }

    /// Run until every handle has been dropped.
    pub async fn run(mut self) {
        info!(
            "Starting autosend dispatcher with {}ms delay",
            self.autosend.delay().as_millis()
        );

        while let Some(command) = self.rx.recv().await {
            match command {
                AutosendCommand::Tick(token) => self.handle_tick(token),
                command => self.apply(command),
            }
        }

        info!(
            "Autosend dispatcher stopped with {} connections registered",
            self.autosend.len()
        );
    }

    fn apply(&mut self, command: AutosendCommand) {
        match command {
            AutosendCommand::Add(protocol) => {
                if !self.autosend.add(protocol) {
                    debug!("Connection already registered for autosend");
                }
            }
            AutosendCommand::Remove(protocol) => {
                self.autosend.remove(&protocol);
            }
            AutosendCommand::Tick(token) => {
                self.autosend.tick(token);
            }
        }
    }

    fn handle_tick(&mut self, token: TickToken) {
        if self.autosend.flush(token).is_none() {
            return;
        }

        // Connections may have unregistered while being flushed
        self.drain_queued();
        self.autosend.finish_tick();
    }

    /// Apply the commands already queued when called, and no more.
    ///
    /// Commands sent while draining wait for the next `recv`.
    fn drain_queued(&mut self) -> usize {
        let queued = self.rx.len();
        let mut applied = 0;
        while applied < queued {
            match self.rx.try_recv() {
                Ok(command) => self.apply(command),
                Err(_) => break,
            }
            applied += 1;
        }
        applied
    }
}

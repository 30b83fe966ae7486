//! Autosend tick loop: arms a timer while connections are registered and
//! flushes each of them once per tick.

use std::time::Duration;
use tracing::{debug, trace, warn};

use crate::autosend::{AutosendRegistry, ProtocolRef};
use crate::metrics::METRICS;

/// Identifies one scheduled tick. Only the most recently armed token is
/// honoured when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TickToken(u64);

impl TickToken {
    #[inline]
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Fire-once delayed delivery of a tick back to the dispatch task.
pub trait Scheduler {
    /// Arrange for `Autosend::tick(token)` to run on the dispatch task after
    /// `delay`.
    fn schedule_after(&self, delay: Duration, token: TickToken);
}

/// Whether a tick is currently scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// No tick pending; the next registration arms the loop.
    Idle,
    /// Exactly one tick with this token is pending.
    Armed(TickToken),
}

/// Outcome of one flush pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// Connections offered a flush.
    pub visited: usize,
    /// Messages handed to a send path.
    pub flushed: usize,
    /// Sends that reported an error.
    pub failed: usize,
    /// Bytes handed to send paths.
    pub bytes: usize,
}

/// Autosend registry and its self-rearming tick.
///
/// Owned by a single dispatch task; every method takes `&mut self`.
pub struct Autosend<S> {
    registry: AutosendRegistry,
    state: LoopState,
    next_token: u64,
    delay: Duration,
    scheduler: S,
}

impl<S: Scheduler> Autosend<S> {
    pub fn new(scheduler: S, delay: Duration) -> Self {
        Self {
            registry: AutosendRegistry::new(),
            state: LoopState::Idle,
            next_token: 0,
            delay,
            scheduler,
        }
    }

    /// Register a connection with pending output.
    ///
    /// Arms the loop if it is idle. Returns `false` if the connection was
    /// already registered.
    pub fn add(&mut self, protocol: ProtocolRef) -> bool {
        if !self.registry.insert(protocol) {
            return false;
        }
        if self.state == LoopState::Idle {
            self.arm();
        }
        true
    }

    /// Unregister a connection. Returns `false` if it was not registered.
    ///
    /// A tick that is already scheduled still fires; it finds fewer
    /// connections and goes idle if none are left.
    pub fn remove(&mut self, protocol: &ProtocolRef) -> bool {
        self.registry.remove(protocol)
    }

    /// Run a full tick: flush, then re-arm if anyone is still registered.
    ///
    /// Returns `None` for a stale token.
    pub fn tick(&mut self, token: TickToken) -> Option<TickReport> {
        let report = self.flush(token)?;
        self.finish_tick();
        Some(report)
    }

    /// First half of a tick: offer every registered connection a flush.
    ///
    /// Leaves the loop idle. The caller may apply queued registrations
    /// before calling [`finish_tick`](Self::finish_tick).
    pub fn flush(&mut self, token: TickToken) -> Option<TickReport> {
        if self.state != LoopState::Armed(token) {
            debug!("Ignoring stale autosend tick {}", token.id());
            METRICS.inc(&METRICS.autosend_stale_ticks);
            return None;
        }
        self.state = LoopState::Idle;

        let mut report = TickReport::default();
        for protocol in self.registry.snapshot() {
            report.visited += 1;

            let Some(message) = protocol.take_current_buffer() else {
                continue;
            };
            let bytes = message.len();

            match protocol.send(message) {
                Ok(()) => {
                    report.flushed += 1;
                    report.bytes += bytes;
                }
                Err(e) => {
                    warn!("Autosend flush failed: {}", e);
                    report.failed += 1;
                }
            }
        }

        METRICS.inc(&METRICS.autosend_ticks);
        METRICS.add(&METRICS.messages_flushed, report.flushed as u64);
        METRICS.add(&METRICS.bytes_flushed, report.bytes as u64);
        METRICS.add(&METRICS.send_failures, report.failed as u64);
        trace!(
            "Autosend tick {}: visited={} flushed={} failed={}",
            token.id(),
            report.visited,
            report.flushed,
            report.failed
        );

        Some(report)
    }

    /// Second half of a tick: re-arm if the loop is idle and anyone is
    /// still registered. Returns `true` if a new tick was scheduled.
    pub fn finish_tick(&mut self) -> bool {
        if self.state == LoopState::Idle && !self.registry.is_empty() {
            self.arm();
            return true;
        }
        if self.registry.is_empty() {
            debug!("Autosend registry empty, loop idle");
        }
        false
    }

    fn arm(&mut self) {
        self.next_token += 1;
        let token = TickToken(self.next_token);
        self.state = LoopState::Armed(token);
        self.scheduler.schedule_after(self.delay, token);
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.state, LoopState::Armed(_))
    }

    pub fn contains(&self, protocol: &ProtocolRef) -> bool {
        self.registry.contains(protocol)
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

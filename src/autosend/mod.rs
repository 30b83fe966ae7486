//! Batched per-connection flushing.
//!
//! Connections with buffered output register here; a self-rearming tick on
//! the dispatch task hands every registered connection's current message to
//! its send path, then goes idle once nobody is left.

mod manager;
mod registry;
mod scheduler;

pub use manager::{AutosendCommand, AutosendHandle, AutosendManager, TokioScheduler};
pub use registry::AutosendRegistry;
pub use scheduler::{Autosend, LoopState, Scheduler, TickReport, TickToken};

use std::sync::Arc;

use crate::error::Result;
use crate::pool::OutputMessage;

/// Protocol-layer endpoint of one connection, as seen by autosend.
pub trait Protocol: Send + Sync {
    /// Take the message buffered since the last flush, leaving the slot empty.
    fn take_current_buffer(&self) -> Option<OutputMessage>;

    /// Hand a message to the transport.
    ///
    /// Errors are logged by the caller and never stop a tick.
    fn send(&self, message: OutputMessage) -> Result<()>;
}

/// Shared handle to a registered connection.
pub type ProtocolRef = Arc<dyn Protocol>;

#[cfg(test)]
pub(crate) mod testing {
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::{Protocol, ProtocolRef};
    use crate::error::{Error, Result};
    use crate::pool::{create_output_message, OutputMessage};

    /// In-memory protocol recording what autosend did with it.
    #[derive(Default)]
    pub struct RecordingProtocol {
        pending: Mutex<Option<OutputMessage>>,
        sent: Mutex<Vec<Vec<u8>>>,
        offered: AtomicUsize,
        failing: bool,
    }

    impl RecordingProtocol {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn failing() -> Arc<Self> {
            Arc::new(Self {
                failing: true,
                ..Self::default()
            })
        }

        pub fn with_pending(payload: &[u8]) -> Arc<Self> {
            let protocol = Self::new();
            protocol.buffer(payload);
            protocol
        }

        /// Append to the current message, starting one if needed.
        pub fn buffer(&self, payload: &[u8]) {
            let mut pending = self.pending.lock();
            let msg = pending.get_or_insert_with(|| create_output_message().unwrap());
            msg.add_bytes(payload).unwrap();
        }

        pub fn has_pending(&self) -> bool {
            self.pending.lock().is_some()
        }

        pub fn sent(&self) -> Vec<Vec<u8>> {
            self.sent.lock().clone()
        }

        /// Times autosend asked for the current buffer.
        pub fn offered(&self) -> usize {
            self.offered.load(Ordering::SeqCst)
        }
    }

    impl Protocol for RecordingProtocol {
        fn take_current_buffer(&self) -> Option<OutputMessage> {
            self.offered.fetch_add(1, Ordering::SeqCst);
            self.pending.lock().take()
        }

        fn send(&self, message: OutputMessage) -> Result<()> {
            if self.failing {
                return Err(Error::ConnectionClosed);
            }
            self.sent.lock().push(message.as_bytes().to_vec());
            Ok(())
        }
    }

    pub fn protocol_ref(protocol: &Arc<RecordingProtocol>) -> ProtocolRef {
        protocol.clone()
    }
}

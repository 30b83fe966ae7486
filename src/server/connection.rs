use bytes::BytesMut;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::debug;

use crate::autosend::{AutosendHandle, Protocol};
use crate::error::{Error, Result};
use crate::pool::{create_output_message, OutputMessage};

/// Buffer size for reading from the socket
const READ_BUFFER_SIZE: usize = 8192;

/// Write buffer size
const WRITE_BUFFER_SIZE: usize = 8192;

struct OutputSlot {
    /// Filled messages waiting for the next tick, oldest first.
    ready: VecDeque<OutputMessage>,
    current: Option<OutputMessage>,
    registered: bool,
    /// A tick took a message and has not sent it yet.
    in_flight: bool,
    closing: bool,
}

impl OutputSlot {
    fn has_pending(&self) -> bool {
        self.current.is_some() || !self.ready.is_empty()
    }
}

/// Output side of one client connection.
///
/// Writes accumulate in the current message until an autosend tick takes
/// it. Only the tick path hands messages to the socket writer task, so
/// bytes leave in the order they were written.
pub struct ClientProtocol {
    slot: Mutex<OutputSlot>,
    outbound: mpsc::UnboundedSender<OutputMessage>,
    autosend: AutosendHandle,
    me: Weak<ClientProtocol>,
}

impl ClientProtocol {
    pub fn new(
        outbound: mpsc::UnboundedSender<OutputMessage>,
        autosend: AutosendHandle,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            slot: Mutex::new(OutputSlot {
                ready: VecDeque::new(),
                current: None,
                registered: false,
                in_flight: false,
                closing: false,
            }),
            outbound,
            autosend,
            me: me.clone(),
        })
    }

    /// Buffer bytes for the next autosend tick.
    ///
    /// A message that fills up is queued behind earlier ones and a new one
    /// started.
    pub fn write(&self, mut data: &[u8]) -> Result<()> {
        let mut slot = self.slot.lock();
        if slot.closing {
            return Err(Error::ConnectionClosed);
        }

        while !data.is_empty() {
            let mut msg = match slot.current.take() {
                Some(msg) => msg,
                None => create_output_message()?,
            };

            let n = data.len().min(msg.remaining());
            msg.add_bytes(&data[..n])?;
            data = &data[n..];

            if msg.remaining() == 0 {
                slot.ready.push_back(msg);
            } else {
                slot.current = Some(msg);
            }
        }

        if slot.has_pending() && !slot.registered {
            if let Some(me) = self.me.upgrade() {
                self.autosend.add_protocol(me)?;
                slot.registered = true;
            }
        }
        Ok(())
    }

    /// Send whatever is buffered and leave autosend.
    ///
    /// If a tick is between taking and sending a message, the rest goes out
    /// right after that send.
    pub fn close(&self) -> Result<()> {
        let mut slot = self.slot.lock();
        slot.closing = true;

        if !slot.in_flight {
            self.flush_locked(&mut slot);
        }
        if slot.registered {
            slot.registered = false;
            if let Some(me) = self.me.upgrade() {
                self.autosend.remove_protocol(me)?;
            }
        }
        Ok(())
    }

    /// Check if the connection is waiting for autosend.
    pub fn is_registered(&self) -> bool {
        self.slot.lock().registered
    }

    fn flush_locked(&self, slot: &mut OutputSlot) {
        let pending = slot.ready.drain(..).chain(slot.current.take());
        for msg in pending {
            // The writer may already be gone; nothing left to deliver to
            let _ = self.outbound.send(msg);
        }
    }
}

impl Protocol for ClientProtocol {
    fn take_current_buffer(&self) -> Option<OutputMessage> {
        let mut slot = self.slot.lock();

        // Idle for a whole tick: drop out until the next write
        if !slot.has_pending() {
            if slot.registered {
                slot.registered = false;
                if let Some(me) = self.me.upgrade() {
                    if let Err(e) = self.autosend.remove_protocol(me) {
                        debug!("Failed to leave autosend: {}", e);
                    }
                }
            }
            return None;
        }

        // Full messages predate the current one
        while let Some(msg) = slot.ready.pop_front() {
            let _ = self.outbound.send(msg);
        }

        let msg = slot.current.take();
        slot.in_flight = msg.is_some();
        msg
    }

    fn send(&self, message: OutputMessage) -> Result<()> {
        let mut slot = self.slot.lock();
        slot.in_flight = false;

        let result = self
            .outbound
            .send(message)
            .map_err(|_| Error::ConnectionClosed);

        if slot.closing {
            self.flush_locked(&mut slot);
        }
        result
    }
}

/// Per-connection handler: echoes everything it reads through autosend.
pub struct Connection {
    reader: OwnedReadHalf,
    read_buffer: BytesMut,
    protocol: Arc<ClientProtocol>,
}

impl Connection {
    /// Wrap a TcpStream and start its writer task.
    pub fn new(stream: TcpStream, addr: SocketAddr, autosend: AutosendHandle) -> Self {
        // Disable Nagle's algorithm; batching happens in autosend
        let _ = stream.set_nodelay(true);
        let (reader, writer) = stream.into_split();

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            if let Err(e) = write_loop(writer, rx).await {
                debug!("Writer for {} stopped: {}", addr, e);
            }
        });

        Self {
            reader,
            read_buffer: BytesMut::with_capacity(READ_BUFFER_SIZE),
            protocol: ClientProtocol::new(tx, autosend),
        }
    }

    pub fn protocol(&self) -> &Arc<ClientProtocol> {
        &self.protocol
    }

    /// Read until the peer closes, buffering every chunk for output.
    pub async fn run(&mut self) -> Result<()> {
        let result = self.read_loop().await;
        self.protocol.close()?;
        result
    }

    async fn read_loop(&mut self) -> Result<()> {
        loop {
            self.read_buffer.clear();
            let bytes_read = self.reader.read_buf(&mut self.read_buffer).await?;
            if bytes_read == 0 {
                return Ok(());
            }
            self.protocol.write(&self.read_buffer)?;
        }
    }
}

/// Drain sent messages onto the socket, one flush per batch.
///
/// Messages are dropped after writing, which returns them to the pool.
async fn write_loop(
    writer: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<OutputMessage>,
) -> io::Result<()> {
    let mut writer = BufWriter::with_capacity(WRITE_BUFFER_SIZE, writer);

    while let Some(msg) = rx.recv().await {
        writer.write_all(msg.as_bytes()).await?;
        drop(msg);

        while let Ok(msg) = rx.try_recv() {
            writer.write_all(msg.as_bytes()).await?;
        }
        writer.flush().await?;
    }

    writer.shutdown().await
}

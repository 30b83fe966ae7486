//! Pooled output messages.
//!
//! Every `OutputMessage` is built through [`create_output_message`] and its
//! buffer goes back to the process-wide free list when the handle is dropped.
//! Buffers are reset on release, so a new message is always empty.

use bytes::BufMut;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::OnceLock;

use crate::error::{Error, Result};
use crate::pool::{FreeList, Recycle, DEFAULT_FREE_LIST_CAPACITY};

/// Total bytes a message can hold, headers included.
pub const MESSAGE_CAPACITY: usize = 24590;

/// Bytes kept free in front of the body for prepended headers.
pub const HEADER_RESERVE: usize = 8;

/// Global free list of message buffers.
static MESSAGE_POOL: OnceLock<FreeList<MessageBuffer>> = OnceLock::new();

/// Install the global message free list with `capacity` retained buffers.
///
/// Returns `false` if the list was already initialized (by an earlier call
/// or by the first message allocation), in which case nothing changes.
pub fn init_message_pool(capacity: usize) -> bool {
    let mut installed = false;
    MESSAGE_POOL.get_or_init(|| {
        installed = true;
        FreeList::new(capacity)
    });
    installed
}

/// Get the global message free list.
pub fn message_pool() -> &'static FreeList<MessageBuffer> {
    MESSAGE_POOL.get_or_init(|| FreeList::new(DEFAULT_FREE_LIST_CAPACITY))
}

/// Create an empty output message backed by the global free list.
pub fn create_output_message() -> Result<OutputMessage> {
    let buffer = message_pool().acquire_with(MessageBuffer::try_new)?;
    Ok(OutputMessage { buffer })
}

/// Fixed-capacity byte buffer with a reserved header area.
///
/// Layout: `[unused | headers | body]`, where the body starts at
/// `HEADER_RESERVE` and headers grow backwards from it.
pub struct MessageBuffer {
    buf: Vec<u8>,
    /// Offset of the first header byte.
    start: usize,
}

impl MessageBuffer {
    /// Allocate a buffer of `MESSAGE_CAPACITY` bytes.
    fn try_new() -> Result<Self> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(MESSAGE_CAPACITY)
            .map_err(|_| Error::AllocationFailed {
                requested: MESSAGE_CAPACITY,
            })?;
        buf.resize(HEADER_RESERVE, 0);

        Ok(Self {
            buf,
            start: HEADER_RESERVE,
        })
    }

    /// Zero-capacity stand-in left behind when a handle gives up its buffer.
    fn placeholder() -> Self {
        Self {
            buf: Vec::new(),
            start: 0,
        }
    }

    /// Bytes to put on the wire: headers followed by the body.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[self.start..]
    }

    /// Body bytes only.
    #[inline]
    pub fn body(&self) -> &[u8] {
        &self.buf[HEADER_RESERVE..]
    }

    /// Length of headers plus body.
    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len() - self.start
    }

    /// Check if nothing was written.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Body bytes that can still be added.
    #[inline]
    pub fn remaining(&self) -> usize {
        MESSAGE_CAPACITY.saturating_sub(self.buf.len())
    }

    #[inline]
    fn ensure(&self, requested: usize) -> Result<()> {
        let available = self.remaining();
        if requested > available {
            return Err(Error::MessageFull {
                requested,
                available,
            });
        }
        Ok(())
    }

    pub fn add_u8(&mut self, value: u8) -> Result<()> {
        self.ensure(1)?;
        self.buf.put_u8(value);
        Ok(())
    }

    pub fn add_u16(&mut self, value: u16) -> Result<()> {
        self.ensure(2)?;
        self.buf.put_u16_le(value);
        Ok(())
    }

    pub fn add_u32(&mut self, value: u32) -> Result<()> {
        self.ensure(4)?;
        self.buf.put_u32_le(value);
        Ok(())
    }

    pub fn add_u64(&mut self, value: u64) -> Result<()> {
        self.ensure(8)?;
        self.buf.put_u64_le(value);
        Ok(())
    }

    pub fn add_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.ensure(bytes.len())?;
        self.buf.put_slice(bytes);
        Ok(())
    }

    /// Add a string prefixed with its u16 length.
    pub fn add_string(&mut self, value: &str) -> Result<()> {
        let len = u16::try_from(value.len()).map_err(|_| Error::MessageFull {
            requested: value.len() + 2,
            available: self.remaining(),
        })?;
        self.ensure(value.len() + 2)?;
        self.buf.put_u16_le(len);
        self.buf.put_slice(value.as_bytes());
        Ok(())
    }

    /// Copy the body of another message onto the end of this one.
    pub fn append(&mut self, other: &MessageBuffer) -> Result<()> {
        self.add_bytes(other.body())
    }

    /// Prepend the current length as a u16 header.
    pub fn write_message_length(&mut self) -> Result<()> {
        // len() is bounded by MESSAGE_CAPACITY, which fits in a u16
        let len = self.len() as u16;
        self.prepend(&len.to_le_bytes())
    }

    /// Prepend a 4-byte header, e.g. a checksum or sequence number.
    pub fn add_header_u32(&mut self, value: u32) -> Result<()> {
        self.prepend(&value.to_le_bytes())
    }

    fn prepend(&mut self, header: &[u8]) -> Result<()> {
        if header.len() > self.start {
            return Err(Error::MessageFull {
                requested: header.len(),
                available: self.start,
            });
        }
        let start = self.start - header.len();
        self.buf[start..self.start].copy_from_slice(header);
        self.start = start;
        Ok(())
    }
}

impl Recycle for MessageBuffer {
    fn recycle(&mut self) {
        self.buf.truncate(HEADER_RESERVE);
        self.buf.resize(HEADER_RESERVE, 0);
        self.start = HEADER_RESERVE;
    }
}

impl fmt::Debug for MessageBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageBuffer")
            .field("len", &self.len())
            .field("headers", &(HEADER_RESERVE.saturating_sub(self.start)))
            .finish()
    }
}

/// Owning handle to a pooled message buffer.
///
/// Ownership moves from the producing connection to the send path by value.
/// Dropping the handle returns the buffer to the global free list.
pub struct OutputMessage {
    buffer: MessageBuffer,
}

impl Deref for OutputMessage {
    type Target = MessageBuffer;

    fn deref(&self) -> &Self::Target {
        &self.buffer
    }
}

impl DerefMut for OutputMessage {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buffer
    }
}

impl fmt::Debug for OutputMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OutputMessage").field(&self.buffer).finish()
    }
}

impl Drop for OutputMessage {
    fn drop(&mut self) {
        let buffer = std::mem::replace(&mut self.buffer, MessageBuffer::placeholder());
        message_pool().release(buffer);
    }
}

//! Memory pooling for output messages.
//!
//! A lock-free bounded free list recycles message buffers so that hot
//! connections do not allocate per message.

mod free_list;
mod message;

pub use free_list::{FreeList, PoolStats, Recycle};
pub use message::{
    create_output_message, init_message_pool, message_pool, MessageBuffer, OutputMessage,
    HEADER_RESERVE, MESSAGE_CAPACITY,
};

/// Default number of idle buffers the message free list retains.
pub const DEFAULT_FREE_LIST_CAPACITY: usize = 2048;

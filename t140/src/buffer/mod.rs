//! Blocking buffers between the application and the transport threads

pub mod fifo;
pub mod sync_buffer;

pub use fifo::FifoBuffer;
pub use sync_buffer::{DEFAULT_BUFFER_TIME, TextSyncBuffer};

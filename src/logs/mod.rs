//! Captured process output.
//!
//! - [`LogStore`] per-process bounded buffers + `LogAppended` events
//! - [`RingBuffer`] the fixed-capacity FIFO behind each buffer

mod ring;
mod store;

pub use ring::RingBuffer;
pub use store::{DEFAULT_LOG_CAPACITY, LogStore};

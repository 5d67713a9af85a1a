mod ring_buffer;
mod window;

pub use self::ring_buffer::RingBuffer;
pub use self::window::{Window, WindowEntry};

/// Error returned when enqueuing into a full buffer.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Full;

/// Error returned when dequeuing from an empty buffer.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Empty;

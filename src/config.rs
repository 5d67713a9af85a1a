//! Compile-time capacity constants and the runtime-tunable [`Config`].
//!
//! Buffer sizes throughout the crate are fixed at compile time (no heap),
//! the way `smoltcp`-derived stacks size their `heapless` storage from a
//! handful of `const`s gathered in one place.

use crate::time::Duration;

/// Size of the fixed frame header, in octets.
pub const HEADER_LEN: usize = 8;

/// Largest frame the radio can carry (header + payload), in octets.
pub const MAX_FRAME: usize = 255;

/// Largest payload a single frame can carry.
pub const MAX_PAYLOAD: usize = MAX_FRAME - HEADER_LEN;

/// Largest `ackWindow`/send-window size representable in the 4-bit header field.
pub const MAX_WINDOW: usize = 15;

/// Per-connection send byte buffer capacity (`MAX_WINDOW * MAX_PAYLOAD`).
///
/// Sized for the largest window a connection could ever be configured with,
/// so `Connection` has no generic parameter over the configured window.
pub const TX_BUFFER_CAP: usize = MAX_WINDOW * MAX_PAYLOAD;

/// Per-connection receive byte buffer capacity.
///
/// The source sizes this as a single `MAX_PAYLOAD`-sized staging area
/// (`LRTP_RX_PACKET_BUFFER_SZ` was `1`). We size it to the full window
/// instead: a receiver that can't keep up with the application simply
/// stops acknowledging new in-order frames once the buffer is full,
/// which forces the sender to retransmit rather than silently losing
/// bytes the single-frame staging buffer had no room for.
pub const RX_BUFFER_CAP: usize = MAX_WINDOW * MAX_PAYLOAD;

/// Maximum number of simultaneously active connections the host will track.
pub const MAX_CONNECTIONS: usize = 16;

/// Runtime-tunable protocol parameters.
///
/// Defaults: `window = 4`, `packet_timeout = 7.5s`, `piggyback_timeout =
/// packet_timeout / 6`, `cad_rounds = 3`, `signal_timeout = 250ms`
/// sampled up to `signal_timeout_rounds` times.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// This host's 16-bit node address.
    pub local_addr: u16,
    /// Local send window size `W`, advertised as `ackWindow`.
    pub window: u8,
    /// Deadline after which an unacknowledged window (or handshake packet) is resent.
    pub packet_timeout: Duration,
    /// Deadline after which a pending ACK with no outbound data rides alone.
    pub piggyback_timeout: Duration,
    /// Consecutive clear CAD rounds required before a transmission.
    pub cad_rounds: u8,
    /// How long the arbiter waits for an `onReceive` completion once a signal is seen.
    pub signal_timeout: Duration,
    /// How many times the signal detector is sampled during the receive-timeout guard.
    pub signal_timeout_rounds: u8,
    /// Retries of a window (or handshake step) before the connection is forced closed.
    pub retry_limit: u32,
}

impl Config {
    /// Construct a `Config` for `local_addr` with every other field at its default.
    pub fn new(local_addr: u16) -> Config {
        let packet_timeout = Duration::from_millis(7_500);
        Config {
            local_addr,
            window: 4,
            packet_timeout,
            piggyback_timeout: packet_timeout / 6,
            cad_rounds: 3,
            signal_timeout: Duration::from_millis(250),
            signal_timeout_rounds: 3,
            retry_limit: 8,
        }
    }
}

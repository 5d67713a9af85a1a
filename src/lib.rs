/*! LRTP — a lightweight reliable transport protocol for half-duplex packet radios.

The crate is organized bottom-up, the way the protocol itself is layered:

- [`wire`] — the 8-byte fixed-header frame codec.
- [`storage`] — bounded, allocation-free buffers the connection engine is
  built from.
- [`seq`] / [`time`] — sequence-number and timer primitives shared by
  every layer above them.
- [`connection`] — the per-peer state machine: handshake, Go-Back-N
  window, piggybacked ACKs, teardown.
- [`arbiter`] — the single process-wide radio state machine (listen,
  CAD, transmit).
- [`radio`] — the contract the core expects from the actual radio driver.
- [`host`] — the multiplexer applications talk to.
*/

pub mod arbiter;
pub mod config;
pub mod connection;
pub mod host;
pub mod radio;
pub mod seq;
pub mod storage;
pub mod time;
pub mod wire;

pub use config::Config;
pub use connection::Connection;
pub use host::Host;
pub use wire::Address;

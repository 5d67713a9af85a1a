//! The radio-driver contract: what the core consumes from, and never
//! assumes about, the actual packet radio.
//!
//! The device is asynchronous and half-duplex: instead of a blocking
//! call surface, [`Radio`] exposes a command surface plus a completion
//! stream ([`Radio::poll_event`]) that [`crate::host::Host::poll`]
//! drains and forwards into [`crate::arbiter::RadioArbiter`].
//!
//! Driving the radio through events rather than callbacks means the
//! radio never needs a handle back into the `Host` that owns it —
//! nothing calls back, the owner just polls.

pub mod sim;

/// A completion reported by the radio since it was last polled.
///
/// Stands in for driver callbacks (`onReceive`/`onTxDone`/`onCadDone`)
/// that would run from interrupt/driver context and only deposit flags
/// or bytes on real hardware. Here that context is modeled as "whatever
/// drains `poll_event` and forwards it into the matching `Host::on_*`
/// method" — on real hardware, an actual interrupt handler; in [`sim`],
/// the test harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioEvent {
    /// A frame of `len` bytes has been fully received and is available via
    /// [`Radio::available`]/[`Radio::read`].
    Received { len: usize },
    /// The in-progress transmission has completed.
    TxDone,
    /// A channel activity detection round has completed; `busy` reports
    /// whether activity was seen.
    CadDone { busy: bool },
}

/// What the core needs from the underlying packet radio.
///
/// Implementations own the actual modulation/framing/CAD hardware (or a
/// simulation of it, see [`sim`]); none of that is this crate's concern.
pub trait Radio {
    /// Begin transmitting `bytes`. Completion is reported as
    /// [`RadioEvent::TxDone`] from [`Radio::poll_event`].
    fn send(&mut self, bytes: &[u8]);

    /// Arm continuous listen. Received frames are reported as
    /// [`RadioEvent::Received`].
    fn receive(&mut self);

    /// Start a single-shot channel activity detection. Completion is
    /// reported as [`RadioEvent::CadDone`].
    fn channel_activity_detection(&mut self);

    /// Instantaneous query: is a signal present right now (including a
    /// reception already in progress)? Used by the arbiter to avoid
    /// pre-empting an in-progress reception when a transmit is requested.
    fn rx_signal_detected(&self) -> bool;

    /// Bytes left to read from the most recently completed reception.
    fn available(&self) -> usize;

    /// Read one byte from the most recently completed reception.
    ///
    /// # Panics
    /// Panics if called with nothing `available()`. Callers (the host's
    /// receive drain) always check first.
    fn read(&mut self) -> u8;

    /// Poll once for the next pending completion event, if any.
    fn poll_event(&mut self) -> Option<RadioEvent>;
}

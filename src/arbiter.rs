//! The radio arbiter: the single, process-wide state machine that
//! sequences the half-duplex radio between listening, receiving,
//! listen-before-talk, and transmitting.
//!
//! Exactly one [`RadioArbiter`] exists per [`crate::host::Host`]; no
//! connection ever drives the radio directly. [`crate::host::Host::poll`]
//! is the only caller.

use crate::config::Config;
use crate::radio::Radio;
use crate::time::{Instant, Timer};

/// The arbiter's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Radio listening, nothing in progress.
    IdleReceive,
    /// A signal was observed; letting an in-progress reception complete.
    Receive,
    /// Performing listen-before-talk.
    CadStarted,
    /// All required CAD rounds came back clear.
    CadFinished,
    /// A frame is being sent.
    Transmit,
}

/// The radio arbiter.
pub struct RadioArbiter {
    state: State,
    cad_rounds_remaining: u8,
    signal_timeout_rounds_remaining: u8,
    signal_timeout: crate::time::Duration,
    receive_timeout: Timer,
}

impl RadioArbiter {
    pub fn new() -> RadioArbiter {
        RadioArbiter {
            state: State::IdleReceive,
            cad_rounds_remaining: 0,
            signal_timeout_rounds_remaining: 0,
            signal_timeout: crate::time::Duration::from_millis(0),
            receive_timeout: Timer::new(),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Called once at startup, after installing radio callbacks.
    pub fn begin<R: Radio>(&mut self, radio: &mut R) {
        radio.receive();
        self.state = State::IdleReceive;
    }

    /// Try to start listen-before-talk ahead of a transmission.
    ///
    /// Only succeeds from [`State::IdleReceive`]. If the radio already
    /// sees a signal, defers to [`State::Receive`] instead of pre-empting
    /// the in-progress reception.
    pub fn begin_cad<R: Radio>(&mut self, radio: &mut R, config: &Config, now: Instant) -> bool {
        if self.state != State::IdleReceive {
            return false;
        }
        if radio.rx_signal_detected() {
            self.enter_receive(radio, config, now);
            return false;
        }
        self.cad_rounds_remaining = config.cad_rounds;
        self.state = State::CadStarted;
        radio.channel_activity_detection();
        true
    }

    /// The remembered pending transmitter's frame is ready; move to
    /// `Transmit`. Only valid from [`State::CadFinished`].
    pub fn begin_transmit<R: Radio>(&mut self, radio: &mut R, bytes: &[u8]) -> bool {
        if self.state != State::CadFinished {
            return false;
        }
        self.state = State::Transmit;
        radio.send(bytes);
        true
    }

    /// Forward a [`crate::radio::RadioEvent::CadDone`] completion.
    pub fn on_cad_done<R: Radio>(&mut self, radio: &mut R, config: &Config, now: Instant, busy: bool) {
        if self.state != State::CadStarted {
            return;
        }
        if busy {
            log::trace!("cad reported busy, deferring to RECEIVE");
            self.enter_receive(radio, config, now);
            return;
        }
        self.cad_rounds_remaining = self.cad_rounds_remaining.saturating_sub(1);
        if self.cad_rounds_remaining == 0 {
            self.state = State::CadFinished;
        } else {
            radio.channel_activity_detection();
        }
    }

    /// Forward a [`crate::radio::RadioEvent::TxDone`] completion.
    pub fn on_tx_done<R: Radio>(&mut self, radio: &mut R) {
        if self.state != State::Transmit {
            return;
        }
        self.state = State::IdleReceive;
        radio.receive();
    }

    /// Forward a [`crate::radio::RadioEvent::Received`] completion. A
    /// frame finished arriving; return to idle regardless of which state
    /// we were in (`Receive`, or `IdleReceive` if the radio delivered a
    /// frame without us ever having noticed a signal mid-flight).
    pub fn on_receive_done<R: Radio>(&mut self, radio: &mut R) {
        self.receive_timeout.cancel();
        self.state = State::IdleReceive;
        radio.receive();
    }

    /// Sample the receive-timeout guard. Call once per tick.
    pub fn poll_receive_timeout<R: Radio>(&mut self, radio: &mut R, now: Instant) {
        if self.state != State::Receive {
            return;
        }
        if !self.receive_timeout.has_expired(now) {
            return;
        }
        if radio.rx_signal_detected() {
            // A signal is still present, so a reception is plausibly just
            // slow to complete; keep waiting without spending a round.
            self.receive_timeout.start(now, self.signal_timeout);
            return;
        }
        self.signal_timeout_rounds_remaining = self.signal_timeout_rounds_remaining.saturating_sub(1);
        if self.signal_timeout_rounds_remaining == 0 {
            // Budget exhausted: assume the frame is lost/corrupted and
            // stop waiting, rather than risk wedging the radio forever.
            log::debug!("receive timeout exhausted, falling back to IDLE_RECEIVE");
            self.receive_timeout.cancel();
            self.state = State::IdleReceive;
            radio.receive();
        } else {
            self.receive_timeout.start(now, self.signal_timeout);
        }
    }

    fn enter_receive<R: Radio>(&mut self, radio: &mut R, config: &Config, now: Instant) {
        self.state = State::Receive;
        self.signal_timeout_rounds_remaining = config.signal_timeout_rounds;
        self.signal_timeout = config.signal_timeout;
        self.receive_timeout.start(now, config.signal_timeout);
        radio.receive();
    }
}

impl Default for RadioArbiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::sim::SimRadio;

    #[test]
    fn clean_cad_round_trip_reaches_transmit_and_back_to_idle() {
        let config = Config::new(1);
        let (mut radio, _peer) = SimRadio::pair();
        let mut arbiter = RadioArbiter::new();
        arbiter.begin(&mut radio);
        assert_eq!(arbiter.state(), State::IdleReceive);

        assert!(arbiter.begin_cad(&mut radio, &config, Instant::ZERO));
        assert_eq!(arbiter.state(), State::CadStarted);

        for _ in 0..config.cad_rounds {
            radio.channel_activity_detection();
            match radio.poll_event() {
                Some(crate::radio::RadioEvent::CadDone { busy }) => {
                    arbiter.on_cad_done(&mut radio, &config, Instant::ZERO, busy);
                }
                _ => panic!("expected CadDone"),
            }
        }
        assert_eq!(arbiter.state(), State::CadFinished);

        assert!(arbiter.begin_transmit(&mut radio, b"frame"));
        assert_eq!(arbiter.state(), State::Transmit);
        assert_eq!(radio.poll_event(), Some(crate::radio::RadioEvent::TxDone));
        arbiter.on_tx_done(&mut radio);
        assert_eq!(arbiter.state(), State::IdleReceive);
    }

    #[test]
    fn busy_cad_defers_to_receive() {
        let config = Config::new(1);
        let (mut radio, _peer) = SimRadio::pair();
        let mut arbiter = RadioArbiter::new();
        arbiter.begin(&mut radio);

        arbiter.begin_cad(&mut radio, &config, Instant::ZERO);
        radio.set_channel_busy(true);
        radio.channel_activity_detection();
        let busy = matches!(
            radio.poll_event(),
            Some(crate::radio::RadioEvent::CadDone { busy: true })
        );
        assert!(busy);
        radio.clear_receive_armed();
        arbiter.on_cad_done(&mut radio, &config, Instant::ZERO, true);
        assert_eq!(arbiter.state(), State::Receive);
        assert!(radio.receive_armed(), "busy CAD must re-arm the radio's receive");
    }

    #[test]
    fn receive_timeout_falls_back_to_idle_after_budget_exhausted() {
        let config = Config::new(1);
        let (mut radio, _peer) = SimRadio::pair();
        let mut arbiter = RadioArbiter::new();
        arbiter.begin(&mut radio);
        arbiter.begin_cad(&mut radio, &config, Instant::ZERO);
        radio.set_channel_busy(true);
        radio.channel_activity_detection();
        radio.poll_event();
        arbiter.on_cad_done(&mut radio, &config, Instant::ZERO, true);
        assert_eq!(arbiter.state(), State::Receive);

        let mut now = Instant::ZERO;
        for _ in 0..config.signal_timeout_rounds {
            now = now + config.signal_timeout;
            arbiter.poll_receive_timeout(&mut radio, now);
        }
        assert_eq!(arbiter.state(), State::IdleReceive);
    }
}

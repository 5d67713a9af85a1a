//! The multiplexer: owns the connection table, drains inbound radio
//! events, dispatches frames, and round-robins outbound scheduling
//! across connections through the [`crate::arbiter::RadioArbiter`].
//!
//! [`Host`] is the only thing the application talks to; it is also the
//! only thing that ever calls into [`crate::arbiter::RadioArbiter`] or a
//! [`crate::radio::Radio`]. No [`Connection`] holds a reference back to
//! its `Host` — the host calls down, connections never call up.

use heapless::LinearMap;

use crate::arbiter::{RadioArbiter, State as ArbiterState};
use crate::config::{Config, MAX_CONNECTIONS, MAX_FRAME};
use crate::connection::Connection;
use crate::radio::{Radio, RadioEvent};
use crate::seq::SeqNum;
use crate::time::Instant;
use crate::wire::{self, Address, Frame, FrameRepr, HEADER_LEN};

/// The protocol core. One per node.
pub struct Host {
    local: Address,
    config: Config,
    arbiter: RadioArbiter,
    connections: LinearMap<Address, Connection, MAX_CONNECTIONS>,
    cursor: usize,
    pending_transmitter: Option<Address>,
    on_connect: Option<alloc_box::BoxedConnectCb>,
    on_broadcast: Option<alloc_box::BoxedBroadcastCb>,
}

/// Local alias module so the boxed-closure types below don't clutter the
/// field list above; `std` is already assumed elsewhere in the crate
/// (the `sim` radio, the `echo` demo example), so `Box` costs nothing new.
mod alloc_box {
    use super::Address;
    pub type BoxedConnectCb = Box<dyn FnMut(Address)>;
    pub type BoxedBroadcastCb = Box<dyn FnMut(Address, &[u8])>;
}

impl Host {
    /// Build a host for `local_addr` with default-tuned parameters.
    pub fn new(local_addr: u16) -> Host {
        Host::with_config(Config::new(local_addr))
    }

    pub fn with_config(config: Config) -> Host {
        Host {
            local: Address(config.local_addr),
            config,
            arbiter: RadioArbiter::new(),
            connections: LinearMap::new(),
            cursor: 0,
            pending_transmitter: None,
            on_connect: None,
            on_broadcast: None,
        }
    }

    pub fn local_addr(&self) -> Address {
        self.local
    }

    /// Install radio callbacks and arm continuous listen. Call once before
    /// the first [`Host::poll`].
    pub fn begin<R: Radio>(&mut self, radio: &mut R) {
        self.arbiter.begin(radio);
    }

    /// Register the callback fired when an unsolicited inbound SYN is admitted.
    pub fn on_connect<F: FnMut(Address) + 'static>(&mut self, f: F) {
        self.on_connect = Some(Box::new(f));
    }

    /// Register the callback fired for inbound frames addressed to the broadcast address.
    pub fn on_broadcast<F: FnMut(Address, &[u8]) + 'static>(&mut self, f: F) {
        self.on_broadcast = Some(Box::new(f));
    }

    /// Create a connection to `remote`, or return the existing one.
    ///
    /// `remote == Address::BROADCAST` is never a valid connection endpoint
    /// and is silently refused rather than allocating a connection that
    /// could never complete a handshake.
    pub fn connect(&mut self, remote: Address, now: Instant) -> Address {
        if !remote.is_broadcast() && !self.connections.contains_key(&remote) {
            let mut conn = Connection::new(self.local, remote, self.config.window);
            conn.initiate_connect(&self.config, now, SeqNum::new(rand::random()));
            // Capacity is bounded by MAX_CONNECTIONS; a failed insert here
            // silently drops the attempt rather than panicking, matching
            // the admission policy's "discard" default elsewhere.
            let _ = self.connections.insert(remote, conn);
        }
        remote
    }

    /// Borrow the connection for `remote`, if one exists.
    pub fn connection(&mut self, remote: Address) -> Option<&mut Connection> {
        self.connections.get_mut(&remote)
    }

    /// Advance the protocol by one cooperative tick. Must be called
    /// frequently: there are no suspension points, all progress happens
    /// here.
    pub fn poll<R: Radio>(&mut self, radio: &mut R, now: Instant) {
        self.reap_closed();
        self.drain_radio_events(radio, now);
        self.arbiter.poll_receive_timeout(radio, now);
        for (_, conn) in self.connections.iter_mut() {
            conn.poll_timers(&self.config, now);
        }
        self.schedule_outbound(radio, now);
    }

    fn drain_radio_events<R: Radio>(&mut self, radio: &mut R, now: Instant) {
        while let Some(event) = radio.poll_event() {
            match event {
                RadioEvent::Received { len } => {
                    let mut staging = [0u8; MAX_FRAME];
                    let n = len.min(MAX_FRAME);
                    for slot in staging.iter_mut().take(n) {
                        *slot = radio.read();
                    }
                    self.arbiter.on_receive_done(radio);
                    self.dispatch_inbound(&staging[..n], now);
                }
                RadioEvent::TxDone => {
                    self.arbiter.on_tx_done(radio);
                }
                RadioEvent::CadDone { busy } => {
                    self.arbiter.on_cad_done(radio, &self.config, now, busy);
                }
            }
        }
    }

    /// Inbound dispatch: decode, route by destination, admit new peers.
    fn dispatch_inbound(&mut self, bytes: &[u8], now: Instant) {
        let frame = match Frame::new_checked(bytes) {
            Ok(frame) => frame,
            Err(err) => {
                log::warn!("dropping malformed frame: {}", err);
                return;
            }
        };
        let repr = match FrameRepr::parse(&frame) {
            Ok(repr) => repr,
            Err(err) => {
                log::warn!("dropping malformed frame: {}", err);
                return;
            }
        };
        log::trace!("recv {}", repr);

        if repr.dest.is_broadcast() {
            if let Some(cb) = &mut self.on_broadcast {
                cb(repr.src, frame.payload());
            }
            return;
        }
        if repr.dest != self.local {
            return;
        }

        if let Some(conn) = self.connections.get_mut(&repr.src) {
            conn.on_receive(&repr, frame.payload(), &self.config, now);
            return;
        }

        let is_plain_syn = repr.flags.syn && !repr.flags.ack && !repr.flags.fin && frame.payload().is_empty();
        if !is_plain_syn {
            log::debug!("discarding frame from unknown source {}", repr.src);
            return;
        }
        if self.connections.len() >= MAX_CONNECTIONS {
            log::warn!("connection table full, refusing SYN from {}", repr.src);
            return;
        }
        let mut conn = Connection::new(self.local, repr.src, self.config.window);
        conn.accept_inbound_syn(&self.config, now, SeqNum::new(rand::random()), repr.seq_num);
        let _ = self.connections.insert(repr.src, conn);
        if let Some(cb) = &mut self.on_connect {
            cb(repr.src);
        }
    }

    /// Outbound scheduling: a persistent round-robin cursor picks the
    /// pending transmitter, the arbiter sequences CAD, and once clear the
    /// connection's next frame is encoded and handed to the radio.
    fn schedule_outbound<R: Radio>(&mut self, radio: &mut R, now: Instant) {
        match self.arbiter.state() {
            ArbiterState::IdleReceive => {
                if self.pending_transmitter.is_none() {
                    self.pending_transmitter = self.find_ready_connection();
                }
                if self.pending_transmitter.is_some() {
                    self.arbiter.begin_cad(radio, &self.config, now);
                }
            }
            ArbiterState::CadFinished => {
                if let Some(addr) = self.pending_transmitter.take() {
                    self.transmit_from(addr, radio, now);
                }
            }
            ArbiterState::Receive | ArbiterState::CadStarted | ArbiterState::Transmit => {}
        }
    }

    fn transmit_from<R: Radio>(&mut self, addr: Address, radio: &mut R, now: Instant) {
        let Some(conn) = self.connections.get_mut(&addr) else {
            return;
        };
        let Some(packet) = conn.get_next_tx_packet(&self.config, now) else {
            return;
        };
        log::trace!("send {}", packet.repr);
        let total = HEADER_LEN + packet.payload.len();
        let mut buf = [0u8; MAX_FRAME];
        {
            let mut frame = Frame::new_unchecked(&mut buf[..total]);
            packet.repr.emit(&mut frame);
            frame.payload_mut().copy_from_slice(&packet.payload);
        }
        self.arbiter.begin_transmit(radio, &buf[..total]);
    }

    /// Advance the round-robin cursor by one connection per call; the
    /// first ready connection found wins the slot.
    fn find_ready_connection(&mut self) -> Option<Address> {
        let mut keys: heapless::Vec<Address, MAX_CONNECTIONS> = heapless::Vec::new();
        for (addr, _) in self.connections.iter() {
            let _ = keys.push(*addr);
        }
        let n = keys.len();
        if n == 0 {
            return None;
        }
        self.cursor %= n;
        for step in 0..n {
            let idx = (self.cursor + step) % n;
            let addr = keys[idx];
            if let Some(conn) = self.connections.get_mut(&addr) {
                if conn.is_ready_for_transmit() {
                    self.cursor = (idx + 1) % n;
                    return Some(addr);
                }
            }
        }
        self.cursor = (self.cursor + 1) % n;
        None
    }

    /// Connections that lingered through `CLOSE_FIN_ACK` and reached
    /// `CLOSED` are retained for one full tick (so late duplicates and
    /// queued events can still be observed) before being dropped here.
    fn reap_closed(&mut self) {
        let mut dead: heapless::Vec<Address, MAX_CONNECTIONS> = heapless::Vec::new();
        for (addr, conn) in self.connections.iter() {
            if conn.is_closed() {
                let _ = dead.push(*addr);
            }
        }
        for addr in dead {
            self.connections.remove(&addr);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::sim::SimRadio;

    fn run_until<F: Fn(&mut Host, &mut Host) -> bool>(
        a: &mut Host,
        b: &mut Host,
        radio_a: &mut SimRadio,
        radio_b: &mut SimRadio,
        max_ticks: usize,
        done: F,
    ) {
        let mut now = Instant::ZERO;
        for _ in 0..max_ticks {
            now = now + crate::time::Duration::from_millis(10);
            a.poll(radio_a, now);
            b.poll(radio_b, now);
            while radio_a.deliver_next() {}
            while radio_b.deliver_next() {}
            if done(a, b) {
                return;
            }
        }
        panic!("did not converge within {} ticks", max_ticks);
    }

    #[test]
    fn handshake_and_data_exchange_over_sim_radio() {
        let (mut radio_a, mut radio_b) = SimRadio::pair();
        let mut a = Host::new(1);
        let mut b = Host::new(2);
        a.begin(&mut radio_a);
        b.begin(&mut radio_b);

        let now = Instant::ZERO;
        a.connect(Address(2), now);

        run_until(&mut a, &mut b, &mut radio_a, &mut radio_b, 200, |a, b| {
            matches!(
                a.connection(Address(2)).map(|c| c.state()),
                Some(crate::connection::State::Connected)
            ) && matches!(
                b.connection(Address(1)).map(|c| c.state()),
                Some(crate::connection::State::Connected)
            )
        });

        a.connection(Address(2)).unwrap().write(b"hello host");

        run_until(&mut a, &mut b, &mut radio_a, &mut radio_b, 200, |_, b| {
            b.connection(Address(1))
                .map(|c| c.available() >= b"hello host".len())
                .unwrap_or(false)
        });

        let conn = b.connection(Address(1)).unwrap();
        let mut out = [0u8; 10];
        conn.read(&mut out);
        assert_eq!(&out, b"hello host");
    }

    #[test]
    fn mid_window_frame_loss_triggers_go_back_n_retransmission() {
        fn fast_config(local_addr: u16) -> Config {
            let packet_timeout = crate::time::Duration::from_millis(150);
            Config {
                packet_timeout,
                piggyback_timeout: packet_timeout / 6,
                ..Config::new(local_addr)
            }
        }

        let (mut radio_a, mut radio_b) = SimRadio::pair();
        let mut a = Host::with_config(fast_config(1));
        let mut b = Host::with_config(fast_config(2));
        a.begin(&mut radio_a);
        b.begin(&mut radio_b);

        let mut now = Instant::ZERO;
        a.connect(Address(2), now);
        run_until(&mut a, &mut b, &mut radio_a, &mut radio_b, 200, |a, b| {
            matches!(
                a.connection(Address(2)).map(|c| c.state()),
                Some(crate::connection::State::Connected)
            ) && matches!(
                b.connection(Address(1)).map(|c| c.state()),
                Some(crate::connection::State::Connected)
            )
        });

        // Bigger than three frames' worth but no more than four: a single
        // write forces exactly four data frames through the window=4 send
        // path in one go, rather than trickling out one frame per write.
        let frame_payload_cap = crate::config::MAX_PAYLOAD;
        let full: std::vec::Vec<u8> = (0..(3 * frame_payload_cap + 159))
            .map(|i| (i % 256) as u8)
            .collect();
        assert!(full.len() > 3 * frame_payload_cap);
        assert!(full.len() <= 4 * frame_payload_cap);
        a.connection(Address(2)).unwrap().write(&full);

        let mut sent_seen = radio_a.sent_frames().len();
        let mut data_frames_seen = 0u32;
        let mut dropped = false;
        for _ in 0..3000 {
            now = now + crate::time::Duration::from_millis(10);
            a.poll(&mut radio_a, now);
            b.poll(&mut radio_b, now);

            while sent_seen < radio_a.sent_frames().len() {
                let bytes = &radio_a.sent_frames()[sent_seen];
                sent_seen += 1;
                let is_data = bytes.len() > HEADER_LEN;
                if is_data {
                    data_frames_seen += 1;
                }
                if is_data && data_frames_seen == 2 && !dropped {
                    assert!(radio_b.drop_next(), "expected a frame waiting to be dropped");
                    dropped = true;
                } else {
                    assert!(radio_b.deliver_next(), "expected a frame waiting to be delivered");
                }
            }
            while radio_a.deliver_next() {}

            if dropped
                && b.connection(Address(1))
                    .map(|c| c.available() >= full.len())
                    .unwrap_or(false)
            {
                break;
            }
        }

        assert!(dropped, "drop_next() was never exercised");
        assert!(
            data_frames_seen > 4,
            "expected at least one retransmitted data frame, saw {}",
            data_frames_seen
        );

        let conn = b.connection(Address(1)).unwrap();
        assert_eq!(conn.available(), full.len());
        let mut out = std::vec![0u8; full.len()];
        conn.read(&mut out);
        assert_eq!(out, full);
    }

    #[test]
    fn connect_refuses_broadcast_address() {
        let mut host = Host::new(1);
        host.connect(Address::BROADCAST, Instant::ZERO);
        assert!(host.connection(Address::BROADCAST).is_none());
    }

    #[test]
    fn unknown_source_without_plain_syn_is_discarded() {
        let (mut radio_a, mut radio_b) = SimRadio::pair();
        let mut b = Host::new(2);
        b.begin(&mut radio_b);

        let bogus = wire::FrameRepr {
            version: 1,
            payload_type: 0,
            flags: wire::Flags::ack_only(),
            ack_window: 4,
            src: Address(9),
            dest: Address(2),
            seq_num: 0,
            ack_num: 0,
        };
        let mut buf = [0u8; HEADER_LEN];
        {
            let mut frame = Frame::new_unchecked(&mut buf[..]);
            bogus.emit(&mut frame);
        }
        radio_a.send(&buf);
        radio_b.deliver_next();
        b.poll(&mut radio_b, Instant::ZERO);
        assert!(b.connection(Address(9)).is_none());
    }
}

//! The per-connection state machine: handshake, Go-Back-N send window,
//! in-order delivery, piggybacked acknowledgment, and teardown.
//!
//! One [`Connection`] exists per remote peer, owned by
//! [`crate::host::Host`]'s connection table. A connection never touches
//! the radio; it only produces and consumes [`crate::wire::FrameRepr`]
//! headers plus payload bytes, handed to and from it by the host.

use heapless::{Deque, Vec};

use crate::config::{self, MAX_PAYLOAD, RX_BUFFER_CAP, TX_BUFFER_CAP};
use crate::seq::SeqNum;
use crate::storage::{RingBuffer, Window, WindowEntry};
use crate::time::{Duration, Instant, Timer};
use crate::wire::{Address, Flags, FrameRepr};

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Closed,
    ConnectSyn,
    ConnectSynAck,
    Connected,
    CloseFin,
    CloseFinAck,
}

/// The last recoverable or fatal condition recorded on this connection.
///
/// `CloseFinAck` is not listed here: full `CLOSE_FIN_ACK` semantics are
/// implemented rather than left as a dangling branch — see `DESIGN.md`.
/// `RetriesExhausted` covers a retry cap that is enforced here but was
/// previously unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LastError {
    #[default]
    None,
    InvalidSyn,
    InvalidSynAckSyn,
    InvalidSynAck,
    InvalidState,
    RetriesExhausted,
}

/// An event the application can drain, substituting for
/// `onDataReceived`/`onClose` callbacks. Storing closures on a `Connection`
/// would reach back up toward the host that owns it, creating a
/// reference cycle, so events are queued instead and the application
/// (or the host, on its behalf) polls for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnEvent {
    DataReceived,
    Closed,
}

/// A frame ready to hand to the radio: header plus owned payload bytes.
pub struct TxPacket {
    pub repr: FrameRepr,
    pub payload: Vec<u8, MAX_PAYLOAD>,
}

/// One connection's complete state.
pub struct Connection {
    local: Address,
    remote: Address,
    state: State,
    window_size: u8,
    current_seq_num: SeqNum,
    seq_base: SeqNum,
    next_ack_num: SeqNum,
    tx_queue: RingBuffer<TX_BUFFER_CAP>,
    rx_queue: RingBuffer<RX_BUFFER_CAP>,
    window: Window,
    packet_timeout: Timer,
    piggyback_timer: Timer,
    linger_timer: Timer,
    pending_control: Option<Flags>,
    fin_sent: bool,
    retry_count: u32,
    last_error: LastError,
    events: Deque<ConnEvent, 4>,
}

impl Connection {
    /// A fresh, unconnected connection slot for `remote`, owned by `local`.
    pub fn new(local: Address, remote: Address, window_size: u8) -> Connection {
        Connection {
            local,
            remote,
            state: State::Closed,
            window_size,
            current_seq_num: SeqNum::new(0),
            seq_base: SeqNum::new(0),
            next_ack_num: SeqNum::new(0),
            tx_queue: RingBuffer::new(),
            rx_queue: RingBuffer::new(),
            window: Window::new(),
            packet_timeout: Timer::new(),
            piggyback_timer: Timer::new(),
            linger_timer: Timer::new(),
            pending_control: None,
            fin_sent: false,
            retry_count: 0,
            last_error: LastError::None,
            events: Deque::new(),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn remote_addr(&self) -> Address {
        self.remote
    }

    pub fn last_error(&self) -> LastError {
        self.last_error
    }

    pub fn is_closed(&self) -> bool {
        self.state == State::Closed
    }

    /// Drain the next queued application event, if any.
    pub fn take_event(&mut self) -> Option<ConnEvent> {
        self.events.pop_front()
    }

    fn push_event(&mut self, event: ConnEvent) {
        if self.events.push_back(event).is_err() {
            // The application isn't draining events; drop the oldest rather
            // than lose the newest (a `Closed` event matters more than a
            // stale `DataReceived`).
            self.events.pop_front();
            let _ = self.events.push_back(event);
        }
    }

    // ---- application-facing stream API ----

    /// Enqueue `data` for transmission. Returns the number of bytes
    /// actually accepted, which may be fewer than `data.len()` if the
    /// send buffer is full; `0` if the connection isn't in a state that
    /// accepts writes.
    pub fn write(&mut self, data: &[u8]) -> usize {
        if !matches!(self.state, State::Connected | State::ConnectSynAck) {
            return 0;
        }
        self.tx_queue.enqueue_slice(data)
    }

    /// Enqueue a single byte. Returns `1` if accepted, `0` if the send
    /// buffer is full or the connection isn't in a state that accepts
    /// writes.
    pub fn write_byte(&mut self, byte: u8) -> usize {
        self.write(&[byte])
    }

    /// Room left in the send buffer, or `-1` if writes aren't currently accepted.
    pub fn available_for_write(&self) -> i32 {
        if !matches!(self.state, State::Connected | State::ConnectSynAck) {
            return -1;
        }
        self.tx_queue.available() as i32
    }

    /// No-op: framing and transmission are entirely driven by the host's
    /// tick, not by an explicit flush.
    pub fn flush(&mut self) {}

    pub fn read(&mut self, out: &mut [u8]) -> usize {
        self.rx_queue.dequeue_slice(out)
    }

    pub fn read_byte(&mut self) -> Option<u8> {
        self.rx_queue.dequeue_one().ok()
    }

    pub fn peek_byte(&self) -> Option<u8> {
        self.rx_queue.peek_one().ok()
    }

    pub fn available(&self) -> usize {
        self.rx_queue.len()
    }

    /// Request a graceful close. Asynchronous: the FIN rides on the next
    /// control frame once any queued data has drained.
    pub fn close(&mut self) {
        if matches!(self.state, State::Closed | State::CloseFin | State::CloseFinAck) {
            return;
        }
        self.state = State::CloseFin;
    }

    // ---- handshake initiation (CLOSED state) ----

    /// `connect()`: pick the initial sequence number and schedule a SYN.
    pub fn initiate_connect(&mut self, config: &config::Config, now: Instant, initial_seq: SeqNum) {
        self.current_seq_num = initial_seq;
        self.seq_base = initial_seq;
        self.state = State::ConnectSyn;
        self.pending_control = Some(Flags {
            syn: true,
            fin: false,
            ack: false,
        });
        self.packet_timeout.start(now, config.packet_timeout);
    }

    /// Admit an unsolicited SYN: accept, schedule SYN+ACK.
    pub fn accept_inbound_syn(
        &mut self,
        config: &config::Config,
        now: Instant,
        initial_seq: SeqNum,
        remote_syn_seq: u8,
    ) {
        self.next_ack_num = SeqNum::new(remote_syn_seq).add(1);
        self.current_seq_num = initial_seq;
        self.seq_base = initial_seq;
        self.state = State::ConnectSynAck;
        self.pending_control = Some(Flags {
            syn: true,
            fin: false,
            ack: true,
        });
        self.packet_timeout.start(now, config.packet_timeout);
    }

    // ---- inbound dispatch ----

    /// Process one inbound frame already matched to this connection.
    pub fn on_receive(&mut self, repr: &FrameRepr, payload: &[u8], config: &config::Config, now: Instant) {
        match self.state {
            State::Closed => {
                self.last_error = LastError::InvalidSyn;
            }
            State::ConnectSyn => self.on_receive_connect_syn(repr, config, now),
            State::ConnectSynAck => self.on_receive_connect_syn_ack(repr, config, now),
            State::Connected => self.on_receive_connected(repr, payload, config, now),
            State::CloseFin => self.on_receive_close_fin(repr, config, now),
            State::CloseFinAck => self.on_receive_close_fin_ack(repr, config, now),
        }
    }

    fn on_receive_connect_syn(&mut self, repr: &FrameRepr, config: &config::Config, now: Instant) {
        let expect_ack = self.current_seq_num.add(1);
        if repr.flags.syn && repr.flags.ack && repr.ack_num == expect_ack.0 {
            self.next_ack_num = SeqNum::new(repr.seq_num).add(1);
            self.current_seq_num = expect_ack;
            self.seq_base = expect_ack;
            self.pending_control = Some(Flags::ack_only());
            self.packet_timeout.cancel();
            self.piggyback_timer.start(now, config.piggyback_timeout);
            self.retry_count = 0;
            self.state = State::Connected;
        } else {
            log::warn!("{}: bad SYN+ACK from {}, re-sending SYN", self.local, self.remote);
            self.last_error = LastError::InvalidSynAckSyn;
            self.pending_control = Some(Flags {
                syn: true,
                fin: false,
                ack: false,
            });
            self.packet_timeout.start(now, config.packet_timeout);
        }
    }

    fn on_receive_connect_syn_ack(&mut self, repr: &FrameRepr, config: &config::Config, now: Instant) {
        if repr.flags.ack && repr.seq_num == self.next_ack_num.0 {
            self.current_seq_num = self.current_seq_num.add(1);
            self.seq_base = self.current_seq_num;
            self.packet_timeout.cancel();
            self.piggyback_timer.start(now, config.piggyback_timeout);
            self.retry_count = 0;
            self.state = State::Connected;
        } else {
            log::warn!("{}: bad ACK from {}, re-sending SYN+ACK", self.local, self.remote);
            self.last_error = LastError::InvalidSynAck;
            self.pending_control = Some(Flags {
                syn: true,
                fin: false,
                ack: true,
            });
            self.packet_timeout.start(now, config.packet_timeout);
        }
    }

    fn on_receive_connected(&mut self, repr: &FrameRepr, payload: &[u8], config: &config::Config, now: Instant) {
        if repr.flags.ack {
            self.process_ack(SeqNum::new(repr.ack_num), now, config);
        }
        if repr.flags.syn {
            // A SYN from an already-connected peer is not a reconnect request.
            log::warn!("{}: SYN from already-connected peer {}", self.local, self.remote);
            self.last_error = LastError::InvalidState;
        }

        if repr.seq_num == self.next_ack_num.0 {
            if !payload.is_empty() && self.rx_queue.enqueue_slice_atomic(payload).is_ok() {
                self.next_ack_num = self.next_ack_num.add(1);
                self.pending_control.get_or_insert(Flags::ack_only());
                self.piggyback_timer.start(now, config.piggyback_timeout);
                self.push_event(ConnEvent::DataReceived);
            }
            // A full receive buffer simply withholds the ACK; the sender's
            // packet timeout will force a retransmission later.
        } else {
            // Out of order: re-ack the last in-order seq, forcing the
            // peer's Go-Back-N retransmission of its whole window.
            self.pending_control.get_or_insert(Flags::ack_only());
            self.piggyback_timer.start(now, config.piggyback_timeout);
        }

        if repr.flags.fin {
            self.state = State::CloseFin;
            self.pending_control.get_or_insert(Flags::ack_only());
        }
    }

    fn on_receive_close_fin(&mut self, repr: &FrameRepr, config: &config::Config, now: Instant) {
        if repr.flags.ack {
            self.process_ack(SeqNum::new(repr.ack_num), now, config);
        }
        if repr.flags.fin {
            // Simultaneous close: ACK the peer's FIN right away and move on
            // to lingering, regardless of whether our own FIN has gone out
            // yet — waiting for `fin_sent` here would cost an extra
            // round-trip for no protocol benefit.
            self.pending_control.get_or_insert(Flags::ack_only());
            self.enter_close_fin_ack(config, now);
        } else if self.fin_sent && repr.flags.ack {
            self.enter_close_fin_ack(config, now);
        }
    }

    fn on_receive_close_fin_ack(&mut self, repr: &FrameRepr, config: &config::Config, now: Instant) {
        if repr.flags.fin {
            // Late/duplicate FIN from a peer that hasn't seen our ACK yet.
            self.pending_control.get_or_insert(Flags::ack_only());
            self.linger_timer.start(now, config.packet_timeout);
        }
    }

    fn enter_close_fin_ack(&mut self, config: &config::Config, now: Instant) {
        self.state = State::CloseFinAck;
        self.linger_timer.start(now, config.packet_timeout);
    }

    /// Go-Back-N cumulative ACK processing.
    fn process_ack(&mut self, ack_num: SeqNum, now: Instant, config: &config::Config) {
        let base = self.seq_base;
        let end = base.add(self.window.len() as u8);
        if ack_num.in_range_inclusive(base, end) {
            let advanced = base.distance_to(ack_num) as usize;
            self.window.release_front(advanced);
            self.seq_base = ack_num;
            self.current_seq_num = ack_num;
            if ack_num != end {
                self.packet_timeout.start(now, config.packet_timeout);
            } else {
                self.packet_timeout.cancel();
            }
            self.retry_count = 0;
        } else {
            // Outside the plausible range: rewind to force a full resend.
            self.current_seq_num = self.seq_base;
        }
    }

    fn position_in_window(&self) -> usize {
        self.seq_base.distance_to(self.current_seq_num) as usize
    }

    /// Arm the pending FIN once nothing else is left to frame.
    fn service_close(&mut self) {
        if self.state == State::CloseFin
            && !self.fin_sent
            && self.pending_control.is_none()
            && self.tx_queue.is_empty()
            && self.position_in_window() >= self.window.len()
        {
            self.pending_control = Some(Flags {
                syn: false,
                fin: true,
                ack: true,
            });
        }
    }

    /// The transmit-readiness predicate.
    pub fn is_ready_for_transmit(&mut self) -> bool {
        self.service_close();
        if self.pending_control.is_some() {
            return true;
        }
        if self.state != State::Connected {
            return false;
        }
        let position = self.position_in_window();
        let data_queued = !self.tx_queue.is_empty();
        (data_queued && position < self.window_size as usize) || position < self.window.len()
    }

    /// Picks the next frame to send: (a) retransmit, (b) fresh data frame, or
    /// (c) a control/piggyback frame, in that preference order.
    pub fn get_next_tx_packet(&mut self, config: &config::Config, now: Instant) -> Option<TxPacket> {
        self.service_close();
        let position = self.position_in_window();

        if position < self.window.len() {
            let entry = self.window.get(position)?;
            let seq_num = entry.seq_num;
            let payload = entry.payload.clone();
            let flags = self.pending_control.take().unwrap_or_else(Flags::ack_only);
            self.current_seq_num = self.current_seq_num.add(1);
            self.packet_timeout.start(now, config.packet_timeout);
            return Some(TxPacket {
                repr: self.build_header(flags, seq_num),
                payload,
            });
        }

        if !self.tx_queue.is_empty() && position < self.window_size as usize {
            let want = self.tx_queue.len().min(MAX_PAYLOAD);
            let mut bytes = [0u8; MAX_PAYLOAD];
            let n = self.tx_queue.dequeue_slice(&mut bytes[..want]);
            let mut payload: Vec<u8, MAX_PAYLOAD> = Vec::new();
            payload
                .extend_from_slice(&bytes[..n])
                .expect("n is bounded by MAX_PAYLOAD");
            let seq = self.current_seq_num;
            let _ = self.window.push(WindowEntry {
                seq_num: seq.0,
                payload: payload.clone(),
            });
            self.current_seq_num = self.current_seq_num.add(1);
            let flags = self.pending_control.take().unwrap_or_else(Flags::ack_only);
            self.packet_timeout.start(now, config.packet_timeout);
            return Some(TxPacket {
                repr: self.build_header(flags, seq.0),
                payload,
            });
        }

        if let Some(flags) = self.pending_control.take() {
            if flags.fin {
                self.fin_sent = true;
            }
            if matches!(self.state, State::ConnectSyn | State::ConnectSynAck) {
                self.packet_timeout.start(now, config.packet_timeout);
            }
            self.piggyback_timer.cancel();
            return Some(TxPacket {
                repr: self.build_header(flags, self.current_seq_num.0),
                payload: Vec::new(),
            });
        }

        None
    }

    fn build_header(&self, flags: Flags, seq_num: u8) -> FrameRepr {
        FrameRepr {
            version: 1,
            payload_type: 0,
            flags,
            ack_window: self.window_size,
            src: self.local,
            dest: self.remote,
            seq_num,
            ack_num: self.next_ack_num.0,
        }
    }

    /// Sample this connection's timers. Call once per host tick.
    pub fn poll_timers(&mut self, config: &config::Config, now: Instant) {
        if self.packet_timeout.has_expired(now) {
            self.on_packet_timeout(config, now);
        }
        if self.piggyback_timer.has_expired(now) {
            self.piggyback_timer.cancel();
            self.pending_control.get_or_insert(Flags::ack_only());
        }
        if self.state == State::CloseFinAck && self.linger_timer.has_expired(now) {
            self.state = State::Closed;
            self.push_event(ConnEvent::Closed);
        }
    }

    fn on_packet_timeout(&mut self, config: &config::Config, now: Instant) {
        match self.state {
            State::Closed => {
                self.packet_timeout.cancel();
            }
            State::ConnectSyn | State::ConnectSynAck => {
                if !self.bump_retry(config) {
                    return;
                }
                let flags = if self.state == State::ConnectSyn {
                    Flags {
                        syn: true,
                        fin: false,
                        ack: false,
                    }
                } else {
                    Flags {
                        syn: true,
                        fin: false,
                        ack: true,
                    }
                };
                self.pending_control = Some(flags);
                self.packet_timeout.start(now, config.packet_timeout);
            }
            State::Connected | State::CloseFin | State::CloseFinAck => {
                if !self.bump_retry(config) {
                    return;
                }
                log::warn!(
                    "{}: packet timeout, rewinding to seqBase={} for retransmission of {}",
                    self.local,
                    self.seq_base,
                    self.remote
                );
                self.current_seq_num = self.seq_base;
                self.packet_timeout.cancel();
            }
        }
    }

    /// Returns `false` (and forces the connection closed) once the retry
    /// cap is exceeded, so repeated timeouts cannot loop forever.
    fn bump_retry(&mut self, config: &config::Config) -> bool {
        self.retry_count += 1;
        if self.retry_count > config.retry_limit {
            log::error!(
                "{}: retry limit ({}) exceeded for {}, forcing closed",
                self.local,
                config.retry_limit,
                self.remote
            );
            self.last_error = LastError::RetriesExhausted;
            self.state = State::Closed;
            self.push_event(ConnEvent::Closed);
            false
        } else {
            true
        }
    }
}

use byteorder::{BigEndian, ByteOrder};
use core::fmt;

use super::{Address, Error, Result};

mod field {
    use super::super::field::*;

    pub const VER_TYPE: usize = 0;
    pub const FLAGS_WIN: usize = 1;
    pub const SRC: Field = 2..4;
    pub const DEST: Field = 4..6;
    pub const SEQ: usize = 6;
    pub const ACK: usize = 7;
    pub const PAYLOAD: Rest = 8..;
}

pub const HEADER_LEN: usize = field::PAYLOAD.start;

/// The three control bits carried in the high nibble of header byte 1.
///
/// Packed (high to low) as `SYN, FIN, ACK`; the lowest bit of the nibble
/// is reserved and always emitted as zero.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Flags {
    pub syn: bool,
    pub fin: bool,
    pub ack: bool,
}

impl Flags {
    pub const fn ack_only() -> Flags {
        Flags {
            syn: false,
            fin: false,
            ack: true,
        }
    }

    fn pack(self) -> u8 {
        (u8::from(self.syn) << 3) | (u8::from(self.fin) << 2) | (u8::from(self.ack) << 1)
    }

    fn unpack(nibble: u8) -> Flags {
        Flags {
            syn: (nibble >> 3) & 0x1 != 0,
            fin: (nibble >> 2) & 0x1 != 0,
            ack: (nibble >> 1) & 0x1 != 0,
        }
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            if self.syn { 'S' } else { '-' },
            if self.fin { 'F' } else { '-' },
            if self.ack { 'A' } else { '-' },
        )
    }
}

/// A read/write wrapper around an LRTP frame buffer.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Frame<T: AsRef<[u8]>> {
    buffer: T,
}

#[allow(clippy::len_without_is_empty)]
impl<T: AsRef<[u8]>> Frame<T> {
    /// Imbue a raw octet buffer with frame structure.
    pub const fn new_unchecked(buffer: T) -> Frame<T> {
        Frame { buffer }
    }

    /// Shorthand for [`Frame::new_unchecked`] followed by [`Frame::check_len`].
    pub fn new_checked(buffer: T) -> Result<Frame<T>> {
        let frame = Self::new_unchecked(buffer);
        frame.check_len()?;
        Ok(frame)
    }

    /// Ensure no accessor will panic, i.e. the buffer holds at least [`HEADER_LEN`] bytes.
    ///
    /// There is no on-wire length field: everything past the header is
    /// payload, so a buffer longer than the header is never rejected here.
    pub fn check_len(&self) -> Result<()> {
        if self.buffer.as_ref().len() < HEADER_LEN {
            Err(Error::TooShort)
        } else {
            Ok(())
        }
    }

    pub fn into_inner(self) -> T {
        self.buffer
    }

    #[inline]
    pub fn version(&self) -> u8 {
        self.buffer.as_ref()[field::VER_TYPE] >> 4
    }

    #[inline]
    pub fn payload_type(&self) -> u8 {
        self.buffer.as_ref()[field::VER_TYPE] & 0x0f
    }

    #[inline]
    pub fn flags(&self) -> Flags {
        Flags::unpack(self.buffer.as_ref()[field::FLAGS_WIN] >> 4)
    }

    #[inline]
    pub fn ack_window(&self) -> u8 {
        self.buffer.as_ref()[field::FLAGS_WIN] & 0x0f
    }

    #[inline]
    pub fn src(&self) -> Address {
        Address(BigEndian::read_u16(&self.buffer.as_ref()[field::SRC]))
    }

    #[inline]
    pub fn dest(&self) -> Address {
        Address(BigEndian::read_u16(&self.buffer.as_ref()[field::DEST]))
    }

    #[inline]
    pub fn seq_num(&self) -> u8 {
        self.buffer.as_ref()[field::SEQ]
    }

    #[inline]
    pub fn ack_num(&self) -> u8 {
        self.buffer.as_ref()[field::ACK]
    }
}

impl<'a, T: AsRef<[u8]> + ?Sized> Frame<&'a T> {
    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        &self.buffer.as_ref()[field::PAYLOAD]
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Frame<T> {
    #[inline]
    pub fn set_version(&mut self, value: u8) {
        let ty = self.payload_type();
        self.buffer.as_mut()[field::VER_TYPE] = (value << 4) | (ty & 0x0f);
    }

    #[inline]
    pub fn set_payload_type(&mut self, value: u8) {
        let ver = self.version();
        self.buffer.as_mut()[field::VER_TYPE] = (ver << 4) | (value & 0x0f);
    }

    #[inline]
    pub fn set_flags(&mut self, flags: Flags) {
        let win = self.ack_window();
        self.buffer.as_mut()[field::FLAGS_WIN] = (flags.pack() << 4) | (win & 0x0f);
    }

    #[inline]
    pub fn set_ack_window(&mut self, value: u8) {
        let flags_nibble = self.buffer.as_ref()[field::FLAGS_WIN] & 0xf0;
        self.buffer.as_mut()[field::FLAGS_WIN] = flags_nibble | (value & 0x0f);
    }

    #[inline]
    pub fn set_src(&mut self, value: Address) {
        BigEndian::write_u16(&mut self.buffer.as_mut()[field::SRC], value.0)
    }

    #[inline]
    pub fn set_dest(&mut self, value: Address) {
        BigEndian::write_u16(&mut self.buffer.as_mut()[field::DEST], value.0)
    }

    #[inline]
    pub fn set_seq_num(&mut self, value: u8) {
        self.buffer.as_mut()[field::SEQ] = value;
    }

    #[inline]
    pub fn set_ack_num(&mut self, value: u8) {
        self.buffer.as_mut()[field::ACK] = value;
    }

    #[inline]
    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.buffer.as_mut()[field::PAYLOAD]
    }
}

impl<T: AsRef<[u8]>> AsRef<[u8]> for Frame<T> {
    fn as_ref(&self) -> &[u8] {
        self.buffer.as_ref()
    }
}

/// A high-level, validated representation of an LRTP frame header.
///
/// Carries no payload bytes of its own; callers pair a `FrameRepr` with
/// the payload slice (already living in the [`Frame`]'s buffer, or about
/// to be written there) when emitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRepr {
    pub version: u8,
    pub payload_type: u8,
    pub flags: Flags,
    pub ack_window: u8,
    pub src: Address,
    pub dest: Address,
    pub seq_num: u8,
    pub ack_num: u8,
}

impl FrameRepr {
    /// Parse a frame header. Never inspects the payload.
    pub fn parse<T>(frame: &Frame<&T>) -> Result<FrameRepr>
    where
        T: AsRef<[u8]> + ?Sized,
    {
        frame.check_len()?;
        Ok(FrameRepr {
            version: frame.version(),
            payload_type: frame.payload_type(),
            flags: frame.flags(),
            ack_window: frame.ack_window(),
            src: frame.src(),
            dest: frame.dest(),
            seq_num: frame.seq_num(),
            ack_num: frame.ack_num(),
        })
    }

    pub const fn header_len(&self) -> usize {
        HEADER_LEN
    }

    /// Emit the header into `frame`. The payload must already be (or will
    /// be) written at `frame.payload_mut()` by the caller.
    pub fn emit<T>(&self, frame: &mut Frame<&mut T>)
    where
        T: AsRef<[u8]> + AsMut<[u8]> + ?Sized,
    {
        frame.set_version(self.version);
        frame.set_payload_type(self.payload_type);
        frame.set_flags(self.flags);
        frame.set_ack_window(self.ack_window);
        frame.set_src(self.src);
        frame.set_dest(self.dest);
        frame.set_seq_num(self.seq_num);
        frame.set_ack_num(self.ack_num);
    }
}

impl fmt::Display for FrameRepr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "LRTP src={} dst={} seq={} ack={} win={} flags={}",
            self.src, self.dest, self.seq_num, self.ack_num, self.ack_window, self.flags
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_repr() -> FrameRepr {
        FrameRepr {
            version: 1,
            payload_type: 0,
            flags: Flags {
                syn: true,
                fin: false,
                ack: true,
            },
            ack_window: 4,
            src: Address(0x1234),
            dest: Address(0xBEEF),
            seq_num: 7,
            ack_num: 200,
        }
    }

    #[test]
    fn round_trip_header_only() {
        let repr = sample_repr();
        let mut buf = [0u8; HEADER_LEN];
        let mut frame = Frame::new_unchecked(&mut buf);
        repr.emit(&mut frame);

        let frame = Frame::new_checked(&buf[..]).unwrap();
        let parsed = FrameRepr::parse(&Frame::new_unchecked(&buf[..])).unwrap();
        assert_eq!(repr, parsed);
        assert_eq!(frame.payload().len(), 0);
    }

    #[test]
    fn round_trip_with_payload() {
        let repr = sample_repr();
        let payload = b"hello lrtp";
        let mut buf = [0u8; HEADER_LEN + 10];
        {
            let mut frame = Frame::new_unchecked(&mut buf[..]);
            repr.emit(&mut frame);
            frame.payload_mut().copy_from_slice(payload);
        }
        let frame = Frame::new_checked(&buf[..]).unwrap();
        assert_eq!(frame.payload(), payload);
        assert_eq!(FrameRepr::parse(&frame).unwrap(), repr);
    }

    #[test]
    fn decode_too_short_is_rejected() {
        let buf = [0u8; 7];
        assert_eq!(Frame::new_checked(&buf[..]).unwrap_err(), Error::TooShort);
    }

    #[test]
    fn flag_nibble_matches_bit_layout() {
        // SYN+ACK, ackWindow=4 -> high nibble 1010 (S=1,F=0,A=1,rsv=0), low nibble 0100
        let repr = FrameRepr {
            flags: Flags {
                syn: true,
                fin: false,
                ack: true,
            },
            ack_window: 4,
            ..sample_repr()
        };
        let mut buf = [0u8; HEADER_LEN];
        let mut frame = Frame::new_unchecked(&mut buf);
        repr.emit(&mut frame);
        assert_eq!(buf[1], 0b1010_0100);
    }

    #[test]
    fn broadcast_address_round_trips() {
        assert!(Address::BROADCAST.is_broadcast());
        assert!(!Address(0x1234).is_broadcast());
    }
}

//! Modulo-256 sequence number arithmetic.
//!
//! `seqNum`/`ackNum` wrap at 255→0. Comparisons use the standard
//! TCP "serial number" technique (RFC 1982, specialized to an 8-bit
//! field) rather than raw integer comparison, so a window that straddles
//! the wrap still orders correctly.

use core::fmt;
use core::ops;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SeqNum(pub u8);

impl SeqNum {
    pub const fn new(value: u8) -> SeqNum {
        SeqNum(value)
    }

    /// `self + rhs`, wrapping at 256.
    pub fn add(self, rhs: u8) -> SeqNum {
        SeqNum(self.0.wrapping_add(rhs))
    }

    /// Distance from `self` to `rhs` going forward (i.e. `rhs - self`), as an
    /// unsigned step count in `0..=255`.
    pub fn distance_to(self, rhs: SeqNum) -> u8 {
        rhs.0.wrapping_sub(self.0)
    }

    /// True if `self` is strictly before `rhs` in serial order, i.e. reaching
    /// `rhs` from `self` takes fewer than half the sequence space forward
    /// steps. Ties (exactly 128 apart) are considered "not before".
    pub fn serial_lt(self, rhs: SeqNum) -> bool {
        let d = self.distance_to(rhs);
        d != 0 && d < 128
    }

    /// True if `value` lies in the inclusive serial range `[lo, hi]`.
    pub fn in_range_inclusive(self, lo: SeqNum, hi: SeqNum) -> bool {
        (lo == self) || (hi == self) || (lo.serial_lt(self) && self.serial_lt(hi))
    }
}

impl ops::Add<u8> for SeqNum {
    type Output = SeqNum;
    fn add(self, rhs: u8) -> SeqNum {
        SeqNum::add(self, rhs)
    }
}

impl fmt::Display for SeqNum {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u8> for SeqNum {
    fn from(value: u8) -> SeqNum {
        SeqNum(value)
    }
}

impl From<SeqNum> for u8 {
    fn from(value: SeqNum) -> u8 {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_at_256() {
        assert_eq!(SeqNum::new(255).add(1), SeqNum::new(0));
        assert_eq!(SeqNum::new(250).add(6), SeqNum::new(0));
    }

    #[test]
    fn serial_lt_handles_wrap() {
        assert!(SeqNum::new(254).serial_lt(SeqNum::new(2)));
        assert!(!SeqNum::new(2).serial_lt(SeqNum::new(254)));
        assert!(SeqNum::new(10).serial_lt(SeqNum::new(20)));
        assert!(!SeqNum::new(10).serial_lt(SeqNum::new(10)));
    }

    #[test]
    fn range_inclusive_across_wrap() {
        let base = SeqNum::new(250);
        let end = base.add(6); // 0
        assert!(base.in_range_inclusive(base, end));
        assert!(SeqNum::new(253).in_range_inclusive(base, end));
        assert!(end.in_range_inclusive(base, end));
        assert!(!SeqNum::new(10).in_range_inclusive(base, end));
    }
}

//! A monotonic millisecond clock, sampled once per [`poll`](crate::host::Host::poll)
//! rather than driven by a timer-wheel or OS sleep.

use core::fmt;
use core::ops;

/// A point in monotonic time, in milliseconds since an arbitrary epoch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Instant {
    millis: i64,
}

impl Instant {
    pub const ZERO: Instant = Instant { millis: 0 };

    pub const fn from_millis(millis: i64) -> Instant {
        Instant { millis }
    }

    pub const fn total_millis(&self) -> i64 {
        self.millis
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}ms", self.millis)
    }
}

impl ops::Add<Duration> for Instant {
    type Output = Instant;

    fn add(self, rhs: Duration) -> Instant {
        Instant::from_millis(self.millis + rhs.millis as i64)
    }
}

impl ops::Sub<Duration> for Instant {
    type Output = Instant;

    fn sub(self, rhs: Duration) -> Instant {
        Instant::from_millis(self.millis - rhs.millis as i64)
    }
}

impl ops::Sub<Instant> for Instant {
    type Output = Duration;

    fn sub(self, rhs: Instant) -> Duration {
        Duration::from_millis((self.millis - rhs.millis).unsigned_abs())
    }
}

/// A span of time, in milliseconds.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Duration {
    millis: u64,
}

impl Duration {
    pub const fn from_millis(millis: u64) -> Duration {
        Duration { millis }
    }

    pub const fn total_millis(&self) -> u64 {
        self.millis
    }
}

impl ops::Div<u64> for Duration {
    type Output = Duration;

    fn div(self, rhs: u64) -> Duration {
        Duration::from_millis(self.millis / rhs)
    }
}

/// A cancellable deadline sampled against [`Instant`] each tick.
///
/// A plain `{deadline, active}` pair is enough at this scale; no timer
/// wheel is needed for a handful of timers per connection.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Timer {
    deadline: Instant,
    active: bool,
}

impl Timer {
    pub const fn new() -> Timer {
        Timer {
            deadline: Instant::ZERO,
            active: false,
        }
    }

    /// Arm the timer to expire `delay` after `now`.
    pub fn start(&mut self, now: Instant, delay: Duration) {
        self.deadline = now + delay;
        self.active = true;
    }

    pub fn cancel(&mut self) {
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Has this timer expired as of `now`? Does not disarm it.
    pub fn has_expired(&self, now: Instant) -> bool {
        self.active && now >= self.deadline
    }
}

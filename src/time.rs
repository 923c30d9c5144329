//!
//! Simulation time as used by the model host.
//!
//! Unlike a full discrete-event engine, a co-simulation step driver never
//! needs anything richer than "a point in time, in seconds" plus the
//! ability to compare and add step sizes — so this is a thin newtype over
//! `f64` rather than the nanosecond-precision duration type a DES kernel
//! would carry.
//!

use std::fmt::{self, Display};
use std::ops::{Add, AddAssign, Sub};

/// A point in simulation time, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
#[repr(transparent)]
pub struct SimTime(f64);

impl SimTime {
    /// The origin of simulation time.
    pub const ZERO: SimTime = SimTime(0.0);

    /// Constructs a `SimTime` from a raw seconds value.
    #[must_use]
    pub const fn from_secs_f64(secs: f64) -> Self {
        Self(secs)
    }

    /// Returns the time as a raw seconds value.
    #[must_use]
    pub const fn as_secs_f64(self) -> f64 {
        self.0
    }
}

impl From<f64> for SimTime {
    fn from(value: f64) -> Self {
        Self(value)
    }
}

impl From<SimTime> for f64 {
    fn from(value: SimTime) -> Self {
        value.0
    }
}

impl Add for SimTime {
    type Output = SimTime;
    fn add(self, rhs: Self) -> Self::Output {
        SimTime(self.0 + rhs.0)
    }
}

impl AddAssign for SimTime {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for SimTime {
    type Output = SimTime;
    fn sub(self, rhs: Self) -> Self::Output {
        SimTime(self.0 - rhs.0)
    }
}

impl Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}

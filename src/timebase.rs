use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Tick duration of a timestamp, in seconds: `num / den`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

/// Timebase of the public API timestamps.
pub const MILLIS: Rational = Rational::new(1, 1000);

impl Rational {
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    pub fn is_valid(&self) -> bool {
        self.num > 0 && self.den > 0
    }
}

impl Display for Rational {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Rescales `value` from one timebase to another, rounding to nearest with
/// ties away from zero. Saturates at the `i64` range.
pub fn rescale(value: i64, from: Rational, to: Rational) -> i64 {
    debug_assert!(from.is_valid() && to.is_valid(), "{} -> {}", from, to);
    if from == to {
        return value;
    }
    let num = value as i128 * from.num as i128 * to.den as i128;
    let den = from.den as i128 * to.num as i128;
    let half = den / 2;
    let q = if num >= 0 {
        (num + half) / den
    } else {
        (num - half) / den
    };
    q.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

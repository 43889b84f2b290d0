/*!
    Timestamp and time base types.
*/

/**
    A rational number, used for time bases and frame rates.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    pub fn to_f64(self) -> f64 {
        self.num as f64 / self.den as f64
    }

    /**
        Returns the reciprocal, e.g. the time base matching a frame rate.
    */
    pub const fn invert(self) -> Self {
        Self {
            num: self.den,
            den: self.num,
        }
    }

    /**
        Rescale a timestamp from this time base into `to`.

        Rounds to the nearest value, halfway cases away from zero.
    */
    pub fn rescale(self, ts: i64, to: Rational) -> i64 {
        if self == to {
            return ts;
        }

        let num = ts as i128 * self.num as i128 * to.den as i128;
        let den = self.den as i128 * to.num as i128;
        if den == 0 {
            return 0;
        }

        let (num, den) = if den < 0 { (-num, -den) } else { (num, den) };
        let half = den / 2;
        let rounded = if num >= 0 {
            (num + half) / den
        } else {
            (num - half) / den
        };
        rounded as i64
    }
}

/**
    Presentation or decode timestamp, in units of a time base.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pts(pub i64);

/**
    Duration in units of a time base.
*/
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MediaDuration(pub i64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rescale_identity_is_exact() {
        let tb = Rational::new(1, 44100);
        assert_eq!(tb.rescale(123_456, tb), 123_456);
    }

    #[test]
    fn rescale_between_sample_rate_and_ticks() {
        let samples = Rational::new(1, 48000);
        let ticks = Rational::new(1, 10_000_000);
        // 1024 samples at 48 kHz = 21.333 ms
        assert_eq!(samples.rescale(1024, ticks), 213_333);
        assert_eq!(ticks.rescale(10_000_000, samples), 48000);
    }

    #[test]
    fn rescale_rounds_to_nearest() {
        let from = Rational::new(1, 3);
        let to = Rational::new(1, 2);
        // 1/3 s = 0.667 half-units
        assert_eq!(from.rescale(1, to), 1);
        // 3/2 half-units rounds away from zero
        assert_eq!(Rational::new(1, 2).rescale(3, Rational::new(1, 1)), 2);
        assert_eq!(Rational::new(1, 2).rescale(-3, Rational::new(1, 1)), -2);
    }

    #[test]
    fn invert_frame_rate() {
        assert_eq!(Rational::new(30, 1).invert(), Rational::new(1, 30));
        assert!((Rational::new(30000, 1001).to_f64() - 29.97).abs() < 0.01);
    }
}

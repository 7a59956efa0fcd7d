use rand::Rng;
use std::time::Duration;

/// Think time between two consecutive tasks of the same user.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum WaitTime {
    None,
    Constant(Duration),
    /// Uniformly distributed between the two bounds, inclusive.
    Between(Duration, Duration),
}

impl WaitTime {
    pub fn between_secs(min: f64, max: f64) -> Self {
        WaitTime::Between(Duration::from_secs_f64(min), Duration::from_secs_f64(max))
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        match *self {
            WaitTime::None => Duration::ZERO,
            WaitTime::Constant(d) => d,
            WaitTime::Between(a, b) => {
                let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
                Duration::from_secs_f64(rng.gen_range(lo.as_secs_f64()..=hi.as_secs_f64()))
            }
        }
    }
}

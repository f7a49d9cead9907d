//! Injectable time source.

use chrono::{DateTime, Utc};

/// Wall-clock seam: production uses [`SystemClock`], tests pin time with
/// [`FixedClock`].
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// System wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at a given instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_returns_its_instant() {
        let at = "2025-06-15T10:00:00Z".parse::<DateTime<Utc>>().unwrap();
        assert_eq!(FixedClock(at).now(), at);
    }
}

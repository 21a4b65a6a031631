use std::{
    thread,
    time::{Duration, Instant},
};

use crate::error::{Error, Result};

/// A monitored sequence advanced one non-blocking step at a time.
pub trait Sequence {
    /// One accept attempt plus whatever the received message requires.
    fn tick(&mut self) -> Result<()>;

    /// Complete or failed; no further ticks do anything.
    fn is_finished(&self) -> bool;

    /// Back to the initial state, releasing the listener.
    fn reset(&mut self);
}

/// Ticks `seq` every `interval` until it finishes, fails, or `deadline`
/// passes. On deadline the sequence is reset.
pub fn drive(seq: &mut dyn Sequence, interval: Duration, deadline: Option<Duration>) -> Result<()> {
    let start = Instant::now();
    loop {
        seq.tick()?;
        if seq.is_finished() {
            return Ok(());
        }
        if let Some(limit) = deadline
            && start.elapsed() >= limit
        {
            seq.reset();
            return Err(Error::Deadline(limit));
        }
        thread::sleep(interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Countdown {
        left: u32,
        ticks: u32,
        reset: bool,
        fail_at: Option<u32>,
    }

    impl Sequence for Countdown {
        fn tick(&mut self) -> Result<()> {
            self.ticks += 1;
            if Some(self.ticks) == self.fail_at {
                return Err(Error::Protocol("boom".into()));
            }
            self.left = self.left.saturating_sub(1);
            Ok(())
        }
        fn is_finished(&self) -> bool {
            self.left == 0
        }
        fn reset(&mut self) {
            self.reset = true;
        }
    }

    fn countdown(left: u32, fail_at: Option<u32>) -> Countdown {
        Countdown {
            left,
            ticks: 0,
            reset: false,
            fail_at,
        }
    }

    #[test]
    fn runs_until_finished() {
        let mut c = countdown(3, None);
        drive(&mut c, Duration::ZERO, None).unwrap();
        assert_eq!(c.ticks, 3);
        assert!(!c.reset);
    }

    #[test]
    fn stops_on_first_error() {
        let mut c = countdown(10, Some(2));
        assert!(matches!(
            drive(&mut c, Duration::ZERO, None),
            Err(Error::Protocol(_))
        ));
        assert_eq!(c.ticks, 2);
    }

    #[test]
    fn deadline_resets_sequence() {
        let mut c = countdown(u32::MAX, None);
        let r = drive(&mut c, Duration::from_millis(1), Some(Duration::from_millis(20)));
        assert!(matches!(r, Err(Error::Deadline(_))));
        assert!(c.reset);
    }
}

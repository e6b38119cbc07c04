// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::time::{Duration, Instant};

use crate::playsync::CancelHandle;

/// The tail of every wait that is spun rather than slept.
const SPIN_WINDOW: Duration = Duration::from_millis(1);

/// Pacer sleeps between scheduled events. It remembers the deadline of the previous wait and
/// targets the next one relative to it, so the time spent dispatching events doesn't
/// accumulate as drift over a long run.
pub struct Pacer {
    last_deadline: Option<Instant>,
    cancel_handle: CancelHandle,
}

impl Pacer {
    pub fn new(cancel_handle: CancelHandle) -> Pacer {
        Pacer {
            last_deadline: None,
            cancel_handle,
        }
    }

    /// Waits until delta_ms after the previous deadline. The first wait is relative to now.
    /// Returns false if the run was cancelled.
    pub fn wait(&mut self, delta_ms: i64) -> bool {
        if delta_ms <= 0 {
            return !self.cancel_handle.is_cancelled();
        }

        let base = self.last_deadline.unwrap_or_else(Instant::now);
        let deadline = base + Duration::from_millis(delta_ms as u64);
        self.last_deadline = Some(deadline);

        if let Some(coarse) = deadline.checked_sub(SPIN_WINDOW) {
            if coarse > Instant::now() && !self.cancel_handle.wait_until(coarse) {
                return false;
            }
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if !remaining.is_zero() {
            spin_sleep::sleep(remaining);
        }

        !self.cancel_handle.is_cancelled()
    }
}

#[cfg(test)]
mod test {
    use std::thread;

    use super::*;

    #[test]
    fn test_waits_accumulate_deadlines() {
        let mut pacer = Pacer::new(CancelHandle::new());

        let start = Instant::now();
        assert!(pacer.wait(10));
        let first = pacer.last_deadline.expect("deadline");
        // Work between events doesn't push the next deadline back.
        thread::sleep(Duration::from_millis(5));
        assert!(pacer.wait(10));

        assert_eq!(Some(first + Duration::from_millis(10)), pacer.last_deadline);
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_non_positive_delta_doesnt_wait() {
        let mut pacer = Pacer::new(CancelHandle::new());
        let start = Instant::now();
        assert!(pacer.wait(0));
        assert!(pacer.wait(-3));
        assert!(start.elapsed() < Duration::from_millis(5));
    }

    #[test]
    fn test_cancel_interrupts_wait() {
        let cancel_handle = CancelHandle::new();
        let mut pacer = Pacer::new(cancel_handle.clone());

        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            cancel_handle.cancel();
        });

        let start = Instant::now();
        assert!(!pacer.wait(60_000));
        assert!(start.elapsed() < Duration::from_secs(10));
        canceller.join().expect("join");
    }
}

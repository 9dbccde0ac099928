//! Requests-per-minute gate for agents with `max_rpm` set.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

struct Window {
    started: Instant,
    count: i32,
}

/// Counts requests in rolling one-minute windows and blocks the caller
/// when the window is exhausted until the next window opens.
pub struct RpmController {
    max_rpm: Option<i32>,
    window: Mutex<Window>,
}

impl RpmController {
    /// No limit when `max_rpm` is `None`.
    pub fn new(max_rpm: Option<i32>) -> Self {
        Self {
            max_rpm,
            window: Mutex::new(Window {
                started: Instant::now(),
                count: 0,
            }),
        }
    }

    /// Count one request, sleeping into the next minute window when the
    /// current one is used up.
    pub fn check_or_wait(&self) {
        let max = match self.max_rpm {
            Some(max) if max > 0 => max,
            _ => return,
        };

        loop {
            let wait_for = {
                let mut window = self.window.lock();
                let elapsed = window.started.elapsed();
                if elapsed >= Duration::from_secs(60) {
                    window.started = Instant::now();
                    window.count = 0;
                }
                if window.count < max {
                    window.count += 1;
                    return;
                }
                Duration::from_secs(60).saturating_sub(elapsed)
            };
            log::info!("max RPM reached, waiting {:?} for the next minute window", wait_for);
            std::thread::sleep(wait_for);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited_controller_never_blocks() {
        let controller = RpmController::new(None);
        for _ in 0..1000 {
            controller.check_or_wait();
        }
    }

    #[test]
    fn counts_within_the_window() {
        let controller = RpmController::new(Some(5));
        let start = Instant::now();
        for _ in 0..5 {
            controller.check_or_wait();
        }
        // Five requests fit in the window without sleeping.
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}

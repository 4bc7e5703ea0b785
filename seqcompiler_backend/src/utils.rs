use std::time::{SystemTime, UNIX_EPOCH};

// Utility class for time-tracking
pub struct TickTimer {
    pub milis: f64,
}

fn now_milis() -> f64 {
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    duration.as_secs() as f64 * 1e3 + duration.subsec_nanos() as f64 / 1e6
}

impl TickTimer {
    pub fn new() -> Self {
        Self { milis: now_milis() }
    }

    /// Milliseconds since the last tick (or construction).
    pub fn tick(&mut self) -> f64 {
        let milis = now_milis();
        let diff = milis - self.milis;
        self.milis = milis;
        diff
    }

    pub fn tick_log(&mut self, msg: &str) -> f64 {
        let diff = self.tick();
        log::debug!("{}: {:.3} ms", msg, diff);
        diff
    }
}

impl Default for TickTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_reports_elapsed_time() {
        let mut timer = TickTimer::new();
        assert!(timer.tick() >= 0.);
        assert!(timer.tick_log("second tick") >= 0.);
    }
}

use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

/// Sliding-window event counter used for the frames-per-second readout.
#[derive(Debug, Clone)]
pub struct RateCounter {
    window: Duration,
    events: VecDeque<Instant>,
}

impl Default for RateCounter {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl RateCounter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            events: VecDeque::new(),
        }
    }

    /// Records one event now.
    pub fn incr(&mut self) {
        self.incr_at(Instant::now());
    }

    /// Records one event at `now`. Timestamps must be non-decreasing.
    pub fn incr_at(&mut self, now: Instant) {
        self.prune(now);
        self.events.push_back(now);
    }

    /// Events recorded within the last window.
    pub fn rate(&self) -> u64 {
        self.rate_at(Instant::now())
    }

    pub fn rate_at(&self, now: Instant) -> u64 {
        self.events
            .iter()
            .rev()
            .take_while(|&&at| now.saturating_duration_since(at) < self.window)
            .count() as u64
    }

    fn prune(&mut self, now: Instant) {
        while let Some(&oldest) = self.events.front() {
            if now.saturating_duration_since(oldest) < self.window {
                break;
            }
            self.events.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_events_inside_the_window() {
        let start = Instant::now();
        let mut counter = RateCounter::default();

        for step in 0..10 {
            counter.incr_at(start + Duration::from_millis(step * 100));
        }

        assert_eq!(counter.rate_at(start + Duration::from_millis(900)), 10);
        assert_eq!(counter.rate_at(start + Duration::from_millis(1_450)), 5);
        assert_eq!(counter.rate_at(start + Duration::from_secs(3)), 0);
    }

    #[test]
    fn prunes_expired_events_on_increment() {
        let start = Instant::now();
        let mut counter = RateCounter::new(Duration::from_millis(500));

        counter.incr_at(start);
        counter.incr_at(start + Duration::from_millis(100));
        counter.incr_at(start + Duration::from_secs(2));

        assert_eq!(counter.events.len(), 1);
        assert_eq!(counter.rate_at(start + Duration::from_secs(2)), 1);
    }

    #[test]
    fn starts_empty() {
        assert_eq!(RateCounter::default().rate(), 0);
    }
}

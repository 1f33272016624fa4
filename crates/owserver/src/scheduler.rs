//! Poll cadence and write verification bookkeeping.
//!
//! Both types are pure state machines; the service drives them from its
//! background loop and tests drive them with simulated instants.

use std::time::Duration;

use tokio::time::Instant;

/// Period of one scheduler tick.
pub const TICK: Duration = Duration::from_secs(1);

/// Work selected by one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickAction {
    /// Refresh descriptions and push every value.
    Full,
    /// Push changed values only.
    Values,
    Idle,
}

/// Two independent countdowns measured in ticks.
#[derive(Debug, Clone)]
pub struct Countdown {
    td_interval: u64,
    value_interval: u64,
    td_left: u64,
    value_left: u64,
}

impl Countdown {
    /// The first tick is always [`TickAction::Full`].
    pub fn new(td_interval: u64, value_interval: u64) -> Self {
        Self {
            td_interval: td_interval.max(1),
            value_interval: value_interval.max(1),
            td_left: 0,
            value_left: value_interval.max(1),
        }
    }

    pub fn tick(&mut self) -> TickAction {
        self.td_left = self.td_left.saturating_sub(1);
        if self.td_left == 0 {
            self.td_left = self.td_interval;
            self.value_left = self.value_interval;
            return TickAction::Full;
        }
        self.value_left = self.value_left.saturating_sub(1);
        if self.value_left == 0 {
            self.value_left = self.value_interval;
            return TickAction::Values;
        }
        TickAction::Idle
    }

    /// Make the next tick [`TickAction::Full`] again after a failed refresh.
    pub fn retry_full(&mut self) {
        self.td_left = 1;
    }
}

/// Change-only poll due after a successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingVerification {
    pub node_id: String,
    pub property: String,
    pub due: Instant,
}

#[derive(Debug, Default)]
pub struct VerificationQueue {
    pending: Vec<PendingVerification>,
}

impl VerificationQueue {
    /// Queue one verification per delay, counted from `now`.
    pub fn schedule(&mut self, node_id: &str, property: &str, now: Instant, delays: &[Duration]) {
        for delay in delays {
            self.pending.push(PendingVerification {
                node_id: node_id.to_string(),
                property: property.to_string(),
                due: now + *delay,
            });
        }
    }

    /// Remove and return the entries due at `now`, earliest first.
    pub fn take_due(&mut self, now: Instant) -> Vec<PendingVerification> {
        let (mut due, rest): (Vec<_>, Vec<_>) =
            self.pending.drain(..).partition(|p| p.due <= now);
        self.pending = rest;
        due.sort_by_key(|p| p.due);
        due
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(countdown: &mut Countdown, ticks: usize) -> Vec<TickAction> {
        (0..ticks).map(|_| countdown.tick()).collect()
    }

    #[test]
    fn first_tick_is_full_then_values_on_their_period() {
        let mut countdown = Countdown::new(10, 3);
        let actions = run(&mut countdown, 10);
        use TickAction::*;
        assert_eq!(
            actions,
            [Full, Idle, Idle, Values, Idle, Idle, Values, Idle, Idle, Values]
        );
        // metadata expiry resets the value countdown
        assert_eq!(run(&mut countdown, 4), [Full, Idle, Idle, Values]);
    }

    #[test]
    fn full_refresh_preempts_value_poll() {
        let mut countdown = Countdown::new(4, 2);
        use TickAction::*;
        assert_eq!(run(&mut countdown, 5), [Full, Idle, Values, Idle, Full]);
    }

    #[test]
    fn failed_refresh_is_retried_on_next_tick() {
        let mut countdown = Countdown::new(3600, 5);
        assert_eq!(countdown.tick(), TickAction::Full);
        countdown.retry_full();
        assert_eq!(countdown.tick(), TickAction::Full);
        assert_eq!(countdown.tick(), TickAction::Idle);
    }

    #[test]
    fn zero_intervals_do_not_stall() {
        let mut countdown = Countdown::new(0, 0);
        assert_eq!(countdown.tick(), TickAction::Full);
        assert_eq!(countdown.tick(), TickAction::Full);
    }

    #[test]
    fn verifications_come_due_in_order() {
        let start = Instant::now();
        let mut queue = VerificationQueue::default();
        queue.schedule("dev", "relay", start, &[Duration::from_secs(1), Duration::from_secs(5)]);
        assert_eq!(queue.len(), 2);
        assert!(queue.take_due(start).is_empty());

        let due = queue.take_due(start + Duration::from_secs(2));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].due, start + Duration::from_secs(1));

        let due = queue.take_due(start + Duration::from_secs(10));
        assert_eq!(due.len(), 1);
        assert!(queue.is_empty());
    }
}

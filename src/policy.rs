/// Kill/relaunch policy for a heartbeat-supervised child process.
///
/// A single `tick()` decides between doing nothing, killing an unresponsive
/// child, or (re)launching a dead one, then returns the number of seconds
/// the caller should sleep before ticking again. The owning scheduler runs
/// the real timing loop; the policy itself only blocks for one bounded
/// corrective wait on the unresponsive path.
///
/// Not reentrant-safe: `tick()` must always run on the same logical task.
use crate::process::SupervisedProcess;
use tracing::{debug, info, warn};

/// Milliseconds to wait before re-reading the heartbeat when the child
/// first looks unresponsive. Covers the window where the host clock jumped
/// ahead of the heartbeat writer (suspend/resume, VM pause) while the child
/// was in fact still alive.
const CORRECTIVE_WAIT_MS: u64 = 2000;

/// Operator message recorded when a confirmed-unresponsive child is killed.
pub const NO_HEARTBEAT_MESSAGE: &str = "No heartbeat received.";

pub struct WatchdogPolicy<P> {
    unresponsive_kill_period: u64,
    resurrection_period: u64,
    process: P,
    /// Latest heartbeat ever observed. Never regresses, even when the
    /// channel momentarily reports a stale or zero value.
    last_heartbeat_time: u64,
}

impl<P: SupervisedProcess> WatchdogPolicy<P> {
    /// Create a policy for one supervised child.
    ///
    /// `unresponsive_kill_period`: max seconds since the last heartbeat
    /// before a running child is killed. `resurrection_period`: seconds a
    /// killed child stays down before relaunch becomes eligible.
    pub fn new(unresponsive_kill_period: u64, resurrection_period: u64, process: P) -> Self {
        Self {
            unresponsive_kill_period,
            resurrection_period,
            process,
            last_heartbeat_time: 0,
        }
    }

    /// Run one supervision decision. Returns the suggested delay in seconds
    /// before the next tick; callers clamp to a minimum of 1 since clock
    /// skew can drive the slack to zero.
    pub fn tick(&mut self) -> u64 {
        let now = self.process.get_current_time();
        let mut heartbeat = self.process.get_heartbeat().max(self.last_heartbeat_time);
        if heartbeat == 0 {
            // No heartbeat has ever been observed by either source; the
            // child has not reported in and there is nothing actionable.
            return 1;
        }
        self.last_heartbeat_time = heartbeat;

        if self.process.started() && self.process.is_alive() {
            let silence = now.saturating_sub(heartbeat);
            if silence > self.unresponsive_kill_period {
                // The first read may be a clock/suspend artifact. Wait
                // briefly and re-read before trusting it.
                self.process.sleep(CORRECTIVE_WAIT_MS);
                heartbeat = self.process.get_heartbeat().max(self.last_heartbeat_time);
                self.last_heartbeat_time = heartbeat;
                if now.saturating_sub(heartbeat) > self.unresponsive_kill_period {
                    warn!(now, heartbeat, "child unresponsive, killing");
                    self.process.kill(NO_HEARTBEAT_MESSAGE);
                    self.process.set_pending_message(NO_HEARTBEAT_MESSAGE);
                    // Cooldown counts from the kill, not from the stale
                    // heartbeat, or the dead branch would relaunch at once.
                    self.last_heartbeat_time = now;
                } else {
                    debug!(now, heartbeat, "heartbeat recovered on re-read");
                }
                return 1;
            }
            // Seconds of slack before the child would be judged
            // unresponsive; no point polling more often than that.
            self.unresponsive_kill_period - silence
        } else {
            let eligible_at = heartbeat
                .saturating_add(self.unresponsive_kill_period)
                .saturating_add(self.resurrection_period);
            if eligible_at <= now {
                info!(now, "launching child");
                if !self.process.create() {
                    warn!("child launch failed, will retry after cooldown");
                }
                // Baseline from the launch attempt, so a failed create is
                // retried at the next cooldown window instead of spinning.
                self.last_heartbeat_time = now;
                1
            } else {
                eligible_at - now
            }
        }
    }

    /// Latest heartbeat the policy has observed (0 = never).
    pub fn last_heartbeat_time(&self) -> u64 {
        self.last_heartbeat_time
    }

    /// The underlying capability, for scheduler-owned operations
    /// (startup launch, heartbeat seeding, memory checks, final kill).
    pub fn process_mut(&mut self) -> &mut P {
        &mut self.process
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::fake::FakeProcess;

    /// resurrection=60, kill=30: the periods used throughout.
    fn policy(process: FakeProcess) -> WatchdogPolicy<FakeProcess> {
        WatchdogPolicy::new(30, 60, process)
    }

    #[test]
    fn test_no_heartbeat_yet_returns_short_delay() {
        let mut fake = FakeProcess::new();
        fake.now = 1000;
        let mut policy = policy(fake);

        assert_eq!(policy.tick(), 1);
        assert_eq!(policy.last_heartbeat_time(), 0);
        let fake = policy.process_mut();
        assert_eq!(fake.creates, 0);
        assert!(fake.kills.is_empty());
        assert!(fake.sleeps.is_empty());
    }

    #[test]
    fn test_first_tick_launches_child_despite_stale_heartbeat() {
        let mut fake = FakeProcess::new();
        fake.now = 1000;
        fake.heartbeat_value = 100;
        let mut policy = policy(fake);

        // 100 + 30 + 60 = 190 <= 1000: long past eligibility.
        assert_eq!(policy.tick(), 1);
        assert_eq!(policy.last_heartbeat_time(), 1000);
        let fake = policy.process_mut();
        assert_eq!(fake.creates, 1);
        assert!(fake.kills.is_empty());
    }

    #[test]
    fn test_responsive_child_returns_slack() {
        let mut fake = FakeProcess::new();
        fake.now = 1000;
        fake.heartbeat_value = 990;
        fake.started = true;
        fake.alive = true;
        let mut policy = policy(fake);

        assert_eq!(policy.tick(), 20);
        let fake = policy.process_mut();
        assert!(fake.kills.is_empty());
        assert!(fake.sleeps.is_empty());
    }

    #[test]
    fn test_silence_equal_to_period_does_not_kill() {
        let mut fake = FakeProcess::new();
        fake.now = 130;
        fake.heartbeat_value = 100;
        fake.started = true;
        fake.alive = true;
        let mut policy = policy(fake);

        // Exactly at the threshold: slack is 0, not a kill.
        assert_eq!(policy.tick(), 0);
        assert!(policy.process_mut().kills.is_empty());
    }

    #[test]
    fn test_kill_after_silence() {
        let mut fake = FakeProcess::new();
        fake.now = 1020;
        fake.heartbeat_value = 100;
        fake.started = true;
        fake.alive = true;
        let mut policy = policy(fake);

        // 1020 - 100 = 920 > 30: corrective wait, re-read, then kill.
        assert_eq!(policy.tick(), 1);
        assert_eq!(policy.last_heartbeat_time(), 1020);
        let fake = policy.process_mut();
        assert_eq!(fake.sleeps, vec![2000]);
        assert_eq!(fake.kills, vec![NO_HEARTBEAT_MESSAGE.to_string()]);
        assert_eq!(fake.pending_messages, vec![NO_HEARTBEAT_MESSAGE.to_string()]);
        assert_eq!(fake.creates, 0);
    }

    #[test]
    fn test_cooldown_respected_after_kill() {
        let mut fake = FakeProcess::new();
        fake.now = 1020;
        fake.heartbeat_value = 100;
        fake.started = true;
        fake.alive = true;
        let mut policy = policy(fake);
        policy.tick(); // kills at t=1020

        // Not eligible again until 1020 + 30 + 60 = 1110.
        policy.process_mut().now = 1025;
        assert_eq!(policy.tick(), 85);
        policy.process_mut().now = 1109;
        assert_eq!(policy.tick(), 1);
        assert_eq!(policy.process_mut().creates, 0);

        policy.process_mut().now = 1110;
        assert_eq!(policy.tick(), 1);
        let fake = policy.process_mut();
        assert_eq!(fake.creates, 1);
        // Exactly one kill across the whole sequence.
        assert_eq!(fake.kills.len(), 1);
    }

    #[test]
    fn test_no_premature_kill_with_regular_heartbeats() {
        let mut fake = FakeProcess::new();
        fake.started = true;
        fake.alive = true;
        let mut policy = policy(fake);

        // Heartbeat every 10s, well inside the 30s kill period.
        for step in 0..20u64 {
            let now = 1000 + step * 10;
            let fake = policy.process_mut();
            fake.now = now;
            fake.heartbeat_value = now - 5;
            let delay = policy.tick();
            assert_eq!(delay, 25);
        }
        let fake = policy.process_mut();
        assert!(fake.kills.is_empty());
        assert!(fake.sleeps.is_empty());
    }

    #[test]
    fn test_monotonic_heartbeat_never_regresses() {
        let mut fake = FakeProcess::new();
        fake.started = true;
        fake.alive = true;
        fake.now = 1000;
        fake.heartbeat_value = 990;
        let mut policy = policy(fake);

        let mut previous = 0;
        for &observed in &[990u64, 500, 0, 995, 200] {
            {
                let fake = policy.process_mut();
                fake.heartbeat_value = observed;
                fake.now += 2;
            }
            policy.tick();
            assert!(policy.last_heartbeat_time() >= previous);
            previous = policy.last_heartbeat_time();
        }
        // Only the genuinely newer value ever advanced the belief.
        assert_eq!(policy.last_heartbeat_time(), 995);
    }

    #[test]
    fn test_zero_heartbeat_read_does_not_regress_or_kill() {
        let mut fake = FakeProcess::new();
        fake.started = true;
        fake.alive = true;
        fake.now = 960;
        fake.heartbeat_value = 950;
        let mut policy = policy(fake);
        assert_eq!(policy.tick(), 20);

        // Channel momentarily unreadable: falls back to the last belief.
        let fake = policy.process_mut();
        fake.now = 970;
        fake.heartbeat_value = 0;
        assert_eq!(policy.tick(), 10);
        assert_eq!(policy.last_heartbeat_time(), 950);
        assert!(policy.process_mut().kills.is_empty());
    }

    #[test]
    fn test_suspend_tolerance_no_kill_when_heartbeat_jumped_too() {
        let mut fake = FakeProcess::new();
        fake.started = true;
        fake.alive = true;
        // Wall clock jumped from ~2000 to 3000 (host suspend); the stale
        // read still shows the pre-suspend heartbeat, but the child kept
        // beating and the channel catches up during the corrective wait.
        fake.now = 3000;
        fake.heartbeat_value = 1995;
        fake.heartbeat_after_sleep = Some(3000);
        let mut policy = policy(fake);

        assert_eq!(policy.tick(), 1);
        let fake = policy.process_mut();
        assert_eq!(fake.sleeps, vec![2000]);
        assert!(fake.kills.is_empty());
    }

    #[test]
    fn test_slow_wake_tolerance_reread_catches_late_heartbeat() {
        let mut fake = FakeProcess::new();
        fake.started = true;
        fake.alive = true;
        fake.now = 3000;
        fake.heartbeat_value = 1995;
        // Child needed a moment to resume; its first post-wake heartbeat
        // lands inside the 2s corrective window.
        fake.heartbeat_after_sleep = Some(2985);
        let mut policy = policy(fake);

        // 3000 - 2985 = 15 <= 30: rescued, delay 1 so the caller re-ticks
        // almost immediately with fresh slack.
        assert_eq!(policy.tick(), 1);
        assert!(policy.process_mut().kills.is_empty());
        assert_eq!(policy.last_heartbeat_time(), 2985);

        // Next tick sees the child fully resumed.
        let fake = policy.process_mut();
        fake.now = 3001;
        fake.heartbeat_value = 3001;
        assert_eq!(policy.tick(), 30);
    }

    #[test]
    fn test_corrective_reread_still_silent_kills() {
        let mut fake = FakeProcess::new();
        fake.started = true;
        fake.alive = true;
        fake.now = 3000;
        fake.heartbeat_value = 1995;
        // No rescue: the channel stays stale through the wait.
        let mut policy = policy(fake);

        assert_eq!(policy.tick(), 1);
        let fake = policy.process_mut();
        assert_eq!(fake.kills, vec![NO_HEARTBEAT_MESSAGE.to_string()]);
    }

    #[test]
    fn test_launch_failure_retries_after_full_cooldown() {
        let mut fake = FakeProcess::new();
        fake.now = 1000;
        fake.heartbeat_value = 100;
        fake.create_result = false;
        let mut policy = policy(fake);

        assert_eq!(policy.tick(), 1);
        assert_eq!(policy.process_mut().creates, 1);
        // Baseline advanced to the failed attempt: no tight retry loop.
        assert_eq!(policy.last_heartbeat_time(), 1000);

        policy.process_mut().now = 1001;
        assert_eq!(policy.tick(), 89);
        assert_eq!(policy.process_mut().creates, 1);

        policy.process_mut().now = 1090;
        assert_eq!(policy.tick(), 1);
        assert_eq!(policy.process_mut().creates, 2);
    }

    #[test]
    fn test_child_clock_ahead_of_watchdog_is_harmless() {
        let mut fake = FakeProcess::new();
        fake.started = true;
        fake.alive = true;
        // Child's clock runs slightly ahead: heartbeat in "the future".
        fake.now = 1000;
        fake.heartbeat_value = 1003;
        let mut policy = policy(fake);

        // Silence saturates to 0; full kill period of slack.
        assert_eq!(policy.tick(), 30);
        assert!(policy.process_mut().kills.is_empty());
    }

    #[test]
    fn test_dead_child_with_recent_heartbeat_waits_out_cooldown() {
        let mut fake = FakeProcess::new();
        fake.now = 1000;
        fake.heartbeat_value = 990;
        fake.started = true;
        fake.alive = false;
        let mut policy = policy(fake);

        // Eligible at 990 + 30 + 60 = 1080.
        assert_eq!(policy.tick(), 80);
        assert_eq!(policy.process_mut().creates, 0);

        policy.process_mut().now = 1080;
        assert_eq!(policy.tick(), 1);
        assert_eq!(policy.process_mut().creates, 1);
    }
}

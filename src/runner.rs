/// The supervision loop: owns the policy, seeds startup state, enforces the
/// memory ceiling, and sleeps between ticks for however long the policy asks.
///
/// Everything here is scheduler territory the policy deliberately does not
/// own: the first launch, the startup grace period, the memory ceiling, and
/// the final kill on shutdown.
use crate::policy::WatchdogPolicy;
use crate::process::SupervisedProcess;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};

/// Operator message recorded when the memory ceiling kills the child.
pub const MEMORY_LIMIT_MESSAGE: &str = "Memory limit exceeded.";
/// Operator message recorded for the final kill on shutdown.
pub const SHUTDOWN_MESSAGE: &str = "Watchdog shutting down.";

pub struct Runner<P> {
    policy: WatchdogPolicy<P>,
    grace_period: u64,
    memory_limit: u64,
}

impl<P: SupervisedProcess> Runner<P> {
    pub fn new(policy: WatchdogPolicy<P>, grace_period: u64, memory_limit: u64) -> Self {
        Self {
            policy,
            grace_period,
            memory_limit,
        }
    }

    /// Launch the child and seed the heartbeat channel, then hand back the
    /// initial delay, sized by the grace period so the child gets time to
    /// write its first heartbeat before being judged.
    pub fn startup(&mut self) -> u64 {
        let process = self.policy.process_mut();
        process.set_status("Watchdog starting.");
        if !process.create() {
            warn!("initial child launch failed, policy will retry after cooldown");
        }
        process.heartbeat();
        self.grace_period
    }

    /// One scheduler pass: memory ceiling first, then the policy tick.
    /// Returns seconds to sleep before the next pass, clamped to >= 1
    /// since clock skew can drive the suggested delay to zero.
    pub fn pass(&mut self) -> u64 {
        if self.memory_limit > 0 {
            let process = self.policy.process_mut();
            let usage = process.get_memory_usage();
            if usage > self.memory_limit {
                warn!(usage, limit = self.memory_limit, "memory ceiling exceeded");
                process.kill(MEMORY_LIMIT_MESSAGE);
            }
        }
        self.policy.tick().max(1)
    }

    /// Stop supervising and kill the child; the watchdog owns its lifecycle.
    pub fn shutdown(&mut self) {
        info!("shutting down");
        self.policy.process_mut().kill(SHUTDOWN_MESSAGE);
    }

    /// The underlying capability, for adapter-specific teardown.
    pub fn process_mut(&mut self) -> &mut P {
        self.policy.process_mut()
    }

    /// Drive the supervision loop until SIGINT or SIGTERM, then issue the
    /// final kill. The loop is a single task; ticks are never reentrant.
    pub async fn run(&mut self) -> Result<(), std::io::Error> {
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        let mut delay = self.startup();
        info!(grace_secs = delay, "supervision loop started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(delay)) => {
                    delay = self.pass();
                }
                _ = sigint.recv() => {
                    self.shutdown();
                    return Ok(());
                }
                _ = sigterm.recv() => {
                    self.shutdown();
                    return Ok(());
                }
            }
        }
    }
}

/// Capability surface for one supervised child process.
///
/// Everything platform-specific about the child goes through this trait:
/// spawning, killing, liveness queries, the shared heartbeat channel, the
/// wall clock, and the operator-visible text sinks. The policy treats every
/// call as best-effort: failures surface through the documented sentinels
/// (`0` for unreadable values, `false` for a failed spawn), never through
/// panics or errors.
///
/// Timestamps are seconds since the Unix epoch; `0` means "unknown".
pub trait SupervisedProcess {
    /// Launch the child process. If one is already running it is killed
    /// first (launching is "stop-if-running, then start"). Returns whether
    /// the new process was spawned.
    fn create(&mut self) -> bool;

    /// Unconditionally terminate the running child, recording `reason` as
    /// operator-visible status. No-op when nothing is running.
    fn kill(&mut self, reason: &str);

    /// Whether a previously created process is still running.
    ///
    /// Conservatively `true` when no process has ever been tracked, so
    /// callers cannot mistake "never started" for "confirmed dead".
    fn is_alive(&mut self) -> bool;

    /// Whether a process has ever been created, alive or not.
    fn started(&self) -> bool;

    /// Last heartbeat timestamp the child wrote to the shared channel.
    /// `0` when the channel is unavailable, unwritten, or corrupt.
    fn get_heartbeat(&mut self) -> u64;

    /// Overwrite the heartbeat channel with an explicit timestamp.
    fn set_heartbeat(&mut self, value: u64);

    /// Write the current time to the heartbeat channel.
    fn heartbeat(&mut self);

    /// Clear the heartbeat channel.
    fn clear_heartbeat(&mut self);

    /// Wall-clock seconds since epoch as seen by this process. May differ
    /// slightly from the child's clock.
    fn get_current_time(&self) -> u64;

    /// Resident memory of the child in bytes, `0` if unavailable.
    fn get_memory_usage(&mut self) -> u64;

    /// Blocking sleep for `millis` milliseconds.
    fn sleep(&mut self, millis: u64);

    /// Operator-visible status line (current watchdog state).
    fn set_status(&mut self, msg: &str);

    /// Operator-visible message (noteworthy event).
    fn set_message(&mut self, msg: &str);

    /// Message queued for delivery on the child's next check-in.
    fn set_pending_message(&mut self, msg: &str);
}

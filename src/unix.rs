/// Unix implementation of [`SupervisedProcess`].
///
/// The child runs in its own process group so a kill takes down its whole
/// tree. The heartbeat channel is a small file the child overwrites with
/// decimal seconds since epoch; the operator sinks go to the tracing log
/// (deduplicated) and the status file.
use crate::config::ProcwatchConfig;
use crate::process::SupervisedProcess;
use crate::status::StatusWriter;
use crate::throttle::MessageThrottle;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Child, Command};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub struct UnixChildProcess {
    command: String,
    args: Vec<String>,
    heartbeat_file: PathBuf,
    child: Option<Child>,
    started: bool,
    status: StatusWriter,
    throttle: MessageThrottle,
}

impl UnixChildProcess {
    pub fn new(config: &ProcwatchConfig) -> Self {
        Self {
            command: config.child.command.clone(),
            args: config.child.args.clone(),
            heartbeat_file: config.paths.heartbeat_file.clone(),
            child: None,
            started: false,
            status: StatusWriter::new(config.paths.status_file.clone()),
            throttle: MessageThrottle::new(config.watchdog.message_suppression_secs),
        }
    }

    /// Remove the status file on clean shutdown.
    pub fn cleanup(&self) {
        self.status.remove();
    }
}

/// Resident set size of `pid` in bytes, from `/proc/<pid>/status`.
fn read_vm_rss(pid: u32) -> u64 {
    let contents = match std::fs::read_to_string(format!("/proc/{}/status", pid)) {
        Ok(c) => c,
        Err(_) => return 0,
    };
    for line in contents.lines() {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            let kb: u64 = rest
                .trim()
                .trim_end_matches("kB")
                .trim()
                .parse()
                .unwrap_or(0);
            return kb * 1024;
        }
    }
    0
}

impl SupervisedProcess for UnixChildProcess {
    fn create(&mut self) -> bool {
        if self.child.is_some() && self.is_alive() {
            self.kill("Restarting child.");
        }

        // New process group for clean kill of the whole tree.
        match Command::new(&self.command)
            .args(&self.args)
            .process_group(0)
            .spawn()
        {
            Ok(child) => {
                let pid = child.id();
                tracing::info!(pid, command = %self.command, "child process started");
                self.status.set_child_pid(Some(pid));
                self.child = Some(child);
                self.started = true;
                true
            }
            Err(e) => {
                tracing::error!(error = %e, command = %self.command, "failed to spawn child");
                false
            }
        }
    }

    fn kill(&mut self, reason: &str) {
        self.set_status(reason);
        if let Some(mut child) = self.child.take() {
            let pid = child.id();
            // Child is its own group leader, so pgid == pid.
            if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                tracing::warn!(pid, error = %e, "killpg failed, killing pid directly");
                let _ = child.kill();
            }
            let _ = child.wait();
            self.status.set_child_pid(None);
            tracing::info!(pid, reason, "child process killed");
        }
    }

    fn is_alive(&mut self) -> bool {
        let Some(child) = self.child.as_mut() else {
            // Only "confirmed dead" when something was actually started
            // and later reaped; never-started stays conservative.
            return !self.started;
        };
        match child.try_wait() {
            Ok(Some(exit)) => {
                tracing::info!(code = ?exit.code(), "child process exited");
                self.child = None;
                self.status.set_child_pid(None);
                false
            }
            Ok(None) => true,
            Err(e) => {
                tracing::warn!(error = %e, "liveness check failed, assuming alive");
                true
            }
        }
    }

    fn started(&self) -> bool {
        self.started
    }

    fn get_heartbeat(&mut self) -> u64 {
        match std::fs::read_to_string(&self.heartbeat_file) {
            Ok(contents) => contents.trim().parse().unwrap_or(0),
            Err(_) => 0,
        }
    }

    fn set_heartbeat(&mut self, value: u64) {
        if let Err(e) = std::fs::write(&self.heartbeat_file, value.to_string()) {
            tracing::warn!(error = %e, path = %self.heartbeat_file.display(), "heartbeat write failed");
        }
    }

    fn heartbeat(&mut self) {
        let now = self.get_current_time();
        self.set_heartbeat(now);
    }

    fn clear_heartbeat(&mut self) {
        let _ = std::fs::remove_file(&self.heartbeat_file);
    }

    fn get_current_time(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    fn get_memory_usage(&mut self) -> u64 {
        match self.child.as_ref() {
            Some(child) => read_vm_rss(child.id()),
            None => 0,
        }
    }

    fn sleep(&mut self, millis: u64) {
        std::thread::sleep(Duration::from_millis(millis));
    }

    fn set_status(&mut self, msg: &str) {
        let now = self.get_current_time();
        if self.throttle.should_emit(msg, now) {
            tracing::info!(status = msg, "watchdog status");
        }
        self.status.set_status(msg);
    }

    fn set_message(&mut self, msg: &str) {
        let now = self.get_current_time();
        if self.throttle.should_emit(msg, now) {
            tracing::info!(message = msg, "watchdog message");
        }
        self.status.set_message(msg);
    }

    fn set_pending_message(&mut self, msg: &str) {
        self.status.set_pending_message(msg);
    }
}

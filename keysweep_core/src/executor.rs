use crate::candidate::Candidate;
use crate::config::ExecutorSettings;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How a single unlock attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// The unlock program exited cleanly with status zero; the volume is mounted.
    Unlocked,
    /// The unlock program exited with a failure status.
    Rejected(String),
    /// The attempt ran past its time budget and was killed.
    Timeout,
    /// The attempt could not be carried out at all (spawn or wait failure).
    Other(String),
}

/// The two attempt classes recorded in a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    /// Classifies an execution status. `Other` is not an attempt outcome and
    /// yields `None`: nothing was tried, so nothing may be recorded.
    pub fn from_status(status: &ExecutionStatus) -> Option<Self> {
        match status {
            ExecutionStatus::Unlocked => Some(Outcome::Success),
            ExecutionStatus::Rejected(_) | ExecutionStatus::Timeout => Some(Outcome::Failure),
            ExecutionStatus::Other(_) => None,
        }
    }
}

/// The resource under attack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Target identity; the volume path handed to the unlock program.
    pub identity: String,
    /// Where the volume is mounted on success.
    pub mount_point: PathBuf,
}

impl Target {
    pub fn new(identity: impl Into<String>, mount_point: impl Into<PathBuf>) -> Self {
        Self {
            identity: identity.into(),
            mount_point: mount_point.into(),
        }
    }
}

/// Performs exactly one unlock attempt per call. No retries.
pub trait AttemptExecutor {
    fn attempt(&mut self, target: &Target, candidate: &Candidate) -> ExecutionStatus;
}

/// Runs the attempt through a closure instead of an external program.
pub struct InProcessExecutor<F>
where
    F: FnMut(&Target, &Candidate) -> ExecutionStatus,
{
    attempt_fn: F,
}

impl<F> InProcessExecutor<F>
where
    F: FnMut(&Target, &Candidate) -> ExecutionStatus,
{
    pub fn new(attempt_fn: F) -> Self {
        Self { attempt_fn }
    }
}

impl<F> AttemptExecutor for InProcessExecutor<F>
where
    F: FnMut(&Target, &Candidate) -> ExecutionStatus,
{
    fn attempt(&mut self, target: &Target, candidate: &Candidate) -> ExecutionStatus {
        (self.attempt_fn)(target, candidate)
    }
}

pub struct CommandExecutorConfig {
    /// Program followed by any leading arguments, e.g. `["sudo", "veracrypt"]`.
    pub command: Vec<String>,
    pub timeout: Option<Duration>,
}

impl From<&ExecutorSettings> for CommandExecutorConfig {
    fn from(settings: &ExecutorSettings) -> Self {
        Self {
            command: settings.command.clone(),
            timeout: settings.timeout_ms.map(Duration::from_millis),
        }
    }
}

/// Invokes the volume-encryption tool in text mode, one process per attempt.
pub struct CommandExecutor {
    config: CommandExecutorConfig,
}

impl CommandExecutor {
    const POLL_INTERVAL: Duration = Duration::from_millis(50);

    pub fn new(config: CommandExecutorConfig) -> Self {
        Self { config }
    }

    /// Full argument list after the program name for one attempt.
    pub fn attempt_args(&self, target: &Target, candidate: &Candidate) -> Vec<String> {
        let mut args: Vec<String> = self.config.command.iter().skip(1).cloned().collect();
        args.extend([
            "--text".to_string(),
            format!("--password={candidate}"),
            "--protect-hidden=no".to_string(),
            "--keyfiles=".to_string(),
            // Prevents re-prompting for the password on failure.
            "--non-interactive".to_string(),
            target.identity.clone(),
            target.mount_point.to_string_lossy().into_owned(),
        ]);
        args
    }

    fn wait_with_timeout(
        &self,
        mut child: Child,
        timeout: Duration,
    ) -> Result<ExitStatus, ExecutionStatus> {
        let start_time = Instant::now();

        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) => {
                    if start_time.elapsed() > timeout {
                        warn!("Unlock attempt exceeded {timeout:?}, killing");
                        if let Err(e) = child.kill() {
                            return Err(ExecutionStatus::Other(format!(
                                "Failed to kill timed-out process: {e}",
                            )));
                        }
                        if let Err(e) = child.wait() {
                            debug!("Failed to reap timed-out unlock process: {e}");
                        }
                        return Err(ExecutionStatus::Timeout);
                    }
                    std::thread::sleep(Self::POLL_INTERVAL);
                }
                Err(e) => {
                    return Err(ExecutionStatus::Other(format!(
                        "Error waiting for unlock process: {e}",
                    )));
                }
            }
        }
    }

    fn describe_failure(status: ExitStatus) -> String {
        if let Some(code) = status.code() {
            return format!("Exited with code {code}");
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return format!("Terminated by signal {signal}");
            }
        }
        "Exited abnormally".to_string()
    }
}

impl AttemptExecutor for CommandExecutor {
    fn attempt(&mut self, target: &Target, candidate: &Candidate) -> ExecutionStatus {
        let Some(program) = self.config.command.first() else {
            return ExecutionStatus::Other("Unlock command is empty".to_string());
        };

        let mut cmd = Command::new(program);
        cmd.args(self.attempt_args(target, candidate))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return ExecutionStatus::Other(format!(
                    "Failed to spawn command '{:?}': {}",
                    self.config.command, e
                ));
            }
        };

        let exit_status = match self.config.timeout {
            Some(timeout) => match self.wait_with_timeout(child, timeout) {
                Ok(status) => status,
                Err(status) => return status,
            },
            None => {
                let mut child = child;
                match child.wait() {
                    Ok(status) => status,
                    Err(e) => {
                        return ExecutionStatus::Other(format!(
                            "Error waiting for unlock process: {e}"
                        ));
                    }
                }
            }
        };

        if exit_status.success() {
            ExecutionStatus::Unlocked
        } else {
            let desc = Self::describe_failure(exit_status);
            debug!("Unlock program rejected candidate: {desc}");
            ExecutionStatus::Rejected(desc)
        }
    }
}


#[cfg(all(test, unix))]
mod command_executor_tests {
    use super::*;

    fn get_test_target_path(name: &str) -> PathBuf {
        let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        manifest_dir.join("../test_targets").join(name)
    }

    fn script_executor(name: &str, timeout: Option<Duration>) -> CommandExecutor {
        let target_path = get_test_target_path(name);
        if !target_path.exists() {
            panic!("Test target missing: {target_path:?}");
        }
        CommandExecutor::new(CommandExecutorConfig {
            command: vec!["sh".to_string(), target_path.to_str().unwrap().to_string()],
            timeout,
        })
    }

    fn target() -> Target {
        Target::new("/dev/test-volume", "/mnt/test")
    }

    #[test]
    fn attempt_args_carry_fixed_flags_in_order() {
        let executor = CommandExecutor::new(CommandExecutorConfig {
            command: vec!["sudo".to_string(), "veracrypt".to_string()],
            timeout: None,
        });
        let args = executor.attempt_args(&target(), &Candidate::from("cat horse"));
        assert_eq!(
            args,
            vec![
                "veracrypt",
                "--text",
                "--password=cat horse",
                "--protect-hidden=no",
                "--keyfiles=",
                "--non-interactive",
                "/dev/test-volume",
                "/mnt/test",
            ]
        );
    }

    #[test]
    fn cmd_exec_zero_exit_is_unlocked() {
        let mut executor = script_executor("unlock_ok.sh", Some(Duration::from_secs(5)));
        let status = executor.attempt(&target(), &Candidate::from("anything"));
        assert_eq!(status, ExecutionStatus::Unlocked);
    }

    #[test]
    fn cmd_exec_nonzero_exit_is_rejected() {
        let mut executor = script_executor("unlock_reject.sh", None);
        match executor.attempt(&target(), &Candidate::from("anything")) {
            ExecutionStatus::Rejected(desc) => {
                assert!(desc.contains("code 1"), "Unexpected desc: {desc}");
            }
            other => panic!("Expected Rejected, got {other:?}"),
        }
    }

    #[test]
    fn cmd_exec_checks_password_argument() {
        let mut executor = script_executor("unlock_password.sh", Some(Duration::from_secs(5)));
        assert_eq!(
            executor.attempt(&target(), &Candidate::from("open sesame")),
            ExecutionStatus::Unlocked
        );
        assert!(matches!(
            executor.attempt(&target(), &Candidate::from("open says me")),
            ExecutionStatus::Rejected(_)
        ));
    }

    #[test]
    fn cmd_exec_timeout() {
        // test: 100ms, script: 5s
        let mut executor = script_executor("unlock_hang.sh", Some(Duration::from_millis(100)));
        let start = Instant::now();
        let status = executor.attempt(&target(), &Candidate::from("slow"));
        assert_eq!(status, ExecutionStatus::Timeout);
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn cmd_exec_invalid_command() {
        let mut executor = CommandExecutor::new(CommandExecutorConfig {
            command: vec!["./this_command_does_not_exist_ever_12345".to_string()],
            timeout: Some(Duration::from_secs(1)),
        });
        match executor.attempt(&target(), &Candidate::from("x")) {
            ExecutionStatus::Other(msg) => assert!(msg.contains("Failed to spawn command")),
            other => panic!("Expected Other for invalid command, got {other:?}"),
        }
    }

    #[test]
    fn cmd_exec_empty_command() {
        let mut executor = CommandExecutor::new(CommandExecutorConfig {
            command: Vec::new(),
            timeout: None,
        });
        assert!(matches!(
            executor.attempt(&target(), &Candidate::from("x")),
            ExecutionStatus::Other(_)
        ));
    }
}

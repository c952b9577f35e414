//! External command execution behind a trait, so `nft` calls can be mocked.

use anyhow::{Context, Result};
use std::process::{Command, Stdio};

#[cfg(test)]
use mockall::automock;

/// Captured result of a finished command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code 0
    pub success: bool,
    /// None when the process was killed by a signal
    pub code: Option<i32>,
}

impl CommandOutput {
    /// Best human-readable reason for a failure: stderr, else stdout, else the exit code.
    pub fn failure_reason(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        match self.code {
            Some(code) => format!("exit code {}", code),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Runs external programs.
///
/// Arguments are `&[String]` rather than `&[&str]`: mockall cannot express
/// the nested lifetime of the latter.
#[cfg_attr(test, automock)]
pub trait CommandExecutor: Send + Sync {
    /// Run `cmd` with `args` and wait for it to exit.
    ///
    /// An `Err` means the process could not be started; a non-zero exit is
    /// reported through [`CommandOutput::success`].
    fn execute(&self, cmd: &str, args: &[String]) -> Result<CommandOutput>;
}

/// Executor backed by `std::process::Command`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealCommandExecutor;

impl CommandExecutor for RealCommandExecutor {
    fn execute(&self, cmd: &str, args: &[String]) -> Result<CommandOutput> {
        let output = Command::new(cmd)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .with_context(|| format!("Failed to run {}", cmd))?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            success: output.status.success(),
            code: output.status.code(),
        })
    }
}

pub fn args_to_strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_to_strings() {
        assert_eq!(
            args_to_strings(&["-f", "/etc/intelsync/blacklist.nft"]),
            vec!["-f", "/etc/intelsync/blacklist.nft"]
        );
        assert!(args_to_strings(&[]).is_empty());
    }

    #[test]
    fn test_failure_reason_prefers_stderr() {
        let output = CommandOutput {
            stdout: "out".into(),
            stderr: "Error: syntax error\n".into(),
            success: false,
            code: Some(1),
        };
        assert_eq!(output.failure_reason(), "Error: syntax error");
    }

    #[test]
    fn test_failure_reason_fallbacks() {
        let output = CommandOutput {
            stdout: "  only stdout ".into(),
            code: Some(1),
            ..Default::default()
        };
        assert_eq!(output.failure_reason(), "only stdout");

        let output = CommandOutput {
            code: Some(3),
            ..Default::default()
        };
        assert_eq!(output.failure_reason(), "exit code 3");

        assert_eq!(CommandOutput::default().failure_reason(), "terminated by signal");
    }

    #[test]
    fn test_real_executor_echo() {
        let output = RealCommandExecutor
            .execute("echo", &args_to_strings(&["-n", "hello"]))
            .unwrap();
        assert!(output.success);
        assert_eq!(output.stdout, "hello");
        assert_eq!(output.code, Some(0));
    }

    #[test]
    fn test_real_executor_non_zero_exit() {
        let output = RealCommandExecutor
            .execute("ls", &args_to_strings(&["--invalid-flag"]))
            .unwrap();
        assert!(!output.success);
        assert!(!output.stderr.is_empty());
    }

    #[test]
    fn test_real_executor_missing_binary() {
        let result = RealCommandExecutor.execute("/nonexistent/intelsync-nft", &[]);
        assert!(result.is_err());
    }

    #[test]
    fn test_mock_executor() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .withf(|cmd, args| cmd == "nft" && args == ["flush".to_string(), "ruleset".to_string()])
            .times(1)
            .returning(|_, _| {
                Ok(CommandOutput {
                    success: true,
                    code: Some(0),
                    ..Default::default()
                })
            });

        let output = mock
            .execute("nft", &args_to_strings(&["flush", "ruleset"]))
            .unwrap();
        assert!(output.success);
    }
}

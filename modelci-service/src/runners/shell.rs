// Shell Runner
// Spawns step commands, streams their output and enforces the step timeout

use super::{OutputSink, StepCommand, StepRunner};

use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

/// Configuration for command execution
#[derive(Debug, Clone, Default)]
pub struct ShellConfig {
    /// Timeout per command (None = no timeout)
    pub timeout: Option<Duration>,
}

/// Output collected during command execution
#[derive(Debug, Clone, Default)]
pub struct ShellOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code (None if the process could not be spawned, timed out or was signalled)
    pub exit_code: Option<i32>,
}

impl ShellOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    fn failed_to_start(message: String) -> Self {
        Self {
            stdout: String::new(),
            stderr: message,
            exit_code: None,
        }
    }
}

/// Runs step commands as child processes
#[derive(Debug, Clone, Default)]
pub struct ShellRunner {
    config: ShellConfig,
}

impl ShellRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ShellConfig) -> Self {
        Self { config }
    }
}

#[async_trait::async_trait]
impl StepRunner for ShellRunner {
    async fn run(&self, command: &StepCommand, on_output: OutputSink<'_>) -> ShellOutput {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args);
        cmd.current_dir(&command.working_dir);
        cmd.envs(&command.env);
        for binding in &command.secrets {
            cmd.env(&binding.env_name, binding.token.expose());
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        // Cancelling the job future must not leave processes behind
        cmd.kill_on_drop(true);

        debug!(command = %command, dir = %command.working_dir.display(), "spawning");

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return ShellOutput::failed_to_start(format!(
                    "Failed to spawn process '{}': {}",
                    command.program, e
                ));
            }
        };

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return ShellOutput::failed_to_start(format!(
                "Output pipes unavailable for '{}'",
                command.program
            ));
        };

        let collect = async {
            tokio::join!(
                read_lines(stdout, |line| on_output(line, false)),
                read_lines(stderr, |line| on_output(line, true)),
                child.wait(),
            )
        };

        let timeout = self.config.timeout;
        let finished = match timeout {
            Some(limit) => tokio::time::timeout(limit, collect).await.ok(),
            None => Some(collect.await),
        };

        let Some((stdout, stderr, status)) = finished else {
            let _ = child.kill().await;
            let limit = timeout.unwrap_or_default();
            warn!(command = %command, ?limit, "command timed out");
            return ShellOutput {
                stdout: String::new(),
                stderr: format!("Process timed out after {:?}", limit),
                exit_code: None,
            };
        };

        ShellOutput {
            stdout,
            stderr,
            exit_code: status.ok().and_then(|s| s.code()),
        }
    }
}

/// Read a stream line by line until EOF, forwarding each line and collecting the whole text.
///
/// Bytes that are not valid UTF-8 are replaced, never treated as the end of output.
async fn read_lines<R>(reader: R, on_line: impl Fn(&str)) -> String
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut output = String::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf);
                let line = text.strip_suffix('\n').unwrap_or(&text);
                let line = line.strip_suffix('\r').unwrap_or(line);
                on_line(line);
                if !output.is_empty() {
                    output.push('\n');
                }
                output.push_str(line);
            }
            Err(e) => {
                debug!(error = %e, "output stream closed");
                break;
            }
        }
    }
    output
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::checkpoint::SecretToken;

    use std::collections::HashMap;
    use std::sync::Mutex;

    fn sh(script: &str) -> StepCommand {
        StepCommand::new(
            "sh",
            vec!["-c".to_string(), script.to_string()],
            &std::env::current_dir().unwrap(),
        )
    }

    fn ignore(_: &str, _: bool) {}

    #[tokio::test]
    async fn test_shell_runner_echo() {
        let output = ShellRunner::new().run(&sh("echo hello"), &ignore).await;

        assert_eq!(output.exit_code, Some(0));
        assert!(output.success());
        assert!(output.stdout.contains("hello"));
        assert!(output.stderr.is_empty());
    }

    #[tokio::test]
    async fn test_shell_runner_with_env() {
        let mut env = HashMap::new();
        env.insert("MY_VAR".to_string(), "test_value".to_string());
        let cmd = sh("echo $MY_VAR").with_env(&env);

        let output = ShellRunner::new().run(&cmd, &ignore).await;

        assert_eq!(output.exit_code, Some(0));
        assert!(output.stdout.contains("test_value"));
    }

    #[tokio::test]
    async fn test_shell_runner_exit_code() {
        let output = ShellRunner::new().run(&sh("exit 42"), &ignore).await;
        assert_eq!(output.exit_code, Some(42));
        assert!(!output.success());
    }

    #[tokio::test]
    async fn test_shell_runner_stderr_is_streamed() {
        let lines = Mutex::new(Vec::new());
        let sink = |line: &str, is_error: bool| {
            lines.lock().unwrap().push((line.to_string(), is_error));
        };

        let output = ShellRunner::new()
            .run(&sh("echo out; echo err >&2"), &sink)
            .await;

        assert_eq!(output.exit_code, Some(0));
        assert!(output.stderr.contains("err"));
        let lines = lines.into_inner().unwrap();
        assert!(lines.contains(&("out".to_string(), false)));
        assert!(lines.contains(&("err".to_string(), true)));
    }

    #[tokio::test]
    async fn test_shell_runner_spawn_failure() {
        let cmd = StepCommand::new(
            "definitely-not-a-real-program-xyz",
            Vec::new(),
            &std::env::current_dir().unwrap(),
        );
        let output = ShellRunner::new().run(&cmd, &ignore).await;

        assert_eq!(output.exit_code, None);
        assert!(output.stderr.contains("Failed to spawn"));
    }

    #[tokio::test]
    async fn test_shell_runner_timeout() {
        let runner = ShellRunner::with_config(ShellConfig {
            timeout: Some(Duration::from_millis(200)),
        });
        let output = runner.run(&sh("sleep 5"), &ignore).await;

        assert_eq!(output.exit_code, None);
        assert!(output.stderr.contains("timed out"));
    }

    #[tokio::test]
    async fn test_invalid_utf8_output_is_drained() {
        let script = "printf '\\377\\n'; head -c 300000 /dev/zero | tr '\\0' a; echo; echo done";
        let output = ShellRunner::new().run(&sh(script), &ignore).await;

        assert_eq!(output.exit_code, Some(0));
        assert!(output.stdout.starts_with('\u{FFFD}'));
        assert!(output.stdout.ends_with("done"));
        assert!(output.stdout.len() > 300_000);
    }

    #[tokio::test]
    async fn test_crlf_is_stripped() {
        let lines = Mutex::new(Vec::new());
        let sink = |line: &str, _: bool| lines.lock().unwrap().push(line.to_string());

        ShellRunner::new().run(&sh("printf 'a\\r\\nb'"), &sink).await;

        assert_eq!(lines.into_inner().unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_secret_is_only_in_child_env() {
        let token = SecretToken::new("s3cr3t-value").unwrap();
        let cmd = sh("test \"$HF_TOKEN\" = s3cr3t-value").with_secret("HF_TOKEN", token);

        let output = ShellRunner::new().run(&cmd, &ignore).await;
        assert_eq!(output.exit_code, Some(0));
        assert!(std::env::var("HF_TOKEN").map_or(true, |v| v != "s3cr3t-value"));
    }
}

//! Subprocess execution for helmfile, kubectl, git and kpt.
//!
//! Every external tool goes through [`CommandRunner`] so flows can be driven
//! by a recording fake in tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Child;
use tokio::task::JoinHandle;

use crate::error::{PreviewError, Result};

/// Captured output is truncated to this many trailing bytes per stream.
const MAX_CAPTURE: usize = 65536;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Command {
    pub name: String,
    pub args: Vec<String>,
    pub dir: Option<PathBuf>,
    /// Added on top of the inherited process environment.
    pub env: BTreeMap<String, String>,
    pub stdin: Option<String>,
    /// Stream stdout/stderr to the terminal instead of capturing them.
    pub inherit_output: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

impl Command {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn envs(mut self, env: &BTreeMap<String, String>) -> Self {
        self.env
            .extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn inherit_output(mut self) -> Self {
        self.inherit_output = true;
        self
    }

    /// The command line as a user would type it.
    pub fn cli(&self) -> String {
        std::iter::once(self.name.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Receives each output line of a spawned command.
pub type LineSink = Arc<dyn Fn(OutputStream, &str) + Send + Sync>;

/// A command left running in the background.
#[async_trait]
pub trait RunningCommand: Send {
    /// Terminate the command; its exit status is ignored.
    async fn kill(&mut self);
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion. A non-zero exit is a [`PreviewError::CommandFailed`].
    async fn run(&self, command: &Command) -> Result<CommandOutput>;

    /// Start a long-running command, feeding its output lines to `sink`.
    fn spawn(&self, command: &Command, sink: LineSink) -> Result<Box<dyn RunningCommand>>;
}

/// Runs commands as real child processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, command: &Command) -> Result<CommandOutput> {
        let cli = command.cli();
        tracing::debug!(command = %cli, dir = ?command.dir, "Running command");

        let mut cmd = tokio::process::Command::new(&command.name);
        cmd.args(&command.args).envs(&command.env);
        if let Some(dir) = &command.dir {
            cmd.current_dir(dir);
        }
        if command.inherit_output {
            cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        } else {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        }
        cmd.stdin(if command.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

        let mut child = cmd.spawn().map_err(|e| PreviewError::CommandFailed {
            command: cli.clone(),
            exit_code: None,
            message: format!("failed to execute command: {e}"),
        })?;

        if let (Some(input), Some(mut stdin)) = (&command.stdin, child.stdin.take()) {
            stdin
                .write_all(input.as_bytes())
                .await
                .map_err(|e| PreviewError::io(format!("failed to write stdin of {cli}"), e))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| PreviewError::io(format!("failed to wait for {cli}"), e))?;

        let stdout = truncate_tail(String::from_utf8_lossy(&output.stdout).to_string());
        let stderr = truncate_tail(String::from_utf8_lossy(&output.stderr).to_string());

        if !output.status.success() {
            let code = output.status.code();
            return Err(PreviewError::CommandFailed {
                command: cli,
                exit_code: code,
                message: failure_message(&stdout, &stderr, code),
            });
        }

        Ok(CommandOutput { stdout, stderr })
    }

    fn spawn(&self, command: &Command, sink: LineSink) -> Result<Box<dyn RunningCommand>> {
        let cli = command.cli();
        tracing::debug!(command = %cli, "Spawning command");

        let mut cmd = tokio::process::Command::new(&command.name);
        cmd.args(&command.args)
            .envs(&command.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &command.dir {
            cmd.current_dir(dir);
        }
        let mut child = cmd.spawn().map_err(|e| PreviewError::CommandFailed {
            command: cli.clone(),
            exit_code: None,
            message: format!("failed to execute command: {e}"),
        })?;

        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(forward_lines(stdout, OutputStream::Stdout, sink.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(forward_lines(stderr, OutputStream::Stderr, sink)));
        }
        Ok(Box::new(ChildProcess { cli, child, readers }))
    }
}

struct ChildProcess {
    cli: String,
    child: Child,
    readers: Vec<JoinHandle<()>>,
}

#[async_trait]
impl RunningCommand for ChildProcess {
    async fn kill(&mut self) {
        if let Err(e) = self.child.kill().await {
            tracing::debug!(command = %self.cli, "Process already exited: {e}");
        }
        for reader in self.readers.drain(..) {
            reader.abort();
        }
    }
}

async fn forward_lines<R: AsyncRead + Unpin>(reader: R, stream: OutputStream, sink: LineSink) {
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        sink(stream, &line);
    }
}

fn truncate_tail(text: String) -> String {
    if text.len() <= MAX_CAPTURE {
        return text;
    }
    let mut start = text.len() - MAX_CAPTURE;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("...truncated...\n{}", &text[start..])
}

/// Prefer stderr, fall back to stdout, then to the exit status.
pub fn failure_message(stdout: &str, stderr: &str, code: Option<i32>) -> String {
    let stderr = stderr.trim();
    let stdout = stdout.trim();
    match (stderr.is_empty(), stdout.is_empty()) {
        (false, true) => stderr.to_string(),
        (false, false) => format!("{stderr}\n{stdout}"),
        (true, false) => stdout.to_string(),
        (true, true) => match code {
            Some(code) => format!("exit status {code}"),
            None => "terminated by signal".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_renders_name_and_args() {
        let cmd = Command::new("helmfile")
            .args(["--file", "preview/helmfile.yaml.gotmpl"])
            .arg("sync");
        assert_eq!(cmd.cli(), "helmfile --file preview/helmfile.yaml.gotmpl sync");
    }

    #[test]
    fn failure_message_prefers_stderr() {
        assert_eq!(failure_message("out", "err", Some(1)), "err\nout");
        assert_eq!(failure_message("out\n", "  ", Some(1)), "out");
        assert_eq!(failure_message("", "", Some(3)), "exit status 3");
    }

    #[test]
    fn truncation_keeps_the_tail() {
        let long = "a".repeat(MAX_CAPTURE) + "tail";
        let cut = truncate_tail(long);
        assert!(cut.starts_with("...truncated..."));
        assert!(cut.ends_with("tail"));
    }

    #[tokio::test]
    async fn process_runner_captures_stdout() {
        let out = ProcessRunner
            .run(&Command::new("sh").args(["-c", "echo hello"]))
            .await
            .unwrap();
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn process_runner_reports_non_zero_exit() {
        let err = ProcessRunner
            .run(&Command::new("sh").args(["-c", "echo broken >&2; exit 4"]))
            .await
            .unwrap_err();
        match err {
            PreviewError::CommandFailed { exit_code, message, .. } => {
                assert_eq!(exit_code, Some(4));
                assert_eq!(message, "broken");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn process_runner_feeds_stdin_and_env() {
        let mut env = BTreeMap::new();
        env.insert("GREETING".to_string(), "hi".to_string());
        let out = ProcessRunner
            .run(
                &Command::new("sh")
                    .args(["-c", "read line; echo \"$GREETING $line\""])
                    .envs(&env)
                    .stdin("there\n"),
            )
            .await
            .unwrap();
        assert_eq!(out.stdout.trim(), "hi there");
    }

    #[tokio::test]
    async fn spawned_command_streams_lines_until_killed() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink: LineSink = {
            let seen = seen.clone();
            Arc::new(move |stream: OutputStream, line: &str| {
                seen.lock().unwrap().push((stream, line.to_string()));
            })
        };
        let mut running = ProcessRunner
            .spawn(
                &Command::new("sh").args(["-c", "echo first; echo oops >&2; sleep 30"]),
                sink,
            )
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        running.kill().await;

        let seen = seen.lock().unwrap().clone();
        assert!(seen.contains(&(OutputStream::Stdout, "first".to_string())));
        assert!(seen.contains(&(OutputStream::Stderr, "oops".to_string())));
    }

    #[tokio::test]
    async fn spawning_a_missing_binary_fails() {
        let sink: LineSink = Arc::new(|_: OutputStream, _: &str| {});
        let err = ProcessRunner
            .spawn(&Command::new("/nonexistent/kubectl"), sink)
            .map(|_| ())
            .unwrap_err();
        assert!(matches!(err, PreviewError::CommandFailed { exit_code: None, .. }));
    }
}

//! Runs one external tool: launch, stream output, poll for exit or cancellation.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::sync::mpsc;

use super::lines::{pump_lines, Stream};
use super::registry::ProcessRegistry;
use crate::control::AbortToken;
use crate::error::JobError;

/// Lines kept per stream for diagnostics.
const TAIL_LINES: usize = 32;
/// How long to keep reading output after exit (helpers may hold the pipe).
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// One invocation of an external tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    /// Short name used in logs and error messages (`yt-dlp`, `ffmpeg`).
    pub tool: String,
    pub exe: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

/// Last lines a successful run printed.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

#[derive(Default)]
struct Tails {
    stdout: VecDeque<String>,
    stderr: VecDeque<String>,
}

impl Tails {
    fn push(&mut self, stream: Stream, line: String) {
        let q = match stream {
            Stream::Stdout => &mut self.stdout,
            Stream::Stderr => &mut self.stderr,
        };
        if q.len() == TAIL_LINES {
            q.pop_front();
        }
        q.push_back(line);
    }

    /// stderr, else stdout, else the exit code.
    fn diagnostic(&self, code: Option<i32>) -> String {
        for q in [&self.stderr, &self.stdout] {
            let errors: Vec<&str> = q
                .iter()
                .map(|l| l.trim())
                .filter(|l| l.starts_with("ERROR"))
                .collect();
            if let Some(last) = errors.last() {
                return (*last).to_string();
            }
            let recent: Vec<&str> = q
                .iter()
                .rev()
                .map(|l| l.trim())
                .filter(|l| !l.is_empty())
                .take(3)
                .collect();
            if !recent.is_empty() {
                return recent.into_iter().rev().collect::<Vec<_>>().join("\n");
            }
        }
        match code {
            Some(c) => format!("exited with code {c}"),
            None => "exited with code unknown (terminated by signal)".to_string(),
        }
    }

    fn into_output(self) -> ToolOutput {
        ToolOutput {
            stdout: self.stdout.into(),
            stderr: self.stderr.into(),
        }
    }
}

/// Launches tools for jobs and reports a typed outcome.
pub struct ProcessSupervisor<'a> {
    registry: &'a ProcessRegistry,
    poll_interval: Duration,
}

impl<'a> ProcessSupervisor<'a> {
    pub fn new(registry: &'a ProcessRegistry, poll_interval: Duration) -> Self {
        Self {
            registry,
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }

    /// Runs `cmd` for `item_id` to completion.
    ///
    /// Every stdout/stderr line is passed to `on_line` as it arrives. The exit
    /// status is polled each `poll_interval`; if `abort` is set (or the registry
    /// kills the process) the child is killed and `JobError::Cancelled` returned.
    pub async fn run<F>(
        &self,
        item_id: &str,
        cmd: &ToolCommand,
        abort: &AbortToken,
        mut on_line: F,
    ) -> Result<ToolOutput, JobError>
    where
        F: FnMut(&str),
    {
        if abort.is_aborted() {
            return Err(JobError::Cancelled);
        }

        let mut command = Command::new(&cmd.exe);
        command
            .args(&cmd.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &cmd.cwd {
            command.current_dir(cwd);
        }
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => JobError::ToolNotFound {
                tool: cmd.tool.clone(),
                hint: Some(cmd.exe.display().to_string()),
            },
            _ => JobError::LaunchFailed {
                exe: cmd.exe.clone(),
                source: e,
            },
        })?;

        let registration = self.registry.add(
            item_id,
            cmd.exe.clone(),
            cmd.args.clone(),
            cmd.cwd.clone(),
            child.id(),
        );
        tracing::debug!(item_id, tool = %cmd.tool, pid = ?child.id(), "launched");

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut pumps = Vec::with_capacity(2);
        if let Some(out) = child.stdout.take() {
            pumps.push(tokio::spawn(pump_lines(out, Stream::Stdout, tx.clone())));
        }
        if let Some(err) = child.stderr.take() {
            pumps.push(tokio::spawn(pump_lines(err, Stream::Stderr, tx.clone())));
        }
        drop(tx);

        let mut tails = Tails::default();
        let mut lines_open = true;
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let status = loop {
            tokio::select! {
                line = rx.recv(), if lines_open => match line {
                    Some((stream, line)) => {
                        on_line(&line);
                        tails.push(stream, line);
                    }
                    None => lines_open = false,
                },
                _ = ticker.tick() => {
                    if abort.is_aborted() || registration.handle().kill_requested() {
                        registration.handle().kill();
                        let _ = child.start_kill();
                        let _ = child.wait().await;
                        for p in &pumps {
                            p.abort();
                        }
                        tracing::debug!(item_id, tool = %cmd.tool, "killed on cancellation");
                        return Err(JobError::Cancelled);
                    }
                    match child.try_wait() {
                        Ok(Some(status)) => break status,
                        Ok(None) => {}
                        Err(e) => {
                            let _ = child.start_kill();
                            let _ = child.wait().await;
                            for p in &pumps {
                                p.abort();
                            }
                            return Err(JobError::io(format!("wait for {}", cmd.tool), e));
                        }
                    }
                }
            }
        };
        registration.handle().mark_exited();

        if lines_open {
            let _ = tokio::time::timeout(DRAIN_TIMEOUT, async {
                while let Some((stream, line)) = rx.recv().await {
                    on_line(&line);
                    tails.push(stream, line);
                }
            })
            .await;
        }
        for p in &pumps {
            p.abort();
        }

        if status.success() {
            tracing::debug!(item_id, tool = %cmd.tool, "exited cleanly");
            return Ok(tails.into_output());
        }
        if abort.is_aborted() || registration.handle().kill_requested() {
            return Err(JobError::Cancelled);
        }
        let code = status.code();
        Err(JobError::NonZeroExit {
            tool: cmd.tool.clone(),
            code,
            diagnostic: tails.diagnostic(code),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> ToolCommand {
        ToolCommand {
            tool: "sh".to_string(),
            exe: PathBuf::from("/bin/sh"),
            args: vec!["-c".to_string(), script.to_string()],
            cwd: None,
        }
    }

    fn supervisor(reg: &ProcessRegistry) -> ProcessSupervisor<'_> {
        ProcessSupervisor::new(reg, Duration::from_millis(20))
    }

    #[tokio::test]
    async fn streams_lines_and_succeeds() {
        let reg = ProcessRegistry::new();
        let mut seen = Vec::new();
        let out = supervisor(&reg)
            .run(
                "a",
                &sh("echo '[download]  10.0%'; printf 'time=1\\rtime=2\\n' >&2"),
                &AbortToken::new(),
                |l| seen.push(l.to_string()),
            )
            .await
            .unwrap();
        assert!(seen.contains(&"[download]  10.0%".to_string()));
        assert!(seen.contains(&"time=1".to_string()));
        assert!(seen.contains(&"time=2".to_string()));
        assert_eq!(out.stdout, vec!["[download]  10.0%"]);
        assert_eq!(reg.live_count(), 0);
    }

    #[tokio::test]
    async fn non_zero_exit_uses_stderr_then_stdout_then_code() {
        let reg = ProcessRegistry::new();
        let sup = supervisor(&reg);

        let err = sup
            .run("a", &sh("echo out; echo 'ERROR: no video' >&2; exit 3"), &AbortToken::new(), |_| {})
            .await
            .unwrap_err();
        match err {
            JobError::NonZeroExit { code, diagnostic, .. } => {
                assert_eq!(code, Some(3));
                assert_eq!(diagnostic, "ERROR: no video");
            }
            other => panic!("unexpected {other:?}"),
        }

        let err = sup
            .run("a", &sh("echo only-stdout; exit 1"), &AbortToken::new(), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::NonZeroExit { ref diagnostic, .. } if diagnostic == "only-stdout"));

        let err = sup
            .run("a", &sh("exit 7"), &AbortToken::new(), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::NonZeroExit { ref diagnostic, .. } if diagnostic == "exited with code 7"));
        assert_eq!(reg.live_count(), 0);
    }

    #[tokio::test]
    async fn abort_kills_and_reports_cancelled() {
        let reg = ProcessRegistry::new();
        let abort = AbortToken::new();
        let trigger = abort.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.abort();
        });
        let started = std::time::Instant::now();
        let err = supervisor(&reg)
            .run("a", &sh("sleep 30"), &abort, |_| {})
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(reg.live_count(), 0);
    }

    #[tokio::test]
    async fn registry_kill_reports_cancelled() {
        let reg = ProcessRegistry::new();
        let sup = supervisor(&reg);
        let killer = async {
            loop {
                if reg.kill_job("victim") > 0 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        let cmd = sh("sleep 30");
        let abort = AbortToken::new();
        let (res, _) = tokio::join!(
            sup.run("victim", &cmd, &abort, |_| {}),
            killer
        );
        assert!(res.unwrap_err().is_cancelled());
        assert_eq!(reg.live_count(), 0);
    }

    #[tokio::test]
    async fn missing_executable_is_tool_not_found() {
        let reg = ProcessRegistry::new();
        let cmd = ToolCommand {
            tool: "yt-dlp".to_string(),
            exe: PathBuf::from("/nonexistent/yt-dlp"),
            args: vec![],
            cwd: None,
        };
        let err = supervisor(&reg)
            .run("a", &cmd, &AbortToken::new(), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::ToolNotFound { .. }));
        assert_eq!(reg.live_count(), 0);
    }

    #[tokio::test]
    async fn already_aborted_never_launches() {
        let reg = ProcessRegistry::new();
        let abort = AbortToken::new();
        abort.abort();
        let err = supervisor(&reg)
            .run("a", &sh("echo hi"), &abort, |_| panic!("no output expected"))
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}

//! Headless browser driver for UI tests
//!
//! One invocation spawns the browser subprocess with a JSON options payload
//! and polls its stdout line by line. The protocol is newline-delimited text:
//! the exact line `ok` ends the run successfully, the exact line `error`
//! fails it, and every other line is relayed to the test log. A wall-clock
//! deadline bounds the whole invocation, and the subprocess is reaped
//! unconditionally on the way out.

use folio_common::{BrowserConfig, Error, HarnessConfig, Result};
use serde::Serialize;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Options payload handed to the subprocess as a single serialized argument
#[derive(Debug, Clone, Serialize)]
pub struct BrowserOptions {
    pub timeout: u64,
    pub port: u16,
    pub db: String,
    pub session_id: String,
    pub ready: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl BrowserOptions {
    /// Options for a script-file test: defaults merged from config
    pub fn script(config: &HarnessConfig, session_id: impl Into<String>) -> Self {
        Self {
            timeout: config.browser.default_timeout_secs,
            port: config.port,
            db: config.db_name.clone(),
            session_id: session_id.into(),
            ready: config.browser.ready_marker.clone(),
            url_path: None,
            code: None,
            login: None,
            password: None,
        }
    }

    /// Options for a page test: load `url_path`, wait for the readiness
    /// marker, then evaluate `code` inside the page as the admin user.
    pub fn page(
        config: &HarnessConfig,
        session_id: impl Into<String>,
        url_path: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        let mut options = Self::script(config, session_id);
        options.url_path = Some(url_path.into());
        options.code = Some(code.into());
        options.login = Some(config.admin_login.clone());
        options.password = Some(config.admin_password.clone());
        options
    }

    pub fn timeout(mut self, secs: u64) -> Self {
        self.timeout = secs;
        self
    }

    pub fn ready(mut self, marker: impl Into<String>) -> Self {
        self.ready = marker.into();
        self
    }
}

/// Terminal state of one polling pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Succeeded,
    Failed(String),
    TimedOut,
}

/// What an invocation amounted to from the suite's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// The subprocess ran and signalled `ok`
    Completed,
    /// The browser executable is not installed; the test was skipped
    Skipped,
}

/// Driver for one-shot browser test subprocesses
pub struct BrowserDriver {
    config: BrowserConfig,
}

impl BrowserDriver {
    pub fn new(config: BrowserConfig) -> Self {
        Self { config }
    }

    /// Run a script-file test: `[binary, jsfile, support-script, options]`
    pub fn run_script(&self, jsfile: &Path, options: &BrowserOptions) -> Result<RunStatus> {
        let mut cmd = Command::new(&self.config.binary_path);
        cmd.arg(jsfile);
        if let Some(support) = &self.config.support_script {
            cmd.arg(support);
        }
        cmd.arg(serde_json::to_string(options)?);
        self.run(&mut cmd, Duration::from_secs(options.timeout))
    }

    /// Run a page test: the support script does the navigation and eval,
    /// driven entirely by the options payload.
    pub fn run_page(&self, options: &BrowserOptions) -> Result<RunStatus> {
        let support = self.config.support_script.as_ref().ok_or_else(|| {
            Error::InvalidConfig("page tests require browser.support_script".to_string())
        })?;
        let mut cmd = Command::new(&self.config.binary_path);
        cmd.arg(support).arg(serde_json::to_string(options)?);
        self.run(&mut cmd, Duration::from_secs(options.timeout))
    }

    /// Launch the command and poll it to a terminal state.
    ///
    /// A missing executable downgrades to [`RunStatus::Skipped`] with a log
    /// notice; nothing is ever polled for an unlaunched process. Every
    /// launched subprocess is reaped before this returns, including on the
    /// error paths.
    pub fn run(&self, cmd: &mut Command, timeout: Duration) -> Result<RunStatus> {
        debug!("executing {:?}", cmd);
        let deadline = Instant::now() + timeout;

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("browser executable not found, test skipped: {e}");
                return Ok(RunStatus::Skipped);
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(stderr) = child.stderr.take() {
            thread::spawn(move || {
                for line in BufReader::new(stderr).lines().map_while(|l| l.ok()) {
                    warn!("browser stderr: {line}");
                }
            });
        }

        let polled = self.poll(&mut child, deadline);

        // Unconditional cleanup: the subprocess must not outlive the
        // invocation regardless of how polling ended.
        reap(&mut child);

        let (outcome, transcript) = polled?;
        match outcome {
            PollOutcome::Succeeded => {
                info!("browser test successful");
                Ok(RunStatus::Completed)
            }
            PollOutcome::Failed(reason) => Err(Error::BrowserFailed(with_transcript(
                &reason,
                &transcript,
            ))),
            PollOutcome::TimedOut => Err(Error::Timeout {
                seconds: timeout.as_secs(),
            }),
        }
    }

    /// Poll the subprocess's stdout until a terminal line, end of stream, or
    /// the deadline.
    ///
    /// A reader thread forwards raw chunks over a channel; this loop waits at
    /// most one poll interval per cycle and re-checks the deadline each time,
    /// so the worst-case overrun is one interval. Lines are logged and
    /// recorded in arrival order. End of stream without a terminal line is an
    /// explicit failure, never a silent success.
    fn poll(&self, child: &mut Child, deadline: Instant) -> Result<(PollOutcome, Vec<String>)> {
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Internal("subprocess stdout was not captured".to_string()))?;

        let (tx, rx) = mpsc::channel::<Vec<u8>>();
        // The reader exits on EOF (after the child is reaped) or once the
        // receiver is gone; it is deliberately not joined.
        thread::spawn(move || {
            let mut stdout = stdout;
            let mut chunk = [0u8; 256];
            loop {
                match stdout.read(&mut chunk) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if tx.send(chunk[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let mut buf: Vec<u8> = Vec::new();
        let mut transcript = Vec::new();

        let outcome = 'poll: loop {
            if Instant::now() >= deadline {
                break PollOutcome::TimedOut;
            }

            let stream_closed = match rx.recv_timeout(poll_interval) {
                Ok(bytes) => {
                    buf.extend_from_slice(&bytes);
                    false
                }
                Err(mpsc::RecvTimeoutError::Timeout) => false,
                Err(mpsc::RecvTimeoutError::Disconnected) => true,
            };

            while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                let raw: Vec<u8> = buf.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&raw[..raw.len() - 1])
                    .trim_end_matches('\r')
                    .to_string();
                info!("browser: {line}");
                match line.as_str() {
                    "ok" => break 'poll PollOutcome::Succeeded,
                    "error" => {
                        break 'poll PollOutcome::Failed(
                            "subprocess reported `error`".to_string(),
                        )
                    }
                    _ => transcript.push(line),
                }
            }

            if stream_closed {
                break PollOutcome::Failed(
                    "output stream closed before a terminal line".to_string(),
                );
            }
        };

        Ok((outcome, transcript))
    }
}

/// Terminate the subprocess if it is still alive: SIGTERM, a short grace
/// period, then SIGKILL, then reap the zombie.
fn reap(child: &mut Child) {
    match child.try_wait() {
        Ok(Some(status)) => {
            debug!("browser subprocess exited with {status}");
            return;
        }
        Ok(None) => {}
        Err(e) => warn!("could not query browser subprocess: {e}"),
    }

    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let pid = Pid::from_raw(child.id() as i32);
        if kill(pid, Signal::SIGTERM).is_ok() {
            thread::sleep(Duration::from_millis(100));
        }
    }

    if !matches!(child.try_wait(), Ok(Some(_))) {
        let _ = child.kill();
    }
    let _ = child.wait();
}

fn with_transcript(reason: &str, transcript: &[String]) -> String {
    if transcript.is_empty() {
        reason.to_string()
    } else {
        format!("{reason}; log: {}", transcript.join(" / "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn driver() -> BrowserDriver {
        BrowserDriver::new(BrowserConfig {
            poll_interval_ms: 50,
            ..BrowserConfig::default()
        })
    }

    fn spawn_sh(script: &str) -> Child {
        Command::new("sh")
            .args(["-c", script])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .unwrap()
    }

    fn deadline(secs: u64) -> Instant {
        Instant::now() + Duration::from_secs(secs)
    }

    #[test]
    fn test_poll_succeeds_on_ok() {
        let mut child = spawn_sh("printf 'starting up\ndoing work\nok\n'");
        let (outcome, transcript) = driver().poll(&mut child, deadline(5)).unwrap();
        reap(&mut child);

        assert_eq!(outcome, PollOutcome::Succeeded);
        assert_eq!(transcript, ["starting up", "doing work"]);
    }

    #[test]
    fn test_poll_fails_on_error_line() {
        let mut child = spawn_sh("printf 'loading page\nerror\n'");
        let (outcome, transcript) = driver().poll(&mut child, deadline(5)).unwrap();
        reap(&mut child);

        assert!(matches!(outcome, PollOutcome::Failed(_)));
        assert_eq!(transcript, ["loading page"]);
    }

    #[test]
    fn test_poll_tolerates_crlf() {
        let mut child = spawn_sh("printf 'ok\r\n'");
        let (outcome, _) = driver().poll(&mut child, deadline(5)).unwrap();
        reap(&mut child);

        assert_eq!(outcome, PollOutcome::Succeeded);
    }

    #[test]
    fn test_poll_eof_without_terminal_is_failure() {
        let mut child = spawn_sh("printf 'only informational output\n'");
        let (outcome, transcript) = driver().poll(&mut child, deadline(5)).unwrap();
        reap(&mut child);

        match outcome {
            PollOutcome::Failed(reason) => assert!(reason.contains("stream closed")),
            other => panic!("expected Failed, got {other:?}"),
        }
        assert_eq!(transcript, ["only informational output"]);
    }

    #[test]
    fn test_run_times_out_and_kills_subprocess() {
        let start = Instant::now();
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "sleep 30"]);

        let err = driver().run(&mut cmd, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, Error::Timeout { seconds: 1 }));
        // Bounded by timeout + one poll interval + reap grace, not the sleep
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_run_reports_error_with_transcript() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "printf 'step one\nerror\n'"]);

        let err = driver().run(&mut cmd, Duration::from_secs(5)).unwrap_err();
        match err {
            Error::BrowserFailed(msg) => assert!(msg.contains("step one")),
            other => panic!("expected BrowserFailed, got {other}"),
        }
    }

    #[test]
    fn test_run_skips_when_executable_missing() {
        let mut cmd = Command::new("/nonexistent/folio-browser");
        let status = driver().run(&mut cmd, Duration::from_secs(1)).unwrap();
        assert_eq!(status, RunStatus::Skipped);
    }

    #[test]
    fn test_options_payload_shape() {
        let config = HarnessConfig::default();
        let options = BrowserOptions::page(&config, "tok123", "/web", "folio.ready();")
            .timeout(10)
            .ready("folio");
        let payload: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&options).unwrap()).unwrap();

        assert_eq!(payload["timeout"], 10);
        assert_eq!(payload["session_id"], "tok123");
        assert_eq!(payload["url_path"], "/web");
        assert_eq!(payload["ready"], "folio");
        assert_eq!(payload["login"], "admin");

        let script_only = BrowserOptions::script(&config, "tok456");
        let payload: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&script_only).unwrap()).unwrap();
        assert!(payload.get("url_path").is_none());
        assert!(payload.get("login").is_none());
    }
}

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};

use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStderr, ChildStdout, Command};
use tracing::{debug, info};

use crate::config::ToolLogLevel;
use crate::options::{to_args, TfOption};
use crate::{DriverError, Result};

/// Process name of the external tool, as seen in the process table.
pub const BINARY_NAME: &str = "terraform";

// ─── LiveProcess ──────────────────────────────────────────────────────────

/// Pid of the terraform process currently running, if any.
///
/// Shared between the executor (which sets it around each invocation) and the
/// abort controller (which reads it to find the process group to signal).
#[derive(Debug, Clone, Default)]
pub struct LiveProcess(Arc<Mutex<Option<u32>>>);

impl LiveProcess {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<u32> {
        self.0.lock().ok().and_then(|pid| *pid)
    }

    pub(crate) fn set(&self, pid: Option<u32>) {
        if let Ok(mut slot) = self.0.lock() {
            *slot = pid;
        }
    }
}

// ─── Stdout wiring ────────────────────────────────────────────────────────

/// Where a terraform invocation's standard output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StdoutSink {
    /// Straight to the driver's console.
    Console,
    /// Into a file, optionally duplicated to the console.
    File { path: PathBuf, tee: bool },
    /// Buffered in memory and handed back to the caller.
    Capture,
}

enum OpenSink {
    Console(tokio::io::Stdout),
    File {
        file: tokio::fs::File,
        tee: Option<tokio::io::Stdout>,
    },
    Capture,
}

impl OpenSink {
    async fn open(sink: &StdoutSink) -> Result<Self> {
        Ok(match sink {
            StdoutSink::Console => OpenSink::Console(tokio::io::stdout()),
            StdoutSink::File { path, tee } => OpenSink::File {
                file: tokio::fs::File::create(path).await?,
                tee: tee.then(tokio::io::stdout),
            },
            StdoutSink::Capture => OpenSink::Capture,
        })
    }
}

async fn pump_stdout(mut src: ChildStdout, mut sink: OpenSink) -> std::io::Result<Vec<u8>> {
    let mut captured = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = src.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        let chunk = &buf[..n];
        match &mut sink {
            OpenSink::Console(out) => out.write_all(chunk).await?,
            OpenSink::File { file, tee } => {
                file.write_all(chunk).await?;
                if let Some(out) = tee {
                    out.write_all(chunk).await?;
                }
            }
            OpenSink::Capture => captured.extend_from_slice(chunk),
        }
    }
    match &mut sink {
        OpenSink::Console(out) => out.flush().await?,
        OpenSink::File { file, tee } => {
            file.flush().await?;
            if let Some(out) = tee {
                out.flush().await?;
            }
        }
        OpenSink::Capture => {}
    }
    Ok(captured)
}

/// Stderr is always shown on the console and also kept so a failure can
/// carry terraform's own diagnostics. Bytes go to the console untouched; the
/// kept copy replaces invalid UTF-8.
async fn pump_stderr(src: ChildStderr) -> std::io::Result<String> {
    let mut console = tokio::io::stderr();
    let mut reader = BufReader::new(src);
    let mut captured = Vec::new();
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            break;
        }
        console.write_all(&line).await?;
        captured.extend_from_slice(&line);
    }
    console.flush().await?;
    let text = String::from_utf8_lossy(&captured);
    Ok(text.trim_end_matches('\n').to_string())
}

/// Flags whose values are commonly credentials.
const SECRET_FLAGS: &[&str] = &["-var=", "-backend-config="];

/// `-var=db_password=hunter2` becomes `-var=db_password=***`. A value with no
/// `key=` part (a backend config file) is kept.
fn redact(arg: &str) -> String {
    for flag in SECRET_FLAGS {
        if let Some(value) = arg.strip_prefix(flag) {
            if let Some((key, _)) = value.split_once('=') {
                return format!("{flag}{key}=***");
            }
        }
    }
    arg.to_string()
}

// ─── Terraform ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct VersionOutput {
    terraform_version: String,
}

/// Handle bound to one installed terraform executable and one working
/// directory. Every invocation runs in its own process group.
#[derive(Debug, Clone)]
pub struct Terraform {
    exec_path: PathBuf,
    working_dir: PathBuf,
    env: Vec<(String, String)>,
    live: LiveProcess,
}

impl Terraform {
    pub fn new(working_dir: &Path, exec_path: &Path, live: LiveProcess) -> Result<Self> {
        if !exec_path.is_file() {
            return Err(DriverError::BinaryNotFound(exec_path.display().to_string()));
        }
        if !working_dir.is_dir() {
            return Err(DriverError::Config(format!(
                "working directory {} does not exist",
                working_dir.display()
            )));
        }
        Ok(Self {
            exec_path: exec_path.to_path_buf(),
            working_dir: working_dir.to_path_buf(),
            env: vec![("TF_IN_AUTOMATION".into(), "1".into())],
            live,
        })
    }

    /// Route terraform's own core and provider logs to `log_path`.
    pub fn set_log(&mut self, level: ToolLogLevel, log_path: &Path) {
        self.env
            .retain(|(k, _)| !matches!(k.as_str(), "TF_LOG" | "TF_LOG_PROVIDER" | "TF_LOG_PATH"));
        if let Some(level) = level.as_env() {
            self.env.push(("TF_LOG".into(), level.into()));
            self.env.push(("TF_LOG_PROVIDER".into(), level.into()));
            self.env
                .push(("TF_LOG_PATH".into(), log_path.display().to_string()));
        }
    }

    pub fn env(&self) -> &[(String, String)] {
        &self.env
    }

    /// The version the binary reports about itself.
    pub async fn version(&self) -> Result<String> {
        let out = self
            .invoke(
                vec!["version".into(), "-json".into()],
                &StdoutSink::Capture,
                &[],
            )
            .await?;
        let parsed: VersionOutput = serde_json::from_slice(&out.stdout)?;
        Ok(parsed.terraform_version)
    }

    pub async fn init(&self, options: &[TfOption]) -> Result<()> {
        let mut args = base_args("init");
        args.extend(to_args(options));
        self.invoke(args, &StdoutSink::Console, &[]).await?;
        Ok(())
    }

    /// Returns `true` when the plan contains changes (`-detailed-exitcode` 2).
    pub async fn plan(&self, options: &[TfOption]) -> Result<bool> {
        let mut args = base_args("plan");
        args.push("-detailed-exitcode".into());
        args.extend(to_args(options));
        let out = self.invoke(args, &StdoutSink::Console, &[2]).await?;
        Ok(out.code == 2)
    }

    /// `show -json <plan>` into `sink`.
    pub async fn show_plan_file(&self, plan_file: &Path, sink: &StdoutSink) -> Result<()> {
        let args = vec![
            "show".into(),
            "-json".into(),
            "-no-color".into(),
            plan_file.display().to_string(),
        ];
        self.invoke(args, sink, &[]).await?;
        Ok(())
    }

    pub async fn apply(&self, options: &[TfOption]) -> Result<()> {
        let mut args = base_args("apply");
        args.push("-auto-approve".into());
        args.extend(to_args(options));
        self.invoke(args, &StdoutSink::Console, &[]).await?;
        Ok(())
    }

    pub async fn destroy(&self, options: &[TfOption]) -> Result<()> {
        let mut args = base_args("destroy");
        args.push("-auto-approve".into());
        args.extend(to_args(options));
        self.invoke(args, &StdoutSink::Console, &[]).await?;
        Ok(())
    }

    /// `output -json` into `sink`.
    pub async fn output(&self, sink: &StdoutSink) -> Result<()> {
        let args = vec!["output".into(), "-json".into(), "-no-color".into()];
        self.invoke(args, sink, &[]).await?;
        Ok(())
    }

    pub async fn force_unlock(&self, lock_id: &str) -> Result<()> {
        let args = vec![
            "force-unlock".into(),
            "-force".into(),
            "-no-color".into(),
            lock_id.to_string(),
        ];
        self.invoke(args, &StdoutSink::Console, &[]).await?;
        Ok(())
    }

    /// Spawn terraform with `args`, wire its streams, and wait for it.
    ///
    /// Exit code 0 and any code in `ok_codes` count as success; anything else
    /// (including death by signal) becomes [`DriverError::Tool`] carrying the
    /// captured stderr verbatim.
    async fn invoke(&self, args: Vec<String>, sink: &StdoutSink, ok_codes: &[i32]) -> Result<Invocation> {
        let open = OpenSink::open(sink).await?;

        let mut cmd = Command::new(&self.exec_path);
        cmd.args(&args)
            .current_dir(&self.working_dir)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let shown: Vec<String> = args.iter().map(|a| redact(a)).collect();
        info!(
            command = %format!("{} {}", self.exec_path.display(), shown.join(" ")),
            workdir = %self.working_dir.display(),
            "running terraform command"
        );

        let mut child = cmd.spawn().map_err(|source| DriverError::Spawn {
            program: self.exec_path.display().to_string(),
            source,
        })?;
        self.live.set(child.id());

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DriverError::Config("stdout not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| DriverError::Config("stderr not captured".into()))?;

        let stdout_task = tokio::spawn(pump_stdout(stdout, open));
        let stderr_task = tokio::spawn(pump_stderr(stderr));
        let (stdout_res, stderr_res) = tokio::join!(stdout_task, stderr_task);

        let status = child.wait().await;
        self.live.set(None);
        let status = status?;

        let stdout = stdout_res.map_err(std::io::Error::other)??;
        let stderr = stderr_res.map_err(std::io::Error::other)??;

        let code = status.code();
        debug!(?code, "terraform exited");
        match code {
            Some(c) if c == 0 || ok_codes.contains(&c) => Ok(Invocation { code: c, stdout }),
            _ => Err(DriverError::Tool { code, stderr }),
        }
    }
}

struct Invocation {
    code: i32,
    stdout: Vec<u8>,
}

fn base_args(subcommand: &str) -> Vec<String> {
    vec![
        subcommand.to_string(),
        "-no-color".to_string(),
        "-input=false".to_string(),
    ]
}

use std::{
    ffi::OsString,
    io::{self, ErrorKind, Read},
    path::{Path, PathBuf},
    process::{Child, Command, Output, Stdio},
    sync::mpsc::{self, RecvTimeoutError, Sender},
    thread,
    time::{Duration, Instant},
};

use tracing::{debug, warn};

use crate::application::render::types::{RenderError, ToolRun, format_command_line};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// A fully specified external command, ready to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ToolInvocation {
    program: PathBuf,
    args: Vec<OsString>,
}

impl ToolInvocation {
    pub(crate) fn new(program: &Path) -> Self {
        Self {
            program: program.to_path_buf(),
            args: Vec::new(),
        }
    }

    pub(crate) fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub(crate) fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub(crate) fn program_name(&self) -> String {
        self.program.display().to_string()
    }

    fn display_args(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }

    pub(crate) fn command_line(&self) -> String {
        format_command_line(&self.program_name(), &self.display_args())
    }

    /// Run to completion, capturing stdout and stderr. With a `timeout`, the
    /// tool and every process it started are killed once the limit passes,
    /// whether the tool itself is still running or only its pipes are held open.
    pub(crate) fn run(&self, timeout: Option<Duration>) -> Result<ToolRun, RenderError> {
        let started_at = Instant::now();
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let output = match timeout {
            None => command.output().map_err(|err| self.spawn_error(err))?,
            Some(limit) => {
                isolate_process_group(&mut command);
                let child = command.spawn().map_err(|err| self.spawn_error(err))?;
                self.wait_with_timeout(child, limit, started_at)?
            }
        };

        let run = ToolRun {
            program: self.program_name(),
            args: self.display_args(),
            exit_code: output.status.code(),
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            elapsed: started_at.elapsed(),
        };

        debug!(
            target = "application::render::toolchain",
            op = "toolchain::run",
            program = %run.program,
            exit_code = run.exit_code.map(i64::from).unwrap_or(-1),
            elapsed_ms = run.elapsed.as_millis() as u64,
            stdout_bytes = run.stdout.len(),
            stderr_bytes = run.stderr.len(),
            "External tool finished"
        );

        Ok(run)
    }

    fn wait_with_timeout(
        &self,
        mut child: Child,
        limit: Duration,
        started_at: Instant,
    ) -> Result<Output, RenderError> {
        // Drain both pipes concurrently so a chatty tool cannot fill a pipe
        // buffer and stall while we poll.
        let (tx, rx) = mpsc::channel();
        let mut pending = 0;
        if let Some(stdout) = child.stdout.take() {
            drain(stdout, Stream::Stdout, tx.clone());
            pending += 1;
        }
        if let Some(stderr) = child.stderr.take() {
            drain(stderr, Stream::Stderr, tx.clone());
            pending += 1;
        }
        drop(tx);

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if started_at.elapsed() >= limit => {
                    return Err(self.timed_out(&mut child, limit, started_at));
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(err) => {
                    return Err(RenderError::Spawn {
                        program: self.program_name(),
                        source: err,
                    });
                }
            }
        };

        // Background processes left behind by the tool may still hold the
        // pipes open; the remaining budget bounds how long we wait for EOF.
        let mut output = Output {
            status,
            stdout: Vec::new(),
            stderr: Vec::new(),
        };
        for _ in 0..pending {
            let remaining = limit.saturating_sub(started_at.elapsed());
            match rx.recv_timeout(remaining) {
                Ok((Stream::Stdout, buf)) => output.stdout = buf,
                Ok((Stream::Stderr, buf)) => output.stderr = buf,
                Err(RecvTimeoutError::Timeout) => {
                    return Err(self.timed_out(&mut child, limit, started_at));
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        Ok(output)
    }

    fn timed_out(&self, child: &mut Child, limit: Duration, started_at: Instant) -> RenderError {
        if let Err(err) = terminate(child) {
            warn!(
                target = "application::render::toolchain",
                op = "toolchain::run",
                program = %self.program.display(),
                error = %err,
                "Failed to kill timed-out tool"
            );
        }
        let _ = child.wait();
        warn!(
            target = "application::render::toolchain",
            op = "toolchain::run",
            result = "timeout",
            program = %self.program.display(),
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "External tool exceeded its time limit"
        );
        RenderError::ToolTimedOut {
            program: self.program_name(),
            timeout: limit,
        }
    }

    fn spawn_error(&self, err: io::Error) -> RenderError {
        warn!(
            target = "application::render::toolchain",
            op = "toolchain::run",
            result = "error",
            program = %self.program.display(),
            error_code = "spawn_tool",
            error = %err,
            "Failed to spawn external tool"
        );
        if err.kind() == ErrorKind::NotFound {
            RenderError::ToolUnavailable {
                program: self.program_name(),
                source: err,
            }
        } else {
            RenderError::Spawn {
                program: self.program_name(),
                source: err,
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

fn drain<R: Read + Send + 'static>(mut pipe: R, stream: Stream, tx: Sender<(Stream, Vec<u8>)>) {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        let _ = tx.send((stream, buf));
    });
}

/// Run the tool as the leader of a fresh process group, so a timeout can
/// take down anything it spawned along with it.
#[cfg(unix)]
fn isolate_process_group(command: &mut Command) {
    use std::os::unix::process::CommandExt;
    command.process_group(0);
}

#[cfg(not(unix))]
fn isolate_process_group(_command: &mut Command) {}

#[cfg(unix)]
fn terminate(child: &mut Child) -> io::Result<()> {
    let Ok(pgid) = libc::pid_t::try_from(child.id()) else {
        return child.kill();
    };
    // SAFETY: killpg takes no pointers; the group id is the child's pid,
    // which stays reserved while any member of its group is alive.
    if unsafe { libc::killpg(pgid, libc::SIGKILL) } == 0 {
        return Ok(());
    }
    child.kill()
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) -> io::Result<()> {
    child.kill()
}

/// External programs used by the pipeline, plus how to treat their exit status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub latex_program: PathBuf,
    pub convert_program: PathBuf,
    /// Arguments placed before `-density`, e.g. `["convert"]` for `magick`.
    pub convert_args: Vec<String>,
    pub timeout: Option<Duration>,
    /// Treat a non-zero exit code as failure even when output was produced.
    pub strict_exit_status: bool,
    /// Parent directory for render workspaces; the system temp dir when unset.
    pub work_dir: Option<PathBuf>,
}

pub const DEFAULT_LATEX_PROGRAM: &str = "xelatex";
pub const DEFAULT_CONVERT_PROGRAM: &str = "convert";

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            latex_program: PathBuf::from(DEFAULT_LATEX_PROGRAM),
            convert_program: PathBuf::from(DEFAULT_CONVERT_PROGRAM),
            convert_args: Vec::new(),
            timeout: None,
            strict_exit_status: false,
            work_dir: None,
        }
    }
}

impl Toolchain {
    /// `<latex> -output-directory <dir> <tex>`
    pub(crate) fn compile(&self, tex: &Path, out_dir: &Path) -> ToolInvocation {
        ToolInvocation::new(&self.latex_program)
            .arg("-output-directory")
            .arg(out_dir)
            .arg(tex)
    }

    /// `<convert> [prefix args] -density <density> <pdf> <png>`
    pub(crate) fn rasterize(&self, pdf: &Path, png: &Path, density: u32) -> ToolInvocation {
        ToolInvocation::new(&self.convert_program)
            .args(&self.convert_args)
            .arg("-density")
            .arg(density.to_string())
            .arg(pdf)
            .arg(png)
    }
}

impl From<&crate::config::ToolchainSettings> for Toolchain {
    fn from(settings: &crate::config::ToolchainSettings) -> Self {
        Self {
            latex_program: settings.latex_program.clone(),
            convert_program: settings.convert_program.clone(),
            convert_args: settings.convert_args.clone(),
            timeout: settings.timeout,
            strict_exit_status: settings.strict_exit_status,
            work_dir: settings.work_dir.clone(),
        }
    }
}

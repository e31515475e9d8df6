use anyhow::{Context, Result};
use std::io;
use std::path::PathBuf;
use std::process::{Child, ChildStderr, Command, Stdio};

/// How to launch the external tracer
#[derive(Debug, Clone)]
pub struct TracerConfig {
    pub program: PathBuf,
    pub pids: Vec<i32>,
    pub syscalls: Vec<String>,
    pub string_limit: usize,
    pub follow_forks: bool,
}

impl TracerConfig {
    /// Arguments for `strace -s <limit> -e trace=<list> [-f] -p <pid>...`
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "-s".to_string(),
            self.string_limit.to_string(),
            "-e".to_string(),
            format!("trace={}", self.syscalls.join(",")),
        ];
        if self.follow_forks {
            args.push("-f".to_string());
        }
        for pid in &self.pids {
            args.push("-p".to_string());
            args.push(pid.to_string());
        }
        args
    }

    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.args());
        cmd
    }

    pub fn spawn(&self) -> Result<TracerProcess> {
        log::info!("spawning {} {}", self.program.display(), self.args().join(" "));
        TracerProcess::spawn(self.command())
            .with_context(|| format!("Failed to start tracer {}", self.program.display()))
    }
}

/// A running tracer. Records arrive on its stderr.
///
/// Dropping the guard kills the tracer and reaps it, so every exit path
/// releases the subprocess.
#[derive(Debug)]
pub struct TracerProcess {
    child: Child,
    output: Option<ChildStderr>,
}

impl TracerProcess {
    pub fn spawn(mut command: Command) -> io::Result<Self> {
        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;
        let output = child.stderr.take();
        Ok(TracerProcess { child, output })
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Hand the output pipe to a reader. Only the first call returns it.
    pub fn take_output(&mut self) -> Option<ChildStderr> {
        self.output.take()
    }

    /// Kill the tracer if it is still running and wait for it
    pub fn terminate(&mut self) -> io::Result<()> {
        self.output = None;
        if let Some(status) = self.child.try_wait()? {
            log::debug!("tracer {} already exited with {}", self.child.id(), status);
            return Ok(());
        }

        self.child.kill()?;
        let status = self.child.wait()?;
        log::debug!("tracer {} terminated: {}", self.child.id(), status);
        Ok(())
    }
}

impl Drop for TracerProcess {
    fn drop(&mut self) {
        if let Err(e) = self.terminate() {
            log::warn!("Failed to terminate tracer {}: {}", self.child.id(), e);
        }
    }
}

//! Blocking invocation of the external image tools.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Command;

use crate::quicklook::error::{QuicklookError, QuicklookResult};

/// One external tool call: program plus arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl ToolCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Program file name, e.g. `mJPEG`.
    pub fn name(&self) -> String {
        self.program
            .file_name()
            .unwrap_or(self.program.as_os_str())
            .to_string_lossy()
            .into_owned()
    }

    /// Command line as it would be typed in a shell, for logs.
    pub fn display(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }
}

/// Executes tool commands. The driver only sees this trait so tests can
/// record calls instead of spawning processes.
pub trait ToolRunner {
    /// Runs the command to completion and returns its standard output.
    fn run(&mut self, command: &ToolCommand) -> QuicklookResult<String>;
}

/// Runs commands as child processes, without a timeout.
///
/// A command that writes anything to standard error has failed, whatever its
/// exit status.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl ToolRunner for ProcessRunner {
    fn run(&mut self, command: &ToolCommand) -> QuicklookResult<String> {
        log::debug!("{}", command.display());

        let output = Command::new(&command.program)
            .args(&command.args)
            .output()
            .map_err(|source| QuicklookError::Spawn {
                command: command.display(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if !stderr.is_empty() {
            return Err(QuicklookError::ToolStderr {
                command: command.display(),
                stderr,
                stdout,
            });
        }
        if !output.status.success() {
            log::warn!("{} exited with {}", command.name(), output.status);
        }
        if !stdout.is_empty() {
            log::debug!("{}", stdout);
        }
        Ok(stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let cmd = ToolCommand::new("/usr/bin/convert")
            .arg("a.jpg")
            .arg("-resize")
            .arg("600");
        assert_eq!(cmd.display(), "/usr/bin/convert a.jpg -resize 600");
        assert_eq!(cmd.name(), "convert");
    }

    #[cfg(unix)]
    #[test]
    fn test_process_runner_stdout() {
        let out = ProcessRunner
            .run(&ToolCommand::new("sh").arg("-c").arg("echo hello"))
            .unwrap();
        assert_eq!(out, "hello");
    }

    #[cfg(unix)]
    #[test]
    fn test_process_runner_stderr_is_failure() {
        let err = ProcessRunner
            .run(&ToolCommand::new("sh").arg("-c").arg("echo oops >&2"))
            .unwrap_err();
        match err {
            QuicklookError::ToolStderr { stderr, .. } => assert_eq!(stderr, "oops"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_process_runner_missing_program() {
        let err = ProcessRunner
            .run(&ToolCommand::new("/nonexistent/uvex-qc-tool"))
            .unwrap_err();
        assert!(matches!(err, QuicklookError::Spawn { .. }));
    }
}

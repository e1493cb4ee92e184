//! External tool invocation.
//!
//! Every collaborator (`ogr2ogr`, `tippecanoe`, `tile-join`, `duckdb`) is run
//! through a [`CommandRunner`], so batch stages can be exercised in tests
//! without the tools installed.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::process::Command;

use thiserror::Error;
use tracing::{debug, info};

/// Result type for tool invocations.
pub type CommandResult<T> = Result<T, CommandError>;

/// Errors running an external tool.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The program could not be started at all.
    #[error("'{program}' could not be started: {source}. Please install it using your package manager")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    /// The program ran and exited unsuccessfully.
    #[error("command {command} failed (code {code})\nstdout: {stdout}\nstderr: {stderr}")]
    Failed {
        command: String,
        code: String,
        stdout: String,
        stderr: String,
    },
}

/// A program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    program: String,
    args: Vec<OsString>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    /// Arguments as lossy strings, handy for assertions and logs.
    pub fn args_lossy(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Runs external tools.
pub trait CommandRunner: Send + Sync {
    /// Run the command to completion and return its standard output.
    ///
    /// A non-zero exit is an error carrying both output streams.
    fn output(&self, command: &ToolCommand) -> CommandResult<String>;

    /// Run the command, discarding its output.
    fn run(&self, command: &ToolCommand) -> CommandResult<()> {
        self.output(command).map(|_| ())
    }
}

/// Runs tools as child processes of the current process.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellRunner;

impl ShellRunner {
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for ShellRunner {
    fn output(&self, command: &ToolCommand) -> CommandResult<String> {
        info!("{}", command);

        let output = Command::new(command.program())
            .args(command.get_args())
            .output()
            .map_err(|e| CommandError::Spawn {
                program: command.program().to_string(),
                source: e,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            return Err(CommandError::Failed {
                command: command.to_string(),
                code: output
                    .status
                    .code()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string()),
                stdout,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        debug!(program = command.program(), bytes = stdout.len(), "command finished");
        Ok(stdout)
    }
}

/// Check that a tool can be started, by running it with `args`.
pub fn check_tool_available(
    runner: &dyn CommandRunner,
    program: &str,
    args: &[&str],
) -> CommandResult<()> {
    runner.run(&ToolCommand::new(program).args(args))
}

#[cfg(test)]
pub(crate) mod testing {
    //! A runner that records commands instead of spawning them.

    use std::collections::HashSet;
    use std::path::PathBuf;
    use std::sync::Mutex;

    use super::*;

    #[derive(Debug, Default)]
    pub struct RecordingRunner {
        pub commands: Mutex<Vec<ToolCommand>>,
        /// Programs that fail when run.
        pub failing: HashSet<String>,
        /// Output files are created for commands that name one after `-o`.
        pub touch_outputs: bool,
        /// Canned stdout, returned for every command.
        pub stdout: String,
    }

    impl RecordingRunner {
        pub fn new() -> Self {
            Self {
                touch_outputs: true,
                ..Default::default()
            }
        }

        pub fn failing(mut self, program: &str) -> Self {
            self.failing.insert(program.to_string());
            self
        }

        pub fn with_stdout(mut self, stdout: &str) -> Self {
            self.stdout = stdout.to_string();
            self
        }

        pub fn recorded(&self) -> Vec<ToolCommand> {
            self.commands.lock().unwrap().clone()
        }

        pub fn count(&self) -> usize {
            self.commands.lock().unwrap().len()
        }

        fn output_path(command: &ToolCommand) -> Option<PathBuf> {
            let args = command.args_lossy();
            if command.program() == "ogr2ogr" {
                // ogr2ogr -progress -f FORMAT <dst> <src> ...
                return args.get(3).map(PathBuf::from);
            }
            args.iter()
                .position(|a| a == "-o")
                .and_then(|i| args.get(i + 1))
                .map(PathBuf::from)
        }
    }

    impl CommandRunner for RecordingRunner {
        fn output(&self, command: &ToolCommand) -> CommandResult<String> {
            self.commands.lock().unwrap().push(command.clone());

            if self.failing.contains(command.program()) {
                return Err(CommandError::Failed {
                    command: command.to_string(),
                    code: "1".to_string(),
                    stdout: String::new(),
                    stderr: "simulated failure".to_string(),
                });
            }

            if self.touch_outputs {
                if let Some(path) = Self::output_path(command) {
                    std::fs::write(&path, command.to_string()).unwrap();
                }
            }
            Ok(self.stdout.clone())
        }
    }
}

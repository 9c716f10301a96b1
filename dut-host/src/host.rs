//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Output;

use dut_utils::parallel::Node;
use serde::Serialize;
use tracing::debug;

use crate::error::Error;

/// Operation to run on a host.
#[derive(Clone, Debug)]
pub enum Module {
    // Command line interpreted by the shell.
    Shell(String),
    // Program and arguments, split on whitespace, run without a shell.
    Command(String),
    Copy(PathBuf, PathBuf),
    // Source, destination and the variables available to the template.
    Template(PathBuf, PathBuf, BTreeMap<String, String>),
}

/// Outcome of a module run.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct CommandResult {
    pub rc: i32,
    pub stdout: String,
    pub stdout_lines: Vec<String>,
    pub stderr: String,
    pub stderr_lines: Vec<String>,
    pub failed: bool,
    pub exception: Option<String>,
}

/// Host that modules can be run on.
///
/// Implementors only need to provide [`Host::execute`]. The other methods
/// turn failed results into [`Error::ModuleFailed`].
pub trait Host: Node + Send + Sync {
    /// Runs a module and reports its outcome, whether it failed or not.
    fn execute(&self, module: &Module) -> CommandResult;

    fn hostname(&self) -> &str {
        self.node_name()
    }

    /// Runs a module. A failed result is returned as an error unless
    /// `ignore_errors` is set.
    fn run(
        &self,
        module: &Module,
        ignore_errors: bool,
    ) -> Result<CommandResult, Error> {
        debug!(hostname = %self.hostname(), ?module, "running module");
        let result = self.execute(module);
        if result.failed && !ignore_errors {
            return Err(Error::ModuleFailed(
                self.hostname().to_owned(),
                module.name(),
                result,
            ));
        }
        Ok(result)
    }

    fn shell(&self, cmd: &str) -> Result<CommandResult, Error> {
        self.run(&Module::Shell(cmd.to_owned()), false)
    }

    fn command(&self, cmd: &str) -> Result<CommandResult, Error> {
        self.run(&Module::Command(cmd.to_owned()), false)
    }

    fn copy(
        &self,
        src: impl Into<PathBuf>,
        dest: impl Into<PathBuf>,
    ) -> Result<CommandResult, Error>
    where
        Self: Sized,
    {
        self.run(&Module::Copy(src.into(), dest.into()), false)
    }

    fn template(
        &self,
        src: impl Into<PathBuf>,
        dest: impl Into<PathBuf>,
        vars: BTreeMap<String, String>,
    ) -> Result<CommandResult, Error>
    where
        Self: Sized,
    {
        self.run(&Module::Template(src.into(), dest.into(), vars), false)
    }
}

// ===== impl Module =====

impl Module {
    pub fn name(&self) -> &'static str {
        match self {
            Module::Shell(..) => "shell",
            Module::Command(..) => "command",
            Module::Copy(..) => "copy",
            Module::Template(..) => "template",
        }
    }
}

// ===== impl CommandResult =====

impl CommandResult {
    /// Builds the result of a finished process. A process killed by a signal
    /// is reported with `rc` -1.
    pub fn from_output(output: &Output) -> CommandResult {
        let rc = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        CommandResult {
            rc,
            stdout_lines: stdout.lines().map(str::to_owned).collect(),
            stdout,
            stderr_lines: stderr.lines().map(str::to_owned).collect(),
            stderr,
            failed: rc != 0,
            exception: None,
        }
    }

    /// Builds the result of a module that couldn't run to completion.
    pub fn exception(message: impl Into<String>) -> CommandResult {
        CommandResult {
            rc: 1,
            failed: true,
            exception: Some(message.into()),
            ..Default::default()
        }
    }

    /// Builds the result of a module that succeeded without output.
    pub fn changed() -> CommandResult {
        CommandResult::default()
    }
}

//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;
use std::sync::LazyLock as Lazy;

use derive_new::new;
use dut_utils::parallel::Node;
use regex::{Captures, Regex};
use tracing::debug;

use crate::host::{CommandResult, Host, Module};

// Template placeholder: `{{ name }}`.
static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{[ \t]*([A-Za-z0-9_]+)[ \t]*\}\}").unwrap()
});

/// The machine the harness runs on.
#[derive(Clone, Debug, new)]
pub struct LocalHost {
    hostname: String,
}

// ===== impl LocalHost =====

impl Default for LocalHost {
    fn default() -> LocalHost {
        LocalHost::new("localhost".to_owned())
    }
}

impl Node for LocalHost {
    fn node_name(&self) -> &str {
        &self.hostname
    }
}

impl Host for LocalHost {
    fn execute(&self, module: &Module) -> CommandResult {
        match module {
            Module::Shell(cmd) => {
                let mut command = Command::new("sh");
                command.arg("-c").arg(cmd);
                spawn(command)
            }
            Module::Command(cmd) => {
                let mut argv = cmd.split_whitespace();
                let Some(program) = argv.next() else {
                    return CommandResult::exception("no command given");
                };
                let mut command = Command::new(program);
                command.args(argv);
                spawn(command)
            }
            Module::Copy(src, dest) => {
                let dest = copy_destination(src, dest);
                match std::fs::copy(src, &dest) {
                    Ok(bytes) => {
                        debug!(src = %src.display(), dest = %dest.display(), %bytes, "copied file");
                        CommandResult::changed()
                    }
                    Err(error) => CommandResult::exception(format!(
                        "failed to copy {} to {}: {}",
                        src.display(),
                        dest.display(),
                        error
                    )),
                }
            }
            Module::Template(src, dest, vars) => {
                let template = match std::fs::read_to_string(src) {
                    Ok(template) => template,
                    Err(error) => {
                        return CommandResult::exception(format!(
                            "failed to read template {}: {}",
                            src.display(),
                            error
                        ));
                    }
                };
                let rendered = match render(&template, vars) {
                    Ok(rendered) => rendered,
                    Err(name) => {
                        return CommandResult::exception(format!(
                            "'{}' is undefined in template {}",
                            name,
                            src.display()
                        ));
                    }
                };
                let dest = copy_destination(src, dest);
                match std::fs::write(&dest, rendered) {
                    Ok(()) => CommandResult::changed(),
                    Err(error) => CommandResult::exception(format!(
                        "failed to write {}: {}",
                        dest.display(),
                        error
                    )),
                }
            }
        }
    }
}

// ===== helper functions =====

fn spawn(mut command: Command) -> CommandResult {
    match command.output() {
        Ok(output) => CommandResult::from_output(&output),
        Err(error) => {
            CommandResult::exception(format!("failed to run command: {}", error))
        }
    }
}

// Copying into a directory keeps the source file name.
fn copy_destination(src: &Path, dest: &Path) -> std::path::PathBuf {
    match src.file_name() {
        Some(name) if dest.is_dir() => dest.join(name),
        _ => dest.to_path_buf(),
    }
}

// Replaces every placeholder with its value. Returns the name of the first
// undefined variable on failure.
fn render(
    template: &str,
    vars: &BTreeMap<String, String>,
) -> Result<String, String> {
    if let Some(undefined) = PLACEHOLDER
        .captures_iter(template)
        .map(|captures| captures[1].to_owned())
        .find(|name| !vars.contains_key(name))
    {
        return Err(undefined);
    }

    let rendered = PLACEHOLDER.replace_all(template, |captures: &Captures<'_>| {
        vars[&captures[1]].clone()
    });
    Ok(rendered.into_owned())
}

// ===== unit tests =====

use anyhow::{Context, Result, anyhow};
use log::{error, info};
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Command, Stdio};

/// Environment variable pointing generator commands at their staged directory.
pub const STAGE_DIR_ENV: &str = "STORELET_STAGE_DIR";

/// Executes a command, prints its output in real-time,
/// and returns an error if the command exits with a non-zero status code.
///
/// The command is split on whitespace; wrap it in `sh -c '...'` when shell
/// syntax is needed. With `workdir` set, the command runs there and sees it
/// as [`STAGE_DIR_ENV`].
pub fn execute_and_stream_command(command: &str, workdir: Option<&Path>) -> Result<()> {
    let parts: Vec<&str> = command.split_whitespace().collect();
    let program = parts.first().context("Command string is empty")?;
    let args = &parts[1..];

    let mut cmd = Command::new(program);
    cmd.args(args).stdout(Stdio::piped());
    if let Some(dir) = workdir {
        cmd.current_dir(dir).env(STAGE_DIR_ENV, dir);
    }

    info!("running '{command}'");
    let mut child = cmd
        .spawn()
        .with_context(|| format!("Failed to spawn command: '{command}'"))?;

    let stdout = child
        .stdout
        .take()
        .context("Child process did not have a stdout handle")?;

    for line in BufReader::new(stdout).lines() {
        let line = line.context("Error reading output from child process")?;
        println!("{line}");
    }

    let status = child.wait().context("Failed to wait on child process")?;

    if status.success() {
        Ok(())
    } else {
        let code = status.code().unwrap_or(-1);
        error!("command '{command}' failed with exit code {code}");
        Err(anyhow!("Command '{command}' failed with exit code: {code}"))
    }
}

use anyhow::{Context, Result, bail};
use log::info;

use storelet_lib::{ArchiveBackup, Config, OutSink};

use crate::shell_exec::execute_and_stream_command;

pub const DEFAULT_NAME: &str = "backup";

/// A `NAME=COMMAND` generator: the command runs inside a staged directory
/// whose contents land in the archive under `NAME`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generator {
    pub name: String,
    pub command: String,
}

impl Generator {
    pub fn parse(raw: &str) -> Result<Self> {
        let Some((name, command)) = raw.split_once('=') else {
            bail!("generator '{raw}' must look like NAME=COMMAND");
        };
        let (name, command) = (name.trim(), command.trim());
        if name.is_empty() || command.is_empty() {
            bail!("generator '{raw}' needs both a name and a command");
        }

        Ok(Self {
            name: name.to_string(),
            command: command.to_string(),
        })
    }
}

fn get_output_sink(config: &Config) -> Result<OutSink> {
    let output = config.output.as_deref().unwrap_or_default();
    output
        .parse()
        .with_context(|| format!("invalid output '{output}'"))
}

/// Runs one full backup: hooks, inclusions, generators and delivery.
pub fn run_backup(config: &Config) -> Result<()> {
    let name = config.name.as_deref().unwrap_or(DEFAULT_NAME);
    let sink = get_output_sink(config)?;
    let credentials = config.credentials();
    let generators = config
        .generate
        .iter()
        .flatten()
        .map(|raw| Generator::parse(raw))
        .collect::<Result<Vec<_>>>()?;

    if let Some(before) = &config.before {
        execute_and_stream_command(before, None).context("before hook failed")?;
    }

    let mut backup = ArchiveBackup::with_compression(name, config.compressor())
        .context("creating temporary archive")?;
    let preserve_paths = config.preserve_paths.unwrap_or(false);

    for path in config.paths.iter().flatten() {
        backup
            .include_directory(path, preserve_paths, None)
            .with_context(|| format!("including {path}"))?;
    }

    for generator in &generators {
        let staged = backup
            .include_new_directory(generator.name.as_str())
            .context("creating staged directory")?;
        execute_and_stream_command(&generator.command, Some(staged.path()))
            .with_context(|| format!("generator '{}' failed", generator.name))?;
        staged
            .finish()
            .with_context(|| format!("folding in '{}'", generator.name))?;
    }

    let location = backup
        .deliver(&sink, credentials.as_ref())
        .with_context(|| format!("delivering backup to {sink}"))?;
    info!("backup '{name}' delivered to {location}");
    backup.close()?;

    if let Some(after) = &config.after {
        execute_and_stream_command(after, None).context("after hook failed")?;
    }

    Ok(())
}

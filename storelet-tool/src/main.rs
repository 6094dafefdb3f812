use clap::Parser;
use log::debug;
use std::{collections::HashMap, env, fs};

use storelet_lib::Config;

mod fs_utils;
mod process;
mod shell_exec;

use fs_utils::{encode_size, list_planned_entries, total_size};

const ENV_PREFIX: &str = "STORELET_";

#[derive(Parser, Debug)]
#[command(author, version, about = "Zip directories into one backup archive and ship it", long_about = None)]
pub struct Cli {
    /// Backup name, used as the stem of the uploaded file name
    #[arg(short, long)]
    pub name: Option<String>,

    /// Destination: a local path (placeholders allowed), http(s)://..., or s3://bucket
    #[arg(short, long)]
    pub output: Option<String>,

    /// Configuration file (YAML or JSON)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Object-storage access key
    #[arg(long)]
    pub access_key: Option<String>,

    /// Object-storage secret key
    #[arg(long)]
    pub secret_key: Option<String>,

    /// Object-storage region (default us-east-1)
    #[arg(long)]
    pub region: Option<String>,

    /// Custom object-storage endpoint for S3-compatible services
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Keep absolute source paths inside the archive
    #[arg(long, action = clap::ArgAction::SetTrue, conflicts_with = "no_preserve_paths")]
    pub preserve_paths: bool,

    /// Strip source roots even if the config file preserves paths
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub no_preserve_paths: bool,

    /// Store files without compression
    #[arg(long, action = clap::ArgAction::SetTrue, conflicts_with = "compress")]
    pub stored: bool,

    /// Deflate files even if the config file disables compression
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub compress: bool,

    /// Dry run (just list files and parameters)
    #[arg(short, long, action = clap::ArgAction::SetTrue)]
    pub dry: bool,

    /// Command to execute before backup
    #[arg(short, long)]
    pub before: Option<String>,

    /// Command to execute after a successful backup
    #[arg(short, long)]
    pub after: Option<String>,

    /// NAME=COMMAND: run COMMAND in a scratch directory archived under NAME (repeatable)
    #[arg(short, long)]
    pub generate: Vec<String>,

    /// Generate YAML config to stdout
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub generate_yaml_config: bool,

    /// Directories to backup
    #[arg()]
    pub paths: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    // Merge order: env < file < CLI
    let env_config = read_env();

    let mut file_config = Config::default();
    if let Some(path) = cli.config.clone().or(env_config.config.clone()) {
        file_config = read_config_file(&path)?;
    }

    let merged = merge_configs(env_config, file_config, cli_to_config(&cli));

    if cli.generate_yaml_config {
        let yaml = serde_yaml::to_string(&merged)?;
        println!("{yaml}");
        return Ok(());
    }

    if merged.output.as_deref().unwrap_or("").is_empty() {
        eprintln!("Error: output (--output, config:output or STORELET_OUTPUT) is required");
        std::process::exit(2);
    }

    let has_paths = merged.paths.as_ref().is_some_and(|p| !p.is_empty());
    let has_generators = merged.generate.as_ref().is_some_and(|g| !g.is_empty());
    if !has_paths && !has_generators {
        eprintln!(
            "Error: at least one path or generator must be provided (CLI, config:paths/generate, STORELET_PATHS)"
        );
        std::process::exit(3);
    }

    if merged.dry.unwrap_or(false) {
        println!("--- DRY RUN ---");
        println!("{}", serde_yaml::to_string(&redacted(&merged))?);
        let entries = list_planned_entries(&merged)?;
        let total = total_size(&entries);
        println!("Total files: {}", entries.len());
        println!("Total size: {}", encode_size(total));
        for entry in entries {
            println!("{} -> {}", entry.path.display(), entry.member);
        }
        for generator in merged.generate.iter().flatten() {
            println!("generator: {generator}");
        }
        return Ok(());
    }

    process::run_backup(&merged)
}

/// Reads environment variables prefixed with STORELET_
fn read_env() -> Config {
    let vars: HashMap<String, String> = env::vars().collect();
    config_from_vars(&vars)
}

fn config_from_vars(vars: &HashMap<String, String>) -> Config {
    macro_rules! get_env {
        ($key:expr) => {
            vars.get(&format!("{}{}", ENV_PREFIX, $key)).cloned()
        };
    }

    fn flag(v: String) -> bool {
        v == "true" || v == "1" || v.eq_ignore_ascii_case("yes")
    }

    fn list(v: String) -> Vec<String> {
        v.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    Config {
        name: get_env!("NAME"),
        output: get_env!("OUTPUT"),
        config: get_env!("CONFIG"),
        access_key: get_env!("ACCESS_KEY"),
        secret_key: get_env!("SECRET_KEY"),
        region: get_env!("REGION"),
        endpoint: get_env!("ENDPOINT"),
        preserve_paths: get_env!("PRESERVE_PATHS").map(flag),
        compress: get_env!("COMPRESS").map(flag),
        dry: get_env!("DRY").map(flag),
        before: get_env!("BEFORE"),
        after: get_env!("AFTER"),
        paths: get_env!("PATHS").map(list),
        // Single generator; commands may contain commas.
        generate: get_env!("GENERATE").map(|v| vec![v]),
    }
}

/// Reads YAML or JSON config from file
fn read_config_file(path: &str) -> anyhow::Result<Config> {
    debug!("reading config from {path}");
    let content = fs::read_to_string(path)?;
    let lower = path.to_lowercase();
    let cfg = if lower.ends_with(".json") {
        serde_json::from_str(&content)?
    } else {
        serde_yaml::from_str(&content)?
    };
    Ok(cfg)
}

/// Converts CLI struct into Config; flags left unset stay `None` so they
/// don't override lower layers.
fn cli_to_config(cli: &Cli) -> Config {
    Config {
        name: cli.name.clone(),
        output: cli.output.clone(),
        config: cli.config.clone(),
        access_key: cli.access_key.clone(),
        secret_key: cli.secret_key.clone(),
        region: cli.region.clone(),
        endpoint: cli.endpoint.clone(),
        preserve_paths: switch(cli.preserve_paths, cli.no_preserve_paths),
        compress: switch(cli.compress, cli.stored),
        dry: cli.dry.then_some(true),
        before: cli.before.clone(),
        after: cli.after.clone(),
        paths: if cli.paths.is_empty() {
            None
        } else {
            Some(cli.paths.clone())
        },
        generate: if cli.generate.is_empty() {
            None
        } else {
            Some(cli.generate.clone())
        },
    }
}

/// A pair of opposing flags: `None` when neither was given.
fn switch(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (false, true) => Some(false),
        (false, false) => None,
    }
}

/// Merge configs by priority: env < file < cli
fn merge_configs(env: Config, file: Config, cli: Config) -> Config {
    fn pick<T: Clone>(env: Option<T>, file: Option<T>, cli: Option<T>) -> Option<T> {
        cli.or(file).or(env)
    }

    Config {
        name: pick(env.name, file.name, cli.name),
        output: pick(env.output, file.output, cli.output),
        config: pick(env.config, file.config, cli.config),
        access_key: pick(env.access_key, file.access_key, cli.access_key),
        secret_key: pick(env.secret_key, file.secret_key, cli.secret_key),
        region: pick(env.region, file.region, cli.region),
        endpoint: pick(env.endpoint, file.endpoint, cli.endpoint),
        preserve_paths: pick(env.preserve_paths, file.preserve_paths, cli.preserve_paths),
        compress: pick(env.compress, file.compress, cli.compress),
        dry: pick(env.dry, file.dry, cli.dry),
        before: pick(env.before, file.before, cli.before),
        after: pick(env.after, file.after, cli.after),
        paths: pick(env.paths, file.paths, cli.paths),
        generate: pick(env.generate, file.generate, cli.generate),
    }
}

fn redacted(config: &Config) -> Config {
    let mut shown = config.clone();
    if shown.secret_key.is_some() {
        shown.secret_key = Some("<redacted>".to_string());
    }
    shown
}

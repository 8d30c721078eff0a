use std::env;
use std::path::PathBuf;

/// Options for a command-line run.
#[derive(Debug, Clone, PartialEq)]
pub struct CliOptions {
    pub config: PathBuf,
    /// `dotted.path=value` overrides, in the order given.
    pub overrides: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CliCommand {
    Run(CliOptions),
    Help,
}

pub fn parse_args() -> Result<CliCommand, String> {
    let args: Vec<String> = env::args().skip(1).collect();
    parse_args_from(args)
}

pub fn parse_args_from(args: Vec<String>) -> Result<CliCommand, String> {
    let mut i = 0usize;
    let mut config = None;
    let mut overrides = Vec::new();

    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                i += 1;
                let path = args.next_or_err(i, "missing value for --config (expected a TOML file path)")?;
                if config.replace(PathBuf::from(path)).is_some() {
                    return Err("--config provided more than once".to_string());
                }
            }
            "--override" | "-o" => {
                let start = overrides.len();
                while let Some(value) = args.get(i + 1).filter(|a| !is_flag(a)) {
                    overrides.push(value.clone());
                    i += 1;
                }
                if overrides.len() == start {
                    return Err("missing value for --override (expected key=value)".to_string());
                }
            }
            "--help" | "-h" => return Ok(CliCommand::Help),
            other => return Err(format!("unknown argument: {other}")),
        }
        i += 1;
    }

    let config = config.ok_or_else(|| "missing required argument --config".to_string())?;
    Ok(CliCommand::Run(CliOptions { config, overrides }))
}

fn is_flag(arg: &str) -> bool {
    arg.starts_with('-')
}

trait SliceArgExt {
    fn next_or_err(&self, index: usize, err: &str) -> Result<&str, String>;
}

impl SliceArgExt for [String] {
    fn next_or_err(&self, index: usize, err: &str) -> Result<&str, String> {
        self.get(index)
            .map(String::as_str)
            .ok_or_else(|| err.to_string())
    }
}

pub fn print_usage() {
    eprintln!("snobal-sim: point snowpack energy and mass balance simulation");
    eprintln!();
    eprintln!("Usage: snobal-sim --config <path> [--override <key=value>...]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -c, --config <path>          Run configuration (TOML)");
    eprintln!("  -o, --override <key=value>   Replace an existing config value, e.g.");
    eprintln!("                               defaults.max_h2o_vol_frac=0.02 (repeatable)");
    eprintln!("  -h, --help                   Show this help message");
}

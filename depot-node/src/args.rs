//! Command line: `depot name {goods qty}`.

use std::ffi::OsString;

use clap::error::ErrorKind;
use clap::Parser;
use depot_core::{is_valid_name, parse_int};

#[derive(Debug, Parser)]
#[command(name = "depot", version, disable_help_flag = true)]
struct Cli {
    /// Depot name announced to peers.
    name: Option<String>,
    /// Initial stock as item/quantity pairs.
    #[arg(num_args = 0..)]
    goods: Vec<String>,
}

/// `depot --version` or `depot -V` with nothing else.
fn asks_for_version(args: &[OsString]) -> bool {
    args.len() == 2 && matches!(args[1].to_str(), Some("--version" | "-V"))
}

/// Validated startup values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Startup {
    pub name: String,
    pub seed: Vec<(String, i64)>,
}

/// What to do instead of starting a depot.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StartupError {
    #[error("Usage: depot name {{goods qty}}")]
    Usage,
    #[error("Invalid name(s)")]
    InvalidName,
    #[error("Invalid quantity")]
    InvalidQuantity,
    /// `--version`; clap has already rendered the text.
    #[error("{0}")]
    Version(String),
}

impl StartupError {
    pub fn exit_code(&self) -> u8 {
        match self {
            StartupError::Version(_) => 0,
            StartupError::Usage => 1,
            StartupError::InvalidName => 2,
            StartupError::InvalidQuantity => 3,
        }
    }
}

/// Parse and validate the full argument list (program name first).
/// Checks run in order: arity, depot name, then each pair (quantity before item).
/// Every other token is a value, so `--`, `-V` and `--version` are ordinary names here.
pub fn parse<I, T>(args: I) -> Result<Startup, StartupError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let mut args: Vec<OsString> = args.into_iter().map(Into::into).collect();
    if !args.is_empty() && !asks_for_version(&args) {
        args.insert(1, OsString::from("--"));
    }
    let cli = Cli::try_parse_from(args).map_err(|e| match e.kind() {
        ErrorKind::DisplayVersion => StartupError::Version(e.to_string()),
        _ => StartupError::Usage,
    })?;
    let Some(name) = cli.name else {
        return Err(StartupError::Usage);
    };
    if cli.goods.len() % 2 != 0 {
        return Err(StartupError::Usage);
    }
    if !is_valid_name(&name) {
        return Err(StartupError::InvalidName);
    }
    let mut seed = Vec::with_capacity(cli.goods.len() / 2);
    for pair in cli.goods.chunks(2) {
        let quantity = parse_int(&pair[1])
            .filter(|q| *q >= 0)
            .ok_or(StartupError::InvalidQuantity)?;
        if !is_valid_name(&pair[0]) {
            return Err(StartupError::InvalidName);
        }
        seed.push((pair[0].clone(), quantity));
    }
    Ok(Startup { name, seed })
}

//! Normalize command - rewrite foreign exports to the canonical schema

use crate::cmd::{canonicalize, read_input};
use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct NormalizeCommand {
    /// Transactions CSV file (native or CoinTracker). Reads from stdin
    /// if not specified.
    #[arg(default_value = "-")]
    file: PathBuf,

    /// Fill missing unit prices from historical daily closes
    #[arg(long)]
    fetch_prices: bool,
}

impl NormalizeCommand {
    pub fn exec(&self) -> color_eyre::Result<()> {
        let raw = read_input(&self.file)?;
        let mut warnings = Vec::new();
        let canonical = canonicalize(&raw, self.fetch_prices, &mut warnings)?;

        for warning in &warnings {
            eprintln!("warning: {warning}");
        }
        print!("{canonical}");
        Ok(())
    }
}

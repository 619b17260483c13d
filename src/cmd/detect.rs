//! Detect command - classify a CSV file from its header row

use crate::cmd::read_input;
use crate::format::detect_format;
use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct DetectCommand {
    /// Transactions CSV file. Reads from stdin if not specified.
    #[arg(default_value = "-")]
    file: PathBuf,
}

impl DetectCommand {
    pub fn exec(&self) -> color_eyre::Result<()> {
        let raw = read_input(&self.file)?;
        println!("{}", detect_format(&raw));
        Ok(())
    }
}

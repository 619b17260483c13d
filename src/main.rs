use clap::{Parser, Subcommand};

mod cmd;
mod cointracker;
mod diagnostics;
mod enrich;
mod format;
mod oracle;
mod tax;
mod transaction;
mod utils;

#[derive(Parser, Debug)]
#[command(name = "capgains", version, about = "Calculate US crypto capital gains tax reports")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify a CSV file from its header row
    Detect(cmd::detect::DetectCommand),
    /// Rewrite a CoinTracker export to the canonical schema
    Normalize(cmd::normalize::NormalizeCommand),
    /// Generate a tax report for one year
    Report(cmd::report::ReportCommand),
    /// Show residual lot inventory after replaying all transactions
    Lots(cmd::lots::LotsCommand),
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Command::Detect(cmd) => cmd.exec(),
        Command::Normalize(cmd) => cmd.exec(),
        Command::Report(cmd) => cmd.exec(),
        Command::Lots(cmd) => cmd.exec(),
    }
}

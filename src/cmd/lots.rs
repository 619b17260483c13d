//! Lots command - residual inventory after replaying all transactions

use crate::cmd::{prepare, MethodArg};
use crate::tax::{calculate, Method};
use crate::utils::{format_quantity, format_usd};
use clap::Args;
use std::path::PathBuf;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

#[derive(Args, Debug)]
pub struct LotsCommand {
    /// Transactions CSV file (native or CoinTracker). Reads from stdin
    /// if not specified.
    #[arg(default_value = "-")]
    file: PathBuf,

    /// Cost basis selection method
    #[arg(short, long, value_enum, default_value_t = MethodArg::Fifo)]
    method: MethodArg,

    /// Fill missing unit prices from historical daily closes
    #[arg(long)]
    fetch_prices: bool,

    /// Output as JSON instead of a formatted table
    #[arg(long)]
    json: bool,
}

#[derive(Tabled)]
struct LotRow {
    #[tabled(rename = "Id")]
    id: u64,
    #[tabled(rename = "Wallet")]
    wallet: String,
    #[tabled(rename = "Asset")]
    asset: String,
    #[tabled(rename = "Remaining")]
    remaining: String,
    #[tabled(rename = "Original")]
    original: String,
    #[tabled(rename = "Basis/Unit")]
    basis: String,
    #[tabled(rename = "Cost")]
    cost: String,
    #[tabled(rename = "Acquired")]
    acquired: String,
    #[tabled(rename = "Via")]
    via: String,
}

impl LotsCommand {
    pub fn exec(&self) -> color_eyre::Result<()> {
        let method: Method = self.method.into();
        let input = prepare(&self.file, self.fetch_prices)?;
        let result = calculate(input.transactions, method);

        if self.json {
            println!("{}", serde_json::to_string_pretty(&result.remaining_lots)?);
            return Ok(());
        }

        if result.remaining_lots.is_empty() {
            println!("No remaining lots.");
            return Ok(());
        }

        let rows: Vec<LotRow> = result
            .remaining_lots
            .iter()
            .map(|lot| LotRow {
                id: lot.id,
                wallet: lot.wallet.clone(),
                asset: lot.asset.clone(),
                remaining: format_quantity(lot.remaining),
                original: format_quantity(lot.original),
                basis: format_usd(lot.basis_per_unit),
                cost: format_usd(lot.remaining * lot.basis_per_unit),
                acquired: lot.acquired_at.format("%Y-%m-%d").to_string(),
                via: lot.acquired_as.to_string(),
            })
            .collect();

        let mut table = Table::new(rows);
        table
            .with(Style::rounded())
            .with(Modify::new(Rows::new(1..)).with(Alignment::right()));
        println!("{table}");

        for error in &result.errors {
            eprintln!("error: {error}");
        }
        Ok(())
    }
}

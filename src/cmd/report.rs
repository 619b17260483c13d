//! Report command - full pipeline to a Schedule-D style tax report

use crate::cmd::{prepare, MethodArg};
use crate::tax::report::TaxReport;
use crate::tax::{calculate, generate_report, Method};
use crate::utils::{format_quantity, format_usd, write_csv};
use clap::Args;
use std::io;
use std::path::PathBuf;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

#[derive(Args, Debug)]
pub struct ReportCommand {
    /// Transactions CSV file (native or CoinTracker). Reads from stdin
    /// if not specified.
    #[arg(default_value = "-")]
    file: PathBuf,

    /// Tax year to report (e.g., 2024)
    #[arg(short, long)]
    year: i32,

    /// Cost basis selection method
    #[arg(short, long, value_enum, default_value_t = MethodArg::Fifo)]
    method: MethodArg,

    /// Fill missing unit prices from historical daily closes
    #[arg(long)]
    fetch_prices: bool,

    /// Output the full report as JSON
    #[arg(long)]
    json: bool,

    /// Output the 8949-style rows as CSV
    #[arg(long)]
    csv: bool,
}

#[derive(Tabled)]
struct DisposalRow {
    #[tabled(rename = "Description")]
    description: String,
    #[tabled(rename = "Acquired")]
    acquired: String,
    #[tabled(rename = "Sold")]
    sold: String,
    #[tabled(rename = "Proceeds")]
    proceeds: String,
    #[tabled(rename = "Cost Basis")]
    cost_basis: String,
    #[tabled(rename = "Gain/Loss")]
    gain: String,
    #[tabled(rename = "Term")]
    term: String,
    #[tabled(rename = "Days")]
    days: String,
}

#[derive(Tabled)]
struct IncomeRow {
    #[tabled(rename = "Date")]
    date: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Asset")]
    asset: String,
    #[tabled(rename = "Amount")]
    amount: String,
    #[tabled(rename = "FMV (USD)")]
    fmv: String,
    #[tabled(rename = "Wallet")]
    wallet: String,
}

#[derive(Tabled)]
struct LotRow {
    #[tabled(rename = "Wallet")]
    wallet: String,
    #[tabled(rename = "Asset")]
    asset: String,
    #[tabled(rename = "Remaining")]
    remaining: String,
    #[tabled(rename = "Basis/Unit")]
    basis: String,
    #[tabled(rename = "Acquired")]
    acquired: String,
}

impl ReportCommand {
    pub fn exec(&self) -> color_eyre::Result<()> {
        let method: Method = self.method.into();
        let input = prepare(&self.file, self.fetch_prices)?;

        let result = calculate(input.transactions, method);
        let mut errors = input.errors;
        errors.extend(result.errors.iter().cloned());
        let mut warnings = input.warnings;
        warnings.extend(result.warnings.iter().cloned());

        let report = generate_report(
            &result.disposals,
            &result.income_events,
            &result.remaining_lots,
            self.year,
            method,
            errors,
            warnings,
        );

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else if self.csv {
            write_csv(&report.rows, io::stdout())?;
        } else {
            self.print_report(&report);
        }

        if !report.errors.is_empty() {
            std::process::exit(1);
        }
        Ok(())
    }

    fn print_report(&self, report: &TaxReport) {
        println!();
        println!("TAX REPORT {} ({})", report.year, report.method);

        println!();
        println!("DISPOSALS");
        if report.rows.is_empty() {
            println!("  (none in {})", report.year);
        } else {
            let rows: Vec<DisposalRow> = report
                .rows
                .iter()
                .map(|row| DisposalRow {
                    description: row.description.clone(),
                    acquired: row.date_acquired.format("%Y-%m-%d").to_string(),
                    sold: row.date_sold.format("%Y-%m-%d").to_string(),
                    proceeds: format_usd(row.proceeds),
                    cost_basis: format_usd(row.cost_basis),
                    gain: format_usd(row.gain),
                    term: if row.long_term { "Long" } else { "Short" }.to_string(),
                    days: row.days_held.to_string(),
                })
                .collect();
            println!("{}", styled(Table::new(rows)));
        }

        println!();
        println!("ORDINARY INCOME");
        if report.income_events.is_empty() {
            println!("  (none in {})", report.year);
        } else {
            let rows: Vec<IncomeRow> = report
                .income_events
                .iter()
                .map(|event| IncomeRow {
                    date: event.date.format("%Y-%m-%d").to_string(),
                    kind: event.kind.to_string(),
                    asset: event.asset.clone(),
                    amount: format_quantity(event.amount),
                    fmv: format_usd(event.fmv_usd),
                    wallet: event.wallet.clone(),
                })
                .collect();
            println!("{}", styled(Table::new(rows)));
            println!("  Total income: {}", format_usd(report.total_income));
        }

        println!();
        println!("SCHEDULE D SUMMARY");
        let s = &report.summary;
        println!("  Short-term gains:  {:>15}", format_usd(s.short_term_gains));
        println!("  Short-term losses: {:>15}", format_usd(s.short_term_losses));
        println!("  Net short-term:    {:>15}", format_usd(s.net_short_term));
        println!("  Long-term gains:   {:>15}", format_usd(s.long_term_gains));
        println!("  Long-term losses:  {:>15}", format_usd(s.long_term_losses));
        println!("  Net long-term:     {:>15}", format_usd(s.net_long_term));
        println!("  Total gain/loss:   {:>15}", format_usd(s.total));

        println!();
        println!("REMAINING LOTS");
        if report.remaining_lots.is_empty() {
            println!("  (none)");
        } else {
            let rows: Vec<LotRow> = report
                .remaining_lots
                .iter()
                .map(|lot| LotRow {
                    wallet: lot.wallet.clone(),
                    asset: lot.asset.clone(),
                    remaining: format_quantity(lot.remaining),
                    basis: format_usd(lot.basis_per_unit),
                    acquired: lot.acquired_at.format("%Y-%m-%d").to_string(),
                })
                .collect();
            println!("{}", styled(Table::new(rows)));
        }

        if !report.warnings.is_empty() {
            println!();
            println!("\u{26A0} {} warning(s):", report.warnings.len());
            for warning in &report.warnings {
                println!("  {warning}");
            }
        }
        if !report.errors.is_empty() {
            println!();
            println!("\u{2717} {} error(s):", report.errors.len());
            for error in &report.errors {
                println!("  {error}");
            }
        }
    }
}

fn styled(mut table: Table) -> String {
    table
        .with(Style::rounded())
        .with(Modify::new(Rows::new(1..)).with(Alignment::right()));
    table.to_string()
}

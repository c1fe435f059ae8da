//! Result formatting and export.
//!
//! The engine emits plain tabular structures; everything here is a
//! convenience for terminal inspection and flat-file export. Charting and
//! dashboard rendering belong to the presentation layer.

use crate::backtest::{sharpe_ratio, BacktestReport};
use crate::error::Result;
use crate::stationarity::AdfResult;
use crate::types::TradeRecord;
use colored::Colorize;
use std::io::Write;
use std::path::Path;
use tabled::{builder::Builder, settings::Style};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format results for terminal display.
pub struct ResultFormatter;

impl ResultFormatter {
    /// Print a backtest summary to stdout.
    pub fn print_report(report: &BacktestReport) {
        println!();
        println!("{}", "═".repeat(60).blue());
        println!("{}", " PAIR BACKTEST RESULTS ".bold().blue());
        println!("{}", "═".repeat(60).blue());
        println!();

        println!("{}", "Trade Statistics".bold().underline());
        println!("  Total Trades:    {:>12}", report.total_trades);
        println!(
            "  Winning Trades:  {:>12}  ({:.1}%)",
            report.winning_trades,
            report.win_rate * 100.0
        );
        println!("  Losing Trades:   {:>12}", report.losing_trades);
        println!("  Forced Closes:   {:>12}", report.forced_closes);
        println!();

        println!("{}", "P&L".bold().underline());
        println!(
            "  Total P&L:       {:>12.4}  {}",
            report.total_pnl,
            Self::format_signed(report.total_pnl)
        );
        println!("  Realized P&L:    {:>12.4}", report.realized_pnl);
        println!("  Forced P&L:      {:>12.4}", report.forced_pnl);
        println!(
            "  Sharpe Ratio:    {:>12.2}",
            sharpe_ratio(&report.equity_curve)
        );
        println!();

        println!("{}", "═".repeat(60).blue());
    }

    /// Print the trade ledger as a table.
    pub fn print_trades(report: &BacktestReport) {
        if report.trades.is_empty() {
            println!("No trades.");
            return;
        }

        let mut builder = Builder::new();
        builder.push_record([
            "Direction",
            "Entry Time",
            "Entry Z",
            "Exit Time",
            "Exit Z",
            "P&L",
            "Forced",
        ]);
        for trade in &report.trades {
            builder.push_record([
                trade.direction.to_string(),
                trade.entry_time.format(TIME_FORMAT).to_string(),
                format!("{:.3}", trade.entry_zscore),
                trade
                    .exit_time
                    .map(|t| t.format(TIME_FORMAT).to_string())
                    .unwrap_or_else(|| "open".to_string()),
                trade
                    .exit_zscore
                    .map(|z| format!("{:.3}", z))
                    .unwrap_or_else(|| "-".to_string()),
                trade
                    .pnl
                    .map(|p| format!("{:.4}", p))
                    .unwrap_or_else(|| "-".to_string()),
                (if trade.forced { "yes" } else { "" }).to_string(),
            ]);
        }

        let table = builder.build().with(Style::rounded()).to_string();
        println!("{}", table);
    }

    /// Print an ADF test summary.
    pub fn print_adf(result: &AdfResult) {
        let verdict = if result.is_stationary {
            "stationary".green().bold()
        } else {
            "non-stationary".red().bold()
        };
        println!();
        println!("{}", "ADF Stationarity Test".bold().underline());
        println!("  Test Statistic:  {:>12.4}", result.test_statistic);
        println!("  P-Value:         {:>12.4}", result.p_value);
        println!("  Lag Order:       {:>12}", result.lag);
        println!("  Observations:    {:>12}", result.n_obs);
        for (level, value) in &result.critical_values {
            println!("  Critical {:>4}:   {:>12.4}", level, value);
        }
        println!("  Verdict:         {:>12}", verdict);
        println!();
    }

    /// Export a backtest report to pretty JSON.
    pub fn to_json(report: &BacktestReport) -> Result<String> {
        Ok(serde_json::to_string_pretty(report)?)
    }

    fn format_signed(value: f64) -> String {
        if value >= 0.0 {
            format!("(+{:.4})", value).green().to_string()
        } else {
            format!("({:.4})", value).red().to_string()
        }
    }
}

/// Write the trade ledger as CSV to any writer.
pub fn write_trades_csv<W: Write>(trades: &[TradeRecord], writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record([
        "entry_time",
        "exit_time",
        "direction",
        "entry_zscore",
        "exit_zscore",
        "entry_spread",
        "exit_spread",
        "pnl",
        "forced",
    ])?;

    for trade in trades {
        csv_writer.write_record([
            trade.entry_time.format(TIME_FORMAT).to_string(),
            trade
                .exit_time
                .map(|t| t.format(TIME_FORMAT).to_string())
                .unwrap_or_default(),
            trade.direction.to_string(),
            format!("{:.6}", trade.entry_zscore),
            trade
                .exit_zscore
                .map(|z| format!("{:.6}", z))
                .unwrap_or_default(),
            format!("{:.6}", trade.entry_spread),
            trade
                .exit_spread
                .map(|s| format!("{:.6}", s))
                .unwrap_or_default(),
            trade.pnl.map(|p| format!("{:.6}", p)).unwrap_or_default(),
            trade.forced.to_string(),
        ])?;
    }

    csv_writer.flush()?;
    Ok(())
}

/// Write the trade ledger as a CSV file.
pub fn export_trades_csv(trades: &[TradeRecord], path: impl AsRef<Path>) -> Result<()> {
    let file = std::fs::File::create(path)?;
    write_trades_csv(trades, file)
}

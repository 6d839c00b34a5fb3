use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use crate::config::AppConfig;
use crate::coordinator::AnalysisReport;
use crate::error::{HedgeflowError, Result};

#[derive(Parser, Debug)]
#[command(name = "hedgeflow")]
#[command(version)]
#[command(
    about = "Multi-agent equity analysis pipeline on a privacy-scoped message bus",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config directory (default.toml plus $HEDGEFLOW_ENV overrides)
    #[arg(short, long, default_value = "config", env = "HEDGEFLOW_CONFIG_DIR")]
    pub config: String,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Start the bus, the websocket server and the agent supervisors
    Run {
        /// Start every agent immediately instead of waiting for a UI command
        #[arg(long)]
        autostart: bool,
        /// Listen port (overrides server.port)
        #[arg(short, long)]
        port: Option<u16>,
        /// Ticker to follow (overrides pipeline.ticker)
        #[arg(short, long)]
        ticker: Option<String>,
    },
    /// Run the pipeline once and print the first trading decision
    Analyze {
        /// Ticker symbol, e.g. AAPL
        #[arg(short, long)]
        ticker: String,
        /// First day of the price window (YYYY-MM-DD)
        #[arg(long)]
        start_date: Option<NaiveDate>,
        /// Last day of the price window (YYYY-MM-DD)
        #[arg(long)]
        end_date: Option<NaiveDate>,
        /// Print intermediate artifacts and agent thoughts
        #[arg(long)]
        show_reasoning: bool,
    },
    /// Print the effective configuration as TOML
    Config,
}

impl Commands {
    /// Fold command-line overrides into the loaded configuration
    pub fn apply_overrides(&self, config: &mut AppConfig) {
        match self {
            Commands::Run { port, ticker, .. } => {
                if let Some(port) = port {
                    config.server.port = *port;
                }
                if let Some(ticker) = ticker {
                    config.pipeline.ticker = ticker.to_uppercase();
                }
            }
            Commands::Analyze {
                ticker,
                start_date,
                end_date,
                ..
            } => {
                config.pipeline.ticker = ticker.to_uppercase();
                if start_date.is_some() {
                    config.pipeline.start_date = *start_date;
                }
                if end_date.is_some() {
                    config.pipeline.end_date = *end_date;
                }
            }
            Commands::Config => {}
        }
    }
}

/// Effective configuration as TOML, credentials masked
pub fn render_config(config: &AppConfig) -> Result<String> {
    let mut shown = config.clone();
    let mask = |secret: &mut Option<String>| {
        if secret.is_some() {
            *secret = Some("********".to_string());
        }
    };
    mask(&mut shown.market.api_key_id);
    mask(&mut shown.market.api_secret_key);
    mask(&mut shown.llm.api_key);

    toml::to_string_pretty(&shown)
        .map_err(|e| HedgeflowError::Internal(format!("failed to render config: {}", e)))
}

/// Human-readable summary of one pipeline pass
pub fn render_report(report: &AnalysisReport, show_reasoning: bool) -> String {
    let mut out = String::new();

    if show_reasoning {
        if let Some(market) = &report.market_data {
            out.push_str(&format!(
                "\x1b[36m== Market data ==\x1b[0m\n{} bars, last close {:.2}\n\n",
                market.prices.len(),
                market.prices.last_close().unwrap_or_default()
            ));
        }
        if let Some(ta) = &report.technical_analysis {
            let ind = &ta.indicators;
            out.push_str(&format!(
                "\x1b[36m== Technical analysis ==\x1b[0m\n\
                 MACD {:.4} / signal {:.4} -> {}\n\
                 RSI {:.2} -> {}\n\
                 Bollinger position {:.2} -> {}\n\n",
                ind.macd,
                ind.macd_signal,
                signal_at(&ta.signals, 0),
                ind.rsi,
                signal_at(&ta.signals, 1),
                ind.bollinger_position,
                signal_at(&ta.signals, 2),
            ));
        }
        if let Some(risk) = &report.risk_assessment {
            out.push_str(&format!(
                "\x1b[36m== Risk ==\x1b[0m\nlevel {}, max position {}, stop loss {}\n\n",
                risk.risk_level, risk.max_position_size, risk.stop_loss
            ));
        }
        if !report.thoughts.is_empty() {
            out.push_str("\x1b[36m== Agent thoughts ==\x1b[0m\n");
            for (agent, thought) in &report.thoughts {
                out.push_str(&format!("[{}] {}\n", agent, thought));
            }
            out.push('\n');
        }
    }

    match &report.decision {
        Some(decision) => out.push_str(&format!(
            "\x1b[32m✓ {} {}\x1b[0m\n  reason: {}\n  max position: {}\n  stop loss: {}\n",
            decision.action.to_string().to_uppercase(),
            decision.ticker.as_deref().unwrap_or("-"),
            decision.reason,
            decision.max_position_size,
            decision.stop_loss
        )),
        None => out.push_str("\x1b[31m✗ no trading decision\x1b[0m\n"),
    }
    out
}

fn signal_at(signals: &[crate::domain::Signal], idx: usize) -> String {
    signals
        .get(idx)
        .map(|s| s.to_string())
        .unwrap_or_else(|| "-".to_string())
}

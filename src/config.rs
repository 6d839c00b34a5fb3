use chrono::NaiveDate;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub market: MarketConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BusConfig {
    /// Upper bound on how long `stop()` waits for queued messages to drain
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,
}

fn default_drain_timeout_ms() -> u64 {
    5_000
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            drain_timeout_ms: default_drain_timeout_ms(),
        }
    }
}

impl BusConfig {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SupervisorConfig {
    /// Length of one scheduling unit (inter-tick sleep, backoff base)
    #[serde(default = "default_scheduling_unit_ms")]
    pub scheduling_unit_ms: u64,
    /// Consecutive tick failures before the agent stops itself
    #[serde(default = "default_max_consecutive_errors")]
    pub max_consecutive_errors: u32,
    /// Backoff cap, in scheduling units
    #[serde(default = "default_max_backoff_units")]
    pub max_backoff_units: u32,
}

fn default_scheduling_unit_ms() -> u64 {
    1_000
}

fn default_max_consecutive_errors() -> u32 {
    3
}

fn default_max_backoff_units() -> u32 {
    60
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            scheduling_unit_ms: default_scheduling_unit_ms(),
            max_consecutive_errors: default_max_consecutive_errors(),
            max_backoff_units: default_max_backoff_units(),
        }
    }
}

impl SupervisorConfig {
    pub fn scheduling_unit(&self) -> Duration {
        Duration::from_millis(self.scheduling_unit_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Ticker fetched until a user message switches it
    #[serde(default = "default_ticker")]
    pub ticker: String,
    /// History window when no explicit start date is set
    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,
    /// Fixed start of the price window (YYYY-MM-DD)
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    /// Fixed end of the price window (YYYY-MM-DD), defaults to today
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default = "default_ingest_interval")]
    pub ingest_interval_secs: u64,
    #[serde(default = "default_stage_interval")]
    pub analyze_interval_secs: u64,
    #[serde(default = "default_stage_interval")]
    pub risk_interval_secs: u64,
    #[serde(default = "default_stage_interval")]
    pub decide_interval_secs: u64,
}

fn default_ticker() -> String {
    "AAPL".to_string()
}

fn default_lookback_days() -> i64 {
    90
}

fn default_ingest_interval() -> u64 {
    60
}

fn default_stage_interval() -> u64 {
    300
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ticker: default_ticker(),
            lookback_days: default_lookback_days(),
            start_date: None,
            end_date: None,
            ingest_interval_secs: default_ingest_interval(),
            analyze_interval_secs: default_stage_interval(),
            risk_interval_secs: default_stage_interval(),
            decide_interval_secs: default_stage_interval(),
        }
    }
}

impl PipelineConfig {
    /// Fetch window: explicit dates win, otherwise `lookback_days` back
    /// from `today`
    pub fn date_window(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let end = self.end_date.unwrap_or(today);
        let start = self
            .start_date
            .unwrap_or_else(|| end - chrono::Duration::days(self.lookback_days));
        (start, end)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MarketConfig {
    /// "synthetic" or "alpaca"
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Seed for the synthetic random walk
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_alpaca_data_url")]
    pub data_url: String,
    #[serde(default = "default_alpaca_live_url")]
    pub trading_url: String,
    #[serde(default = "default_alpaca_paper_url")]
    pub paper_trading_url: String,
    /// Normally supplied via HEDGEFLOW_MARKET__API_KEY_ID
    #[serde(default, skip_serializing)]
    pub api_key_id: Option<String>,
    #[serde(default, skip_serializing)]
    pub api_secret_key: Option<String>,
}

fn default_provider() -> String {
    "synthetic".to_string()
}

fn default_seed() -> u64 {
    7
}

fn default_alpaca_data_url() -> String {
    "https://data.alpaca.markets".to_string()
}

fn default_alpaca_live_url() -> String {
    "https://api.alpaca.markets".to_string()
}

fn default_alpaca_paper_url() -> String {
    "https://paper-api.alpaca.markets".to_string()
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            seed: default_seed(),
            data_url: default_alpaca_data_url(),
            trading_url: default_alpaca_live_url(),
            paper_trading_url: default_alpaca_paper_url(),
            api_key_id: None,
            api_secret_key: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutionConfig {
    /// Submit orders for buy/sell decisions
    #[serde(default)]
    pub enabled: bool,
    /// Paper account instead of live
    #[serde(default = "default_true")]
    pub paper: bool,
    /// Shares per submitted order
    #[serde(default = "default_quantity")]
    pub quantity: u64,
}

fn default_true() -> bool {
    true
}

fn default_quantity() -> u64 {
    1
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            paper: true,
            quantity: default_quantity(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// Use the chat-completions backend; otherwise replies are canned
    #[serde(default)]
    pub enabled: bool,
    /// OpenAI-compatible base URL (Ollama: http://localhost:11434/v1)
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_llm_timeout() -> u64 {
    30
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            api_key: None,
            temperature: default_temperature(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Directory for the daily rolling log file (console only when unset)
    #[serde(default)]
    pub dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            dir: None,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bus: BusConfig::default(),
            supervisor: SupervisorConfig::default(),
            pipeline: PipelineConfig::default(),
            market: MarketConfig::default(),
            execution: ExecutionConfig::default(),
            llm: LlmConfig::default(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("supervisor.max_consecutive_errors", 3)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("HEDGEFLOW_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (HEDGEFLOW_PIPELINE__TICKER, etc.)
            .add_source(
                Environment::with_prefix("HEDGEFLOW")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.supervisor.scheduling_unit_ms == 0 {
            errors.push("scheduling_unit_ms must be positive".to_string());
        }

        if self.supervisor.max_consecutive_errors == 0 {
            errors.push("max_consecutive_errors must be at least 1".to_string());
        }

        if self.supervisor.max_backoff_units == 0 {
            errors.push("max_backoff_units must be at least 1".to_string());
        }

        if self.pipeline.ticker.trim().is_empty() {
            errors.push("ticker must not be empty".to_string());
        }

        if self.pipeline.lookback_days <= 0 {
            errors.push("lookback_days must be positive".to_string());
        }

        if let (Some(start), Some(end)) = (self.pipeline.start_date, self.pipeline.end_date) {
            if start > end {
                errors.push(format!("start_date {start} is after end_date {end}"));
            }
        }

        if self.execution.quantity == 0 {
            errors.push("execution quantity must be positive".to_string());
        }

        if !matches!(self.market.provider.as_str(), "synthetic" | "alpaca") {
            errors.push(format!(
                "unknown market provider '{}' (expected synthetic or alpaca)",
                self.market.provider
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.supervisor.max_consecutive_errors, 3);
        assert_eq!(config.supervisor.max_backoff_units, 60);
        assert_eq!(config.supervisor.scheduling_unit(), Duration::from_secs(1));
        assert_eq!(config.pipeline.ingest_interval_secs, 60);
        assert_eq!(config.pipeline.decide_interval_secs, 300);
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let mut config = AppConfig::default();
        config.supervisor.scheduling_unit_ms = 0;
        config.market.provider = "bloomberg".to_string();
        config.pipeline.start_date = NaiveDate::from_ymd_opt(2024, 6, 1);
        config.pipeline.end_date = NaiveDate::from_ymd_opt(2024, 1, 1);

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.contains("bloomberg")));
    }

    #[test]
    fn test_date_window() {
        let today = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
        let mut pipeline = PipelineConfig::default();
        assert_eq!(
            pipeline.date_window(today),
            (NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(), today)
        );

        pipeline.start_date = NaiveDate::from_ymd_opt(2023, 1, 1);
        pipeline.end_date = NaiveDate::from_ymd_opt(2023, 6, 30);
        let (start, end) = pipeline.date_window(today);
        assert_eq!(start.to_string(), "2023-01-01");
        assert_eq!(end.to_string(), "2023-06-30");
    }

    #[test]
    fn test_load_from_missing_dir_uses_defaults() {
        let config = AppConfig::load_from("/nonexistent/hedgeflow-config").unwrap();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.pipeline.ticker, "AAPL");
    }

    #[test]
    fn test_partial_toml_section() {
        let parsed: AppConfig = toml::from_str(
            r#"
            [pipeline]
            ticker = "MSFT"
            start_date = "2024-01-02"

            [supervisor]
            scheduling_unit_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(parsed.pipeline.ticker, "MSFT");
        assert_eq!(
            parsed.pipeline.start_date,
            NaiveDate::from_ymd_opt(2024, 1, 2)
        );
        assert_eq!(parsed.supervisor.scheduling_unit_ms, 250);
        assert_eq!(parsed.supervisor.max_consecutive_errors, 3);
        assert_eq!(parsed.bus.drain_timeout_ms, 5_000);
    }
}

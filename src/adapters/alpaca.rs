//! Alpaca REST adapter (market data v2 + trading v2, no SDK dependency).

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::execution::{reject_non_order, ExecutionGateway};
use super::market_data::MarketDataProvider;
use crate::config::{ExecutionConfig, MarketConfig};
use crate::domain::{ExecutionMode, ExecutionReport, PriceBar, PriceSeries, TradeAction};
use crate::error::{HedgeflowError, Result};

const MAX_PAGES: usize = 50;

#[derive(Debug, Deserialize)]
struct AlpacaBar {
    #[serde(rename = "t")]
    timestamp: DateTime<Utc>,
    #[serde(rename = "o")]
    open: f64,
    #[serde(rename = "h")]
    high: f64,
    #[serde(rename = "l")]
    low: f64,
    #[serde(rename = "c")]
    close: f64,
    #[serde(rename = "v")]
    volume: f64,
}

#[derive(Debug, Deserialize)]
struct BarsPage {
    #[serde(default)]
    bars: Option<Vec<AlpacaBar>>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct OrderRequest<'a> {
    symbol: &'a str,
    qty: String,
    side: &'a str,
    #[serde(rename = "type")]
    order_type: &'a str,
    time_in_force: &'a str,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: String,
}

#[derive(Clone)]
pub struct AlpacaClient {
    http: Client,
    data_url: String,
    trading_url: String,
    key_id: Option<String>,
    secret_key: Option<String>,
    mode: ExecutionMode,
}

impl AlpacaClient {
    pub fn new(market: &MarketConfig, execution: &ExecutionConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent("hedgeflow/0.1")
            .build()
            .map_err(|e| {
                HedgeflowError::Internal(format!("failed to build Alpaca HTTP client: {}", e))
            })?;

        let trading_url = if execution.paper {
            &market.paper_trading_url
        } else {
            &market.trading_url
        };

        Ok(Self {
            http,
            data_url: market.data_url.trim_end_matches('/').to_string(),
            trading_url: trading_url.trim_end_matches('/').to_string(),
            key_id: market.api_key_id.clone(),
            secret_key: market.api_secret_key.clone(),
            mode: ExecutionMode::from_paper_flag(execution.paper),
        })
    }

    fn auth_headers(&self) -> Result<HeaderMap> {
        let key = self.key_id.as_ref().ok_or_else(|| {
            HedgeflowError::Gateway("Alpaca key id is not configured".to_string())
        })?;
        let secret = self.secret_key.as_ref().ok_or_else(|| {
            HedgeflowError::Gateway("Alpaca secret key is not configured".to_string())
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("apca-api-key-id"),
            HeaderValue::from_str(key)
                .map_err(|e| HedgeflowError::Gateway(format!("invalid key id header: {}", e)))?,
        );
        headers.insert(
            HeaderName::from_static("apca-api-secret-key"),
            HeaderValue::from_str(secret)
                .map_err(|e| HedgeflowError::Gateway(format!("invalid secret header: {}", e)))?,
        );
        Ok(headers)
    }

    async fn request_json(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, String)],
        body: Option<Value>,
    ) -> Result<Value> {
        let mut req = self
            .http
            .request(method.clone(), url)
            .headers(self.auth_headers()?);
        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }

        let resp = req.send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            return Err(HedgeflowError::Gateway(format!(
                "Alpaca {} {} failed: status={} body={}",
                method, url, status, text
            )));
        }

        Ok(serde_json::from_str(&text)?)
    }

    fn bars_to_series(bars: Vec<AlpacaBar>) -> PriceSeries {
        bars.into_iter()
            .map(|b| PriceBar::new(b.timestamp, b.open, b.high, b.low, b.close, b.volume))
            .collect()
    }
}

#[async_trait]
impl MarketDataProvider for AlpacaClient {
    async fn get_prices(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceSeries> {
        let url = format!("{}/v2/stocks/{}/bars", self.data_url, ticker);
        let mut bars = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let mut query = vec![
                ("timeframe", "1Day".to_string()),
                ("start", start.to_string()),
                ("end", end.to_string()),
                ("adjustment", "raw".to_string()),
            ];
            if let Some(token) = &page_token {
                query.push(("page_token", token.clone()));
            }

            let page: BarsPage =
                serde_json::from_value(self.request_json(Method::GET, &url, &query, None).await?)?;
            bars.extend(page.bars.unwrap_or_default());

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!("Alpaca returned {} bars for {}", bars.len(), ticker);
        if bars.is_empty() {
            return Err(HedgeflowError::DataUnavailable(format!(
                "No price data returned for {ticker}"
            )));
        }
        Ok(Self::bars_to_series(bars))
    }
}

#[async_trait]
impl ExecutionGateway for AlpacaClient {
    fn mode(&self) -> ExecutionMode {
        self.mode
    }

    async fn execute_trade(
        &self,
        ticker: &str,
        action: TradeAction,
        quantity: u64,
    ) -> ExecutionReport {
        if let Some(rejected) = reject_non_order(ticker, action, quantity, self.mode) {
            return rejected;
        }

        let order = OrderRequest {
            symbol: ticker,
            qty: quantity.to_string(),
            side: if action == TradeAction::Buy { "buy" } else { "sell" },
            order_type: "market",
            time_in_force: "day",
        };
        let url = format!("{}/v2/orders", self.trading_url);

        let submitted = async {
            let body = serde_json::to_value(&order)?;
            let value = self.request_json(Method::POST, &url, &[], Some(body)).await?;
            Ok::<OrderResponse, HedgeflowError>(serde_json::from_value(value)?)
        }
        .await;

        match submitted {
            Ok(resp) => ExecutionReport::Submitted {
                order_id: resp.id,
                ticker: ticker.to_string(),
                side: action,
                quantity,
                mode: self.mode,
            },
            Err(e) => {
                warn!("Alpaca order {} {} x{} failed: {}", action, ticker, quantity, e);
                ExecutionReport::Error {
                    error: e.to_string(),
                    ticker: ticker.to_string(),
                    mode: self.mode,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bars_page() {
        let page: BarsPage = serde_json::from_str(
            r#"{
                "bars": [
                    {"t":"2024-01-03T05:00:00Z","o":184.2,"h":185.8,"l":183.4,"c":184.25,"v":58414460,"n":1,"vw":184.3},
                    {"t":"2024-01-02T05:00:00Z","o":187.15,"h":188.44,"l":183.89,"c":185.64,"v":82488674}
                ],
                "symbol": "AAPL",
                "next_page_token": null
            }"#,
        )
        .unwrap();

        assert!(page.next_page_token.is_none());
        let series = AlpacaClient::bars_to_series(page.bars.unwrap());
        assert_eq!(series.len(), 2);
        // Sorted by timestamp
        assert_eq!(series.closes(), vec![185.64, 184.25]);
    }

    #[test]
    fn test_null_bars_page() {
        let page: BarsPage = serde_json::from_str(r#"{"bars":null,"next_page_token":null}"#).unwrap();
        assert!(page.bars.is_none());
    }

    #[test]
    fn test_order_body() {
        let body = serde_json::to_value(OrderRequest {
            symbol: "AAPL",
            qty: "3".into(),
            side: "buy",
            order_type: "market",
            time_in_force: "day",
        })
        .unwrap();
        assert_eq!(body["type"], "market");
        assert_eq!(body["qty"], "3");
        assert_eq!(body["time_in_force"], "day");
    }

    #[tokio::test]
    async fn test_missing_credentials_become_error_report() {
        let client =
            AlpacaClient::new(&MarketConfig::default(), &ExecutionConfig::default()).unwrap();
        let report = client.execute_trade("AAPL", TradeAction::Buy, 1).await;
        match report {
            ExecutionReport::Error { error, mode, .. } => {
                assert!(error.contains("not configured"));
                assert_eq!(mode, ExecutionMode::Paper);
            }
            other => panic!("unexpected report {other:?}"),
        }
    }
}

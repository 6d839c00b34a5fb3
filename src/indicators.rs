//! Technical indicator library
//!
//! Pure functions over close/volume columns of a `PriceSeries`. Conventions
//! follow the usual dataframe definitions: exponential averages are seeded
//! with the first observation, rolling windows yield `None` until full, and
//! standard deviation uses the sample (n - 1) denominator.

use serde::{Deserialize, Serialize};

use crate::domain::{PriceSeries, Signal};
use crate::error::{HedgeflowError, Result};

pub const MACD_FAST_SPAN: usize = 12;
pub const MACD_SLOW_SPAN: usize = 26;
pub const MACD_SIGNAL_SPAN: usize = 9;
pub const RSI_PERIOD: usize = 14;
pub const RSI_OVERSOLD: f64 = 30.0;
pub const RSI_OVERBOUGHT: f64 = 70.0;
pub const BOLLINGER_WINDOW: usize = 20;
pub const BOLLINGER_STD_DEVS: f64 = 2.0;

/// Bars needed before every indicator has a value
pub const MIN_ANALYSIS_BARS: usize = BOLLINGER_WINDOW;

// =============================================================================
// Moving averages
// =============================================================================

/// Exponential moving average with `alpha = 2 / (span + 1)`, seeded with the
/// first value.
pub fn ema(values: &[f64], span: usize) -> Vec<f64> {
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut prev: Option<f64> = None;
    for &v in values {
        let next = match prev {
            None => v,
            Some(p) => alpha * v + (1.0 - alpha) * p,
        };
        out.push(next);
        prev = Some(next);
    }
    out
}

/// Simple rolling mean over `window` values
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            if window == 0 || i + 1 < window {
                return None;
            }
            let slice = &values[i + 1 - window..=i];
            Some(slice.iter().sum::<f64>() / window as f64)
        })
        .collect()
}

/// Sample standard deviation over `window` values
pub fn rolling_std(values: &[f64], window: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            if window < 2 || i + 1 < window {
                return None;
            }
            let slice = &values[i + 1 - window..=i];
            let mean = slice.iter().sum::<f64>() / window as f64;
            let var = slice.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (window - 1) as f64;
            Some(var.sqrt())
        })
        .collect()
}

// =============================================================================
// MACD
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Macd {
    pub line: Vec<f64>,
    pub signal: Vec<f64>,
}

/// MACD line (EMA12 - EMA26) and its EMA9 signal line
pub fn macd(closes: &[f64]) -> Macd {
    let fast = ema(closes, MACD_FAST_SPAN);
    let slow = ema(closes, MACD_SLOW_SPAN);
    let line: Vec<f64> = fast.iter().zip(&slow).map(|(f, s)| f - s).collect();
    let signal = ema(&line, MACD_SIGNAL_SPAN);
    Macd { line, signal }
}

// =============================================================================
// RSI
// =============================================================================

/// Relative strength index using simple rolling averages of gains and losses.
///
/// Output is always within [0, 100]. A window with no losses reads 100; a
/// window with neither gains nor losses reads 50.
pub fn rsi(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut gains = Vec::with_capacity(closes.len());
    let mut losses = Vec::with_capacity(closes.len());
    for i in 0..closes.len() {
        // First delta is undefined; counts as zero movement
        let delta = if i == 0 { 0.0 } else { closes[i] - closes[i - 1] };
        gains.push(delta.max(0.0));
        losses.push((-delta).max(0.0));
    }

    let avg_gain = rolling_mean(&gains, period);
    let avg_loss = rolling_mean(&losses, period);

    avg_gain
        .into_iter()
        .zip(avg_loss)
        .map(|(g, l)| match (g, l) {
            (Some(g), Some(l)) => Some(rsi_from_averages(g, l)),
            _ => None,
        })
        .collect()
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss <= 0.0 {
        return if avg_gain <= 0.0 { 50.0 } else { 100.0 };
    }
    let rs = avg_gain / avg_loss;
    (100.0 - 100.0 / (1.0 + rs)).clamp(0.0, 100.0)
}

// =============================================================================
// Bollinger bands
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BollingerBands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

impl BollingerBands {
    /// Distance of `price` from the middle band in half-band-widths.
    /// +1 sits on the upper band, -1 on the lower band.
    pub fn position(&self, price: f64) -> f64 {
        let half_width = self.upper - self.middle;
        if half_width <= 0.0 {
            return 0.0;
        }
        (price - self.middle) / half_width
    }
}

pub fn bollinger_bands(
    closes: &[f64],
    window: usize,
    std_devs: f64,
) -> Vec<Option<BollingerBands>> {
    rolling_mean(closes, window)
        .into_iter()
        .zip(rolling_std(closes, window))
        .map(|(mean, std)| match (mean, std) {
            (Some(middle), Some(std)) => Some(BollingerBands {
                upper: middle + std * std_devs,
                middle,
                lower: middle - std * std_devs,
            }),
            _ => None,
        })
        .collect()
}

// =============================================================================
// On-balance volume
// =============================================================================

/// Cumulative volume signed by close-to-close direction, starting at 0
pub fn obv(closes: &[f64], volumes: &[f64]) -> Vec<f64> {
    let n = closes.len().min(volumes.len());
    let mut out = Vec::with_capacity(n);
    if n == 0 {
        return out;
    }
    out.push(0.0);
    for i in 1..n {
        let prev = out[i - 1];
        let next = if closes[i] > closes[i - 1] {
            prev + volumes[i]
        } else if closes[i] < closes[i - 1] {
            prev - volumes[i]
        } else {
            prev
        };
        out.push(next);
    }
    out
}

// =============================================================================
// Snapshot + signals
// =============================================================================

/// Latest value of every indicator for one price series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub close: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub rsi: f64,
    pub bollinger: BollingerBands,
    pub bollinger_position: f64,
    pub obv: f64,
}

impl IndicatorSnapshot {
    pub fn compute(series: &PriceSeries) -> Result<Self> {
        if series.len() < MIN_ANALYSIS_BARS {
            return Err(HedgeflowError::InsufficientData {
                required: MIN_ANALYSIS_BARS,
                available: series.len(),
            });
        }

        let closes = series.closes();
        let volumes = series.volumes();
        let close = closes[closes.len() - 1];

        let m = macd(&closes);
        let rsi_value = rsi(&closes, RSI_PERIOD)
            .last()
            .copied()
            .flatten()
            .ok_or_else(|| HedgeflowError::Internal("RSI undefined on full window".into()))?;
        let bands = bollinger_bands(&closes, BOLLINGER_WINDOW, BOLLINGER_STD_DEVS)
            .last()
            .copied()
            .flatten()
            .ok_or_else(|| HedgeflowError::Internal("Bollinger undefined on full window".into()))?;

        Ok(Self {
            close,
            macd: m.line[m.line.len() - 1],
            macd_signal: m.signal[m.signal.len() - 1],
            rsi: rsi_value,
            bollinger_position: bands.position(close),
            bollinger: bands,
            obv: obv(&closes, &volumes).last().copied().unwrap_or(0.0),
        })
    }

    /// MACD crossover sign, RSI 30/70 thresholds, Bollinger ±1 position
    pub fn signals(&self) -> Vec<Signal> {
        let macd_signal = if self.macd - self.macd_signal > 0.0 {
            Signal::Bullish
        } else {
            Signal::Bearish
        };

        let rsi_signal = if self.rsi < RSI_OVERSOLD {
            Signal::Bullish
        } else if self.rsi > RSI_OVERBOUGHT {
            Signal::Bearish
        } else {
            Signal::Neutral
        };

        let band_signal = if self.bollinger_position < -1.0 {
            Signal::Bullish
        } else if self.bollinger_position > 1.0 {
            Signal::Bearish
        } else {
            Signal::Neutral
        };

        vec![macd_signal, rsi_signal, band_signal]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PriceBar;
    use chrono::{Duration, TimeZone, Utc};

    fn series_from(closes: &[f64]) -> PriceSeries {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| PriceBar::new(start + Duration::days(i as i64), c, c, c, c, 100.0))
            .collect()
    }

    #[test]
    fn test_ema_seeded_with_first_value() {
        let out = ema(&[10.0, 20.0], 3);
        assert_eq!(out[0], 10.0);
        // alpha = 0.5
        assert!((out[1] - 15.0).abs() < 1e-12);
    }

    #[test]
    fn test_rsi_bounds_on_mixed_inputs() {
        let closes: Vec<f64> = (0..60)
            .map(|i| 100.0 + ((i * 37 % 11) as f64 - 5.0) * (i as f64 % 7.0))
            .collect();
        for value in rsi(&closes, RSI_PERIOD).into_iter().flatten() {
            assert!((0.0..=100.0).contains(&value), "rsi out of range: {value}");
        }
    }

    #[test]
    fn test_rsi_extremes() {
        let rising: Vec<f64> = (0..20).map(|i| i as f64).collect();
        assert_eq!(rsi(&rising, RSI_PERIOD).last().copied().flatten(), Some(100.0));

        let falling: Vec<f64> = (0..20).map(|i| 100.0 - i as f64).collect();
        assert_eq!(rsi(&falling, RSI_PERIOD).last().copied().flatten(), Some(0.0));

        let flat = vec![5.0; 20];
        assert_eq!(rsi(&flat, RSI_PERIOD).last().copied().flatten(), Some(50.0));
    }

    #[test]
    fn test_rsi_undefined_before_window() {
        let closes: Vec<f64> = (0..10).map(|i| i as f64).collect();
        assert!(rsi(&closes, RSI_PERIOD).iter().all(Option::is_none));
    }

    #[test]
    fn test_obv_starts_at_zero_and_rises_on_increasing_closes() {
        let closes: Vec<f64> = (1..=10).map(|i| i as f64).collect();
        let volumes = vec![50.0; 10];
        let out = obv(&closes, &volumes);
        assert_eq!(out[0], 0.0);
        assert!(out.windows(2).all(|w| w[1] >= w[0]));
        assert_eq!(out[9], 450.0);
    }

    #[test]
    fn test_obv_direction_rules() {
        let out = obv(&[10.0, 11.0, 11.0, 9.0], &[5.0, 7.0, 3.0, 2.0]);
        assert_eq!(out, vec![0.0, 7.0, 7.0, 5.0]);
    }

    #[test]
    fn test_bollinger_flat_series_has_zero_position() {
        let bands = bollinger_bands(&[3.0; 25], BOLLINGER_WINDOW, BOLLINGER_STD_DEVS);
        let last = bands.last().copied().flatten().unwrap();
        assert_eq!(last.upper, last.lower);
        assert_eq!(last.position(3.0), 0.0);
    }

    #[test]
    fn test_snapshot_requires_full_window() {
        let err = IndicatorSnapshot::compute(&series_from(&[1.0; 5])).unwrap_err();
        assert!(matches!(
            err,
            HedgeflowError::InsufficientData {
                required: 20,
                available: 5
            }
        ));
    }

    #[test]
    fn test_signals_on_rally() {
        // Steady rally, then a spike above the upper band
        let mut closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64 * 0.5).collect();
        closes.push(140.0);
        let snapshot = IndicatorSnapshot::compute(&series_from(&closes)).unwrap();
        let signals = snapshot.signals();

        assert_eq!(signals.len(), 3);
        assert_eq!(signals[0], Signal::Bullish);
        assert_eq!(signals[1], Signal::Bearish);
        assert_eq!(signals[2], Signal::Bearish);
    }
}

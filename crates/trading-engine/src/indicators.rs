//! Indicator engine: SMA, Wilder's RSI, True Range and ATR.
//!
//! Every series is aligned with the input candles. Positions without enough
//! history hold `f64::NAN`. All functions are pure.

use velocity_core::types::Candle;

pub const SMA_PERIOD: usize = 10;
pub const RSI_PERIOD: usize = 14;
pub const ATR_PERIOD: usize = 14;

/// Candle window plus the per-candle indicator series computed from it.
#[derive(Debug, Clone)]
pub struct IndicatorFrame {
    pub candles: Vec<Candle>,
    pub sma: Vec<f64>,
    pub rsi: Vec<f64>,
    pub true_range: Vec<f64>,
    pub atr: Vec<f64>,
}

/// Indicator values at one candle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorPoint {
    pub candle: Candle,
    pub sma: f64,
    pub rsi: f64,
    pub true_range: f64,
    pub atr: f64,
}

impl IndicatorFrame {
    /// Compute SMA(10), RSI(14), TR and ATR(14) over `candles`.
    pub fn compute(candles: Vec<Candle>) -> Self {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let sma = sma(&closes, SMA_PERIOD);
        let rsi = rsi(&closes, RSI_PERIOD);
        let true_range = true_range(&candles);
        let atr = atr(&true_range, ATR_PERIOD);
        Self {
            candles,
            sma,
            rsi,
            true_range,
            atr,
        }
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn point(&self, index: usize) -> Option<IndicatorPoint> {
        Some(IndicatorPoint {
            candle: *self.candles.get(index)?,
            sma: self.sma[index],
            rsi: self.rsi[index],
            true_range: self.true_range[index],
            atr: self.atr[index],
        })
    }

    /// The forming candle.
    pub fn last(&self) -> Option<IndicatorPoint> {
        self.point(self.len().checked_sub(1)?)
    }

    /// The most recent fully closed candle.
    pub fn last_closed(&self) -> Option<IndicatorPoint> {
        self.point(self.len().checked_sub(2)?)
    }

    /// Mean of the last `window` defined ATR values.
    pub fn trailing_atr_mean(&self, window: usize) -> f64 {
        trailing_mean(&self.atr, window)
    }
}

/// Simple moving average. Defined from index `period - 1`.
pub fn sma(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 {
        return out;
    }
    for i in (period - 1)..values.len() {
        let window = &values[i + 1 - period..=i];
        out[i] = window.iter().sum::<f64>() / period as f64;
    }
    out
}

/// RSI with Wilder smoothing (recursive average, alpha = 1/period).
///
/// The first close has no change, so the averages need `period` changes and
/// the first defined value is at index `period`. A flat window (no gains and
/// no losses) stays undefined.
pub fn rsi(closes: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; closes.len()];
    if period == 0 || closes.len() < 2 {
        return out;
    }

    let alpha = 1.0 / period as f64;
    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;

    for i in 1..closes.len() {
        let delta = closes[i] - closes[i - 1];
        let gain = delta.max(0.0);
        let loss = (-delta).max(0.0);
        if i == 1 {
            avg_gain = gain;
            avg_loss = loss;
        } else {
            avg_gain = (1.0 - alpha) * avg_gain + alpha * gain;
            avg_loss = (1.0 - alpha) * avg_loss + alpha * loss;
        }

        if i >= period {
            out[i] = rsi_from_averages(avg_gain, avg_loss);
        }
    }
    out
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        if avg_gain == 0.0 {
            return f64::NAN;
        }
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

/// True Range per candle. The first candle has no previous close, so its
/// range is `high - low`.
pub fn true_range(candles: &[Candle]) -> Vec<f64> {
    candles
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let hl = c.high - c.low;
            match i.checked_sub(1).map(|p| candles[p].close) {
                Some(prev_close) => hl
                    .max((c.high - prev_close).abs())
                    .max((c.low - prev_close).abs()),
                None => hl,
            }
        })
        .collect()
}

/// Average True Range as a simple rolling mean of TR.
pub fn atr(true_range: &[f64], period: usize) -> Vec<f64> {
    sma(true_range, period)
}

/// Mean of the defined values among the last `window` entries.
pub fn trailing_mean(values: &[f64], window: usize) -> f64 {
    let start = values.len().saturating_sub(window);
    let (sum, count) = values[start..]
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

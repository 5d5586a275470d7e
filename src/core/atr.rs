use crate::models::Candle;

/// Running Average True Range with Wilder smoothing.
///
/// The first value is the simple mean of the first `period` true ranges;
/// afterwards `atr = (atr * (period - 1) + tr) / period`.
#[derive(Debug, Clone)]
pub struct Atr {
    period: usize,
    prev_close: Option<f64>,
    seed_sum: f64,
    seed_count: usize,
    value: Option<f64>,
}

impl Atr {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
            prev_close: None,
            seed_sum: 0.0,
            seed_count: 0,
            value: None,
        }
    }

    /// Feed one bar; returns the ATR once enough bars have been seen.
    pub fn update(&mut self, candle: &Candle) -> Option<f64> {
        let tr = candle.true_range(self.prev_close);
        self.prev_close = Some(candle.close);

        self.value = match self.value {
            Some(prev) => {
                let n = self.period as f64;
                Some((prev * (n - 1.0) + tr) / n)
            }
            None => {
                self.seed_sum += tr;
                self.seed_count += 1;
                if self.seed_count == self.period {
                    Some(self.seed_sum / self.period as f64)
                } else {
                    None
                }
            }
        };
        self.value
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }
}

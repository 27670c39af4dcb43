//! Drawdown, recovery and volatility statistics over an account-value curve.

use chrono::NaiveDate;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;
const DAYS_PER_YEAR: f64 = 365.25;

/// High-watermark drawdown tracker fed one account value at a time.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DrawdownTracker {
    watermark: f64,
    watermark_index: usize,
    max_drawdown_pct: f64,
    peak_index: usize,
    trough_index: Option<usize>,
}

impl DrawdownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the value at `index` and returns its drawdown in percent (<= 0).
    pub fn observe(&mut self, index: usize, value: f64) -> f64 {
        if value > self.watermark {
            self.watermark = value;
            self.watermark_index = index;
        }

        let drawdown_pct = if self.watermark > 0.0 {
            (value - self.watermark) / self.watermark * 100.0
        } else {
            0.0
        };

        if drawdown_pct < self.max_drawdown_pct {
            self.max_drawdown_pct = drawdown_pct;
            self.peak_index = self.watermark_index;
            self.trough_index = Some(index);
        }

        drawdown_pct
    }

    pub fn max_drawdown_pct(&self) -> f64 {
        self.max_drawdown_pct
    }

    /// `(peak, trough)` indexes of the deepest drawdown, if any decline was seen.
    pub fn worst(&self) -> Option<(usize, usize)> {
        self.trough_index.map(|trough| (self.peak_index, trough))
    }
}

/// First index after `trough` whose value is back at or above the value at `peak`.
pub fn find_recovery(values: &[f64], peak: usize, trough: usize) -> Option<usize> {
    let target = values.get(peak).copied().unwrap_or(0.0);
    values
        .iter()
        .enumerate()
        .skip(trough + 1)
        .find(|&(_, &v)| v >= target)
        .map(|(i, _)| i)
}

/// Whole calendar days between two dates, clamped at zero.
pub fn days_between(start: NaiveDate, end: NaiveDate) -> i64 {
    (end - start).num_days().max(0)
}

/// Bessel-corrected standard deviation; zero for fewer than two samples.
pub fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    variance.sqrt()
}

/// Day-over-day fractional returns, skipping steps from a zero value.
pub fn daily_returns(values: &[f64]) -> Vec<f64> {
    values
        .windows(2)
        .filter(|w| w[0] > 0.0)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect()
}

/// Annualised volatility of the value curve, in percent.
pub fn annualized_volatility_pct(values: &[f64]) -> f64 {
    sample_std_dev(&daily_returns(values)) * TRADING_DAYS_PER_YEAR.sqrt() * 100.0
}

/// Compound annual growth of `ending_value` over `total_invested` across
/// `duration_days`, as a fraction.
pub fn annualized_return(ending_value: f64, total_invested: f64, duration_days: i64) -> Option<f64> {
    if total_invested <= 0.0 || duration_days <= 0 {
        return None;
    }
    let multiple = ending_value / total_invested;
    if !(multiple > 0.0) {
        return None;
    }
    let rate = multiple.powf(DAYS_PER_YEAR / duration_days as f64) - 1.0;
    rate.is_finite().then_some(rate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn track(values: &[f64]) -> DrawdownTracker {
        let mut tracker = DrawdownTracker::new();
        for (i, &v) in values.iter().enumerate() {
            tracker.observe(i, v);
        }
        tracker
    }

    #[test]
    fn drawdown_peak_trough_and_recovery() {
        let values = [100.0, 150.0, 90.0, 160.0];
        let tracker = track(&values);
        assert_relative_eq!(tracker.max_drawdown_pct(), -40.0, max_relative = 1e-12);
        assert_eq!(tracker.worst(), Some((1, 2)));
        assert_eq!(find_recovery(&values, 1, 2), Some(3));
    }

    #[test]
    fn monotonic_rise_has_no_drawdown() {
        let tracker = track(&[10.0, 20.0, 30.0]);
        assert_eq!(tracker.max_drawdown_pct(), 0.0);
        assert_eq!(tracker.worst(), None);
    }

    #[test]
    fn deepest_drawdown_wins_over_earlier_shallow_one() {
        let values = [100.0, 95.0, 120.0, 60.0, 80.0];
        let tracker = track(&values);
        assert_relative_eq!(tracker.max_drawdown_pct(), -50.0, max_relative = 1e-12);
        assert_eq!(tracker.worst(), Some((2, 3)));
        assert_eq!(find_recovery(&values, 2, 3), None);
    }

    #[test]
    fn observe_reports_current_drawdown() {
        let mut tracker = DrawdownTracker::new();
        assert_eq!(tracker.observe(0, 0.0), 0.0);
        assert_eq!(tracker.observe(1, 200.0), 0.0);
        assert_relative_eq!(tracker.observe(2, 150.0), -25.0);
    }

    #[test]
    fn std_dev_uses_n_minus_one() {
        assert_relative_eq!(
            sample_std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]),
            (32.0f64 / 7.0).sqrt(),
            max_relative = 1e-12
        );
        assert_eq!(sample_std_dev(&[1.0]), 0.0);
    }

    #[test]
    fn returns_skip_zero_base() {
        let returns = daily_returns(&[0.0, 100.0, 110.0]);
        assert_eq!(returns.len(), 1);
        assert_relative_eq!(returns[0], 0.1, max_relative = 1e-12);
    }

    #[test]
    fn flat_curve_has_no_volatility() {
        assert_eq!(annualized_volatility_pct(&[100.0, 100.0, 100.0]), 0.0);
    }

    #[test]
    fn annualized_return_doubles_over_one_year() {
        let rate = annualized_return(200.0, 100.0, 365).unwrap();
        assert_relative_eq!(rate, 2f64.powf(365.25 / 365.0) - 1.0, max_relative = 1e-12);
        assert!(annualized_return(200.0, 0.0, 365).is_none());
        assert!(annualized_return(200.0, 100.0, 0).is_none());
        assert!(annualized_return(0.0, 100.0, 30).is_none());
    }

    #[test]
    fn day_difference_is_never_negative() {
        let a = NaiveDate::from_ymd_opt(2020, 3, 1).unwrap();
        let b = NaiveDate::from_ymd_opt(2020, 2, 1).unwrap();
        assert_eq!(days_between(b, a), 29);
        assert_eq!(days_between(a, b), 0);
    }
}

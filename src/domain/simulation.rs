//! DCA simulation engine.
//!
//! Replays a contribution schedule against a normalised daily series and
//! reports period snapshots plus drawdown, recovery and volatility statistics.
//! Pure: no I/O, never mutates the input rows.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use super::error::DcaError;
use super::metrics::{self, DrawdownTracker};
use super::series::PriceRow;

/// How often a contribution is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = DcaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            "monthly" => Ok(Frequency::Monthly),
            other => Err(DcaError::Validation {
                field: "frequency".into(),
                reason: format!("'{other}' is not one of monthly, weekly, daily"),
            }),
        }
    }
}

/// Snapshot bucket size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    Weekly,
    Monthly,
}

impl Precision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Precision::Weekly => "weekly",
            Precision::Monthly => "monthly",
        }
    }

    /// `YYYY-MM` for monthly buckets, ISO `YYYY-Www` for weekly ones.
    pub fn period_key(&self, date: NaiveDate) -> String {
        match self {
            Precision::Monthly => format!("{:04}-{:02}", date.year(), date.month()),
            Precision::Weekly => {
                let week = date.iso_week();
                format!("{:04}-W{:02}", week.year(), week.week())
            }
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Precision {
    type Err = DcaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "weekly" => Ok(Precision::Weekly),
            "monthly" => Ok(Precision::Monthly),
            other => Err(DcaError::Validation {
                field: "precision".into(),
                reason: format!("'{other}' is not one of weekly, monthly"),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationParams {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub frequency: Frequency,
    /// Amount invested per scheduled contribution.
    pub amount: f64,
    pub precision: Precision,
}

/// Running account state after one trading day.
#[derive(Debug, Clone, PartialEq)]
struct DailyRow {
    date: NaiveDate,
    total_invested: f64,
    account_value: f64,
    profit_loss: f64,
    total_return_pct: f64,
    drawdown_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub period_key: String,
    pub date: NaiveDate,
    pub total_invested: f64,
    pub account_value: f64,
    pub profit_loss: f64,
    pub total_return_pct: f64,
    pub drawdown_pct: f64,
}

impl Snapshot {
    fn from_daily(row: &DailyRow, precision: Precision) -> Self {
        Self {
            period_key: precision.period_key(row.date),
            date: row.date,
            total_invested: row.total_invested,
            account_value: row.account_value,
            profit_loss: row.profit_loss,
            total_return_pct: row.total_return_pct,
            drawdown_pct: row.drawdown_pct,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_contributions: u32,
    pub total_invested: f64,
    pub final_shares: f64,
    pub ending_value: f64,
    pub profit_loss: f64,
    pub total_return_pct: f64,
    pub max_drawdown_pct: f64,
    pub max_drawdown_peak_date: Option<NaiveDate>,
    pub max_drawdown_trough_date: Option<NaiveDate>,
    pub drawdown_recovery_date: Option<NaiveDate>,
    pub drawdown_recovery_days: Option<i64>,
    pub drawdown_peak_to_recovery_days: Option<i64>,
    pub annualized_volatility_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    pub effective_start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub snapshots: Vec<Snapshot>,
    pub summary: Summary,
}

impl SimulationResult {
    /// Compound annual return between the first and last snapshot, as a fraction.
    pub fn annualized_return(&self) -> Option<f64> {
        let first = self.snapshots.first()?;
        let last = self.snapshots.last()?;
        let duration_days = (last.date - first.date).num_days();
        metrics::annualized_return(
            self.summary.ending_value,
            self.summary.total_invested,
            duration_days,
        )
    }
}

fn range_error(reason: &str) -> DcaError {
    DcaError::SimulationRange {
        reason: reason.to_string(),
    }
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(28)
}

/// The same day-of-month as `anchor_day` in the month after `date`, clamped to
/// that month's length.
pub fn add_one_month(date: NaiveDate, anchor_day: u32) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    let day = anchor_day.min(days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(date + Duration::days(28))
}

fn next_contribution_date(current: NaiveDate, frequency: Frequency, anchor_day: u32) -> NaiveDate {
    match frequency {
        Frequency::Weekly => current + Duration::days(7),
        Frequency::Monthly => add_one_month(current, anchor_day),
        Frequency::Daily => current + Duration::days(1),
    }
}

/// Last daily row per period bucket, plus the first daily row if the first
/// bucket would otherwise not start with it.
fn aggregate_snapshots(daily: &[DailyRow], precision: Precision) -> Vec<Snapshot> {
    let Some(first) = daily.first() else {
        return Vec::new();
    };

    let mut snapshots: Vec<Snapshot> = Vec::new();
    for row in daily {
        let snapshot = Snapshot::from_daily(row, precision);
        match snapshots.last_mut() {
            Some(last) if last.period_key == snapshot.period_key => *last = snapshot,
            _ => snapshots.push(snapshot),
        }
    }

    if snapshots.first().map(|s| s.date) != Some(first.date) {
        snapshots.insert(0, Snapshot::from_daily(first, precision));
    }
    snapshots
}

/// Run a DCA simulation over `rows`, which must be sorted ascending by date.
pub fn simulate(rows: &[PriceRow], params: &SimulationParams) -> Result<SimulationResult, DcaError> {
    let (Some(first), Some(last)) = (rows.first(), rows.last()) else {
        return Err(range_error("series has no rows"));
    };

    if params.start_date > last.date {
        return Err(range_error("start date is after the last available close"));
    }

    let effective_start = params.start_date.max(first.date);
    let effective_end = params.end_date.min(last.date);
    if effective_start > effective_end {
        return Err(range_error("effective simulation range is empty"));
    }

    let usable: Vec<&PriceRow> = rows
        .iter()
        .filter(|r| r.date >= effective_start && r.date <= effective_end)
        .collect();
    if usable.is_empty() {
        return Err(range_error("no trading days in the effective range"));
    }

    let anchor_day = effective_start.day();
    let mut schedule_date = effective_start;
    let mut shares = 0.0_f64;
    let mut total_invested = 0.0_f64;
    let mut total_contributions = 0u32;
    let mut drawdown = DrawdownTracker::new();
    let mut daily: Vec<DailyRow> = Vec::with_capacity(usable.len());

    for (index, row) in usable.iter().enumerate() {
        let mut contribution_count = 0u32;
        if params.frequency == Frequency::Daily {
            contribution_count = 1;
        } else {
            while row.date >= schedule_date {
                contribution_count += 1;
                schedule_date = next_contribution_date(schedule_date, params.frequency, anchor_day);
            }
        }

        if contribution_count > 0 {
            let contribution = params.amount * f64::from(contribution_count);
            shares += contribution / row.close;
            total_invested += contribution;
            total_contributions += contribution_count;
        }

        let account_value = shares * row.close;
        let drawdown_pct = drawdown.observe(index, account_value);
        let profit_loss = account_value - total_invested;
        let total_return_pct = if total_invested > 0.0 {
            profit_loss / total_invested * 100.0
        } else {
            0.0
        };

        daily.push(DailyRow {
            date: row.date,
            total_invested,
            account_value,
            profit_loss,
            total_return_pct,
            drawdown_pct,
        });
    }

    let values: Vec<f64> = daily.iter().map(|d| d.account_value).collect();

    let mut peak_date = None;
    let mut trough_date = None;
    let mut recovery_date = None;
    let mut recovery_days = None;
    let mut peak_to_recovery_days = None;
    if let Some((peak, trough)) = drawdown.worst() {
        peak_date = Some(daily[peak].date);
        trough_date = Some(daily[trough].date);
        if let Some(recovery) = metrics::find_recovery(&values, peak, trough) {
            let recovered_on = daily[recovery].date;
            recovery_date = Some(recovered_on);
            recovery_days = Some(metrics::days_between(daily[trough].date, recovered_on));
            peak_to_recovery_days = Some(metrics::days_between(daily[peak].date, recovered_on));
        }
    }

    let snapshots = aggregate_snapshots(&daily, params.precision);
    let ending = &daily[daily.len() - 1];

    Ok(SimulationResult {
        effective_start_date: effective_start,
        end_date: ending.date,
        snapshots,
        summary: Summary {
            total_contributions,
            total_invested: ending.total_invested,
            final_shares: shares,
            ending_value: ending.account_value,
            profit_loss: ending.profit_loss,
            total_return_pct: ending.total_return_pct,
            max_drawdown_pct: drawdown.max_drawdown_pct(),
            max_drawdown_peak_date: peak_date,
            max_drawdown_trough_date: trough_date,
            drawdown_recovery_date: recovery_date,
            drawdown_recovery_days: recovery_days,
            drawdown_peak_to_recovery_days: peak_to_recovery_days,
            annualized_volatility_pct: metrics::annualized_volatility_pct(&values),
        },
    })
}

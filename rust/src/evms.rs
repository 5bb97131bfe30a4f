//! Earned value management metrics.
//!
//! Every metric is a pure function of one period's BCWS, BCWP, ACWP and the
//! budget at completion. Money stays in integer cents; only the
//! dimensionless indices are `f64`. A zero or negative denominator yields
//! [`Computed::NotComputable`] instead of NaN or infinity.

use chrono::NaiveDate;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cpm::ScheduleResult;
use crate::models::{div_round, Activity, Money};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvmsError {
    #[error("{field} must not be negative, got {value}")]
    NegativeValue { field: String, value: Money },
    #[error("{field} exceeds the representable money range")]
    Overflow { field: String },
}

/// A derived value, or a marker that its denominator was zero or negative.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Computed<T> {
    Value(T),
    NotComputable,
}

impl<T: Copy> Computed<T> {
    pub fn value(&self) -> Option<T> {
        match self {
            Computed::Value(v) => Some(*v),
            Computed::NotComputable => None,
        }
    }

    pub fn is_computable(&self) -> bool {
        matches!(self, Computed::Value(_))
    }
}

impl<T> From<Option<T>> for Computed<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Computed::Value(v),
            None => Computed::NotComputable,
        }
    }
}

/// Estimate-at-completion formula.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EacMethod {
    /// ACWP + (BAC - BCWP) / CPI
    #[default]
    CpiBased,
    /// ACWP + (BAC - BCWP): remaining work at budgeted rates.
    AtBudgetedRate,
    /// ACWP + (BAC - BCWP) / (CPI * SPI)
    CpiSpiComposite,
}

/// Cost and progress figures for one reporting period.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvmsSnapshot {
    pub period: NaiveDate,
    pub bcws: Money,
    pub bcwp: Money,
    pub acwp: Money,
    /// Budget at completion.
    pub bac: Money,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvmsMetrics {
    pub period: NaiveDate,
    /// BCWP - ACWP
    pub cv: Money,
    /// BCWP - BCWS
    pub sv: Money,
    pub cpi: Computed<f64>,
    pub spi: Computed<f64>,
    pub eac: Computed<Money>,
    pub etc: Computed<Money>,
    pub vac: Computed<Money>,
    /// (BAC - BCWP) / (BAC - ACWP)
    pub tcpi: Computed<f64>,
    /// (BAC - BCWP) / (EAC - ACWP)
    pub tcpi_eac: Computed<f64>,
    pub percent_complete: Computed<f64>,
    pub percent_spent: Computed<f64>,
}

fn to_money(field: &str, cents: i128) -> Result<Money, EvmsError> {
    i64::try_from(cents).map(Money).map_err(|_| EvmsError::Overflow {
        field: field.to_string(),
    })
}

fn check_non_negative(field: &str, value: Money) -> Result<(), EvmsError> {
    if value.is_negative() {
        return Err(EvmsError::NegativeValue {
            field: field.to_string(),
            value,
        });
    }
    Ok(())
}

/// ACWP plus remaining work scaled by `num / den`; None unless `den > 0`.
fn scaled_eac(acwp: Money, remaining: Money, num: i128, den: i128) -> Option<Money> {
    if den <= 0 {
        return None;
    }
    Some(acwp + remaining.mul_ratio(num, den)?)
}

fn estimate_at_completion(s: &EvmsSnapshot, method: EacMethod) -> Option<Money> {
    let remaining = s.bac - s.bcwp;
    let (bcws, bcwp, acwp) = (s.bcws.cents() as i128, s.bcwp.cents() as i128, s.acwp.cents() as i128);
    match method {
        EacMethod::AtBudgetedRate => Some(s.acwp + remaining),
        EacMethod::CpiBased => {
            // CPI itself must exist
            if acwp == 0 {
                return None;
            }
            scaled_eac(s.acwp, remaining, acwp, bcwp)
        }
        EacMethod::CpiSpiComposite => {
            if acwp == 0 || bcws == 0 {
                return None;
            }
            scaled_eac(s.acwp, remaining, acwp * bcws, bcwp * bcwp)
        }
    }
}

fn percent(part: Money, whole: Money) -> Computed<f64> {
    part.ratio(whole).map(|r| r * 100.0).into()
}

/// Derive the period's metrics.
pub fn calculate(snapshot: &EvmsSnapshot, method: EacMethod) -> Result<EvmsMetrics, EvmsError> {
    check_non_negative("bcws", snapshot.bcws)?;
    check_non_negative("bcwp", snapshot.bcwp)?;
    check_non_negative("acwp", snapshot.acwp)?;
    check_non_negative("bac", snapshot.bac)?;

    let EvmsSnapshot {
        period,
        bcws,
        bcwp,
        acwp,
        bac,
    } = *snapshot;

    let eac: Computed<Money> = estimate_at_completion(snapshot, method).into();
    let etc = eac.value().map(|e| e - acwp);
    let tcpi_eac = etc.and_then(|remaining_cost| (bac - bcwp).ratio(remaining_cost));

    Ok(EvmsMetrics {
        period,
        cv: bcwp - acwp,
        sv: bcwp - bcws,
        cpi: bcwp.ratio(acwp).into(),
        spi: bcwp.ratio(bcws).into(),
        eac,
        etc: etc.into(),
        vac: eac.value().map(|e| bac - e).into(),
        tcpi: (bac - bcwp).ratio(bac - acwp).into(),
        tcpi_eac: tcpi_eac.into(),
        percent_complete: percent(bcwp, bac),
        percent_spent: percent(acwp, bac),
    })
}

/// Metrics for every period, in chronological order.
pub fn calculate_series(
    snapshots: &[EvmsSnapshot],
    method: EacMethod,
) -> Result<Vec<EvmsMetrics>, EvmsError> {
    let mut ordered: Vec<&EvmsSnapshot> = snapshots.iter().collect();
    ordered.sort_by_key(|s| s.period);
    ordered.into_iter().map(|s| calculate(s, method)).collect()
}

/// Budget allotted to one activity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityBudget {
    pub activity_id: String,
    pub budget: Money,
}

/// BCWP from activity progress: sum of budget * percent_complete.
///
/// Budgets for unknown activities are ignored.
pub fn earned_value_from_progress(
    activities: &[Activity],
    budgets: &[ActivityBudget],
) -> Result<Money, EvmsError> {
    let progress: FxHashMap<&str, u8> = activities
        .iter()
        .map(|a| (a.id.as_str(), a.percent_complete))
        .collect();
    let mut earned: i128 = 0;
    for b in budgets {
        check_non_negative("budget", b.budget)?;
        if let Some(&pct) = progress.get(b.activity_id.as_str()) {
            earned += b.budget.cents() as i128 * pct.min(100) as i128;
        }
    }
    to_money("bcwp", div_round(earned, 100))
}

/// BCWS at `status_day`: each budget accrues linearly over its activity's
/// early window; zero-duration activities accrue in full once reached.
pub fn planned_value(
    schedule: &[ScheduleResult],
    budgets: &[ActivityBudget],
    status_day: i64,
) -> Result<Money, EvmsError> {
    let windows: FxHashMap<&str, &ScheduleResult> = schedule
        .iter()
        .map(|s| (s.activity_id.as_str(), s))
        .collect();
    let mut planned: i128 = 0;
    for b in budgets {
        check_non_negative("budget", b.budget)?;
        let Some(s) = windows.get(b.activity_id.as_str()) else {
            continue;
        };
        let budget = b.budget.cents() as i128;
        let duration = s.duration();
        planned += if duration == 0 {
            if status_day >= s.early_start {
                budget
            } else {
                0
            }
        } else {
            let elapsed = (status_day - s.early_start).clamp(0, duration);
            div_round(budget * elapsed as i128, duration as i128)
        };
    }
    to_money("bcws", planned)
}

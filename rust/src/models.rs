//! Core data types shared by every analytics pass.
//!
//! Times are integer day offsets from the program start; calendar dates only
//! appear on constraints and at the result boundary. Money is fixed-point in
//! minor units.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub};

/// Fixed-point money amount in minor units (cents).
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(pub i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Whole currency units (e.g. dollars) to money.
    pub fn from_units(units: i64) -> Self {
        Money(units * 100)
    }

    pub fn cents(self) -> i64 {
        self.0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Multiply by `numerator / denominator`, rounding half away from zero.
    ///
    /// Returns `None` for a non-positive denominator or on overflow.
    pub fn mul_ratio(self, numerator: i128, denominator: i128) -> Option<Money> {
        if denominator <= 0 {
            return None;
        }
        let product = (self.0 as i128).checked_mul(numerator)?;
        i64::try_from(div_round(product, denominator)).ok().map(Money)
    }

    /// Ratio of two amounts as a dimensionless index; `None` when `other <= 0`.
    pub fn ratio(self, other: Money) -> Option<f64> {
        if other.0 <= 0 {
            return None;
        }
        Some(self.0 as f64 / other.0 as f64)
    }
}

/// Integer division rounding half away from zero. `denominator` must be positive.
pub(crate) fn div_round(numerator: i128, denominator: i128) -> i128 {
    let half = denominator / 2;
    if numerator >= 0 {
        (numerator + half) / denominator
    } else {
        (numerator - half) / denominator
    }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Money;
    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl Neg for Money {
    type Output = Money;
    fn neg(self) -> Money {
        Money(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

/// Dependency type between two activities.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DependencyType {
    /// Finish-to-start: successor starts after predecessor finishes.
    #[default]
    FS,
    /// Start-to-start: successor starts after predecessor starts.
    SS,
    /// Finish-to-finish: successor finishes after predecessor finishes.
    FF,
    /// Start-to-finish: successor finishes after predecessor starts.
    SF,
}

/// A typed precedence link with a signed lag (negative lag = lead).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub predecessor_id: String,
    pub successor_id: String,
    #[serde(rename = "type", default)]
    pub dep_type: DependencyType,
    #[serde(default)]
    pub lag: i64,
}

impl Dependency {
    pub fn new(
        predecessor_id: impl Into<String>,
        successor_id: impl Into<String>,
        dep_type: DependencyType,
        lag: i64,
    ) -> Self {
        Self {
            predecessor_id: predecessor_id.into(),
            successor_id: successor_id.into(),
            dep_type,
            lag,
        }
    }

    /// Finish-to-start link without lag.
    pub fn fs(predecessor_id: impl Into<String>, successor_id: impl Into<String>) -> Self {
        Self::new(predecessor_id, successor_id, DependencyType::FS, 0)
    }
}

/// Kind of hard date constraint on an activity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConstraintType {
    StartNoEarlierThan,
    StartNoLaterThan,
    FinishNoEarlierThan,
    FinishNoLaterThan,
    MustStartOn,
    MustFinishOn,
}

impl ConstraintType {
    /// Constraints that pin the activity in place; leveling never moves these.
    pub fn is_mandatory(self) -> bool {
        matches!(self, ConstraintType::MustStartOn | ConstraintType::MustFinishOn)
    }
}

/// A hard bound on an activity's start or finish.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraint {
    #[serde(rename = "constraint_type")]
    pub kind: ConstraintType,
    #[serde(rename = "constraint_date")]
    pub date: NaiveDate,
}

/// A schedulable unit of work.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: String,
    pub code: String,
    pub name: String,
    /// Duration in whole days (forced to 0 for milestones).
    pub duration: i64,
    #[serde(default)]
    pub is_milestone: bool,
    #[serde(default)]
    pub constraint: Option<Constraint>,
    /// Progress in percent, 0..=100.
    #[serde(default)]
    pub percent_complete: u8,
}

impl Activity {
    pub fn new(
        id: impl Into<String>,
        code: impl Into<String>,
        name: impl Into<String>,
        duration: i64,
    ) -> Self {
        Self {
            id: id.into(),
            code: code.into(),
            name: name.into(),
            duration,
            is_milestone: false,
            constraint: None,
            percent_complete: 0,
        }
    }

    /// A zero-duration milestone.
    pub fn milestone(
        id: impl Into<String>,
        code: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            is_milestone: true,
            ..Self::new(id, code, name, 0)
        }
    }

    pub fn with_constraint(mut self, kind: ConstraintType, date: NaiveDate) -> Self {
        self.constraint = Some(Constraint { kind, date });
        self
    }

    pub fn with_progress(mut self, percent_complete: u8) -> Self {
        self.percent_complete = percent_complete;
        self
    }

    /// Duration as scheduled (milestones are always zero).
    pub fn effective_duration(&self) -> i64 {
        if self.is_milestone {
            0
        } else {
            self.duration
        }
    }
}

/// Resource category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Labor,
    Equipment,
    Material,
}

/// A resource pool with a daily capacity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    /// Units available per day (1 = one full-time unit).
    pub capacity_per_day: u32,
    /// Cost per day at 100% allocation.
    #[serde(default)]
    pub cost_rate: Option<Money>,
}

impl Resource {
    pub fn new(id: impl Into<String>, resource_type: ResourceType, capacity_per_day: u32) -> Self {
        Self {
            id: id.into(),
            resource_type,
            capacity_per_day,
            cost_rate: None,
        }
    }

    pub fn with_cost_rate(mut self, cost_rate: Money) -> Self {
        self.cost_rate = Some(cost_rate);
        self
    }

    /// Capacity in allocation percent (capacity 2 = 200%).
    pub fn capacity_percent(&self) -> u32 {
        self.capacity_per_day.saturating_mul(100)
    }
}

fn default_units() -> u32 {
    100
}

/// Allocation of a resource to an activity for the activity's whole window.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub activity_id: String,
    pub resource_id: String,
    /// Allocation percentage (100 = one full unit).
    #[serde(default = "default_units")]
    pub units: u32,
}

impl Assignment {
    pub fn new(activity_id: impl Into<String>, resource_id: impl Into<String>, units: u32) -> Self {
        Self {
            activity_id: activity_id.into(),
            resource_id: resource_id.into(),
            units,
        }
    }
}

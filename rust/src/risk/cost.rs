//! Duration-driven cost model.

use rustc_hash::FxHashMap;

use crate::models::{div_round, Assignment, Money, Resource};
use crate::network::ActivityNetwork;

use super::types::FixedCost;

/// Per-activity daily burn plus fixed amounts, in exact integer cents.
#[derive(Clone, Debug)]
pub(crate) struct CostModel {
    /// Sum of cost_rate cents * units per activity (units in percent).
    rate_units: Vec<i128>,
    fixed_cents: i128,
}

impl CostModel {
    pub fn build(
        network: &ActivityNetwork,
        resources: &[Resource],
        assignments: &[Assignment],
        fixed_costs: &[FixedCost],
        warnings: &mut Vec<String>,
    ) -> Self {
        let rates: FxHashMap<&str, Option<Money>> = resources
            .iter()
            .map(|r| (r.id.as_str(), r.cost_rate))
            .collect();

        let mut rate_units = vec![0i128; network.len()];
        for assignment in assignments {
            let Some(activity) = network.index_of(&assignment.activity_id) else {
                warnings.push(format!(
                    "Cost: assignment references unknown activity {}",
                    assignment.activity_id
                ));
                continue;
            };
            match rates.get(assignment.resource_id.as_str()) {
                Some(Some(rate)) => {
                    rate_units[activity as usize] += rate.cents() as i128 * assignment.units as i128;
                }
                Some(None) => {}
                None => warnings.push(format!(
                    "Cost: assignment references unknown resource {}",
                    assignment.resource_id
                )),
            }
        }

        let mut fixed_cents = 0i128;
        for fixed in fixed_costs {
            if network.index_of(&fixed.activity_id).is_none() {
                warnings.push(format!(
                    "Cost: fixed cost references unknown activity {}",
                    fixed.activity_id
                ));
                continue;
            }
            fixed_cents += fixed.amount.cents() as i128;
        }

        Self {
            rate_units,
            fixed_cents,
        }
    }

    /// Total cost for one set of activity durations; `None` when it does not
    /// fit in `Money`.
    pub fn total(&self, durations: &[i64]) -> Option<Money> {
        let variable = self
            .rate_units
            .iter()
            .zip(durations)
            .try_fold(0i128, |sum, (&rate, &days)| {
                sum.checked_add(rate.checked_mul(days as i128)?)
            })?;
        let cents = div_round(variable, 100).checked_add(self.fixed_cents)?;
        i64::try_from(cents).ok().map(Money)
    }
}

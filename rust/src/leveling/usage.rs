//! Per-(resource, day) load accounting.
//!
//! [`ResourceDemand`] is the static side: which leveled resources each
//! activity draws on and how much. [`UsageProfile`] is the dynamic side: the
//! load per resource per day for one set of activity windows. A profile is
//! rebuilt from scratch for every pass instead of being patched in place, so
//! concurrent component workers never share one.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::config::LevelingOptions;
use crate::cpm::PassTimings;
use crate::interner::ActivityIdx;
use crate::models::{Assignment, Resource};
use crate::network::{ActivityNetwork, Window};

use super::types::ResourceUtilization;

/// Index into [`ResourceDemand`]'s resource tables.
pub(crate) type ResourceSlot = usize;

/// Resource draw of every activity on the leveled resources.
#[derive(Clone, Debug)]
pub(crate) struct ResourceDemand {
    pub resource_ids: Vec<String>,
    /// Capacity per slot in percent units.
    pub capacity: Vec<u32>,
    /// (slot, units) per activity, duplicate assignments summed.
    pub by_activity: Vec<Vec<(ResourceSlot, u32)>>,
    /// Activities drawing on each slot, ascending index.
    pub users: Vec<Vec<ActivityIdx>>,
    pub warnings: Vec<String>,
    /// An assignment referenced a leveled resource with no capacity data.
    pub missing_capacity: bool,
}

impl ResourceDemand {
    pub fn build(
        network: &ActivityNetwork,
        resources: &[Resource],
        assignments: &[Assignment],
        options: &LevelingOptions,
    ) -> Self {
        let mut warnings = Vec::new();
        let mut slots: FxHashMap<&str, ResourceSlot> = FxHashMap::default();
        let mut resource_ids = Vec::new();
        let mut capacity = Vec::new();
        let mut without_capacity: FxHashSet<&str> = FxHashSet::default();

        for resource in resources {
            if !options.levels_resource(&resource.id) || slots.contains_key(resource.id.as_str()) {
                continue;
            }
            if resource.capacity_per_day == 0 {
                without_capacity.insert(resource.id.as_str());
                continue;
            }
            slots.insert(resource.id.as_str(), resource_ids.len());
            resource_ids.push(resource.id.clone());
            capacity.push(resource.capacity_percent());
        }

        let mut by_activity: Vec<Vec<(ResourceSlot, u32)>> = vec![Vec::new(); network.len()];
        let mut missing_capacity = false;
        let mut warned: FxHashSet<&str> = FxHashSet::default();

        for assignment in assignments {
            if !options.levels_resource(&assignment.resource_id) {
                continue;
            }
            let Some(activity) = network.index_of(&assignment.activity_id) else {
                warnings.push(format!(
                    "Assignment of resource {} references unknown activity {}; ignored",
                    assignment.resource_id, assignment.activity_id
                ));
                continue;
            };
            let Some(&slot) = slots.get(assignment.resource_id.as_str()) else {
                missing_capacity = true;
                if warned.insert(assignment.resource_id.as_str()) {
                    let detail = if without_capacity.contains(assignment.resource_id.as_str()) {
                        "has zero capacity"
                    } else {
                        "has no capacity data"
                    };
                    warnings.push(format!(
                        "Resource {} {}; its assignments proceed unleveled",
                        assignment.resource_id, detail
                    ));
                }
                continue;
            };

            let draws = &mut by_activity[activity as usize];
            match draws.iter_mut().find(|(s, _)| *s == slot) {
                Some((_, units)) => *units = units.saturating_add(assignment.units),
                None => draws.push((slot, assignment.units)),
            }
        }

        let mut users = vec![Vec::new(); resource_ids.len()];
        for (i, draws) in by_activity.iter_mut().enumerate() {
            draws.sort_unstable();
            for &(slot, units) in draws.iter() {
                users[slot].push(i as ActivityIdx);
                if units > capacity[slot] {
                    warnings.push(format!(
                        "Activity {} needs {}% of {} but capacity is {}%; cannot be resolved by shifting",
                        network.id_of(i as ActivityIdx),
                        units,
                        resource_ids[slot],
                        capacity[slot]
                    ));
                }
            }
        }

        Self {
            resource_ids,
            capacity,
            by_activity,
            users,
            warnings,
            missing_capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.resource_ids.len()
    }

    /// Activities that draw on any leveled resource.
    pub fn resourced_activities(&self) -> Vec<ActivityIdx> {
        (0..self.by_activity.len())
            .filter(|&i| !self.by_activity[i].is_empty())
            .map(|i| i as ActivityIdx)
            .collect()
    }

    pub fn units(&self, activity: ActivityIdx, slot: ResourceSlot) -> u32 {
        self.by_activity[activity as usize]
            .iter()
            .find(|(s, _)| *s == slot)
            .map_or(0, |&(_, units)| units)
    }

    /// The activity alone exceeds this resource's capacity.
    pub fn exceeds_alone(&self, activity: ActivityIdx, slot: ResourceSlot) -> bool {
        self.units(activity, slot) > self.capacity[slot]
    }
}

/// An overloaded resource-day.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Conflict {
    pub slot: ResourceSlot,
    pub day: i64,
    pub load: u32,
}

/// Load per resource slot per day for one set of activity windows.
#[derive(Clone, Debug)]
pub(crate) struct UsageProfile {
    loads: Vec<Vec<u32>>,
}

impl UsageProfile {
    /// Accumulate the load of `activities` placed at their early windows.
    pub fn build(demand: &ResourceDemand, timings: &PassTimings, activities: &[ActivityIdx]) -> Self {
        let mut loads = vec![Vec::new(); demand.len()];
        for &activity in activities {
            let window = timings.early_window(activity);
            for &(slot, units) in &demand.by_activity[activity as usize] {
                let row: &mut Vec<u32> = &mut loads[slot];
                let end = window.finish.max(0) as usize;
                if row.len() < end {
                    row.resize(end, 0);
                }
                for day in window.start.max(0)..window.finish {
                    row[day as usize] = row[day as usize].saturating_add(units);
                }
            }
        }
        Self { loads }
    }

    #[inline]
    pub fn load(&self, slot: ResourceSlot, day: i64) -> u32 {
        if day < 0 {
            return 0;
        }
        self.loads[slot].get(day as usize).copied().unwrap_or(0)
    }

    /// Earliest overloaded day on any of `slots`, lower slot first on ties.
    pub fn first_conflict(
        &self,
        demand: &ResourceDemand,
        slots: &[ResourceSlot],
        skip: impl Fn(ResourceSlot, i64) -> bool,
    ) -> Option<Conflict> {
        let mut best: Option<Conflict> = None;
        for &slot in slots {
            let capacity = demand.capacity[slot];
            let found = self.loads[slot]
                .iter()
                .enumerate()
                .map(|(day, &load)| (day as i64, load))
                .find(|&(day, load)| load > capacity && !skip(slot, day));
            if let Some((day, load)) = found {
                let better = match best {
                    Some(b) => (day, slot) < (b.day, b.slot),
                    None => true,
                };
                if better {
                    best = Some(Conflict { slot, day, load });
                }
            }
        }
        best
    }

    pub fn overallocated_days(&self, demand: &ResourceDemand, slot: ResourceSlot) -> u32 {
        let capacity = demand.capacity[slot];
        self.loads[slot].iter().filter(|&&load| load > capacity).count() as u32
    }

    /// Overallocated resource-days across `slots`.
    pub fn overallocations(&self, demand: &ResourceDemand, slots: &[ResourceSlot]) -> u32 {
        slots
            .iter()
            .map(|&slot| self.overallocated_days(demand, slot))
            .sum()
    }

    pub fn peak(&self, slot: ResourceSlot) -> u32 {
        self.loads[slot].iter().copied().max().unwrap_or(0)
    }

    /// Earliest start at or after `from` where the activity's whole window fits
    /// every resource it draws on, treating its current placement as removed.
    ///
    /// Resources the activity overloads on its own are ignored; no start can
    /// fix those. Past the last loaded day every resource is free, so the
    /// search always ends.
    pub fn earliest_fit(
        &self,
        demand: &ResourceDemand,
        activity: ActivityIdx,
        current: Window,
        from: i64,
    ) -> i64 {
        let duration = current.finish - current.start;
        let draws = &demand.by_activity[activity as usize];
        let mut start = from;

        'search: loop {
            for &(slot, units) in draws {
                let capacity = demand.capacity[slot];
                if units > capacity {
                    continue;
                }
                for day in start..start + duration {
                    let own = if day >= current.start && day < current.finish {
                        units
                    } else {
                        0
                    };
                    let others = self.load(slot, day).saturating_sub(own);
                    if others + units > capacity {
                        start = day + 1;
                        continue 'search;
                    }
                }
            }
            return start;
        }
    }

    pub fn utilization(&self, demand: &ResourceDemand) -> Vec<ResourceUtilization> {
        (0..demand.len())
            .map(|slot| ResourceUtilization {
                resource_id: demand.resource_ids[slot].clone(),
                capacity: demand.capacity[slot],
                peak_load: self.peak(slot),
                overallocated_days: self.overallocated_days(demand, slot),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpm::CpmEngine;
    use crate::models::{Activity, ResourceType};
    use chrono::NaiveDate;

    fn setup() -> (ActivityNetwork, Vec<Resource>, Vec<Assignment>) {
        let activities = vec![
            Activity::new("a", "A", "a", 4),
            Activity::new("b", "B", "b", 2),
            Activity::new("c", "C", "c", 3),
        ];
        let network = ActivityNetwork::build(&activities, &[]).unwrap();
        let resources = vec![Resource::new("crew", ResourceType::Labor, 1)];
        let assignments = vec![
            Assignment::new("a", "crew", 100),
            Assignment::new("b", "crew", 50),
            Assignment::new("b", "crew", 50),
            Assignment::new("c", "crane", 100),
        ];
        (network, resources, assignments)
    }

    #[test]
    fn test_demand_sums_duplicates_and_flags_missing_capacity() {
        let (network, resources, assignments) = setup();
        let demand =
            ResourceDemand::build(&network, &resources, &assignments, &LevelingOptions::default());

        assert_eq!(demand.len(), 1);
        assert_eq!(demand.units(1, 0), 100);
        assert_eq!(demand.users[0], vec![0, 1]);
        assert!(demand.missing_capacity);
        assert_eq!(demand.warnings.len(), 1);
        assert!(demand.warnings[0].contains("crane"));
    }

    #[test]
    fn test_target_resources_skip_other_assignments() {
        let (network, resources, assignments) = setup();
        let options = LevelingOptions {
            target_resources: Some(vec!["crew".to_string()]),
            ..Default::default()
        };
        let demand = ResourceDemand::build(&network, &resources, &assignments, &options);
        assert!(!demand.missing_capacity);
        assert!(demand.warnings.is_empty());
    }

    #[test]
    fn test_profile_conflict_and_fit() {
        let (network, resources, assignments) = setup();
        let demand =
            ResourceDemand::build(&network, &resources, &assignments, &LevelingOptions::default());
        let engine = CpmEngine::new(&network, NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
        let timings = engine.compute(&network.durations(), None).unwrap();
        let profile = UsageProfile::build(&demand, &timings, &demand.resourced_activities());

        assert_eq!(profile.load(0, 0), 200);
        assert_eq!(profile.load(0, 3), 100);
        assert_eq!(profile.load(0, 9), 0);
        assert_eq!(profile.overallocated_days(&demand, 0), 2);
        assert_eq!(profile.peak(0), 200);

        let conflict = profile.first_conflict(&demand, &[0], |_, _| false).unwrap();
        assert_eq!(conflict, Conflict { slot: 0, day: 0, load: 200 });
        assert!(profile.first_conflict(&demand, &[0], |_, day| day < 2).is_none());

        // b has to wait for a to finish
        let fit = profile.earliest_fit(&demand, 1, timings.early_window(1), 1);
        assert_eq!(fit, 4);
    }
}

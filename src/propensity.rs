//! Cumulative propensity list for the Direct method: an ordered vector of
//! (cumulative rate, reaction) pairs plus a reaction-to-slot map.

use std::collections::HashMap;

use crate::error::SimError;
use crate::network::{Network, ReactionIndex};

/// After this many refreshes the whole prefix sum is recomputed from the
/// cached rates, bounding floating-point drift on long runs.
const REBUILD_PERIOD: u64 = 1_000_000;

/// Slot order is fixed by the initial stable sort (ascending by rate) and
/// never reordered; only the cumulative sums move afterwards.
#[derive(Clone, Debug, Default)]
pub struct PropensityList {
    entries: Vec<(f64, ReactionIndex)>,
    slots: HashMap<ReactionIndex, usize>,
    refresh_count: u64,
}

impl PropensityList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate every local reaction, stable-sort ascending by rate, convert
    /// to cumulative sums, and populate the reverse map.
    pub fn build(&mut self, net: &mut Network) {
        let handles = net.my_reaction_list().to_vec();
        let mut pairs: Vec<(f64, ReactionIndex)> = handles
            .into_iter()
            .map(|r| (net.set_reaction_rate(r), r))
            .collect();
        pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        self.slots.clear();
        self.slots.reserve(pairs.len());
        let mut sum = 0.0;
        for (i, p) in pairs.iter_mut().enumerate() {
            sum += p.0;
            p.0 = sum;
            self.slots.insert(p.1, i);
        }
        self.entries = pairs;
        self.refresh_count = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Total propensity: the last cumulative sum.
    pub fn total(&self) -> f64 {
        self.entries.last().map(|e| e.0).unwrap_or(0.0)
    }

    pub fn entries(&self) -> &[(f64, ReactionIndex)] {
        &self.entries
    }

    pub fn slot_of(&self, r: ReactionIndex) -> Option<usize> {
        self.slots.get(&r).copied()
    }

    /// Pick the reaction at the first slot whose cumulative rate is strictly
    /// greater than `u * total`, for `u` in [0, 1). Fails only when every
    /// rate is zero.
    pub fn sample(&self, u: f64) -> Result<ReactionIndex, SimError> {
        let target = u * self.total();
        let pos = self.entries.partition_point(|e| e.0 <= target);
        self.entries
            .get(pos)
            .map(|e| e.1)
            .ok_or(SimError::NoEligibleReaction)
    }

    /// Re-evaluate the fired and affected reactions, then rebuild the
    /// cumulative sums from the leftmost touched slot upward. With `verify`,
    /// a reaction whose reactants are exhausted gets rate 0 without
    /// evaluating its law.
    pub fn refresh(
        &mut self,
        net: &mut Network,
        fired: ReactionIndex,
        affected: &[ReactionIndex],
        verify: bool,
    ) {
        let Some(&fired_slot) = self.slots.get(&fired) else {
            return;
        };
        let mut pidx_min = fired_slot;
        if verify && !net.check_reaction(fired) {
            net.assign_reaction_rate(fired, 0.0);
        } else {
            net.set_reaction_rate(fired);
        }
        for &h in affected {
            // Affected reactions outside the local partition have no slot.
            let Some(&p) = self.slots.get(&h) else {
                continue;
            };
            pidx_min = pidx_min.min(p);
            if verify && !net.check_reaction(h) {
                net.assign_reaction_rate(h, 0.0);
            } else {
                net.set_reaction_rate(h);
            }
        }

        self.refresh_count += 1;
        if self.refresh_count % REBUILD_PERIOD == 0 {
            pidx_min = 0;
        }

        let mut running = if pidx_min > 0 {
            self.entries[pidx_min - 1].0
        } else {
            0.0
        };
        for e in self.entries[pidx_min..].iter_mut() {
            running += net.get_reaction_rate(e.1);
            e.0 = running;
        }
    }
}

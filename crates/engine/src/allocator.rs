// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The fair-share allocator (SPEC_FULL.md §4.6): chooses which
//! machinetype to create next within per-space/per-type caps, back-off, and
//! fizzle gates. A pure, synchronous planning pass — the actual creation
//! is invoked by the cycle driver for each [`CreationPick`] it returns,
//! so a failing create never needs to roll back the counters this pass
//! already committed (§9 Open Question #3).

use rand::seq::SliceRandom;
use rand::Rng;
use vcycle_core::{Machinetype, Space};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreationPick {
    pub machinetype: String,
    pub processors: u32,
}

fn creations_budget(processors_limit: u32) -> u32 {
    (f64::from(processors_limit) * 0.1).ceil() as u32
}

/// Plans this cycle's creations, mutating `space`'s and its machinetypes'
/// per-cycle counters in place as each pick is committed. `last_abort_time`
/// looks up the monotonic abort time for a given machinetype name.
pub fn plan_creations(
    space: &mut Space,
    last_abort_time: impl Fn(&str) -> i64,
    now: i64,
    rng: &mut impl Rng,
) -> Vec<CreationPick> {
    let mut picks = Vec::new();

    if space.past_shutdown_time(now) {
        return picks;
    }
    let Some(processors_limit) = space.processors_limit else { return picks };
    let budget = creations_budget(processors_limit);
    let mut creations_this_cycle = 0u32;

    loop {
        if space.total_processors >= processors_limit || creations_this_cycle >= budget {
            break;
        }

        let mut names: Vec<String> = space.machinetypes.keys().cloned().collect();
        names.shuffle(rng);

        let mut winner: Option<(String, f64)> = None;
        for name in &names {
            let mt = &space.machinetypes[name];
            if !eligible(mt, space.total_processors, processors_limit, last_abort_time(name), now) {
                continue;
            }
            let weighted = mt.counters.weighted_machines;
            match &winner {
                Some((_, best_weighted)) if weighted >= *best_weighted => {}
                _ => winner = Some((name.clone(), weighted)),
            }
        }

        let Some((winner_name, _)) = winner else { break };
        let mt = space
            .machinetypes
            .get_mut(&winner_name)
            .expect("winner_name was drawn from space.machinetypes.keys()");
        let min_processors = mt.min_processors;
        mt.counters.starting_processors += min_processors;
        mt.counters.total_processors += min_processors;
        mt.counters.not_passed_fizzle += 1;

        space.total_processors += min_processors;
        creations_this_cycle += min_processors;

        picks.push(CreationPick { machinetype: winner_name, processors: min_processors });
    }

    picks
}

fn eligible(mt: &Machinetype, space_total_processors: u32, processors_limit: u32, last_abort_time: i64, now: i64) -> bool {
    if mt.target_share <= 0.0 {
        return false;
    }
    if mt.counters.total_processors >= mt.processors_limit {
        return false;
    }
    if space_total_processors >= processors_limit {
        return false;
    }
    if mt.counters.starting_processors >= mt.max_starting_processors {
        return false;
    }
    if now < last_abort_time + mt.backoff_seconds {
        return false;
    }
    if now < last_abort_time + mt.backoff_seconds + mt.fizzle_seconds && mt.counters.not_passed_fizzle > 0 {
        return false;
    }
    true
}

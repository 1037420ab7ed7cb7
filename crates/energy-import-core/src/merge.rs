// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of FluxION.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use std::collections::HashSet;

use crate::model::{CleanPoint, StatRow};

/// Combine a cleaned batch with the full stored sequence for one series.
///
/// Both sides are keyed by `start_ts`. On a conflicting key the existing
/// row's `state` wins and the fresh value is discarded — repeated or
/// overlapping imports are idempotent and manually corrected history stays
/// untouched. Fresh-only keys are inserted with `created_ts = start_ts` and
/// the target `metadata_id` stamped.
///
/// `sum` is recomputed as the running cumulative total of `state` over the
/// whole merged sequence, existing rows included: inserting data anywhere
/// before the end shifts every later running total.
pub fn merge_series(existing: &[StatRow], fresh: &[CleanPoint], metadata_id: i64) -> Vec<StatRow> {
    let mut merged: Vec<StatRow> = existing.to_vec();
    let mut taken: HashSet<u64> = existing.iter().map(|row| row.start_ts.to_bits()).collect();

    for point in fresh {
        if !taken.insert(point.start_ts.to_bits()) {
            // existing row wins on a conflicting timestamp
            continue;
        }
        merged.push(StatRow {
            metadata_id,
            start_ts: point.start_ts,
            state: point.state,
            sum: 0.0,
            created_ts: point.start_ts,
        });
    }

    merged.sort_by(|a, b| a.start_ts.total_cmp(&b.start_ts));

    let mut running = 0.0;
    for row in &mut merged {
        running += row.state;
        row.sum = running;
    }

    merged
}

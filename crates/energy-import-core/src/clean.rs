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

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::collections::HashSet;
use tracing::debug;

use crate::error::{PipelineError, PipelineResult};
use crate::model::{CleanPoint, RawReading, RawTimestamp, SeriesKind};

/// Repair a raw timestamp/value sequence into per-interval kWh points.
///
/// Steps, in order:
/// 1. coerce timestamps to unix seconds (ISO-8601 strings taken as UTC);
/// 2. shift every timestamp by `time_offset` seconds when configured;
/// 3. move later occurrences of a duplicate timestamp back one second
///    until the key is unique again (fall-back DST produces such pairs on
///    short-term data);
/// 4. apply the series-kind transform and the unit normalization factor.
///
/// A single unparseable timestamp fails the whole batch — there is no
/// partial recovery.
pub fn clean_readings(
    readings: &[RawReading],
    kind: SeriesKind,
    factor: f64,
    time_offset: Option<i64>,
) -> PipelineResult<Vec<CleanPoint>> {
    let mut stamps = Vec::with_capacity(readings.len());
    for reading in readings {
        let ts = match &reading.timestamp {
            RawTimestamp::Unix(ts) => *ts,
            RawTimestamp::Iso(raw) => coerce_iso(raw)?,
        };
        stamps.push(ts);
    }

    if let Some(offset) = time_offset {
        for ts in &mut stamps {
            *ts += offset as f64;
        }
    }

    let mut collisions = 0_usize;
    let mut seen: HashSet<u64> = HashSet::with_capacity(stamps.len());
    for ts in &mut stamps {
        while !seen.insert(ts.to_bits()) {
            *ts -= 1.0;
            collisions += 1;
        }
    }
    if collisions > 0 {
        debug!("Moved {collisions} duplicate timestamps back to restore uniqueness");
    }

    let states: Vec<f64> = match kind {
        SeriesKind::Measurement => readings.iter().map(|r| r.value * factor).collect(),
        SeriesKind::TotalIncreasing => {
            // Counter deltas; the first sample is its own delta (counter
            // reset semantics at series start).
            let mut previous = None;
            readings
                .iter()
                .map(|r| {
                    let delta = match previous {
                        Some(prev) => r.value - prev,
                        None => r.value,
                    };
                    previous = Some(r.value);
                    delta * factor
                })
                .collect()
        }
    };

    Ok(stamps
        .into_iter()
        .zip(states)
        .map(|(start_ts, state)| CleanPoint { start_ts, state })
        .collect())
}

/// Parse an ISO-8601 instant to unix seconds. Offset-carrying strings keep
/// their offset; naive datetimes and bare dates are interpreted as UTC.
fn coerce_iso(raw: &str) -> PipelineResult<f64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.timestamp() as f64);
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(naive.and_utc().timestamp() as f64);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        && let Some(midnight) = date.and_hms_opt(0, 0, 0)
    {
        return Ok(midnight.and_utc().timestamp() as f64);
    }
    Err(PipelineError::BadTimestampFormat(raw.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unix(ts: f64, value: f64) -> RawReading {
        RawReading {
            timestamp: RawTimestamp::Unix(ts),
            value,
        }
    }

    fn iso(raw: &str, value: f64) -> RawReading {
        RawReading {
            timestamp: RawTimestamp::Iso(raw.to_owned()),
            value,
        }
    }

    #[test]
    fn numeric_timestamps_pass_through() {
        let cleaned =
            clean_readings(&[unix(100.0, 5.0)], SeriesKind::Measurement, 1.0, None).unwrap();
        assert_eq!(cleaned, vec![CleanPoint { start_ts: 100.0, state: 5.0 }]);
    }

    #[test]
    fn iso_timestamps_are_parsed_as_utc() {
        let readings = [
            iso("2023-11-14T22:13:20Z", 1.0),
            iso("2023-11-14T23:13:20+01:00", 2.0),
            iso("2023-11-14 22:13:20", 3.0),
        ];
        let cleaned = clean_readings(&readings, SeriesKind::Measurement, 1.0, None).unwrap();
        // The offset-carrying string is the same instant as the first.
        assert_eq!(cleaned[0].start_ts, 1700000000.0);
        assert_eq!(cleaned[1].start_ts, 1700000000.0 - 1.0); // DST repair kicked in
        assert_eq!(cleaned[2].start_ts, 1700000000.0 - 2.0);
    }

    #[test]
    fn bare_dates_become_midnight_utc() {
        let cleaned =
            clean_readings(&[iso("2024-01-01", 1.0)], SeriesKind::Measurement, 1.0, None).unwrap();
        assert_eq!(cleaned[0].start_ts, 1704067200.0);
    }

    #[test]
    fn unparseable_timestamp_fails_the_whole_batch() {
        let readings = [unix(100.0, 1.0), iso("14/11/2023", 2.0)];
        let err = clean_readings(&readings, SeriesKind::Measurement, 1.0, None).unwrap_err();
        assert_eq!(
            err,
            PipelineError::BadTimestampFormat("14/11/2023".to_owned())
        );
    }

    #[test]
    fn offset_shifts_every_timestamp() {
        let readings = [unix(86400.0, 1.0), unix(172800.0, 2.0)];
        let cleaned =
            clean_readings(&readings, SeriesKind::Measurement, 1.0, Some(-3600)).unwrap();
        assert_eq!(cleaned[0].start_ts, 82800.0);
        assert_eq!(cleaned[1].start_ts, 169200.0);
    }

    #[test]
    fn dst_collision_moves_duplicate_back_one_second() {
        let readings = [unix(1000.0, 1.5), unix(1000.0, 2.5)];
        let cleaned = clean_readings(&readings, SeriesKind::Measurement, 1.0, None).unwrap();
        // Two distinct timestamps exactly one second apart, values
        // unchanged, relative order preserved.
        assert_eq!(cleaned[0], CleanPoint { start_ts: 1000.0, state: 1.5 });
        assert_eq!(cleaned[1], CleanPoint { start_ts: 999.0, state: 2.5 });
    }

    #[test]
    fn dst_repair_keeps_stepping_until_unique() {
        let readings = [unix(999.0, 1.0), unix(1000.0, 2.0), unix(1000.0, 3.0)];
        let cleaned = clean_readings(&readings, SeriesKind::Measurement, 1.0, None).unwrap();
        let stamps: Vec<f64> = cleaned.iter().map(|p| p.start_ts).collect();
        assert_eq!(stamps, vec![999.0, 1000.0, 998.0]);
    }

    #[test]
    fn measurement_values_are_scaled_by_the_factor() {
        let cleaned =
            clean_readings(&[unix(100.0, 1000.0)], SeriesKind::Measurement, 0.001, None).unwrap();
        assert_eq!(cleaned[0].state, 1.0);

        let cleaned =
            clean_readings(&[unix(100.0, 1000.0)], SeriesKind::Measurement, 1.0, None).unwrap();
        assert_eq!(cleaned[0].state, 1000.0);
    }

    #[test]
    fn total_increasing_produces_per_interval_deltas() {
        let readings = [
            unix(100.0, 10.0),
            unix(200.0, 15.0),
            unix(300.0, 15.0),
            unix(400.0, 25.0),
        ];
        let cleaned =
            clean_readings(&readings, SeriesKind::TotalIncreasing, 1.0, None).unwrap();
        let deltas: Vec<f64> = cleaned.iter().map(|p| p.state).collect();
        assert_eq!(deltas, vec![10.0, 5.0, 0.0, 10.0]);
    }

    #[test]
    fn total_increasing_deltas_are_scaled_after_differencing() {
        let readings = [unix(100.0, 1000.0), unix(200.0, 3000.0)];
        let cleaned =
            clean_readings(&readings, SeriesKind::TotalIncreasing, 0.001, None).unwrap();
        let deltas: Vec<f64> = cleaned.iter().map(|p| p.state).collect();
        assert_eq!(deltas, vec![1.0, 2.0]);
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let cleaned = clean_readings(&[], SeriesKind::Measurement, 1.0, None).unwrap();
        assert!(cleaned.is_empty());
    }
}

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

use serde::Deserialize;
use std::str::FromStr;

use crate::error::PipelineError;

/// Instant as delivered by a vendor API: either a unix epoch number or an
/// ISO-8601 string. Coercion to unix seconds happens in the sequence
/// cleaner, where a parse failure aborts the whole batch.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    Unix(f64),
    Iso(String),
}

/// One externally supplied sample. The input carries no uniqueness or
/// ordering guarantee.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawReading {
    pub timestamp: RawTimestamp,
    pub value: f64,
}

/// Cleaned per-interval energy value in kWh, keyed by unix start time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CleanPoint {
    pub start_ts: f64,
    pub state: f64,
}

/// One row of a statistics table.
///
/// `(metadata_id, start_ts)` is the upsert conflict key. The store's
/// synthetic `id` column never enters the pipeline: the read path does not
/// select it and identity is re-derived by the database on write.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatRow {
    pub metadata_id: i64,
    pub start_ts: f64,
    pub state: f64,
    pub sum: f64,
    pub created_ts: f64,
}

/// How a series' raw values are to be read: absolute instantaneous
/// readings, or a monotonically increasing counter whose deltas are the
/// quantity of interest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum SeriesKind {
    Measurement,
    TotalIncreasing,
}

impl FromStr for SeriesKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "measurement" => Ok(Self::Measurement),
            "total_increasing" => Ok(Self::TotalIncreasing),
            _ => Err(PipelineError::UnsupportedSeriesKind(s.to_owned())),
        }
    }
}

impl TryFrom<String> for SeriesKind {
    type Error = PipelineError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

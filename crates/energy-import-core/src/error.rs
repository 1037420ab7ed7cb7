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

use thiserror::Error;

/// Errors raised by the cleaning/merging pipeline.
///
/// All of these are fatal for the affected sensor's batch: nothing is
/// written when one occurs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("unit of measurement '{0}' is not recognized (expected kWh, kW, Wh or W)")]
    UnrecognizedUnit(String),

    #[error("series kind '{0}' is not supported (expected 'measurement' or 'total_increasing')")]
    UnsupportedSeriesKind(String),

    #[error("timestamp '{0}' is neither a unix instant nor an ISO-8601 date")]
    BadTimestampFormat(String),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

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

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use tracing::{error, info, warn};

use energy_import_core::{CleanPoint, clean_readings, merge_series, normalization_factor};
use energy_import_ha::{BatchRequest, BatchSource, FieldMap, HomeAssistantClient};
use energy_import_store::{StatisticsStore, WritePlan};

use crate::config::{SensorSettings, resolve_date};

/// Per-run outcome counts.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub succeeded: usize,
    pub failed: usize,
}

/// Drive the pipeline once for every configured sensor, strictly one
/// sensor at a time. A sensor's failure is logged with its name and never
/// prevents the remaining sensors from being attempted.
pub async fn run_import(
    sensors: &[SensorSettings],
    store: &StatisticsStore,
    ha: &HomeAssistantClient,
    source: &BatchSource,
) -> ImportSummary {
    let mut summary = ImportSummary::default();
    for sensor in sensors {
        match import_sensor(sensor, store, ha, source).await {
            Ok(()) => summary.succeeded += 1,
            Err(e) => {
                error!("Import failed for sensor '{}': {:#}", sensor.sensor_name, e);
                summary.failed += 1;
            }
        }
    }
    summary
}

/// One sensor's pass: resolve ids, fetch, clean, merge per destination,
/// then persist everything in a single transaction bracketed by the
/// recorder pause/resume.
async fn import_sensor(
    sensor: &SensorSettings,
    store: &StatisticsStore,
    ha: &HomeAssistantClient,
    source: &BatchSource,
) -> Result<()> {
    info!("Importing sensor '{}'", sensor.sensor_name);

    let ids = store
        .resolve_series(&sensor.sensor_name)
        .context("resolving series ids")?;

    let today = Utc::now().date_naive();
    let request = BatchRequest {
        url: sensor.source.url.clone(),
        headers: sensor.source.headers.clone(),
        start: resolve_date(&sensor.source.start, today).context("resolving start date")?,
        end: resolve_date(&sensor.source.end, today).context("resolving end date")?,
    };
    let fields = FieldMap {
        location: sensor.source.location.clone(),
        date: sensor.source.date_field.clone(),
        state: sensor.source.state_field.clone(),
    };

    let readings = source
        .fetch(&request, &fields)
        .await
        .context("fetching batch")?;

    let factor = normalization_factor(sensor.unit_of_measurement, sensor.conversion_factor);
    let cleaned = clean_readings(&readings, sensor.series_type, factor, sensor.time_offset)
        .context("cleaning batch")?;

    if cleaned.is_empty() {
        info!(
            "Sensor '{}' returned no readings, nothing to merge",
            sensor.sensor_name
        );
        return Ok(());
    }

    let mut plans = Vec::new();
    for &table in sensor.kind.tables() {
        let existing = store
            .fetch_rows(table, ids.metadata_id)
            .with_context(|| format!("reading existing rows from {}", table.table_name()))?;
        let merged = merge_series(&existing, &cleaned, ids.metadata_id);
        info!(
            "Merged {} fresh points with {} existing rows into {} rows for {}",
            cleaned.len(),
            existing.len(),
            merged.len(),
            table.table_name()
        );
        plans.push(WritePlan {
            table,
            rows: merged,
        });
    }

    if let Some(price) = sensor.cost {
        let cost_id = ids.cost_metadata_id.ok_or_else(|| {
            anyhow!(
                "cost is configured but no '{}_cost' series is registered",
                sensor.sensor_name
            )
        })?;
        let cost_points: Vec<CleanPoint> = cleaned
            .iter()
            .map(|p| CleanPoint {
                start_ts: p.start_ts,
                state: p.state * price,
            })
            .collect();
        for &table in sensor.kind.tables() {
            let existing = store
                .fetch_rows(table, cost_id)
                .with_context(|| format!("reading existing cost rows from {}", table.table_name()))?;
            plans.push(WritePlan {
                table,
                rows: merge_series(&existing, &cost_points, cost_id),
            });
        }
    }

    // Recorder bracket around the write phase. Pause/resume failures are
    // operator-visible warnings, never a rollback of a finished write.
    if let Err(e) = ha.pause_recorder().await {
        warn!("Could not pause the recorder before writing: {e}");
    }
    let write_result = store.write_all(&plans);
    if let Err(e) = ha.resume_recorder().await {
        warn!("Could not resume the recorder after writing: {e}");
    }
    write_result.context("writing merged statistics")?;

    info!("Sensor '{}' import complete", sensor.sensor_name);
    Ok(())
}

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

use chrono::NaiveDate;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

use crate::errors::{SourceError, SourceResult};
use energy_import_core::{RawReading, RawTimestamp};

/// Field names under which a vendor API exposes its readings.
#[derive(Debug, Clone)]
pub struct FieldMap {
    /// Key of the reading array in the response body.
    pub location: String,
    /// Field holding the sample timestamp.
    pub date: String,
    /// Field holding the sample value.
    pub state: String,
}

/// One batch request: endpoint, vendor headers, inclusive date range.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub url: String,
    pub headers: HashMap<String, String>,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Vendor API client fetching raw readings for a (series, date-range)
/// request.
///
/// The wire format is not ours to define: each element of the reading
/// array only has to yield a (timestamp, value) pair via the configured
/// field names. Timestamps may be unix numbers or ISO-8601 strings; values
/// may be numbers or numeric strings. Anything else is a fetch error, not
/// a silently dropped sample.
#[derive(Debug, Clone)]
pub struct BatchSource {
    client: Client,
}

impl BatchSource {
    pub fn new() -> SourceResult<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self { client })
    }

    pub async fn fetch(
        &self,
        request: &BatchRequest,
        fields: &FieldMap,
    ) -> SourceResult<Vec<RawReading>> {
        debug!(
            "Fetching batch from {} ({} to {})",
            request.url, request.start, request.end
        );

        let mut builder = self.client.get(&request.url).query(&[
            ("start", request.start.format("%Y-%m-%d").to_string()),
            ("end", request.end.format("%Y-%m-%d").to_string()),
        ]);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::BadStatus {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let body: Value = response.json().await?;
        let items = body
            .get(&fields.location)
            .and_then(Value::as_array)
            .ok_or_else(|| SourceError::MissingLocation(fields.location.clone()))?;

        let mut readings = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            readings.push(RawReading {
                timestamp: extract_timestamp(item, index, &fields.date)?,
                value: extract_value(item, index, &fields.state)?,
            });
        }

        info!("Retrieved {} readings", readings.len());
        Ok(readings)
    }
}

fn extract_timestamp(item: &Value, index: usize, field: &str) -> SourceResult<RawTimestamp> {
    match item.get(field) {
        Some(Value::Number(n)) => n.as_f64().map(RawTimestamp::Unix),
        Some(Value::String(s)) => Some(RawTimestamp::Iso(s.clone())),
        _ => None,
    }
    .ok_or_else(|| SourceError::MissingField {
        index,
        field: field.to_owned(),
    })
}

fn extract_value(item: &Value, index: usize, field: &str) -> SourceResult<f64> {
    match item.get(field) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| SourceError::MissingField {
        index,
        field: field.to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn field_map() -> FieldMap {
        FieldMap {
            location: "interval_reading".to_owned(),
            date: "date".to_owned(),
            state: "value".to_owned(),
        }
    }

    fn request_for(server: &Server) -> BatchRequest {
        BatchRequest {
            url: format!("{}/daily_consumption", server.url()),
            headers: HashMap::from([("x-api-key".to_owned(), "secret".to_owned())]),
            start: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_fetch_extracts_configured_fields() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/daily_consumption")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("start".into(), "2024-03-01".into()),
                Matcher::UrlEncoded("end".into(), "2024-03-02".into()),
            ]))
            .match_header("x-api-key", "secret")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "interval_reading": [
                        {"date": "2024-03-01T00:00:00Z", "value": "1250"},
                        {"date": 1709337600, "value": 980.5}
                    ]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let source = BatchSource::new().unwrap();
        let readings = source.fetch(&request_for(&server), &field_map()).await.unwrap();

        assert_eq!(readings.len(), 2);
        assert_eq!(
            readings[0].timestamp,
            RawTimestamp::Iso("2024-03-01T00:00:00Z".to_owned())
        );
        assert_eq!(readings[0].value, 1250.0);
        assert_eq!(readings[1].timestamp, RawTimestamp::Unix(1709337600.0));
        assert_eq!(readings[1].value, 980.5);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_non_success_status_is_an_error() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/daily_consumption")
            .match_query(Matcher::Any)
            .with_status(503)
            .with_body("maintenance")
            .create_async()
            .await;

        let source = BatchSource::new().unwrap();
        let err = source
            .fetch(&request_for(&server), &field_map())
            .await
            .unwrap_err();

        match err {
            SourceError::BadStatus { status, message } => {
                assert_eq!(status, 503);
                assert_eq!(message, "maintenance");
            }
            other => panic!("expected BadStatus, got {other:?}"),
        }
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_missing_location_is_an_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/daily_consumption")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(json!({"something_else": []}).to_string())
            .create_async()
            .await;

        let source = BatchSource::new().unwrap();
        let err = source
            .fetch(&request_for(&server), &field_map())
            .await
            .unwrap_err();

        assert!(matches!(err, SourceError::MissingLocation(loc) if loc == "interval_reading"));
    }

    #[tokio::test]
    async fn test_fetch_malformed_reading_is_an_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/daily_consumption")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                json!({
                    "interval_reading": [
                        {"date": "2024-03-01", "value": 1.0},
                        {"date": "2024-03-02", "value": "not-a-number"}
                    ]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let source = BatchSource::new().unwrap();
        let err = source
            .fetch(&request_for(&server), &field_map())
            .await
            .unwrap_err();

        match err {
            SourceError::MissingField { index, field } => {
                assert_eq!(index, 1);
                assert_eq!(field, "value");
            }
            other => panic!("expected MissingField, got {other:?}"),
        }
    }
}

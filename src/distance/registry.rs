//! Geocoding through the all-India post-office registry.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{error, info, warn};

use super::{Coordinates, Geocoder, UpstreamConfig};

#[derive(Debug, Deserialize)]
struct RegistryResponse {
    #[serde(default)]
    records: Vec<PostOfficeRecord>,
}

/// One office entry for a pincode. Coordinates are kept raw since the
/// registry sends numbers, numeric strings or placeholders like `"NA"`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostOfficeRecord {
    #[serde(default)]
    pub officetype: Option<String>,
    #[serde(default)]
    pub latitude: Value,
    #[serde(default)]
    pub longitude: Value,
}

impl PostOfficeRecord {
    fn is_type(&self, office_type: &str) -> bool {
        self.officetype
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case(office_type))
    }

    /// Coordinates of this office, if both fields are usable numbers.
    pub fn coordinates(&self) -> Option<Coordinates> {
        Some(Coordinates::new(
            parse_degrees(&self.latitude)?,
            parse_degrees(&self.longitude)?,
        ))
    }
}

fn parse_degrees(value: &Value) -> Option<f64> {
    let degrees = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    degrees.is_finite().then_some(degrees)
}

/// Pick the record to geocode from: the first post office, else the first
/// head office, else whatever comes first.
pub fn select_post_office(records: &[PostOfficeRecord]) -> Option<&PostOfficeRecord> {
    records
        .iter()
        .find(|r| r.is_type("PO"))
        .or_else(|| records.iter().find(|r| r.is_type("HO")))
        .or_else(|| records.first())
}

pub struct RegistryGeocoder {
    client: Client,
    config: UpstreamConfig,
}

impl RegistryGeocoder {
    pub fn new(client: Client, config: UpstreamConfig) -> Self {
        Self { client, config }
    }

    async fn fetch_records(&self, pincode: &str) -> Result<Vec<PostOfficeRecord>, reqwest::Error> {
        let response = self
            .client
            .get(&self.config.base_url)
            .query(&[
                ("api-key", self.config.api_key.as_str()),
                ("format", "json"),
                ("filters[pincode]", pincode),
            ])
            .send()
            .await?
            .error_for_status()?;

        let body: RegistryResponse = response.json().await?;
        Ok(body.records)
    }
}

#[async_trait]
impl Geocoder for RegistryGeocoder {
    async fn geocode(&self, pincode: &str) -> Option<Coordinates> {
        info!(pincode = %pincode, "Looking up pincode in post-office registry");

        let records = match self.fetch_records(pincode).await {
            Ok(records) => records,
            Err(e) => {
                error!(pincode = %pincode, error = %e, "Registry lookup failed");
                return None;
            }
        };

        let Some(record) = select_post_office(&records) else {
            warn!(pincode = %pincode, "No registry records for pincode");
            return None;
        };

        let coordinates = record.coordinates();
        match coordinates {
            Some(c) => info!(
                pincode = %pincode,
                latitude = c.latitude,
                longitude = c.longitude,
                "Geocode found"
            ),
            None => warn!(pincode = %pincode, "Registry record has unusable coordinates"),
        }
        coordinates
    }
}

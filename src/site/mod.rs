//! Extractor backed by rendered catalogue pages.
//!
//! Pages are rendered through spider.cloud and parsed with CSS selectors.
//! The catalogue is a single-page app, so per-vehicle and per-group views are
//! reached through URL templates from [`Config`].

pub mod client;
pub mod groups;
pub mod parts;
pub mod vehicles;

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use scraper::ElementRef;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{DiscoveryError, ExtractionError};
use crate::extractor::{Extractor, GroupExtract};
use crate::model::{Group, GroupType, Vehicle};

pub use client::RenderClient;

static ENTRIES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"of\s+([\d,]+)\s+entries").unwrap());

pub struct SiteExtractor {
    client: RenderClient,
    aggregates_url: String,
    parts_url: String,
}

impl SiteExtractor {
    pub fn new(client: RenderClient, config: &Config) -> Self {
        Self {
            client,
            aggregates_url: config.aggregates_url.clone(),
            parts_url: config.parts_url.clone(),
        }
    }

    fn aggregates_url(&self, vehicle: &Vehicle) -> String {
        fill_template(
            &self.aggregates_url,
            &[
                ("catalog_url", &vehicle.source_url),
                ("model_code", &vehicle.model_code),
            ],
        )
    }

    fn parts_url(&self, vehicle: &Vehicle, group: &Group) -> String {
        fill_template(
            &self.parts_url,
            &[
                ("catalog_url", &vehicle.source_url),
                ("model_code", &vehicle.model_code),
                ("table_no", &group.key.table_no),
                ("group_code", &group.key.group_code),
                ("variant", group.variant.as_deref().unwrap_or("")),
            ],
        )
    }
}

#[async_trait]
impl Extractor for SiteExtractor {
    async fn list_vehicles(&self, catalog_url: &str) -> Result<Vec<Vehicle>, DiscoveryError> {
        info!("Collecting vehicles from catalog: {}", catalog_url);
        let html = self
            .client
            .render(catalog_url)
            .await
            .map_err(|e| DiscoveryError::new(catalog_url, e.to_string()))?;

        let listing = vehicles::parse_catalog(&html, catalog_url)?;
        match listing.expected {
            Some(expected) if listing.vehicles.len() < expected => warn!(
                "Vehicle count mismatch: found {}, expected {}",
                listing.vehicles.len(),
                expected
            ),
            Some(expected) => info!("Vehicle count verified: {}/{}", listing.vehicles.len(), expected),
            None => {}
        }
        info!("Collected {} unique vehicles", listing.vehicles.len());
        Ok(listing.vehicles)
    }

    async fn list_groups(&self, vehicle: &Vehicle) -> Result<Vec<Group>, DiscoveryError> {
        let url = self.aggregates_url(vehicle);
        let html = self
            .client
            .render(&url)
            .await
            .map_err(|e| DiscoveryError::new(&vehicle.vehicle_id, e.to_string()))?;

        let groups = groups::parse_groups(&html, vehicle, &url)?;
        let engine = groups
            .iter()
            .filter(|g| g.key.group_type == GroupType::Engine)
            .count();
        info!(
            "Groups breakdown for {}: {} ENGINE, {} FRAME",
            vehicle.vehicle_name,
            engine,
            groups.len() - engine
        );
        Ok(groups)
    }

    async fn extract_group(
        &self,
        vehicle: &Vehicle,
        group: &Group,
    ) -> Result<GroupExtract, ExtractionError> {
        let url = self.parts_url(vehicle, group);
        let html = self
            .client
            .render(&url)
            .await
            .map_err(|e| ExtractionError::new(format!("render {url}: {e}")))?;
        parts::parse_parts(&html, vehicle, group, &url)
    }
}

/// Substitute `{name}` placeholders.
pub fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    values.iter().fold(template.to_string(), |acc, (name, value)| {
        acc.replace(&format!("{{{name}}}"), value)
    })
}

/// Total from a DataTables info line, e.g. "Showing 1 to 25 of 1,092 entries".
pub fn parse_entry_count(info: &str) -> Option<usize> {
    ENTRIES_RE
        .captures(info)
        .and_then(|c| c[1].replace(',', "").parse().ok())
}

/// Visible text with whitespace collapsed.
pub(crate) fn text_of(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GroupKey;

    #[test]
    fn entry_count() {
        assert_eq!(parse_entry_count("Showing 1 to 25 of 92 entries"), Some(92));
        assert_eq!(parse_entry_count("Showing 1 to 25 of 1,092 entries"), Some(1092));
        assert_eq!(parse_entry_count("Showing 0 to 0 of 0 entries"), Some(0));
        assert_eq!(parse_entry_count(""), None);
        assert_eq!(parse_entry_count("No data available"), None);
    }

    #[test]
    fn template_filling() {
        let vehicle = Vehicle::new("Xoom 110", "XOOM110", "https://cat.example/");
        let group = Group {
            key: GroupKey::new(&vehicle.vehicle_id, GroupType::Engine, "E-1", "E-1_XOOM110"),
            s_no: "1".into(),
            group_desc: "CYLINDER HEAD".into(),
            variant: None,
            page_url: String::new(),
        };
        let url = fill_template(
            "{catalog_url}bom?groupNo={group_code}&variant={variant}",
            &[
                ("catalog_url", &vehicle.source_url),
                ("group_code", &group.key.group_code),
                ("variant", group.variant.as_deref().unwrap_or("")),
            ],
        );
        assert_eq!(url, "https://cat.example/bom?groupNo=E-1_XOOM110&variant=");
        assert_eq!(fill_template("{unknown}/x", &[("a", "b")]), "{unknown}/x");
    }
}

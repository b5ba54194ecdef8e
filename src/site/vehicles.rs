use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use tracing::debug;

use crate::error::DiscoveryError;
use crate::model::Vehicle;

use super::{parse_entry_count, text_of};

static CATALOG_TABLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("#datatable-t2").unwrap());
static MODEL_HEADINGS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"#datatable-t2 .panel .panel-heading[onclick*="loadModelAggregates"]"#).unwrap()
});
static TABLE_INFO: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("#datatable-t2_info").unwrap());
static MODEL_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"loadModelAggregates\(\s*''\s*,\s*'([^']+)'\s*\)").unwrap());

#[derive(Debug)]
pub struct CatalogListing {
    pub vehicles: Vec<Vehicle>,
    /// Total the table claims to hold, when it says.
    pub expected: Option<usize>,
}

/// Vehicles from the catalogue grid, first occurrence per model code.
pub fn parse_catalog(html: &str, catalog_url: &str) -> Result<CatalogListing, DiscoveryError> {
    let doc = Html::parse_document(html);
    if doc.select(&CATALOG_TABLE).next().is_none() {
        return Err(DiscoveryError::new(
            catalog_url,
            "main catalog table #datatable-t2 not found",
        ));
    }

    let mut seen = HashSet::new();
    let mut vehicles = Vec::new();
    for heading in doc.select(&MODEL_HEADINGS) {
        let name = text_of(heading);
        let model_code = heading
            .value()
            .attr("onclick")
            .and_then(|oc| MODEL_CODE_RE.captures(oc))
            .map(|c| c[1].trim().to_string())
            .unwrap_or_default();

        if name.is_empty() || model_code.is_empty() {
            debug!("Skipping invalid vehicle heading: {:?}", name);
            continue;
        }
        if !seen.insert(model_code.clone()) {
            debug!("Skipping duplicate model_code: {}", model_code);
            continue;
        }
        vehicles.push(Vehicle::new(&name, &model_code, catalog_url));
    }

    if vehicles.is_empty() {
        return Err(DiscoveryError::new(catalog_url, "no vehicles found in catalog"));
    }

    let expected = doc
        .select(&TABLE_INFO)
        .next()
        .and_then(|info| parse_entry_count(&text_of(info)));

    Ok(CatalogListing { vehicles, expected })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = "https://catalog.example/";

    fn page(panels: &str) -> String {
        format!(
            r#"<html><body>
            <table id="datatable-t2"><tbody><tr><td>{panels}</td></tr></tbody></table>
            <div id="datatable-t2_info">Showing 1 to 3 of 4 entries</div>
            </body></html>"#
        )
    }

    fn panel(name: &str, code: &str) -> String {
        format!(
            r#"<div class="panel"><div class="panel-heading" onclick="loadModelAggregates('', '{code}')">
                {name}
            </div></div>"#
        )
    }

    #[test]
    fn collects_vehicles_in_order() {
        let html = page(&[panel("XOOM 110", "XM110"), panel("Splendor+ XTEC", "SPX")].concat());
        let listing = parse_catalog(&html, CATALOG).unwrap();

        assert_eq!(listing.vehicles.len(), 2);
        let first = &listing.vehicles[0];
        assert_eq!(first.vehicle_id, "xoom-110");
        assert_eq!(first.vehicle_name, "XOOM 110");
        assert_eq!(first.model_code, "XM110");
        assert_eq!(first.source_url, CATALOG);
        assert_eq!(listing.vehicles[1].vehicle_id, "splendor-xtec");
        assert_eq!(listing.expected, Some(4));
    }

    #[test]
    fn duplicate_and_invalid_headings_are_dropped() {
        let html = page(
            &[
                panel("XOOM 110", "XM110"),
                panel("XOOM 110 (again)", "XM110"),
                panel("", "EMPTY"),
                r#"<div class="panel"><div class="panel-heading" onclick="loadModelAggregates('', '')">No code</div></div>"#
                    .to_string(),
            ]
            .concat(),
        );
        let listing = parse_catalog(&html, CATALOG).unwrap();
        assert_eq!(listing.vehicles.len(), 1);
        assert_eq!(listing.vehicles[0].vehicle_name, "XOOM 110");
    }

    #[test]
    fn missing_table_is_a_discovery_error() {
        let err = parse_catalog("<html><body><p>maintenance</p></body></html>", CATALOG).unwrap_err();
        assert!(err.to_string().contains("#datatable-t2"));
    }

    #[test]
    fn empty_table_is_a_discovery_error() {
        let err = parse_catalog(&page(""), CATALOG).unwrap_err();
        assert!(err.to_string().contains("no vehicles"));
    }
}

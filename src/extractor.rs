use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{DiscoveryError, ExtractionError};
use crate::model::{Group, PartRow, PartsPage, Vehicle};

/// Everything one group's detail view yields.
#[derive(Debug, Clone)]
pub struct GroupExtract {
    pub page: PartsPage,
    pub rows: Vec<PartRow>,
    /// Where the group's diagram can be downloaded from, if the page has one.
    pub asset: Option<String>,
}

/// Produces vehicles, groups and part rows from a catalogue.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn list_vehicles(&self, catalog_url: &str) -> Result<Vec<Vehicle>, DiscoveryError>;

    async fn list_groups(&self, vehicle: &Vehicle) -> Result<Vec<Group>, DiscoveryError>;

    async fn extract_group(&self, vehicle: &Vehicle, group: &Group) -> Result<GroupExtract, ExtractionError>;
}

/// Stores a binary asset next to `destination_prefix` (extension chosen by
/// the fetcher). Missing assets are tolerated, so failures yield `None`.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch_asset(&self, locator: &str, destination_prefix: &Path) -> Option<PathBuf>;
}

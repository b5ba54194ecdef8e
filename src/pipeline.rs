use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{Config, MaterializeMode};
use crate::db;
use crate::error::{ExtractionError, GroupError, RunError};
use crate::extractor::{AssetFetcher, Extractor, GroupExtract};
use crate::model::{CheckpointStatus, Group, GroupKey, Vehicle};
use crate::shard::Materializer;

/// In-memory counters for one run. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub vehicles_seen: usize,
    pub vehicles_skipped: usize,
    pub groups_seen: usize,
    pub groups_done: usize,
    pub groups_skipped: usize,
    pub groups_failed: usize,
    pub parts_rows: usize,
    pub images_saved: usize,
    pub milestones: usize,
}

impl RunStats {
    pub fn log(&self) {
        info!("Vehicles seen         : {}", self.vehicles_seen);
        info!("Vehicles skipped      : {}", self.vehicles_skipped);
        info!("Groups discovered     : {}", self.groups_seen);
        info!("Groups completed      : {}", self.groups_done);
        info!("Groups skipped (done) : {}", self.groups_skipped);
        info!("Groups failed         : {}", self.groups_failed);
        info!("Parts rows collected  : {}", self.parts_rows);
        info!("Images saved          : {}", self.images_saved);
        info!("Milestones recorded   : {}", self.milestones);
    }
}

/// What a worker hands back for one group.
struct Outcome {
    key: GroupKey,
    result: Result<Fetched, ExtractionError>,
}

struct Fetched {
    extract: GroupExtract,
    stored_asset: Option<PathBuf>,
}

/// Drives catalog → vehicle → group traversal against the checkpoint store.
///
/// Workers only talk to the extractor and asset fetcher. Every checkpoint and
/// store write happens here, on the task that owns the connection, so state
/// transitions for a key are serialized.
pub struct Pipeline<'a> {
    config: &'a Config,
    conn: &'a Connection,
    extractor: Arc<dyn Extractor>,
    assets: Arc<dyn AssetFetcher>,
    materializer: Materializer,
    cancel: CancellationToken,
    stats: RunStats,
    vehicles_processed: usize,
    milestone_batch: i64,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a Config,
        conn: &'a Connection,
        extractor: Arc<dyn Extractor>,
        assets: Arc<dyn AssetFetcher>,
    ) -> Self {
        Self {
            config,
            conn,
            extractor,
            assets,
            materializer: Materializer::new(config),
            cancel: CancellationToken::new(),
            stats: RunStats::default(),
            vehicles_processed: 0,
            milestone_batch: 0,
        }
    }

    /// Stop dispatching new work once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub async fn run(&mut self, catalog_url: &str) -> Result<RunStats, RunError> {
        info!("Catalog URL: {}", catalog_url);
        info!("Force reprocess: {}", self.config.force);
        info!(
            "Output: {:?} | Materialize: {:?} | Concurrency: {}",
            self.config.output, self.config.materialize, self.config.max_concurrent_groups
        );

        info!("=== Step 1: Collecting Vehicles ===");
        let vehicles = self.extractor.list_vehicles(catalog_url).await?;
        db::save_vehicles(self.conn, &vehicles)?;
        self.stats.vehicles_seen = vehicles.len();
        info!("Saved {} vehicles to database", vehicles.len());

        info!("=== Step 2: Processing Vehicles ===");
        let pb = self.progress_bar(vehicles.len());
        let total = vehicles.len();
        for (idx, vehicle) in vehicles.iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!("Shutdown requested; stopping before vehicle {}/{}", idx + 1, total);
                break;
            }
            pb.suspend(|| {
                info!(
                    "[{}/{}] Vehicle: {} ({})",
                    idx + 1,
                    total,
                    vehicle.vehicle_name,
                    vehicle.model_code
                )
            });
            self.process_vehicle(vehicle).await;
            self.after_vehicle(&vehicle.vehicle_id);
            pb.inc(1);
        }
        pb.finish_and_clear();

        if self.config.materialize == MaterializeMode::EndOfRun {
            // Every stored group, so groups marked done by an earlier run whose
            // final pass never finished still reach the shards.
            let keys = db::group_keys(self.conn)?;
            if !keys.is_empty() {
                info!("Materializing {} stored groups", keys.len());
                self.materializer.materialize(self.conn, &keys)?;
            }
        }

        info!("=== Step 3: Final Statistics ===");
        self.stats.log();
        Ok(self.stats.clone())
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.config.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        let style = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} vehicles (eta {eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        pb.set_style(style);
        pb
    }

    async fn process_vehicle(&mut self, vehicle: &Vehicle) {
        let mut groups = match self.extractor.list_groups(vehicle).await {
            Ok(groups) => groups,
            Err(e) => {
                warn!("Skipping vehicle {}: {}", vehicle.vehicle_name, e);
                return;
            }
        };

        let discovered = groups.len();
        let mut seen = HashSet::new();
        groups.retain(|g| seen.insert(g.key.clone()));
        if groups.len() < discovered {
            debug!(
                "Collapsed {} duplicate groups for {}",
                discovered - groups.len(),
                vehicle.vehicle_name
            );
        }

        if groups.is_empty() {
            warn!("No Engine/Frame groups found for vehicle: {}", vehicle.vehicle_name);
            return;
        }

        let keys: Vec<GroupKey> = groups.iter().map(|g| g.key.clone()).collect();
        if !self.config.force {
            match db::all_done(self.conn, &keys) {
                Ok(true) => {
                    info!(
                        "[skip vehicle done] {} ({}) - all {} groups already done",
                        vehicle.vehicle_name,
                        vehicle.model_code,
                        keys.len()
                    );
                    self.stats.vehicles_skipped += 1;
                    return;
                }
                Ok(false) => {}
                Err(e) => warn!("Could not check completion of {}: {}", vehicle.vehicle_id, e),
            }
        }

        self.stats.groups_seen += groups.len();
        info!("Found {} groups for {}", groups.len(), vehicle.vehicle_name);
        self.process_groups(vehicle, groups).await;
    }

    async fn process_groups(&mut self, vehicle: &Vehicle, groups: Vec<Group>) {
        let total = groups.len();
        let limit = self.config.max_concurrent_groups.max(1);
        let mut in_flight: JoinSet<Outcome> = JoinSet::new();

        for (j, group) in groups.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!(
                    "Shutdown requested; {} groups of {} not dispatched",
                    total - j,
                    vehicle.vehicle_name
                );
                break;
            }

            let key = group.key.clone();
            match db::checkpoint_status(self.conn, &key) {
                Ok(CheckpointStatus::Done) if !self.config.force => {
                    self.stats.groups_skipped += 1;
                    info!("  - [skip done] {}", key);
                    continue;
                }
                Ok(_) => {}
                Err(e) => warn!("Checkpoint lookup failed for {}: {}", key, e),
            }

            while in_flight.len() >= limit {
                match in_flight.join_next().await {
                    Some(Ok(outcome)) => self.finish_group(outcome),
                    Some(Err(e)) => error!("Group worker vanished: {}", e),
                    None => break,
                }
            }

            if let Err(e) = db::mark_pending(self.conn, &key) {
                error!("Could not mark {} pending, not attempting it: {}", key, e);
                self.stats.groups_failed += 1;
                continue;
            }
            info!("  - [{}/{}] Scraping: {}", j + 1, total, key);
            debug!(s_no = %group.s_no, listed_on = %group.page_url, "dispatching {}", key);

            let extractor = Arc::clone(&self.extractor);
            let assets = Arc::clone(&self.assets);
            let vehicle = vehicle.clone();
            let prefix = asset_prefix(&self.config.images_dir, &key);
            in_flight.spawn(async move {
                let worker = tokio::spawn(attempt(extractor, assets, vehicle, group, prefix));
                let result = match worker.await {
                    Ok(result) => result,
                    Err(e) => Err(ExtractionError::new(format!("extraction task failed: {e}"))),
                };
                Outcome { key, result }
            });
        }

        while let Some(joined) = in_flight.join_next().await {
            match joined {
                Ok(outcome) => self.finish_group(outcome),
                Err(e) => error!("Group worker vanished: {}", e),
            }
        }
    }

    fn finish_group(&mut self, outcome: Outcome) {
        let Outcome { key, result } = outcome;
        let persisted = result
            .map_err(GroupError::from)
            .and_then(|fetched| self.persist(&key, fetched));

        match persisted {
            Ok((rows, asset_saved)) => {
                self.stats.groups_done += 1;
                self.stats.parts_rows += rows;
                if asset_saved {
                    self.stats.images_saved += 1;
                }
                info!("    done: {} rows={}, image_saved={}", key, rows, asset_saved);
            }
            Err(e) => {
                self.stats.groups_failed += 1;
                error!("    error scraping group: {} :: {}", key, e);
                if let Err(mark) = db::mark_error(self.conn, &key, &e.to_string()) {
                    error!("Could not record error checkpoint for {}: {}", key, mark);
                }
            }
        }
    }

    /// Store, materialize, then mark done. `done` is written last.
    fn persist(&self, key: &GroupKey, fetched: Fetched) -> Result<(usize, bool), GroupError> {
        let Fetched {
            mut extract,
            stored_asset,
        } = fetched;

        if extract.page.key != *key || extract.rows.iter().any(|r| r.key != *key) {
            return Err(ExtractionError::new(format!(
                "extracted records do not belong to {key} (stale view?)"
            ))
            .into());
        }

        let image_path = stored_asset.as_deref().map(|p| self.asset_record_path(p));
        for row in &mut extract.rows {
            row.image_path = image_path.clone().unwrap_or_default();
        }
        extract.page.image_path = image_path;

        db::upsert_parts_page(self.conn, &extract.page)?;
        db::upsert_part_rows(self.conn, &extract.rows)?;
        if self.config.materialize == MaterializeMode::PerGroup {
            self.materializer.materialize_group(self.conn, key)?;
        }

        let asset_saved = stored_asset.is_some();
        db::mark_done(self.conn, key, extract.rows.len(), asset_saved)?;
        Ok((extract.rows.len(), asset_saved))
    }

    fn asset_record_path(&self, path: &Path) -> String {
        match self.config.relative_asset_path(path) {
            Ok(rel) => rel,
            Err(_) => {
                debug!(
                    "Asset {} is outside {}; recording absolute path",
                    path.display(),
                    self.config.output_dir.display()
                );
                path.display().to_string()
            }
        }
    }

    fn after_vehicle(&mut self, vehicle_id: &str) {
        self.vehicles_processed += 1;
        let every = self.config.milestone_every;
        if every == 0 || self.vehicles_processed % every != 0 {
            return;
        }
        self.milestone_batch += 1;
        match db::record_milestone(self.conn, self.milestone_batch, vehicle_id) {
            Ok(()) => {
                self.stats.milestones += 1;
                info!(
                    "[milestone] Processed {} vehicles; milestone batch {} recorded.",
                    self.vehicles_processed, self.milestone_batch
                );
            }
            Err(e) => warn!("Could not write milestone batch {}: {}", self.milestone_batch, e),
        }
    }
}

/// `<images>/<vehicle_id>/<group_type>/<table_no>_<group_code>`, with page
/// text reduced to one safe path component.
fn asset_prefix(images_dir: &Path, key: &GroupKey) -> PathBuf {
    let stem = format!(
        "{}_{}",
        path_component(&key.table_no),
        path_component(&key.group_code)
    );
    images_dir
        .join(&key.vehicle_id)
        .join(key.group_type.as_str())
        .join(stem)
}

fn path_component(raw: &str) -> String {
    let safe: String = raw
        .trim()
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .collect();
    if safe.is_empty() {
        "_".into()
    } else {
        safe
    }
}

async fn attempt(
    extractor: Arc<dyn Extractor>,
    assets: Arc<dyn AssetFetcher>,
    vehicle: Vehicle,
    group: Group,
    prefix: PathBuf,
) -> Result<Fetched, ExtractionError> {
    let extract = extractor.extract_group(&vehicle, &group).await?;
    let stored_asset = match &extract.asset {
        Some(locator) => assets.fetch_asset(locator, &prefix).await,
        None => None,
    };
    Ok(Fetched {
        extract,
        stored_asset,
    })
}

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::ValueEnum;

pub const DEFAULT_OUTPUT_DIR: &str = "data";
pub const DEFAULT_MAX_CONCURRENT_GROUPS: usize = 2;
pub const DEFAULT_REQUESTS_PER_SEC: f64 = 1.5;
pub const DEFAULT_MILESTONE_EVERY: usize = 30;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(2);

/// Where the aggregates view of a model is rendered from.
pub const DEFAULT_AGGREGATES_URL: &str = "{catalog_url}?modelCode={model_code}";
/// Where the parts (BOM) view of a group is rendered from.
pub const DEFAULT_PARTS_URL: &str = "{catalog_url}bom?groupNo={group_code}&variant={variant}";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Csv,
    Parquet,
    Both,
}

impl OutputFormat {
    pub fn csv(self) -> bool {
        matches!(self, OutputFormat::Csv | OutputFormat::Both)
    }

    pub fn parquet(self) -> bool {
        matches!(self, OutputFormat::Parquet | OutputFormat::Both)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MaterializeMode {
    /// Rewrite shards after every completed group.
    PerGroup,
    /// Rewrite shards once, after the vehicle loop.
    EndOfRun,
}

/// Run configuration, built once in `main` and handed to every component.
#[derive(Debug, Clone)]
pub struct Config {
    pub output_dir: PathBuf,
    pub sqlite_path: PathBuf,
    pub csv_path: PathBuf,
    pub parquet_path: PathBuf,
    pub images_dir: PathBuf,

    pub force: bool,
    pub output: OutputFormat,
    pub materialize: MaterializeMode,

    pub max_concurrent_groups: usize,
    pub requests_per_sec: f64,
    pub milestone_every: usize,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,

    pub aggregates_url: String,
    pub parts_url: String,
    pub show_progress: bool,
}

impl Config {
    pub fn new(output_dir: impl AsRef<Path>) -> Self {
        let output_dir = output_dir.as_ref().to_path_buf();
        Self {
            sqlite_path: output_dir.join("sqlite").join("catalogue.sqlite"),
            csv_path: output_dir.join("csv").join("parts_master.csv"),
            parquet_path: output_dir.join("parquet").join("parts_master.parquet"),
            images_dir: output_dir.join("images"),
            output_dir,
            force: false,
            output: OutputFormat::Csv,
            materialize: MaterializeMode::PerGroup,
            max_concurrent_groups: DEFAULT_MAX_CONCURRENT_GROUPS,
            requests_per_sec: DEFAULT_REQUESTS_PER_SEC,
            milestone_every: DEFAULT_MILESTONE_EVERY,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            aggregates_url: DEFAULT_AGGREGATES_URL.to_string(),
            parts_url: DEFAULT_PARTS_URL.to_string(),
            show_progress: true,
        }
    }

    pub fn ensure_directories(&self) -> std::io::Result<()> {
        for path in [&self.sqlite_path, &self.csv_path, &self.parquet_path] {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::create_dir_all(&self.images_dir)
    }

    /// Path stored in records for a downloaded asset: relative to the output
    /// root when it lives under it.
    pub fn relative_asset_path(&self, path: &Path) -> Result<String, std::path::StripPrefixError> {
        path.strip_prefix(&self.output_dir)
            .map(|p| p.to_string_lossy().replace('\\', "/"))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(DEFAULT_OUTPUT_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_paths() {
        let c = Config::new("/tmp/out");
        assert_eq!(c.csv_path, PathBuf::from("/tmp/out/csv/parts_master.csv"));
        assert_eq!(c.parquet_path, PathBuf::from("/tmp/out/parquet/parts_master.parquet"));
        assert_eq!(c.sqlite_path, PathBuf::from("/tmp/out/sqlite/catalogue.sqlite"));
        assert_eq!(c.milestone_every, 30);
        assert!(!c.force);
    }

    #[test]
    fn output_format_flags() {
        assert!(OutputFormat::Csv.csv() && !OutputFormat::Csv.parquet());
        assert!(!OutputFormat::Parquet.csv() && OutputFormat::Parquet.parquet());
        assert!(OutputFormat::Both.csv() && OutputFormat::Both.parquet());
    }

    #[test]
    fn asset_path_relative_to_output() {
        let c = Config::new("/tmp/out");
        let p = c.images_dir.join("xoom").join("ENGINE").join("E-1.png");
        assert_eq!(c.relative_asset_path(&p).unwrap(), "images/xoom/ENGINE/E-1.png");
        assert!(c.relative_asset_path(Path::new("/elsewhere/x.png")).is_err());
    }
}

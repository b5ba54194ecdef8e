use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{ArrayRef, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use rusqlite::Connection;
use tracing::{debug, info};

use crate::config::Config;
use crate::db;
use crate::error::PersistenceError;
use crate::model::{GroupKey, ShardRow, SHARD_COLUMNS};

type Result<T> = std::result::Result<T, PersistenceError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardFormat {
    Csv,
    Parquet,
}

#[derive(Debug, Clone)]
pub struct Destination {
    pub format: ShardFormat,
    pub path: PathBuf,
}

/// Rebuilds output shards from the canonical store.
pub struct Materializer {
    destinations: Vec<Destination>,
}

impl Materializer {
    pub fn new(config: &Config) -> Self {
        let mut destinations = Vec::new();
        if config.output.csv() {
            destinations.push(Destination {
                format: ShardFormat::Csv,
                path: config.csv_path.clone(),
            });
        }
        if config.output.parquet() {
            destinations.push(Destination {
                format: ShardFormat::Parquet,
                path: config.parquet_path.clone(),
            });
        }
        Self { destinations }
    }

    pub fn destinations(&self) -> &[Destination] {
        &self.destinations
    }

    pub fn materialize_group(&self, conn: &Connection, key: &GroupKey) -> Result<usize> {
        self.materialize(conn, std::slice::from_ref(key))
    }

    /// Replace every listed group in every destination with a fresh read of
    /// its canonical rows. Returns the number of rows written for `keys`.
    pub fn materialize(&self, conn: &Connection, keys: &[GroupKey]) -> Result<usize> {
        if keys.is_empty() || self.destinations.is_empty() {
            return Ok(0);
        }
        let fresh = db::fetch_shard_rows(conn, keys)?;
        for dest in &self.destinations {
            rewrite(dest, keys, &fresh)?;
            debug!(
                path = %dest.path.display(),
                groups = keys.len(),
                rows = fresh.len(),
                "shard rewritten"
            );
        }
        if keys.len() == 1 {
            info!("Shards updated for {} ({} rows)", keys[0], fresh.len());
        } else {
            info!("Shards updated for {} groups ({} rows)", keys.len(), fresh.len());
        }
        Ok(fresh.len())
    }

    /// Discard every destination and regenerate it from all stored groups.
    pub fn rebuild(&self, conn: &Connection) -> Result<usize> {
        for dest in &self.destinations {
            if dest.path.exists() {
                std::fs::remove_file(&dest.path)?;
            }
        }
        let keys = db::group_keys(conn)?;
        if keys.is_empty() {
            // Still leave header-only shards behind.
            for dest in &self.destinations {
                rewrite(dest, &[], &[])?;
            }
            return Ok(0);
        }
        self.materialize(conn, &keys)
    }
}

/// Read-filter-rewrite of one destination.
fn rewrite(dest: &Destination, keys: &[GroupKey], fresh: &[ShardRow]) -> Result<()> {
    let existing = if dest.path.exists() {
        match dest.format {
            ShardFormat::Csv => read_csv(&dest.path)?,
            ShardFormat::Parquet => read_parquet(&dest.path)?,
        }
    } else {
        Vec::new()
    };

    let mut out: Vec<ShardRow> = existing
        .into_iter()
        .filter(|row| !keys.iter().any(|k| row.belongs_to(k)))
        .collect();
    out.extend_from_slice(fresh);

    if let Some(parent) = dest.path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = tmp_path(&dest.path);
    match dest.format {
        ShardFormat::Csv => write_csv(&tmp, &out)?,
        ShardFormat::Parquet => write_parquet(&tmp, &out)?,
    }
    std::fs::rename(&tmp, &dest.path)?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

// ── CSV ──

pub fn read_csv(path: &Path) -> Result<Vec<ShardRow>> {
    let mut reader = csv::Reader::from_path(path)?;
    let rows = reader
        .deserialize::<ShardRow>()
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn write_csv(path: &Path, rows: &[ShardRow]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    writer.write_record(SHARD_COLUMNS)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

// ── Parquet ──

fn shard_schema() -> Arc<Schema> {
    Arc::new(Schema::new(
        SHARD_COLUMNS
            .iter()
            .map(|name| Field::new(*name, DataType::Utf8, false))
            .collect::<Vec<_>>(),
    ))
}

fn row_values(r: &ShardRow) -> [&str; 17] {
    [
        r.vehicle_id.as_str(),
        r.vehicle_name.as_str(),
        r.model_code.as_str(),
        r.group_type.as_str(),
        r.table_no.as_str(),
        r.group_code.as_str(),
        r.group_desc.as_str(),
        r.ref_no.as_str(),
        r.part_no.as_str(),
        r.description.as_str(),
        r.remark.as_str(),
        r.req_no.as_str(),
        r.moq.as_str(),
        r.mrp.as_str(),
        r.image_path.as_str(),
        r.parts_page_url.as_str(),
        r.source_url.as_str(),
    ]
}

fn write_parquet(path: &Path, rows: &[ShardRow]) -> Result<()> {
    let schema = shard_schema();
    let columns: Vec<ArrayRef> = (0..SHARD_COLUMNS.len())
        .map(|i| {
            let values: Vec<&str> = rows.iter().map(|r| row_values(r)[i]).collect();
            Arc::new(StringArray::from(values)) as ArrayRef
        })
        .collect();
    let batch = RecordBatch::try_new(schema.clone(), columns)?;

    let file = File::create(path)?;
    let props = WriterProperties::builder().build();
    let mut writer = ArrowWriter::try_new(file, schema, Some(props))?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

fn col_string<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    let idx = batch
        .schema()
        .index_of(name)
        .map_err(|e| PersistenceError::Shard(format!("missing column '{name}': {e}")))?;
    batch
        .column(idx)
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| PersistenceError::Shard(format!("column '{name}' is not StringArray")))
}

pub fn read_parquet(path: &Path) -> Result<Vec<ShardRow>> {
    let file = File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

    let mut out = Vec::new();
    for batch in reader {
        let batch = batch?;
        let cols = SHARD_COLUMNS
            .iter()
            .map(|name| col_string(&batch, name))
            .collect::<Result<Vec<_>>>()?;
        let v = |c: usize, i: usize| cols[c].value(i).to_string();
        for i in 0..batch.num_rows() {
            out.push(ShardRow {
                vehicle_id: v(0, i),
                vehicle_name: v(1, i),
                model_code: v(2, i),
                group_type: v(3, i),
                table_no: v(4, i),
                group_code: v(5, i),
                group_desc: v(6, i),
                ref_no: v(7, i),
                part_no: v(8, i),
                description: v(9, i),
                remark: v(10, i),
                req_no: v(11, i),
                moq: v(12, i),
                mrp: v(13, i),
                image_path: v(14, i),
                parts_page_url: v(15, i),
                source_url: v(16, i),
            });
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputFormat;
    use crate::db::tests::{memory_db, part};
    use crate::model::{GroupType, Vehicle};
    use rusqlite::params;

    fn setup(dir: &Path, output: OutputFormat) -> (Connection, Materializer, GroupKey, GroupKey) {
        let conn = memory_db();
        db::save_vehicles(&conn, &[Vehicle::new("Xoom", "XOOM01", "https://example.com/")]).unwrap();
        let mut config = Config::new(dir);
        config.output = output;
        let engine = GroupKey::new("xoom", GroupType::Engine, "E-1", "G1");
        let frame = GroupKey::new("xoom", GroupType::Frame, "F-1", "G2");
        (conn, Materializer::new(&config), engine, frame)
    }

    fn read_all(dest: &Destination) -> Vec<ShardRow> {
        match dest.format {
            ShardFormat::Csv => read_csv(&dest.path).unwrap(),
            ShardFormat::Parquet => read_parquet(&dest.path).unwrap(),
        }
    }

    #[test]
    fn destinations_follow_output_format() {
        let dir = tempfile::tempdir().unwrap();
        let (_, csv_only, _, _) = setup(dir.path(), OutputFormat::Csv);
        assert_eq!(csv_only.destinations().len(), 1);
        let (_, both, _, _) = setup(dir.path(), OutputFormat::Both);
        assert_eq!(both.destinations().len(), 2);
        assert_eq!(both.destinations()[1].format, ShardFormat::Parquet);
    }

    #[test]
    fn rematerialize_converges_to_store() {
        let dir = tempfile::tempdir().unwrap();
        let (conn, m, key, _) = setup(dir.path(), OutputFormat::Both);

        let rows: Vec<_> = (1..=5)
            .map(|i| part(&key, &i.to_string(), &format!("P{i}"), "bolt"))
            .collect();
        db::upsert_part_rows(&conn, &rows).unwrap();
        assert_eq!(m.materialize_group(&conn, &key).unwrap(), 5);

        conn.execute(
            "DELETE FROM parts WHERE group_code = ?1 AND ref_no IN ('4', '5')",
            params![key.group_code],
        )
        .unwrap();
        assert_eq!(m.materialize_group(&conn, &key).unwrap(), 3);

        for dest in m.destinations() {
            let got = read_all(dest);
            assert_eq!(got.len(), 3, "{:?}", dest.format);
            let refs: Vec<_> = got.iter().map(|r| r.ref_no.as_str()).collect();
            assert_eq!(refs, vec!["1", "2", "3"]);
        }
    }

    #[test]
    fn repeated_materialize_is_idempotent_and_keeps_other_groups() {
        let dir = tempfile::tempdir().unwrap();
        let (conn, m, engine, frame) = setup(dir.path(), OutputFormat::Both);
        db::upsert_part_rows(&conn, &[part(&engine, "1", "P1", "a"), part(&engine, "2", "P2", "b")])
            .unwrap();
        db::upsert_part_rows(&conn, &[part(&frame, "1", "F1", "c")]).unwrap();

        m.materialize_group(&conn, &engine).unwrap();
        m.materialize_group(&conn, &frame).unwrap();
        let first: Vec<_> = m.destinations().iter().map(read_all).collect();

        m.materialize_group(&conn, &engine).unwrap();
        m.materialize(&conn, &[engine.clone(), frame.clone()]).unwrap();
        let second: Vec<_> = m.destinations().iter().map(read_all).collect();

        assert_eq!(first[0].len(), 3);
        assert_eq!(first[0].iter().filter(|r| r.belongs_to(&frame)).count(), 1);
        assert_eq!(
            first[0].iter().filter(|r| r.belongs_to(&engine)).count(),
            second[0].iter().filter(|r| r.belongs_to(&engine)).count()
        );
        assert_eq!(second[0].len(), 3);
        assert_eq!(second[0], second[1], "csv and parquet hold the same rows");
    }

    #[test]
    fn csv_has_fixed_header_even_when_empty() {
        let dir = tempfile::tempdir().unwrap();
        let (conn, m, key, _) = setup(dir.path(), OutputFormat::Csv);
        m.materialize_group(&conn, &key).unwrap();

        let text = std::fs::read_to_string(&m.destinations()[0].path).unwrap();
        assert_eq!(text.trim_end(), SHARD_COLUMNS.join(","));
    }

    #[test]
    fn rebuild_drops_groups_missing_from_store() {
        let dir = tempfile::tempdir().unwrap();
        let (conn, m, engine, frame) = setup(dir.path(), OutputFormat::Both);
        db::upsert_part_rows(&conn, &[part(&engine, "1", "P1", "a")]).unwrap();
        db::upsert_part_rows(&conn, &[part(&frame, "1", "F1", "c")]).unwrap();
        m.materialize(&conn, &[engine.clone(), frame.clone()]).unwrap();

        conn.execute("DELETE FROM parts WHERE group_code = ?1", params![frame.group_code])
            .unwrap();
        assert_eq!(m.rebuild(&conn).unwrap(), 1);

        for dest in m.destinations() {
            let got = read_all(dest);
            assert_eq!(got.len(), 1, "{:?}", dest.format);
            assert!(got[0].belongs_to(&engine));
        }
    }

    #[test]
    fn rebuild_of_empty_store_writes_empty_shards() {
        let dir = tempfile::tempdir().unwrap();
        let (conn, m, _, _) = setup(dir.path(), OutputFormat::Both);
        assert_eq!(m.rebuild(&conn).unwrap(), 0);
        for dest in m.destinations() {
            assert!(read_all(dest).is_empty());
        }
    }

    #[test]
    fn shard_row_carries_vehicle_fields() {
        let dir = tempfile::tempdir().unwrap();
        let (conn, m, key, _) = setup(dir.path(), OutputFormat::Parquet);
        db::upsert_part_rows(&conn, &[part(&key, "1", "P1", "a")]).unwrap();
        m.materialize_group(&conn, &key).unwrap();

        let rows = read_parquet(&m.destinations()[0].path).unwrap();
        assert_eq!(rows[0].vehicle_name, "Xoom");
        assert_eq!(rows[0].model_code, "XOOM01");
        assert_eq!(rows[0].group_type, "ENGINE");
    }
}

use std::path::Path;

use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::PersistenceError;
use crate::model::{
    cmp_ref_no, Checkpoint, CheckpointStatus, GroupKey, GroupType, Milestone, PartRow, PartsPage,
    ShardRow, Vehicle,
};

pub type Result<T> = std::result::Result<T, PersistenceError>;

pub fn connect(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS vehicles (
            vehicle_id   TEXT PRIMARY KEY,
            vehicle_name TEXT NOT NULL,
            model_code   TEXT NOT NULL,
            source_url   TEXT NOT NULL,
            created_at   TEXT NOT NULL,
            updated_at   TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS checkpoints (
            vehicle_id  TEXT NOT NULL,
            group_type  TEXT NOT NULL CHECK(group_type IN ('ENGINE','FRAME')),
            table_no    TEXT NOT NULL,
            group_code  TEXT NOT NULL,
            status      TEXT NOT NULL CHECK(status IN ('pending','done','error')),
            row_count   INTEGER,
            asset_saved BOOLEAN NOT NULL DEFAULT 0,
            last_error  TEXT,
            updated_at  TEXT NOT NULL,
            PRIMARY KEY (vehicle_id, group_type, table_no, group_code)
        );
        CREATE INDEX IF NOT EXISTS idx_checkpoints_status ON checkpoints(status);

        CREATE TABLE IF NOT EXISTS parts_pages (
            vehicle_id     TEXT NOT NULL,
            group_type     TEXT NOT NULL,
            table_no       TEXT NOT NULL,
            group_code     TEXT NOT NULL,
            group_desc     TEXT NOT NULL DEFAULT '',
            parts_page_url TEXT NOT NULL DEFAULT '',
            image_path     TEXT NOT NULL DEFAULT '',
            updated_at     TEXT NOT NULL,
            PRIMARY KEY (vehicle_id, group_type, table_no, group_code)
        );

        CREATE TABLE IF NOT EXISTS parts (
            vehicle_id     TEXT NOT NULL,
            group_type     TEXT NOT NULL,
            table_no       TEXT NOT NULL,
            group_code     TEXT NOT NULL,
            ref_no         TEXT NOT NULL,
            part_no        TEXT NOT NULL,
            description    TEXT NOT NULL DEFAULT '',
            remark         TEXT NOT NULL DEFAULT '',
            req_no         TEXT NOT NULL DEFAULT '',
            moq            TEXT NOT NULL DEFAULT '',
            mrp            TEXT NOT NULL DEFAULT '',
            image_path     TEXT NOT NULL DEFAULT '',
            parts_page_url TEXT NOT NULL DEFAULT '',
            source_url     TEXT NOT NULL DEFAULT '',
            created_at     TEXT NOT NULL,
            updated_at     TEXT NOT NULL,
            PRIMARY KEY (vehicle_id, group_type, table_no, group_code, ref_no, part_no)
        );

        CREATE TABLE IF NOT EXISTS milestones (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            batch           INTEGER NOT NULL,
            last_vehicle_id TEXT NOT NULL,
            created_at      TEXT NOT NULL
        );
        ",
    )?;
    Ok(())
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn group_type_at(row: &Row, idx: usize) -> rusqlite::Result<GroupType> {
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

fn group_key_at(row: &Row, start: usize) -> rusqlite::Result<GroupKey> {
    Ok(GroupKey {
        vehicle_id: row.get(start)?,
        group_type: group_type_at(row, start + 1)?,
        table_no: row.get(start + 2)?,
        group_code: row.get(start + 3)?,
    })
}

// ── Vehicles ──

/// Upsert vehicles; only display fields change for an existing id.
pub fn save_vehicles(conn: &Connection, vehicles: &[Vehicle]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let ts = now();
    {
        let mut stmt = tx.prepare(
            "INSERT INTO vehicles (vehicle_id, vehicle_name, model_code, source_url, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(vehicle_id) DO UPDATE SET
                vehicle_name = excluded.vehicle_name,
                model_code   = excluded.model_code,
                source_url   = excluded.source_url,
                updated_at   = excluded.updated_at",
        )?;
        for v in vehicles {
            stmt.execute(params![v.vehicle_id, v.vehicle_name, v.model_code, v.source_url, ts])?;
        }
    }
    tx.commit()?;
    Ok(vehicles.len())
}

// ── Checkpoints ──

pub fn checkpoint_status(conn: &Connection, key: &GroupKey) -> Result<CheckpointStatus> {
    let status: Option<String> = conn
        .query_row(
            "SELECT status FROM checkpoints
             WHERE vehicle_id = ?1 AND group_type = ?2 AND table_no = ?3 AND group_code = ?4",
            params![key.vehicle_id, key.group_type.as_str(), key.table_no, key.group_code],
            |r| r.get(0),
        )
        .optional()?;
    Ok(status
        .as_deref()
        .map(CheckpointStatus::from_db)
        .unwrap_or(CheckpointStatus::Absent))
}

fn checkpoint_from_row(row: &Row) -> rusqlite::Result<Checkpoint> {
    let status: String = row.get(4)?;
    Ok(Checkpoint {
        key: group_key_at(row, 0)?,
        status: CheckpointStatus::from_db(&status),
        row_count: row.get(5)?,
        asset_saved: row.get(6)?,
        last_error: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

/// Every mark replaces the whole record.
fn write_checkpoint(
    conn: &Connection,
    key: &GroupKey,
    status: CheckpointStatus,
    row_count: Option<i64>,
    asset_saved: bool,
    last_error: Option<&str>,
) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO checkpoints
         (vehicle_id, group_type, table_no, group_code, status, row_count, asset_saved, last_error, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            key.vehicle_id,
            key.group_type.as_str(),
            key.table_no,
            key.group_code,
            status.as_str(),
            row_count,
            asset_saved,
            last_error,
            now(),
        ],
    )?;
    Ok(())
}

pub fn mark_pending(conn: &Connection, key: &GroupKey) -> Result<()> {
    write_checkpoint(conn, key, CheckpointStatus::Pending, None, false, None)
}

pub fn mark_done(conn: &Connection, key: &GroupKey, row_count: usize, asset_saved: bool) -> Result<()> {
    write_checkpoint(
        conn,
        key,
        CheckpointStatus::Done,
        Some(row_count as i64),
        asset_saved,
        None,
    )
}

pub fn mark_error(conn: &Connection, key: &GroupKey, message: &str) -> Result<()> {
    write_checkpoint(conn, key, CheckpointStatus::Error, None, false, Some(message))
}

/// True when every key has a `done` checkpoint. An empty key set is never complete.
pub fn all_done(conn: &Connection, keys: &[GroupKey]) -> Result<bool> {
    if keys.is_empty() {
        return Ok(false);
    }
    for key in keys {
        if checkpoint_status(conn, key)? != CheckpointStatus::Done {
            return Ok(false);
        }
    }
    Ok(true)
}

pub fn failed_checkpoints(conn: &Connection) -> Result<Vec<Checkpoint>> {
    let mut stmt = conn.prepare(
        "SELECT vehicle_id, group_type, table_no, group_code,
                status, row_count, asset_saved, last_error, updated_at
         FROM checkpoints
         WHERE status = 'error'
         ORDER BY vehicle_id, group_type, table_no, group_code",
    )?;
    let rows = stmt
        .query_map([], checkpoint_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

// ── Canonical store ──

pub fn upsert_parts_page(conn: &Connection, page: &PartsPage) -> Result<()> {
    conn.execute(
        "INSERT INTO parts_pages
         (vehicle_id, group_type, table_no, group_code, group_desc, parts_page_url, image_path, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(vehicle_id, group_type, table_no, group_code) DO UPDATE SET
            group_desc     = excluded.group_desc,
            parts_page_url = excluded.parts_page_url,
            image_path     = excluded.image_path,
            updated_at     = excluded.updated_at",
        params![
            page.key.vehicle_id,
            page.key.group_type.as_str(),
            page.key.table_no,
            page.key.group_code,
            page.group_desc,
            page.parts_page_url,
            page.image_path.as_deref().unwrap_or(""),
            now(),
        ],
    )?;
    Ok(())
}

/// Insert-or-update by row identity; returns the number of rows submitted.
pub fn upsert_part_rows(conn: &Connection, rows: &[PartRow]) -> Result<usize> {
    if rows.is_empty() {
        return Ok(0);
    }
    let tx = conn.unchecked_transaction()?;
    let ts = now();
    {
        let mut stmt = tx.prepare(
            "INSERT INTO parts
             (vehicle_id, group_type, table_no, group_code, ref_no, part_no,
              description, remark, req_no, moq, mrp, image_path, parts_page_url, source_url,
              created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?15)
             ON CONFLICT(vehicle_id, group_type, table_no, group_code, ref_no, part_no) DO UPDATE SET
                description    = excluded.description,
                remark         = excluded.remark,
                req_no         = excluded.req_no,
                moq            = excluded.moq,
                mrp            = excluded.mrp,
                image_path     = excluded.image_path,
                parts_page_url = excluded.parts_page_url,
                source_url     = excluded.source_url,
                updated_at     = excluded.updated_at",
        )?;
        for r in rows {
            stmt.execute(params![
                r.key.vehicle_id,
                r.key.group_type.as_str(),
                r.key.table_no,
                r.key.group_code,
                r.ref_no,
                r.part_no,
                r.description,
                r.remark,
                r.req_no,
                r.moq,
                r.mrp,
                r.image_path,
                r.parts_page_url,
                r.source_url,
                ts,
            ])?;
        }
    }
    tx.commit()?;
    Ok(rows.len())
}

pub fn fetch_group_rows(conn: &Connection, key: &GroupKey) -> Result<Vec<PartRow>> {
    let mut stmt = conn.prepare(
        "SELECT vehicle_id, group_type, table_no, group_code, ref_no, part_no,
                description, remark, req_no, moq, mrp, image_path, parts_page_url, source_url
         FROM parts
         WHERE vehicle_id = ?1 AND group_type = ?2 AND table_no = ?3 AND group_code = ?4",
    )?;
    let mut rows = stmt
        .query_map(
            params![key.vehicle_id, key.group_type.as_str(), key.table_no, key.group_code],
            |row| {
                Ok(PartRow {
                    key: group_key_at(row, 0)?,
                    ref_no: row.get(4)?,
                    part_no: row.get(5)?,
                    description: row.get(6)?,
                    remark: row.get(7)?,
                    req_no: row.get(8)?,
                    moq: row.get(9)?,
                    mrp: row.get(10)?,
                    image_path: row.get(11)?,
                    parts_page_url: row.get(12)?,
                    source_url: row.get(13)?,
                })
            },
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.sort_by(|a, b| cmp_ref_no(&a.ref_no, &b.ref_no).then_with(|| a.part_no.cmp(&b.part_no)));
    Ok(rows)
}

/// Output rows for the given groups, joined with vehicle and page metadata.
/// Groups come out in the order given, rows in canonical order within each.
pub fn fetch_shard_rows(conn: &Connection, keys: &[GroupKey]) -> Result<Vec<ShardRow>> {
    let mut stmt = conn.prepare(
        "SELECT p.vehicle_id, COALESCE(v.vehicle_name, ''), COALESCE(v.model_code, ''),
                p.group_type, p.table_no, p.group_code, COALESCE(pp.group_desc, ''),
                p.ref_no, p.part_no, p.description, p.remark, p.req_no, p.moq, p.mrp,
                p.image_path, p.parts_page_url, p.source_url
         FROM parts p
         LEFT JOIN vehicles v ON v.vehicle_id = p.vehicle_id
         LEFT JOIN parts_pages pp
                ON pp.vehicle_id = p.vehicle_id AND pp.group_type = p.group_type
               AND pp.table_no = p.table_no AND pp.group_code = p.group_code
         WHERE p.vehicle_id = ?1 AND p.group_type = ?2 AND p.table_no = ?3 AND p.group_code = ?4",
    )?;

    let mut out = Vec::new();
    for key in keys {
        let mut rows = stmt
            .query_map(
                params![key.vehicle_id, key.group_type.as_str(), key.table_no, key.group_code],
                |row| {
                    Ok(ShardRow {
                        vehicle_id: row.get(0)?,
                        vehicle_name: row.get(1)?,
                        model_code: row.get(2)?,
                        group_type: row.get(3)?,
                        table_no: row.get(4)?,
                        group_code: row.get(5)?,
                        group_desc: row.get(6)?,
                        ref_no: row.get(7)?,
                        part_no: row.get(8)?,
                        description: row.get(9)?,
                        remark: row.get(10)?,
                        req_no: row.get(11)?,
                        moq: row.get(12)?,
                        mrp: row.get(13)?,
                        image_path: row.get(14)?,
                        parts_page_url: row.get(15)?,
                        source_url: row.get(16)?,
                    })
                },
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.sort_by(|a, b| cmp_ref_no(&a.ref_no, &b.ref_no).then_with(|| a.part_no.cmp(&b.part_no)));
        out.extend(rows);
    }
    Ok(out)
}

/// Every group that has canonical rows or a stored parts page.
pub fn group_keys(conn: &Connection) -> Result<Vec<GroupKey>> {
    let mut stmt = conn.prepare(
        "SELECT vehicle_id, group_type, table_no, group_code FROM parts
         UNION
         SELECT vehicle_id, group_type, table_no, group_code FROM parts_pages
         ORDER BY 1, 2, 3, 4",
    )?;
    let keys = stmt
        .query_map([], |row| group_key_at(row, 0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(keys)
}

// ── Milestones ──

/// Append-only: batch numbers restart every run, so each call adds a row.
pub fn record_milestone(conn: &Connection, batch: i64, last_vehicle_id: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO milestones (batch, last_vehicle_id, created_at) VALUES (?1, ?2, ?3)",
        params![batch, last_vehicle_id, now()],
    )?;
    Ok(())
}

pub fn fetch_milestones(conn: &Connection) -> Result<Vec<Milestone>> {
    let mut stmt =
        conn.prepare("SELECT batch, last_vehicle_id, created_at FROM milestones ORDER BY id")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(Milestone {
                batch: row.get(0)?,
                last_vehicle_id: row.get(1)?,
                created_at: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

// ── Stats ──

pub struct Stats {
    pub vehicles: usize,
    pub parts_pages: usize,
    pub part_rows: usize,
    pub milestones: usize,
    pub pending: usize,
    pub done: usize,
    pub errors: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let count = |sql: &str| -> Result<usize> { Ok(conn.query_row(sql, [], |r| r.get(0))?) };
    Ok(Stats {
        vehicles: count("SELECT COUNT(*) FROM vehicles")?,
        parts_pages: count("SELECT COUNT(*) FROM parts_pages")?,
        part_rows: count("SELECT COUNT(*) FROM parts")?,
        milestones: count("SELECT COUNT(*) FROM milestones")?,
        pending: count("SELECT COUNT(*) FROM checkpoints WHERE status = 'pending'")?,
        done: count("SELECT COUNT(*) FROM checkpoints WHERE status = 'done'")?,
        errors: count("SELECT COUNT(*) FROM checkpoints WHERE status = 'error'")?,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    pub(crate) fn fetch_checkpoint(conn: &Connection, key: &GroupKey) -> Result<Option<Checkpoint>> {
        let cp = conn
            .query_row(
                "SELECT vehicle_id, group_type, table_no, group_code,
                        status, row_count, asset_saved, last_error, updated_at
                 FROM checkpoints
                 WHERE vehicle_id = ?1 AND group_type = ?2 AND table_no = ?3 AND group_code = ?4",
                params![key.vehicle_id, key.group_type.as_str(), key.table_no, key.group_code],
                checkpoint_from_row,
            )
            .optional()?;
        Ok(cp)
    }

    pub(crate) fn part(key: &GroupKey, ref_no: &str, part_no: &str, description: &str) -> PartRow {
        PartRow {
            key: key.clone(),
            ref_no: ref_no.into(),
            part_no: part_no.into(),
            description: description.into(),
            remark: String::new(),
            req_no: "1".into(),
            moq: "1".into(),
            mrp: "100.00".into(),
            image_path: String::new(),
            parts_page_url: "https://example.com/bom".into(),
            source_url: "https://example.com/".into(),
        }
    }

    fn key() -> GroupKey {
        GroupKey::new("xoom", GroupType::Engine, "E-1", "E-1_XOOM")
    }

    #[test]
    fn status_absent_then_transitions() {
        let conn = memory_db();
        let k = key();
        assert_eq!(checkpoint_status(&conn, &k).unwrap(), CheckpointStatus::Absent);

        mark_pending(&conn, &k).unwrap();
        assert_eq!(checkpoint_status(&conn, &k).unwrap(), CheckpointStatus::Pending);

        mark_done(&conn, &k, 12, true).unwrap();
        let cp = fetch_checkpoint(&conn, &k).unwrap().unwrap();
        assert_eq!(cp.status, CheckpointStatus::Done);
        assert_eq!(cp.row_count, Some(12));
        assert!(cp.asset_saved);
        assert!(cp.last_error.is_none());
    }

    #[test]
    fn mark_error_replaces_whole_record() {
        let conn = memory_db();
        let k = key();
        mark_done(&conn, &k, 5, true).unwrap();
        mark_error(&conn, &k, "parts UI not found").unwrap();

        let cp = fetch_checkpoint(&conn, &k).unwrap().unwrap();
        assert_eq!(cp.status, CheckpointStatus::Error);
        assert_eq!(cp.row_count, None);
        assert!(!cp.asset_saved);
        assert_eq!(cp.last_error.as_deref(), Some("parts UI not found"));

        let failed = failed_checkpoints(&conn).unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].key, k);
    }

    #[test]
    fn upsert_merges_mutable_fields() {
        let conn = memory_db();
        let k = key();
        upsert_part_rows(&conn, &[part(&k, "1", "P1", "old")]).unwrap();
        let submitted = upsert_part_rows(&conn, &[part(&k, "1", "P1", "new")]).unwrap();
        assert_eq!(submitted, 1);

        let rows = fetch_group_rows(&conn, &k).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].description, "new");
    }

    #[test]
    fn group_rows_canonical_order() {
        let conn = memory_db();
        let k = key();
        let rows = vec![
            part(&k, "", "PX", "no ref"),
            part(&k, "10", "P10", "ten"),
            part(&k, "2", "P2", "two"),
            part(&k, "A", "PA", "alpha"),
            part(&k, "1", "P1", "one"),
        ];
        upsert_part_rows(&conn, &rows).unwrap();

        let refs: Vec<String> = fetch_group_rows(&conn, &k)
            .unwrap()
            .into_iter()
            .map(|r| r.ref_no)
            .collect();
        assert_eq!(refs, vec!["1", "2", "10", "", "A"]);
    }

    #[test]
    fn rows_scoped_to_group() {
        let conn = memory_db();
        let a = key();
        let b = GroupKey::new("xoom", GroupType::Frame, "F-1", "F-1_XOOM");
        upsert_part_rows(&conn, &[part(&a, "1", "P1", "a"), part(&b, "1", "P1", "b")]).unwrap();
        assert_eq!(fetch_group_rows(&conn, &a).unwrap().len(), 1);
        assert_eq!(fetch_group_rows(&conn, &b).unwrap()[0].description, "b");
    }

    #[test]
    fn shard_rows_join_vehicle_and_page() {
        let conn = memory_db();
        let v = Vehicle::new("Xoom", "XOOM01", "https://example.com/");
        save_vehicles(&conn, &[v]).unwrap();
        let k = key();
        upsert_parts_page(
            &conn,
            &PartsPage {
                key: k.clone(),
                group_desc: "CYLINDER HEAD".into(),
                parts_page_url: "https://example.com/bom".into(),
                image_path: Some("images/xoom/ENGINE/E-1.png".into()),
            },
        )
        .unwrap();
        upsert_part_rows(&conn, &[part(&k, "1", "P1", "bolt")]).unwrap();

        let rows = fetch_shard_rows(&conn, &[k.clone()]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].vehicle_name, "Xoom");
        assert_eq!(rows[0].model_code, "XOOM01");
        assert_eq!(rows[0].group_desc, "CYLINDER HEAD");
        assert_eq!(rows[0].group_type, "ENGINE");
        assert_eq!(group_keys(&conn).unwrap(), vec![k]);
    }

    #[test]
    fn vehicle_resave_keeps_identity() {
        let conn = memory_db();
        save_vehicles(&conn, &[Vehicle::new("Xoom", "OLD", "u1")]).unwrap();
        save_vehicles(&conn, &[Vehicle::new("Xoom", "NEW", "u2")]).unwrap();
        let (n, code): (usize, String) = conn
            .query_row("SELECT COUNT(*), MAX(model_code) FROM vehicles", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .unwrap();
        assert_eq!(n, 1);
        assert_eq!(code, "NEW");
    }

    #[test]
    fn all_done_requires_every_key() {
        let conn = memory_db();
        let a = key();
        let b = GroupKey::new("xoom", GroupType::Frame, "F-1", "F-1_XOOM");
        assert!(!all_done(&conn, &[]).unwrap());
        mark_done(&conn, &a, 1, false).unwrap();
        assert!(all_done(&conn, &[a.clone()]).unwrap());
        assert!(!all_done(&conn, &[a.clone(), b.clone()]).unwrap());
        mark_error(&conn, &b, "boom").unwrap();
        assert!(!all_done(&conn, &[a, b]).unwrap());
    }

    #[test]
    fn milestones_and_stats() {
        let conn = memory_db();
        record_milestone(&conn, 1, "v30").unwrap();
        record_milestone(&conn, 2, "v60").unwrap();
        let ms = fetch_milestones(&conn).unwrap();
        assert_eq!(ms.len(), 2);
        assert_eq!(ms[1].last_vehicle_id, "v60");

        // A later run restarts at batch 1 without replacing the earlier one.
        record_milestone(&conn, 1, "v30").unwrap();
        let ms = fetch_milestones(&conn).unwrap();
        assert_eq!(ms.len(), 3);
        assert_eq!(ms.iter().map(|m| m.batch).collect::<Vec<_>>(), vec![1, 2, 1]);

        mark_pending(&conn, &key()).unwrap();
        let s = get_stats(&conn).unwrap();
        assert_eq!(s.milestones, 3);
        assert_eq!(s.pending, 1);
        assert_eq!(s.done, 0);
    }
}

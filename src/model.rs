use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

const SLUG_MAX_LEN: usize = 50;

// ── Vehicles ──

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vehicle {
    pub vehicle_id: String,
    pub vehicle_name: String,
    pub model_code: String,
    pub source_url: String,
}

impl Vehicle {
    pub fn new(name: &str, model_code: &str, source_url: &str) -> Self {
        Self {
            vehicle_id: slugify(name),
            vehicle_name: name.trim().to_string(),
            model_code: model_code.trim().to_string(),
            source_url: source_url.to_string(),
        }
    }
}

/// Lowercase ASCII slug, single dashes, capped at 50 chars without a trailing dash.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    if slug.len() > SLUG_MAX_LEN {
        slug.truncate(SLUG_MAX_LEN);
        while slug.ends_with('-') {
            slug.pop();
        }
    }
    slug
}

// ── Groups ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GroupType {
    Engine,
    Frame,
}

impl GroupType {
    pub fn as_str(self) -> &'static str {
        match self {
            GroupType::Engine => "ENGINE",
            GroupType::Frame => "FRAME",
        }
    }

    /// Decide ENGINE/FRAME from the row's own tokens, falling back to the
    /// table the row was listed under.
    pub fn classify(table_no: &str, group_code: &str, hint: GroupType) -> GroupType {
        let tn = table_no.trim().to_ascii_uppercase();
        let gc = group_code.trim().to_ascii_uppercase();
        if tn.starts_with("E-") || gc.starts_with("E-") {
            GroupType::Engine
        } else if tn.starts_with("F-") || gc.starts_with("F-") {
            GroupType::Frame
        } else {
            hint
        }
    }
}

impl fmt::Display for GroupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroupType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ENGINE" => Ok(GroupType::Engine),
            "FRAME" => Ok(GroupType::Frame),
            other => Err(format!("unknown group type '{}'", other)),
        }
    }
}

/// Natural key of a work unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey {
    pub vehicle_id: String,
    pub group_type: GroupType,
    pub table_no: String,
    pub group_code: String,
}

impl GroupKey {
    pub fn new(vehicle_id: &str, group_type: GroupType, table_no: &str, group_code: &str) -> Self {
        Self {
            vehicle_id: vehicle_id.to_string(),
            group_type,
            table_no: table_no.to_string(),
            group_code: group_code.to_string(),
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | {} | {} | {}",
            self.vehicle_id, self.group_type, self.table_no, self.group_code
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub key: GroupKey,
    pub s_no: String,
    pub group_desc: String,
    pub variant: Option<String>,
    pub page_url: String,
}

// ── Extracted records ──

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartsPage {
    pub key: GroupKey,
    pub group_desc: String,
    pub parts_page_url: String,
    pub image_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartRow {
    pub key: GroupKey,
    pub ref_no: String,
    pub part_no: String,
    pub description: String,
    pub remark: String,
    pub req_no: String,
    pub moq: String,
    pub mrp: String,
    pub image_path: String,
    pub parts_page_url: String,
    pub source_url: String,
}

/// Canonical ordering of rows inside a group: numeric ref numbers first,
/// ascending, then everything else; ties by the raw string.
pub fn cmp_ref_no(a: &str, b: &str) -> Ordering {
    let na = a.trim().parse::<i64>().ok();
    let nb = b.trim().parse::<i64>().ok();
    match (na, nb) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

/// One line of an output shard. Field order is the shard column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardRow {
    pub vehicle_id: String,
    pub vehicle_name: String,
    pub model_code: String,
    pub group_type: String,
    pub table_no: String,
    pub group_code: String,
    pub group_desc: String,
    pub ref_no: String,
    pub part_no: String,
    pub description: String,
    pub remark: String,
    pub req_no: String,
    pub moq: String,
    pub mrp: String,
    pub image_path: String,
    pub parts_page_url: String,
    pub source_url: String,
}

pub const SHARD_COLUMNS: [&str; 17] = [
    "vehicle_id",
    "vehicle_name",
    "model_code",
    "group_type",
    "table_no",
    "group_code",
    "group_desc",
    "ref_no",
    "part_no",
    "description",
    "remark",
    "req_no",
    "moq",
    "mrp",
    "image_path",
    "parts_page_url",
    "source_url",
];

impl ShardRow {
    pub fn belongs_to(&self, key: &GroupKey) -> bool {
        self.vehicle_id == key.vehicle_id
            && self.group_type == key.group_type.as_str()
            && self.table_no == key.table_no
            && self.group_code == key.group_code
    }
}

// ── Checkpoints ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckpointStatus {
    Absent,
    Pending,
    Done,
    Error,
}

impl CheckpointStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckpointStatus::Absent => "absent",
            CheckpointStatus::Pending => "pending",
            CheckpointStatus::Done => "done",
            CheckpointStatus::Error => "error",
        }
    }

    pub fn from_db(s: &str) -> Self {
        match s {
            "pending" => CheckpointStatus::Pending,
            "done" => CheckpointStatus::Done,
            "error" => CheckpointStatus::Error,
            _ => CheckpointStatus::Absent,
        }
    }
}

impl fmt::Display for CheckpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub key: GroupKey,
    pub status: CheckpointStatus,
    pub row_count: Option<i64>,
    pub asset_saved: bool,
    pub last_error: Option<String>,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Milestone {
    pub batch: i64,
    pub last_vehicle_id: String,
    pub created_at: String,
}

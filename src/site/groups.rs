use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::error::DiscoveryError;
use crate::model::{Group, GroupKey, GroupType, Vehicle};

use super::text_of;

struct GroupTable {
    rows: Selector,
    hint: GroupType,
}

fn table(id: &str, hint: GroupType) -> GroupTable {
    GroupTable {
        rows: Selector::parse(&format!("#{id} tbody tr")).unwrap(),
        hint,
    }
}

/// Engine and frame list views.
static LIST_TABLES: LazyLock<[GroupTable; 2]> = LazyLock::new(|| {
    [
        table("DataTables_Table_0", GroupType::Engine),
        table("DataTables_Table_1", GroupType::Frame),
    ]
});
/// Thumbnail views, used only when both list views are empty.
static THUMB_TABLES: LazyLock<[GroupTable; 2]> = LazyLock::new(|| {
    [
        table("DataTables_Table_2", GroupType::Engine),
        table("DataTables_Table_3", GroupType::Frame),
    ]
});
static ANY_TABLE: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("#DataTables_Table_0, #DataTables_Table_1, #DataTables_Table_2, #DataTables_Table_3")
        .unwrap()
});

static TD: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());
static GROUP_NO_TD: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td.group-no-td").unwrap());
static LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").unwrap());
static THUMB_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".panel-heading a").unwrap());
static THUMB_HEADING: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".panel-heading").unwrap());

static VARIANT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"updateBomDetails\(\s*'[^']*'\s*,\s*''\s*,\s*'([^']*)'\s*\)").unwrap()
});
static GROUP_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"updateBomDetails\(\s*'([^']+)'").unwrap());
static THUMB_TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^ \t(]+)\s*\((.*)\)\s*$").unwrap());

/// One row as listed, before typing.
struct Listed {
    s_no: String,
    table_no: String,
    desc: String,
    group_code: String,
    variant: Option<String>,
}

/// Engine and frame groups of one vehicle's aggregates view.
pub fn parse_groups(html: &str, vehicle: &Vehicle, page_url: &str) -> Result<Vec<Group>, DiscoveryError> {
    let doc = Html::parse_document(html);
    if doc.select(&ANY_TABLE).next().is_none() {
        return Err(DiscoveryError::new(
            &vehicle.vehicle_id,
            format!("no aggregates table found for vehicle {}", vehicle.vehicle_name),
        ));
    }

    let mut listed = collect(&doc, LIST_TABLES.as_slice(), list_row);
    if listed.is_empty() {
        debug!("List views empty for {}; reading thumbnails", vehicle.vehicle_id);
        listed = collect(&doc, THUMB_TABLES.as_slice(), thumbnail_row);
    }

    let groups = listed
        .into_iter()
        .filter(|(row, _)| !row.group_code.is_empty())
        .map(|(row, hint)| {
            let group_type = GroupType::classify(&row.table_no, &row.group_code, hint);
            Group {
                key: GroupKey::new(&vehicle.vehicle_id, group_type, &row.table_no, &row.group_code),
                s_no: row.s_no,
                group_desc: row.desc,
                variant: row.variant,
                page_url: page_url.to_string(),
            }
        })
        .collect();
    Ok(groups)
}

fn collect(
    doc: &Html,
    tables: &[GroupTable],
    read: fn(ElementRef<'_>) -> Listed,
) -> Vec<(Listed, GroupType)> {
    tables
        .iter()
        .flat_map(|t| doc.select(&t.rows).map(move |tr| (read(tr), t.hint)))
        .collect()
}

fn list_row(tr: ElementRef<'_>) -> Listed {
    let tds: Vec<ElementRef> = tr.select(&TD).collect();
    let cell = |i: usize| tds.get(i).map(|td| text_of(*td)).unwrap_or_default();

    let group_code = tr
        .select(&GROUP_NO_TD)
        .next()
        .and_then(|td| td.value().attr("group-no"))
        .unwrap_or("")
        .trim()
        .to_string();
    let variant = tds
        .get(1)
        .and_then(|td| td.select(&LINK).next())
        .and_then(|a| a.value().attr("onclick"))
        .and_then(variant_of);

    Listed {
        s_no: cell(0),
        table_no: cell(1),
        desc: cell(2),
        group_code,
        variant,
    }
}

fn thumbnail_row(tr: ElementRef<'_>) -> Listed {
    let link = tr
        .select(&THUMB_LINK)
        .next()
        .or_else(|| tr.select(&THUMB_HEADING).next());
    let text = link.map(text_of).unwrap_or_default();
    let (table_no, desc) = match THUMB_TITLE_RE.captures(&text) {
        Some(c) => (c[1].to_string(), c[2].trim().to_string()),
        None => (text.clone(), String::new()),
    };
    let onclick = link.and_then(|l| l.value().attr("onclick")).unwrap_or("");
    let group_code = GROUP_CODE_RE
        .captures(onclick)
        .map(|c| c[1].to_string())
        .unwrap_or_default();

    Listed {
        s_no: String::new(),
        table_no,
        desc,
        group_code,
        variant: variant_of(onclick),
    }
}

fn variant_of(onclick: &str) -> Option<String> {
    VARIANT_RE
        .captures(onclick)
        .map(|c| c[1].trim().to_string())
        .filter(|v| !v.is_empty())
}

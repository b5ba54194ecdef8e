use std::sync::LazyLock;

use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use tracing::{info, warn};

use crate::error::ExtractionError;
use crate::extractor::GroupExtract;
use crate::model::{Group, PartRow, PartsPage, Vehicle};

use super::{parse_entry_count, text_of};

static PARTS_UI: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("#bomPage, #bomPage_wrapper").unwrap());
static HEADERS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("#bomPage thead th").unwrap());
static ROWS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("#bomPage tbody tr").unwrap());
static CELLS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());
static EMPTY_CELL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td.dataTables_empty").unwrap());
static INFO: LazyLock<Selector> = LazyLock::new(|| Selector::parse("#bomPage_info").unwrap());
static DIAGRAM: LazyLock<Selector> = LazyLock::new(|| Selector::parse("#image img").unwrap());

/// Column a parts table header feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    RefNo,
    PartNo,
    Description,
    Remark,
    ReqNo,
    Moq,
    Mrp,
}

impl Column {
    fn from_header(header: &str) -> Option<Column> {
        match header.trim() {
            "Ref No." => Some(Column::RefNo),
            "Part Number" => Some(Column::PartNo),
            "Description" => Some(Column::Description),
            "Remark" => Some(Column::Remark),
            "Req. No." => Some(Column::ReqNo),
            "MOQ" => Some(Column::Moq),
            "MRP(Rs.)" => Some(Column::Mrp),
            _ => None,
        }
    }
}

/// Rows, page record and diagram locator from a group's parts view.
pub fn parse_parts(
    html: &str,
    vehicle: &Vehicle,
    group: &Group,
    page_url: &str,
) -> Result<GroupExtract, ExtractionError> {
    let doc = Html::parse_document(html);
    let code = &group.key.group_code;
    if doc.select(&PARTS_UI).next().is_none() {
        return Err(ExtractionError::new(format!(
            "parts UI not found for {code} at {page_url}"
        )));
    }

    let columns: Vec<Option<Column>> = doc
        .select(&HEADERS)
        .map(|th| Column::from_header(&text_of(th)))
        .collect();

    let rows: Vec<PartRow> = doc
        .select(&ROWS)
        .filter(|tr| tr.select(&EMPTY_CELL).next().is_none())
        .map(|tr| part_row(tr, &columns, vehicle, group, page_url))
        .collect();
    info!("Found {} parts rows for {}", rows.len(), code);

    if let Some(expected) = doc
        .select(&INFO)
        .next()
        .and_then(|info| parse_entry_count(&text_of(info)))
    {
        if rows.len() < expected {
            warn!(
                "Parts count mismatch for {}: found {}, expected {}",
                code,
                rows.len(),
                expected
            );
        }
    }

    let asset = doc
        .select(&DIAGRAM)
        .next()
        .and_then(|img| img.value().attr("src"))
        .map(str::trim)
        .filter(|src| !src.is_empty())
        .map(|src| absolute_url(page_url, src));
    if asset.is_none() {
        warn!("No image found for {}", code);
    }

    Ok(GroupExtract {
        page: PartsPage {
            key: group.key.clone(),
            group_desc: group.group_desc.clone(),
            parts_page_url: page_url.to_string(),
            image_path: None,
        },
        rows,
        asset,
    })
}

fn part_row(
    tr: ElementRef<'_>,
    columns: &[Option<Column>],
    vehicle: &Vehicle,
    group: &Group,
    page_url: &str,
) -> PartRow {
    let mut row = PartRow {
        key: group.key.clone(),
        ref_no: String::new(),
        part_no: String::new(),
        description: String::new(),
        remark: String::new(),
        req_no: String::new(),
        moq: String::new(),
        mrp: String::new(),
        image_path: String::new(),
        parts_page_url: page_url.to_string(),
        source_url: vehicle.source_url.clone(),
    };

    // Short rows leave trailing columns empty.
    for (column, td) in columns.iter().zip(tr.select(&CELLS)) {
        let Some(column) = column else { continue };
        let value = text_of(td);
        match column {
            Column::RefNo => row.ref_no = value,
            Column::PartNo => row.part_no = value,
            Column::Description => row.description = value,
            Column::Remark => row.remark = value,
            Column::ReqNo => row.req_no = value,
            Column::Moq => row.moq = value,
            Column::Mrp => row.mrp = value,
        }
    }
    row
}

fn absolute_url(base: &str, src: &str) -> String {
    Url::parse(base)
        .and_then(|b| b.join(src))
        .map(String::from)
        .unwrap_or_else(|_| src.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GroupKey, GroupType};

    const PAGE: &str = "https://catalog.example/bom?groupNo=E-1_XM110&variant=";

    fn vehicle() -> Vehicle {
        Vehicle::new("XOOM 110", "XM110", "https://catalog.example/")
    }

    fn group() -> Group {
        Group {
            key: GroupKey::new("xoom-110", GroupType::Engine, "E-1", "E-1_XM110"),
            s_no: "1".into(),
            group_desc: "CYLINDER HEAD".into(),
            variant: None,
            page_url: "https://catalog.example/?modelCode=XM110".into(),
        }
    }

    const HEADER: &str = "<tr><th>Ref No.</th><th>Part Number</th><th>Description</th>\
        <th>Remark</th><th>Req. No.</th><th>MOQ</th><th>MRP(Rs.)</th></tr>";

    fn page(body: &str, extra: &str) -> String {
        format!(
            r#"<html><body>
            <div id="image"><img src="/media/diagrams/E-1_XM110.png"></div>
            <table id="bomPage"><thead>{HEADER}</thead><tbody>{body}</tbody></table>
            {extra}
            </body></html>"#
        )
    }

    #[test]
    fn maps_columns_by_header() {
        let html = page(
            "<tr><td>1</td><td>12200-K1N-D00</td><td> HEAD COMP,\n CYLINDER </td><td></td>\
             <td>1</td><td>1</td><td>1,250.00</td></tr>\
             <tr><td>2</td><td>90031-KWB-600</td><td>BOLT</td><td>NLA</td><td>4</td><td>10</td><td>12.50</td></tr>",
            r#"<div id="bomPage_info">Showing 1 to 2 of 2 entries</div>"#,
        );
        let extract = parse_parts(&html, &vehicle(), &group(), PAGE).unwrap();

        assert_eq!(extract.rows.len(), 2);
        let r = &extract.rows[0];
        assert_eq!(r.key, group().key);
        assert_eq!(r.ref_no, "1");
        assert_eq!(r.part_no, "12200-K1N-D00");
        assert_eq!(r.description, "HEAD COMP, CYLINDER");
        assert_eq!(r.mrp, "1,250.00");
        assert_eq!(r.parts_page_url, PAGE);
        assert_eq!(r.source_url, "https://catalog.example/");
        assert_eq!(extract.rows[1].remark, "NLA");
        assert_eq!(extract.rows[1].moq, "10");

        assert_eq!(extract.page.group_desc, "CYLINDER HEAD");
        assert_eq!(extract.page.parts_page_url, PAGE);
        assert_eq!(
            extract.asset.as_deref(),
            Some("https://catalog.example/media/diagrams/E-1_XM110.png")
        );
    }

    #[test]
    fn short_rows_and_unknown_columns() {
        let html = r#"<html><body><table id="bomPage">
            <thead><tr><th>Ref No.</th><th>Stock</th><th>Part Number</th><th>Description</th></tr></thead>
            <tbody><tr><td>3</td><td>yes</td><td>P3</td></tr></tbody>
            </table></body></html>"#;
        let extract = parse_parts(html, &vehicle(), &group(), PAGE).unwrap();
        let r = &extract.rows[0];
        assert_eq!((r.ref_no.as_str(), r.part_no.as_str()), ("3", "P3"));
        assert_eq!(r.description, "");
        assert_eq!(extract.asset, None);
    }

    #[test]
    fn empty_table_placeholder_is_not_a_row() {
        let html = page(
            r#"<tr class="odd"><td valign="top" colspan="7" class="dataTables_empty">No data available in table</td></tr>"#,
            "",
        );
        let extract = parse_parts(&html, &vehicle(), &group(), PAGE).unwrap();
        assert!(extract.rows.is_empty());
    }

    #[test]
    fn missing_parts_ui_is_an_extraction_error() {
        let err = parse_parts("<html><body>loading…</body></html>", &vehicle(), &group(), PAGE)
            .unwrap_err();
        assert!(err.message.contains("parts UI not found for E-1_XM110"));
    }

    #[test]
    fn relative_and_absolute_image_sources() {
        assert_eq!(
            absolute_url(PAGE, "img/a.png"),
            "https://catalog.example/img/a.png"
        );
        assert_eq!(
            absolute_url(PAGE, "https://cdn.example/a.png"),
            "https://cdn.example/a.png"
        );
        assert_eq!(absolute_url("not a url", "img/a.png"), "img/a.png");
    }
}

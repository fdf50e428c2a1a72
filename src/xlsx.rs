//! Minimal OOXML writer for the examinator sheet: one worksheet, inline
//! strings, an optional filterable table and fixed column widths.

use anyhow::Context;
use std::io::{Cursor, Write};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::extract::ExaminerRecord;

pub const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const SHEET_NAME: &str = "Sheet1";
pub const TABLE_NAME: &str = "ExaminatorTable";
pub const TABLE_STYLE: &str = "TableStyleMedium2";
pub const HEADERS: [&str; 2] = ["Medewerker", "Cursus"];

pub const MIN_COL_WIDTH: usize = 10;
pub const MAX_COL_WIDTH: usize = 50;

const NS_MAIN: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const NS_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const NS_PKG_REL: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

#[derive(Debug, thiserror::Error)]
pub enum EmitError {
    #[error("no examiner data found in the report")]
    NoData,
    #[error("failed to build spreadsheet: {0}")]
    Write(String),
}

/// Serializes `records` into a workbook. Empty input is refused so callers
/// can tell the user there was nothing to export.
pub fn emit(records: &[ExaminerRecord]) -> Result<Vec<u8>, EmitError> {
    if records.is_empty() {
        return Err(EmitError::NoData);
    }
    write_workbook(records).map_err(|e| EmitError::Write(format!("{e:#}")))
}

/// Width in character units: longest cell plus padding, clamped.
pub fn column_width<'a>(cells: impl IntoIterator<Item = &'a str>) -> usize {
    let longest = cells
        .into_iter()
        .map(|c| c.chars().count())
        .max()
        .unwrap_or(0);
    (longest + 2).clamp(MIN_COL_WIDTH, MAX_COL_WIDTH)
}

pub fn write_workbook(records: &[ExaminerRecord]) -> anyhow::Result<Vec<u8>> {
    let with_table = !records.is_empty();
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut put = |name: &str, body: String| -> anyhow::Result<()> {
        zip.start_file(name, opts)
            .with_context(|| format!("failed to start entry {name}"))?;
        zip.write_all(body.as_bytes())
            .with_context(|| format!("failed to write entry {name}"))?;
        Ok(())
    };

    put("[Content_Types].xml", content_types(with_table))?;
    put("_rels/.rels", root_rels())?;
    put("xl/workbook.xml", workbook_xml())?;
    put("xl/_rels/workbook.xml.rels", workbook_rels())?;
    put("xl/styles.xml", styles_xml())?;
    put("xl/worksheets/sheet1.xml", sheet_xml(records, with_table))?;
    if with_table {
        put("xl/worksheets/_rels/sheet1.xml.rels", sheet_rels())?;
        put("xl/tables/table1.xml", table_xml(records.len()))?;
    }

    let cursor = zip.finish().context("failed to finalize workbook")?;
    Ok(cursor.into_inner())
}

fn content_types(with_table: bool) -> String {
    let table = if with_table {
        r#"<Override PartName="/xl/tables/table1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.table+xml"/>"#
    } else {
        ""
    };
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
            r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
            r#"<Default Extension="xml" ContentType="application/xml"/>"#,
            r#"<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>"#,
            r#"<Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#,
            r#"<Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>"#,
            "{table}</Types>"
        ),
        table = table
    )
}

fn root_rels() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="{NS_PKG_REL}"><Relationship Id="rId1" Type="{NS_REL}/officeDocument" Target="xl/workbook.xml"/></Relationships>"#
    )
}

fn workbook_xml() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><workbook xmlns="{NS_MAIN}" xmlns:r="{NS_REL}"><sheets><sheet name="{SHEET_NAME}" sheetId="1" r:id="rId1"/></sheets></workbook>"#
    )
}

fn workbook_rels() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="{NS_PKG_REL}"><Relationship Id="rId1" Type="{NS_REL}/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="{NS_REL}/styles" Target="styles.xml"/></Relationships>"#
    )
}

fn styles_xml() -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><styleSheet xmlns="{ns}">"#,
            r#"<fonts count="2"><font><sz val="11"/><name val="Calibri"/></font><font><b/><sz val="11"/><name val="Calibri"/></font></fonts>"#,
            r#"<fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills>"#,
            r#"<borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders>"#,
            r#"<cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs>"#,
            r#"<cellXfs count="2"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/><xf numFmtId="0" fontId="1" fillId="0" borderId="0" xfId="0" applyFont="1"/></cellXfs>"#,
            r#"<cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles>"#,
            r#"</styleSheet>"#
        ),
        ns = NS_MAIN
    )
}

fn sheet_rels() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="{NS_PKG_REL}"><Relationship Id="rId1" Type="{NS_REL}/table" Target="../tables/table1.xml"/></Relationships>"#
    )
}

fn table_ref(data_rows: usize) -> String {
    format!("A1:B{}", data_rows + 1)
}

fn sheet_xml(records: &[ExaminerRecord], with_table: bool) -> String {
    let employee_w = column_width(
        std::iter::once(HEADERS[0]).chain(records.iter().map(|r| r.employee.as_str())),
    );
    let course_w = column_width(
        std::iter::once(HEADERS[1]).chain(records.iter().map(|r| r.course.as_str())),
    );

    let mut rows = String::new();
    rows.push_str(&row_xml(1, HEADERS[0], HEADERS[1], Some(1)));
    for (i, r) in records.iter().enumerate() {
        rows.push_str(&row_xml(i + 2, &r.employee, &r.course, None));
    }

    let table_parts = if with_table {
        r#"<tableParts count="1"><tablePart r:id="rId1"/></tableParts>"#
    } else {
        ""
    };

    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            r#"<worksheet xmlns="{ns}" xmlns:r="{ns_r}">"#,
            r#"<dimension ref="{dim}"/>"#,
            r#"<cols><col min="1" max="1" width="{w1}" customWidth="1"/><col min="2" max="2" width="{w2}" customWidth="1"/></cols>"#,
            r#"<sheetData>{rows}</sheetData>{parts}</worksheet>"#
        ),
        ns = NS_MAIN,
        ns_r = NS_REL,
        dim = table_ref(records.len()),
        w1 = employee_w,
        w2 = course_w,
        rows = rows,
        parts = table_parts,
    )
}

fn row_xml(row: usize, a: &str, b: &str, style: Option<u32>) -> String {
    format!(
        r#"<row r="{row}">{}{}</row>"#,
        cell_xml(&format!("A{row}"), a, style),
        cell_xml(&format!("B{row}"), b, style)
    )
}

fn cell_xml(at: &str, value: &str, style: Option<u32>) -> String {
    let s = style.map(|s| format!(r#" s="{s}""#)).unwrap_or_default();
    let space = if value.trim() != value {
        r#" xml:space="preserve""#
    } else {
        ""
    };
    format!(
        r#"<c r="{at}"{s} t="inlineStr"><is><t{space}>{}</t></is></c>"#,
        escape_xml(value)
    )
}

fn table_xml(data_rows: usize) -> String {
    let range = table_ref(data_rows);
    let mut cols = String::new();
    for (i, h) in HEADERS.iter().enumerate() {
        cols.push_str(&format!(
            r#"<tableColumn id="{}" name="{}"/>"#,
            i + 1,
            escape_xml(h)
        ));
    }
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            r#"<table xmlns="{ns}" id="1" name="{name}" displayName="{name}" ref="{range}" totalsRowShown="0">"#,
            r#"<autoFilter ref="{range}"/>"#,
            r#"<tableColumns count="{count}">{cols}</tableColumns>"#,
            r#"<tableStyleInfo name="{style}" showFirstColumn="0" showLastColumn="0" showRowStripes="1" showColumnStripes="0"/>"#,
            r#"</table>"#
        ),
        ns = NS_MAIN,
        name = TABLE_NAME,
        range = range,
        count = HEADERS.len(),
        cols = cols,
        style = TABLE_STYLE,
    )
}

fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            // Control characters are not representable in XML 1.0.
            c if (c as u32) < 0x20 && !matches!(c, '\t' | '\n' | '\r') => {}
            c => out.push(c),
        }
    }
    out
}

//! Minimal SpreadsheetML (.xlsx) workbooks
//!
//! Reads and writes a single worksheet of plain cell values: numbers,
//! booleans and text (shared or inline strings). Styles are ignored, and a
//! formula cell reads as its cached value. Dates come back as serial numbers.

use std::io::{Cursor, Read, Seek, Write};

use dataflow_engine::WidgetError;
use serde_json::Value;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::table::{number, Row, Table};

const XML_DECL: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;
const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const PACKAGE_REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const DOCUMENT_REL_NS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

/// Longest sheet name Excel accepts
const MAX_SHEET_NAME: usize = 31;
/// Column count of an Excel worksheet (`A` to `XFD`)
const MAX_COLUMNS: usize = 16_384;

/// Check a worksheet name against Excel's rules
pub fn check_sheet_name(name: &str) -> Result<(), WidgetError> {
    let forbidden = ['[', ']', ':', '*', '?', '/', '\\'];
    if name.is_empty() || name.chars().count() > MAX_SHEET_NAME || name.contains(forbidden) {
        return Err(WidgetError::invalid(
            "sheetName",
            "1 to 31 characters, none of []:*?/\\",
        ));
    }
    Ok(())
}

/// Render `columns` of `table` as a one-sheet workbook.
///
/// Missing cells are left empty; nested values are written as compact JSON
/// text.
pub fn write_workbook(
    table: &Table,
    columns: &[String],
    sheet_name: &str,
    header: bool,
) -> Result<Vec<u8>, WidgetError> {
    check_sheet_name(sheet_name)?;

    let mut sheet = format!(r#"{}<worksheet xmlns="{}"><sheetData>"#, XML_DECL, MAIN_NS);
    let mut row_number = 0;
    if header {
        row_number += 1;
        let names: Vec<Value> = columns.iter().cloned().map(Value::String).collect();
        push_row(&mut sheet, row_number, names.iter().map(Some));
    }
    for row in table.rows() {
        row_number += 1;
        push_row(&mut sheet, row_number, columns.iter().map(|c| row.get(c)));
    }
    sheet.push_str("</sheetData></worksheet>");

    let parts = [
        ("[Content_Types].xml", content_types()),
        (
            "_rels/.rels",
            relationships(&format!("{}/officeDocument", DOCUMENT_REL_NS), "xl/workbook.xml"),
        ),
        (
            "xl/workbook.xml",
            format!(
                r#"{}<workbook xmlns="{}" xmlns:r="{}"><sheets><sheet name="{}" sheetId="1" r:id="rId1"/></sheets></workbook>"#,
                XML_DECL,
                MAIN_NS,
                DOCUMENT_REL_NS,
                escape(sheet_name)
            ),
        ),
        (
            "xl/_rels/workbook.xml.rels",
            relationships(&format!("{}/worksheet", DOCUMENT_REL_NS), "worksheets/sheet1.xml"),
        ),
        ("xl/worksheets/sheet1.xml", sheet),
    ];

    let fail = |e: ZipError| WidgetError::failed(format!("Failed to write workbook: {}", e));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, body) in parts {
        zip.start_file(name, options).map_err(fail)?;
        zip.write_all(body.as_bytes())
            .map_err(|e| fail(ZipError::from(e)))?;
    }
    Ok(zip.finish().map_err(fail)?.into_inner())
}

fn content_types() -> String {
    format!(
        concat!(
            r#"{}<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
            r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
            r#"<Default Extension="xml" ContentType="application/xml"/>"#,
            r#"<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>"#,
            r#"<Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#,
            "</Types>"
        ),
        XML_DECL
    )
}

fn relationships(kind: &str, target: &str) -> String {
    format!(
        r#"{}<Relationships xmlns="{}"><Relationship Id="rId1" Type="{}" Target="{}"/></Relationships>"#,
        XML_DECL, PACKAGE_REL_NS, kind, target
    )
}

fn push_row<'a>(out: &mut String, row: usize, cells: impl IntoIterator<Item = Option<&'a Value>>) {
    out.push_str(&format!(r#"<row r="{}">"#, row));
    for (i, value) in cells.into_iter().enumerate() {
        let reference = format!("{}{}", column_letters(i), row);
        match value {
            None | Some(Value::Null) => {}
            Some(Value::Number(n)) => {
                out.push_str(&format!(r#"<c r="{}"><v>{}</v></c>"#, reference, n));
            }
            Some(Value::Bool(b)) => {
                out.push_str(&format!(r#"<c r="{}" t="b"><v>{}</v></c>"#, reference, u8::from(*b)));
            }
            Some(Value::String(s)) => push_text(out, &reference, s),
            Some(other) => push_text(out, &reference, &other.to_string()),
        }
    }
    out.push_str("</row>");
}

fn push_text(out: &mut String, reference: &str, text: &str) {
    out.push_str(&format!(
        r#"<c r="{}" t="inlineStr"><is><t xml:space="preserve">{}</t></is></c>"#,
        reference,
        escape(text)
    ));
}

/// Parse one worksheet of a workbook into a table.
///
/// `sheet` picks a worksheet by name (default: the first). With `header`,
/// the first non-empty row names the columns; otherwise columns are named
/// `column_0`, `column_1`, ... Rows without values are skipped and absent
/// cells become null.
pub fn read_workbook(bytes: &[u8], sheet: Option<&str>, header: bool) -> Result<Table, WidgetError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| WidgetError::failed(format!("Invalid workbook: {}", e)))?;
    let workbook = read_part(&mut archive, "xl/workbook.xml")?
        .ok_or_else(|| WidgetError::failed("Invalid workbook: missing 'xl/workbook.xml'"))?;
    let path = sheet_path(&mut archive, &workbook, sheet)?;
    let xml = read_part(&mut archive, &path)?
        .ok_or_else(|| WidgetError::failed(format!("Invalid workbook: missing '{}'", path)))?;
    let shared: Vec<String> = match read_part(&mut archive, "xl/sharedStrings.xml")? {
        Some(strings) => elements(&strings, "si").iter().map(|si| text_runs(si.body)).collect(),
        None => Vec::new(),
    };

    let rows = parse_rows(&xml, &shared)?;
    Ok(build_table(&rows, header))
}

fn read_part<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<String>, WidgetError> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(WidgetError::failed(format!("Invalid workbook: {}", e))),
    };
    let mut text = String::new();
    file.read_to_string(&mut text).map_err(|e| {
        WidgetError::failed(format!("Invalid workbook: failed to read '{}': {}", name, e))
    })?;
    Ok(Some(text))
}

/// Archive path of the chosen worksheet
fn sheet_path<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    workbook: &str,
    wanted: Option<&str>,
) -> Result<String, WidgetError> {
    let sheets = elements(workbook, "sheet");
    let (index, chosen) = match wanted {
        Some(name) => sheets
            .iter()
            .enumerate()
            .find(|(_, s)| attr(s.attrs, "name").as_deref() == Some(name))
            .ok_or_else(|| WidgetError::failed(format!("Sheet '{}' not found", name)))?,
        None => sheets
            .iter()
            .enumerate()
            .next()
            .ok_or_else(|| WidgetError::failed("Workbook has no sheets"))?,
    };
    let fallback = format!("xl/worksheets/sheet{}.xml", index + 1);

    let Some(rel_id) = attr(chosen.attrs, "r:id") else {
        return Ok(fallback);
    };
    let Some(rels) = read_part(archive, "xl/_rels/workbook.xml.rels")? else {
        return Ok(fallback);
    };
    let target = elements(&rels, "Relationship")
        .iter()
        .find(|r| attr(r.attrs, "Id").as_deref() == Some(rel_id.as_str()))
        .and_then(|r| attr(r.attrs, "Target"));
    Ok(match target {
        Some(target) => match target.strip_prefix('/') {
            Some(absolute) => absolute.to_string(),
            None => format!("xl/{}", target),
        },
        None => fallback,
    })
}

fn parse_rows(xml: &str, shared: &[String]) -> Result<Vec<Vec<(usize, Value)>>, WidgetError> {
    let mut rows = Vec::new();
    for row in elements(xml, "row") {
        let mut cells = Vec::new();
        let mut next = 0;
        for cell in elements(row.body, "c") {
            let column = attr(cell.attrs, "r")
                .as_deref()
                .and_then(column_index)
                .unwrap_or(next);
            if column >= MAX_COLUMNS {
                return Err(WidgetError::failed(format!(
                    "Invalid workbook: column {} out of range",
                    column + 1
                )));
            }
            next = column + 1;
            cells.push((column, cell_value(&cell, shared)?));
        }
        if cells.iter().any(|(_, value)| !value.is_null()) {
            rows.push(cells);
        }
    }
    Ok(rows)
}

fn cell_value(cell: &Element<'_>, shared: &[String]) -> Result<Value, WidgetError> {
    let raw = elements(cell.body, "v").first().map(|v| unescape(v.body));
    let kind = attr(cell.attrs, "t");
    Ok(match (kind.as_deref(), raw) {
        (Some("inlineStr"), _) => Value::String(
            elements(cell.body, "is")
                .first()
                .map(|is| text_runs(is.body))
                .unwrap_or_default(),
        ),
        (_, None) | (Some("e"), _) => Value::Null,
        (Some("s"), Some(raw)) => {
            let text = raw
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(|i| shared.get(i))
                .ok_or_else(|| {
                    WidgetError::failed(format!("Invalid workbook: no shared string '{}'", raw))
                })?;
            Value::String(text.clone())
        }
        (Some("str"), Some(raw)) => Value::String(raw),
        (Some("b"), Some(raw)) => Value::Bool(raw.trim() == "1"),
        (_, Some(raw)) => numeric(&raw),
    })
}

fn numeric(raw: &str) -> Value {
    let raw = raw.trim();
    if let Ok(int) = raw.parse::<i64>() {
        return Value::from(int);
    }
    match raw.parse::<f64>() {
        Ok(float) if float.is_finite() => number(float),
        _ => Value::String(raw.to_string()),
    }
}

fn build_table(rows: &[Vec<(usize, Value)>], header: bool) -> Table {
    let (names, body) = match rows.split_first() {
        Some((first, rest)) if header => (header_names(first), rest),
        _ => {
            let width = rows.iter().flatten().map(|(c, _)| c + 1).max().unwrap_or(0);
            ((0..width).map(|i| format!("column_{}", i)).collect(), rows)
        }
    };

    let table_rows: Vec<Row> = body
        .iter()
        .map(|cells| {
            let mut row: Row = names.iter().map(|n| (n.clone(), Value::Null)).collect();
            for (column, value) in cells {
                if let Some(name) = names.get(*column) {
                    row.insert(name.clone(), value.clone());
                }
            }
            row
        })
        .collect();
    Table::new(table_rows)
}

fn header_names(cells: &[(usize, Value)]) -> Vec<String> {
    let width = cells.iter().map(|(c, _)| c + 1).max().unwrap_or(0);
    let mut names: Vec<String> = (0..width).map(|i| format!("column_{}", i)).collect();
    for (column, value) in cells {
        match value {
            Value::Null => {}
            Value::String(s) => names[*column] = s.clone(),
            other => names[*column] = other.to_string(),
        }
    }
    names
}

/// Column letters for a zero-based index (`0` is `A`, `26` is `AA`)
pub fn column_letters(mut index: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push(char::from(b'A' + (index % 26) as u8));
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    letters.iter().rev().collect()
}

/// Zero-based column index from a cell reference such as `AB12`
pub fn column_index(reference: &str) -> Option<usize> {
    let letters: Vec<u8> = reference
        .bytes()
        .take_while(u8::is_ascii_alphabetic)
        .collect();
    if letters.is_empty() {
        return None;
    }
    letters
        .iter()
        .try_fold(0usize, |acc, b| {
            acc.checked_mul(26)?
                .checked_add(usize::from(b.to_ascii_uppercase() - b'A') + 1)
        })
        .map(|n| n - 1)
}

/// An element found by [`elements`]; `body` is empty for `<tag/>`
struct Element<'a> {
    attrs: &'a str,
    body: &'a str,
}

/// Every `<tag ...>...</tag>` in `xml`, outermost first. Elements of the
/// same name must not nest.
fn elements<'a>(xml: &'a str, tag: &str) -> Vec<Element<'a>> {
    let open = format!("<{}", tag);
    let close = format!("</{}>", tag);
    let mut found = Vec::new();
    let mut rest = xml;
    while let Some(start) = rest.find(&open) {
        let after = &rest[start + open.len()..];
        if !after.starts_with(|c: char| c.is_whitespace() || c == '>' || c == '/') {
            rest = after;
            continue;
        }
        let Some(end) = after.find('>') else {
            break;
        };
        let head = &after[..end];
        if let Some(attrs) = head.strip_suffix('/') {
            found.push(Element { attrs, body: "" });
            rest = &after[end + 1..];
        } else {
            let inner = &after[end + 1..];
            let Some(stop) = inner.find(&close) else {
                break;
            };
            found.push(Element {
                attrs: head,
                body: &inner[..stop],
            });
            rest = &inner[stop + close.len()..];
        }
    }
    found
}

/// Unescaped value of attribute `name`
fn attr(attrs: &str, name: &str) -> Option<String> {
    let mut rest = attrs;
    while let Some(pos) = rest.find(name) {
        let preceded = rest[..pos].ends_with(char::is_whitespace);
        let after = &rest[pos + name.len()..];
        if let (true, Some(value)) = (preceded, after.trim_start().strip_prefix('=')) {
            let value = value.trim_start();
            let quote = value.chars().next().filter(|q| *q == '"' || *q == '\'')?;
            let value = &value[1..];
            let end = value.find(quote)?;
            return Some(unescape(&value[..end]));
        }
        rest = after;
    }
    None
}

/// Concatenated `<t>` runs of a string item
fn text_runs(body: &str) -> String {
    elements(body, "t").iter().map(|t| unescape(t.body)).collect()
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\t' | '\n' | '\r' => out.push(c),
            // not representable in XML 1.0
            c if c < ' ' => {}
            c => out.push(c),
        }
    }
    out
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail
            .find(';')
            .and_then(|semi| entity(&tail[1..semi]).map(|c| (c, semi)));
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let code = match name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => name.strip_prefix('#')?.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Zip archive holding the given `(path, contents)` parts
    fn archive(parts: &[(&str, &str)]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in parts {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn test_written_workbook_reads_back() {
        let table = Table::from_value(
            &json!([
                {"name": "Ada", "age": 36, "score": 9.5, "member": true, "tags": [1, 2]},
                {"name": "Bo <b>", "age": null, "score": -1.25, "member": false}
            ]),
            "data",
        )
        .unwrap();
        let columns = table.columns().to_vec();
        let bytes = write_workbook(&table, &columns, "Data & Notes", true).unwrap();

        let read = read_workbook(&bytes, Some("Data & Notes"), true).unwrap();
        assert_eq!(
            Value::from(read),
            json!([
                {"name": "Ada", "age": 36, "score": 9.5, "member": true, "tags": "[1,2]"},
                {"name": "Bo <b>", "age": null, "score": -1.25, "member": false, "tags": null}
            ])
        );

        let raw = read_workbook(&bytes, None, false).unwrap();
        assert_eq!(raw.row_count(), 3);
        assert_eq!(raw.rows()[0]["column_0"], json!(columns[0]));
    }

    #[test]
    fn test_reads_shared_strings_and_sparse_cells() {
        let bytes = archive(&[
            (
                "xl/workbook.xml",
                r#"<workbook xmlns:r="r"><sheets><sheet name="Notes" sheetId="1" r:id="rId1"/><sheet name="Data" sheetId="2" r:id="rId2"/></sheets></workbook>"#,
            ),
            (
                "xl/_rels/workbook.xml.rels",
                r#"<Relationships><Relationship Id="rId2" Type="worksheet" Target="/xl/worksheets/data.xml"/></Relationships>"#,
            ),
            (
                "xl/sharedStrings.xml",
                r#"<sst count="3"><si><t>group</t></si><si><t>value</t></si><si><r><t xml:space="preserve">Fish </t></r><r><t>&amp; Chips</t></r></si></sst>"#,
            ),
            (
                "xl/worksheets/data.xml",
                concat!(
                    r#"<worksheet><sheetData>"#,
                    r#"<row r="1"><c r="A1" t="s"><v>0</v></c><c r="C1" t="s"><v>1</v></c></row>"#,
                    r#"<row r="2"><c r="A2" t="s"><v>2</v></c><c r="B2"><v>7</v></c><c r="C2"><v>2.5</v></c></row>"#,
                    r#"<row r="3"><c r="A3" s="1"/></row>"#,
                    r#"<row r="4"><c r="C4" t="b"><v>1</v></c></row>"#,
                    r#"</sheetData></worksheet>"#
                ),
            ),
        ]);

        let table = read_workbook(&bytes, Some("Data"), true).unwrap();
        assert_eq!(
            Value::from(table),
            json!([
                {"group": "Fish & Chips", "column_1": 7, "value": 2.5},
                {"group": null, "column_1": null, "value": true}
            ])
        );

        // the first sheet's part is absent from the archive
        let err = read_workbook(&bytes, None, true).unwrap_err();
        assert!(err.to_string().contains("missing 'xl/worksheets/sheet1.xml'"));
        let err = read_workbook(&bytes, Some("Summary"), true).unwrap_err();
        assert!(err.to_string().contains("Sheet 'Summary' not found"));
    }

    #[test]
    fn test_rejects_non_workbooks() {
        assert!(read_workbook(b"name,age\nAda,36\n", None, true).is_err());
        let bytes = archive(&[("hello.txt", "hi")]);
        let err = read_workbook(&bytes, None, true).unwrap_err();
        assert!(err.to_string().contains("missing 'xl/workbook.xml'"));
    }

    #[test]
    fn test_sheet_names() {
        assert!(check_sheet_name("Sheet1").is_ok());
        assert!(check_sheet_name("").is_err());
        assert!(check_sheet_name("Q1/Q2").is_err());
        assert!(check_sheet_name(&"x".repeat(32)).is_err());
    }

    #[test]
    fn test_column_references() {
        for (index, letters) in [(0, "A"), (25, "Z"), (26, "AA"), (701, "ZZ"), (702, "AAA")] {
            assert_eq!(column_letters(index), letters);
            assert_eq!(column_index(&format!("{}7", letters)), Some(index));
        }
        assert_eq!(column_index("12"), None);
    }

    #[test]
    fn test_entities() {
        assert_eq!(unescape("a &lt;b&gt; &#65;&#x42; &bogus; &"), "a <b> AB &bogus; &");
        assert_eq!(escape("x<\"y\">&\u{1}"), "x&lt;&quot;y&quot;&gt;&amp;");
    }
}

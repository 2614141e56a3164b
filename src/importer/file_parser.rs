// ==========================================
// 车队排班导入系统 - 文件解析器实现
// ==========================================
// 阶段 0: 原始字节 → 表头 + 行记录（全部为字符串）
// 支持: CSV / Excel(.xlsx/.xls/.xlsb/.ods) / JSON 对象数组 / 分隔文本
// 约束: 不做类型转换，类型校验推迟到 DiffEngine
// ==========================================

use crate::domain::entity::CANONICAL_DATETIME_FORMAT;
use crate::importer::error::{ImportError, ImportResult};
use calamine::{open_workbook_auto_from_rs, Data, DataType, Reader};
use chrono::{Duration, NaiveDateTime, Timelike};
use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Cursor;

/// 单行原始记录（表头 → 字符串值）
pub type RawRow = BTreeMap<String, String>;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

// ==========================================
// FileFormat - 文件格式
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Csv,
    Spreadsheet,
    Json,
    DelimitedText,
}

impl FileFormat {
    /// 根据扩展名（优先）或 MIME 判断格式
    pub fn detect(file_name: &str, mime_type: Option<&str>) -> Option<Self> {
        let ext = file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.trim().to_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "csv" => return Some(FileFormat::Csv),
            "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => return Some(FileFormat::Spreadsheet),
            "json" => return Some(FileFormat::Json),
            "txt" | "tsv" | "tab" | "dat" => return Some(FileFormat::DelimitedText),
            _ => {}
        }

        let mime = mime_type?.trim().to_lowercase();
        match mime.as_str() {
            "text/csv" | "application/csv" => Some(FileFormat::Csv),
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            | "application/vnd.ms-excel"
            | "application/vnd.oasis.opendocument.spreadsheet" => Some(FileFormat::Spreadsheet),
            "application/json" | "text/json" => Some(FileFormat::Json),
            "text/plain" | "text/tab-separated-values" => Some(FileFormat::DelimitedText),
            _ => None,
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FileFormat::Csv => "csv",
            FileFormat::Spreadsheet => "spreadsheet",
            FileFormat::Json => "json",
            FileFormat::DelimitedText => "delimited_text",
        };
        write!(f, "{}", s)
    }
}

// ==========================================
// UploadedFile - 上传文件（解析输入）
// ==========================================
#[derive(Debug, Clone, Copy)]
pub struct UploadedFile<'a> {
    pub file_name: &'a str,
    pub mime_type: Option<&'a str>,
    pub bytes: &'a [u8],
    /// 指定工作表（仅电子表格有效，None = 第一个工作表）
    pub sheet_name: Option<&'a str>,
}

// ==========================================
// ParsedFile - 解析结果
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedFile {
    pub format: Option<FileFormat>,
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
    /// 致命错误（非空时 rows 必为空）
    pub errors: Vec<String>,
    /// 非致命告警
    pub warnings: Vec<String>,
    pub sheet_name: Option<String>,
}

impl ParsedFile {
    fn failed(format: Option<FileFormat>, message: String) -> Self {
        Self {
            format,
            errors: vec![message],
            ..Default::default()
        }
    }

    pub fn is_fatal(&self) -> bool {
        !self.errors.is_empty()
    }
}

// ==========================================
// FileParser Trait
// ==========================================
// 用途: 字节 → ParsedFile；失败通过 errors 返回，不 panic 不抛错
pub trait FileParser: Send + Sync {
    fn parse(&self, file: &UploadedFile<'_>) -> ParsedFile;
}

// ==========================================
// 公共: 表头规范化 + 行收集
// ==========================================
fn normalize_headers<'a, I>(raw: I, warnings: &mut Vec<String>) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut headers: Vec<String> = Vec::new();
    for (idx, h) in raw.into_iter().enumerate() {
        let mut name = h.trim().trim_start_matches('\u{feff}').to_string();
        if name.is_empty() {
            name = format!("column_{}", idx + 1);
        }
        if headers.contains(&name) {
            let renamed = format!("{}_{}", name, idx + 1);
            warnings.push(format!("表头重复: {}，已重命名为 {}", name, renamed));
            name = renamed;
        }
        headers.push(name);
    }
    headers
}

fn build_row<I>(headers: &[String], values: I) -> Option<RawRow>
where
    I: IntoIterator<Item = String>,
{
    let mut row = RawRow::new();
    for (col_idx, value) in values.into_iter().enumerate() {
        if let Some(header) = headers.get(col_idx) {
            row.insert(header.clone(), value.trim().to_string());
        }
    }

    // 跳过完全空白的行
    if row.values().all(|v| v.is_empty()) {
        return None;
    }
    Some(row)
}

fn finish(
    format: FileFormat,
    headers: Vec<String>,
    rows: Vec<RawRow>,
    warnings: Vec<String>,
    sheet_name: Option<String>,
) -> ImportResult<ParsedFile> {
    if headers.is_empty() {
        return Err(ImportError::ParseError("文件无表头".to_string()));
    }
    if rows.is_empty() {
        return Err(ImportError::ParseError("文件无数据行".to_string()));
    }
    Ok(ParsedFile {
        format: Some(format),
        headers,
        rows,
        errors: Vec::new(),
        warnings,
        sheet_name,
    })
}

fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes)
}

fn parse_delimited(bytes: &[u8], delimiter: u8, format: FileFormat) -> ImportResult<ParsedFile> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true) // 允许行长度不一致
        .delimiter(delimiter)
        .from_reader(strip_bom(bytes));

    let mut warnings = Vec::new();
    let headers = normalize_headers(reader.headers()?.iter(), &mut warnings);

    let mut rows = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        match result {
            Ok(record) => {
                if let Some(row) = build_row(&headers, record.iter().map(str::to_string)) {
                    rows.push(row);
                }
            }
            Err(e) => {
                // 记录级错误不阻断整文件
                warnings.push(format!("第 {} 条记录解析失败，已跳过: {}", idx + 1, e));
            }
        }
    }

    finish(format, headers, rows, warnings, None)
}

// ==========================================
// CSV Parser 实现
// ==========================================
pub struct CsvParser;

impl CsvParser {
    fn parse_bytes(&self, bytes: &[u8]) -> ImportResult<ParsedFile> {
        parse_delimited(bytes, b',', FileFormat::Csv)
    }
}

impl FileParser for CsvParser {
    fn parse(&self, file: &UploadedFile<'_>) -> ParsedFile {
        self.parse_bytes(file.bytes)
            .unwrap_or_else(|e| ParsedFile::failed(Some(FileFormat::Csv), e.to_string()))
    }
}

// ==========================================
// 分隔文本 Parser 实现（自动识别分隔符）
// ==========================================
pub struct DelimitedTextParser;

impl DelimitedTextParser {
    /// 根据表头行识别分隔符（制表符 / 分号 / 竖线 / 逗号）
    pub fn detect_delimiter(bytes: &[u8]) -> u8 {
        let text = String::from_utf8_lossy(strip_bom(bytes));
        let header_line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");

        [b'\t', b';', b'|', b',']
            .into_iter()
            .map(|d| (d, header_line.matches(d as char).count()))
            .filter(|(_, count)| *count > 0)
            .max_by_key(|(_, count)| *count)
            .map(|(d, _)| d)
            .unwrap_or(b',')
    }

    fn parse_bytes(&self, bytes: &[u8]) -> ImportResult<ParsedFile> {
        let delimiter = Self::detect_delimiter(bytes);
        parse_delimited(bytes, delimiter, FileFormat::DelimitedText)
    }
}

impl FileParser for DelimitedTextParser {
    fn parse(&self, file: &UploadedFile<'_>) -> ParsedFile {
        self.parse_bytes(file.bytes).unwrap_or_else(|e| {
            ParsedFile::failed(Some(FileFormat::DelimitedText), e.to_string())
        })
    }
}

// ==========================================
// Excel Parser 实现
// ==========================================
pub struct ExcelParser;

impl ExcelParser {
    fn parse_bytes(&self, bytes: &[u8], sheet: Option<&str>) -> ImportResult<ParsedFile> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;

        let sheet_names = workbook.sheet_names();
        if sheet_names.is_empty() {
            return Err(ImportError::ExcelParseError("Excel 文件无工作表".to_string()));
        }

        // 指定工作表 或 第一个工作表
        let sheet_name = match sheet {
            Some(wanted) => sheet_names
                .iter()
                .find(|n| n.as_str() == wanted.trim())
                .cloned()
                .ok_or_else(|| {
                    ImportError::ExcelParseError(format!(
                        "工作表不存在: {}（可用: {}）",
                        wanted,
                        sheet_names.join(", ")
                    ))
                })?,
            None => sheet_names[0].clone(),
        };

        let range = workbook.worksheet_range(&sheet_name)?;

        // 提取表头（第一行）
        let mut rows_iter = range.rows();
        let header_row = rows_iter
            .next()
            .ok_or_else(|| ImportError::ExcelParseError("Excel 工作表为空".to_string()))?;

        let mut warnings = Vec::new();
        let header_cells: Vec<String> = header_row.iter().map(cell_to_string).collect();
        let headers = normalize_headers(header_cells.iter().map(String::as_str), &mut warnings);

        // 读取数据行
        let mut rows = Vec::new();
        for data_row in rows_iter {
            if let Some(row) = build_row(&headers, data_row.iter().map(cell_to_string)) {
                rows.push(row);
            }
        }

        finish(FileFormat::Spreadsheet, headers, rows, warnings, Some(sheet_name))
    }
}

/// 单元格 → 字符串
///
/// - 日期时间单元格按秒取整，输出规范时间格式
/// - 整数值的浮点单元格去掉小数部分（12000.0 → "12000"）
fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) => format_float(*f),
        Data::DateTime(dt) if dt.is_duration() => format_float(dt.as_f64()),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(format_datetime)
            .unwrap_or_else(|| format_float(dt.as_f64())),
        Data::DateTimeIso(raw) => cell
            .as_datetime()
            .map(format_datetime)
            .unwrap_or_else(|| raw.clone()),
        other => other.to_string(),
    }
}

fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        (value as i64).to_string()
    } else {
        value.to_string()
    }
}

fn format_datetime(value: NaiveDateTime) -> String {
    // 序列号换算存在毫秒级误差
    let rounded = value + Duration::milliseconds(500);
    rounded
        .with_nanosecond(0)
        .unwrap_or(rounded)
        .format(CANONICAL_DATETIME_FORMAT)
        .to_string()
}

impl FileParser for ExcelParser {
    fn parse(&self, file: &UploadedFile<'_>) -> ParsedFile {
        self.parse_bytes(file.bytes, file.sheet_name).unwrap_or_else(|e| {
            ParsedFile::failed(Some(FileFormat::Spreadsheet), e.to_string())
        })
    }
}

// ==========================================
// JSON Parser 实现（对象数组）
// ==========================================
pub struct JsonParser;

impl JsonParser {
    fn stringify(value: &serde_json::Value) -> String {
        match value {
            serde_json::Value::Null => String::new(),
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    fn parse_bytes(&self, bytes: &[u8]) -> ImportResult<ParsedFile> {
        let value: serde_json::Value = serde_json::from_slice(strip_bom(bytes))
            .map_err(|e| ImportError::ParseError(format!("JSON 解析失败: {}", e)))?;

        let items = value
            .as_array()
            .ok_or_else(|| ImportError::ParseError("JSON 顶层必须是对象数组".to_string()))?;

        // 表头按首次出现顺序
        let mut headers: Vec<String> = Vec::new();
        let mut warnings = Vec::new();
        let mut rows = Vec::new();

        for (idx, item) in items.iter().enumerate() {
            let Some(obj) = item.as_object() else {
                warnings.push(format!("第 {} 个元素不是对象，已跳过", idx + 1));
                continue;
            };

            for key in obj.keys() {
                let key = key.trim().to_string();
                if !key.is_empty() && !headers.contains(&key) {
                    headers.push(key);
                }
            }

            let mut row = RawRow::new();
            for (key, v) in obj {
                let key = key.trim();
                if !key.is_empty() {
                    row.insert(key.to_string(), Self::stringify(v).trim().to_string());
                }
            }
            if row.values().all(|v| v.is_empty()) {
                continue;
            }
            rows.push(row);
        }

        finish(FileFormat::Json, headers, rows, warnings, None)
    }
}

impl FileParser for JsonParser {
    fn parse(&self, file: &UploadedFile<'_>) -> ParsedFile {
        self.parse_bytes(file.bytes)
            .unwrap_or_else(|e| ParsedFile::failed(Some(FileFormat::Json), e.to_string()))
    }
}

// ==========================================
// 通用文件解析器（根据扩展名 / MIME 自动选择）
// ==========================================
pub struct UniversalFileParser;

impl FileParser for UniversalFileParser {
    fn parse(&self, file: &UploadedFile<'_>) -> ParsedFile {
        match FileFormat::detect(file.file_name, file.mime_type) {
            Some(FileFormat::Csv) => CsvParser.parse(file),
            Some(FileFormat::Spreadsheet) => ExcelParser.parse(file),
            Some(FileFormat::Json) => JsonParser.parse(file),
            Some(FileFormat::DelimitedText) => DelimitedTextParser.parse(file),
            None => ParsedFile::failed(
                None,
                ImportError::UnsupportedFormat(file.file_name.to_string()).to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload<'a>(file_name: &'a str, bytes: &'a [u8]) -> UploadedFile<'a> {
        UploadedFile {
            file_name,
            mime_type: None,
            bytes,
            sheet_name: None,
        }
    }

    #[test]
    fn test_csv_parser_valid_file() {
        let bytes = b"plate,make,mileage_km\nAB123CD,Volvo,120000\nXY987ZZ,\"Mercedes, Benz\",5000\n";
        let parsed = UniversalFileParser.parse(&upload("fleet.csv", bytes));

        assert!(parsed.errors.is_empty());
        assert_eq!(parsed.format, Some(FileFormat::Csv));
        assert_eq!(parsed.headers, vec!["plate", "make", "mileage_km"]);
        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.rows[1].get("make"), Some(&"Mercedes, Benz".to_string()));
    }

    #[test]
    fn test_csv_parser_strips_bom_and_skips_blank_rows() {
        let mut bytes = UTF8_BOM.to_vec();
        bytes.extend_from_slice(b"plate,make\nAB123CD,Volvo\n\n,\nXY987ZZ,Ford\n");
        let parsed = CsvParser.parse(&upload("fleet.csv", &bytes));

        assert_eq!(parsed.headers[0], "plate");
        assert_eq!(parsed.rows.len(), 2);
    }

    #[test]
    fn test_csv_parser_header_only_is_fatal() {
        let parsed = CsvParser.parse(&upload("fleet.csv", b"plate,make\n"));
        assert!(parsed.is_fatal());
        assert!(parsed.rows.is_empty());
    }

    #[test]
    fn test_unsupported_format() {
        let parsed = UniversalFileParser.parse(&upload("fleet.pdf", b"%PDF-1.4"));
        assert!(parsed.is_fatal());
        assert!(parsed.errors[0].contains("fleet.pdf"));
    }

    #[test]
    fn test_garbage_spreadsheet_bytes_are_fatal() {
        let parsed = UniversalFileParser.parse(&upload("fleet.xlsx", b"definitely not a zip"));
        assert!(parsed.is_fatal());
        assert!(parsed.rows.is_empty());
    }

    /// 最小 xlsx：内联字符串表头 + 以内置格式 22 (m/d/yy h:mm) 标记的日期单元格
    fn roster_xlsx() -> Vec<u8> {
        use std::io::{Cursor, Write};
        use zip::write::SimpleFileOptions;

        const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
        const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

        let parts = [
            (
                "[Content_Types].xml",
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/></Types>"#
                    .to_string(),
            ),
            (
                "_rels/.rels",
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#
                    .to_string(),
            ),
            (
                "xl/workbook.xml",
                format!(
                    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="{MAIN_NS}" xmlns:r="{REL_NS}"><sheets><sheet name="Roster" sheetId="1" r:id="rId1"/></sheets></workbook>"#
                ),
            ),
            (
                "xl/_rels/workbook.xml.rels",
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/></Relationships>"#
                    .to_string(),
            ),
            (
                "xl/styles.xml",
                format!(
                    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="{MAIN_NS}"><cellXfs count="2"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/><xf numFmtId="22" fontId="0" fillId="0" borderId="0" xfId="0" applyNumberFormat="1"/></cellXfs></styleSheet>"#
                ),
            ),
            (
                "xl/worksheets/sheet1.xml",
                format!(
                    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="{MAIN_NS}"><sheetData><row r="1"><c r="A1" t="inlineStr"><is><t>shift_ref</t></is></c><c r="B1" t="inlineStr"><is><t>starts_at</t></is></c><c r="C1" t="inlineStr"><is><t>break_minutes</t></is></c></row><row r="2"><c r="A2" t="inlineStr"><is><t>S-1</t></is></c><c r="B2" s="1"><v>45717.333333333336</v></c><c r="C2"><v>30</v></c></row></sheetData></worksheet>"#
                ),
            ),
        ];

        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in parts {
            writer.start_file(name, SimpleFileOptions::default()).unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_excel_date_cell_renders_canonical_datetime() {
        let bytes = roster_xlsx();
        let parsed = UniversalFileParser.parse(&upload("roster.xlsx", &bytes));

        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        assert_eq!(parsed.format, Some(FileFormat::Spreadsheet));
        assert_eq!(parsed.headers, vec!["shift_ref", "starts_at", "break_minutes"]);
        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(
            parsed.rows[0].get("starts_at"),
            Some(&"2025-03-01T08:00:00".to_string())
        );
        assert_eq!(parsed.rows[0].get("break_minutes"), Some(&"30".to_string()));
    }

    #[test]
    fn test_cell_to_string_native_types() {
        use calamine::{ExcelDateTime, ExcelDateTimeType};

        let starts = Data::DateTime(ExcelDateTime::new(
            45717.333333333336,
            ExcelDateTimeType::DateTime,
            false,
        ));
        assert_eq!(cell_to_string(&starts), "2025-03-01T08:00:00");
        assert_eq!(
            cell_to_string(&Data::DateTimeIso("2025-03-01T16:00:00".to_string())),
            "2025-03-01T16:00:00"
        );
        assert_eq!(cell_to_string(&Data::Float(120000.0)), "120000");
        assert_eq!(cell_to_string(&Data::Float(12.5)), "12.5");
        assert_eq!(cell_to_string(&Data::Int(2020)), "2020");
        assert_eq!(cell_to_string(&Data::Empty), "");
    }

    #[test]
    fn test_json_array_of_objects() {
        let bytes = br#"[{"plate":"AB123CD","mileage_km":120000,"archived":null},{"plate":"XY987ZZ","make":"Ford"}]"#;
        let parsed = UniversalFileParser.parse(&upload("fleet.json", bytes));

        assert!(parsed.errors.is_empty());
        assert_eq!(parsed.headers, vec!["plate", "mileage_km", "archived", "make"]);
        assert_eq!(parsed.rows[0].get("mileage_km"), Some(&"120000".to_string()));
        assert_eq!(parsed.rows[0].get("archived"), Some(&"".to_string()));
    }

    #[test]
    fn test_json_headers_keep_first_seen_order() {
        let bytes = br#"[{"shift_ref":"S-1","staff_name":"Kim"},{"zone":"north","shift_ref":"S-2","break_minutes":"30"}]"#;
        let parsed = JsonParser.parse(&upload("roster.json", bytes));

        assert_eq!(parsed.headers, vec!["shift_ref", "staff_name", "zone", "break_minutes"]);
    }

    #[test]
    fn test_json_not_an_array_is_fatal() {
        let parsed = JsonParser.parse(&upload("fleet.json", br#"{"plate":"AB"}"#));
        assert!(parsed.is_fatal());
    }

    #[test]
    fn test_delimited_text_detects_tab() {
        let bytes = b"shift_ref\tstaff_name\nS-1\tKim\nS-2\tLee\n";
        assert_eq!(DelimitedTextParser::detect_delimiter(bytes), b'\t');

        let parsed = UniversalFileParser.parse(&upload("roster.tsv", bytes));
        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.rows[1].get("staff_name"), Some(&"Lee".to_string()));
    }

    #[test]
    fn test_format_detect_falls_back_to_mime() {
        assert_eq!(
            FileFormat::detect("upload", Some("text/csv")),
            Some(FileFormat::Csv)
        );
        assert_eq!(FileFormat::detect("upload", None), None);
    }
}

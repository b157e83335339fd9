//! Delimited text codec blocks
//!
//! `CSVReader` turns delimited text into a JSON document
//! `{fragmentName: [record, ...]}`; `CSVWriter` renders such a document back
//! to text. Cells that parse as finite numbers become JSON numbers, so a round
//! trip normalizes numeric text (`1.50` is written back as `1.5`). Quoting is
//! not supported: a cell may not contain either delimiter.
//!
//! Ragged rows are padded with empty cells or truncated, with a warning. In
//! strict mode they are rejected with `MalformedInput` instead, as are
//! duplicate header names.
//!
//! A table with a header but no data rows still carries its header: the
//! reader adds a `columns` list next to the empty record sequence and the
//! writer falls back to it.

use super::{BlockAlgorithm, BlockContext, Emission, Parameters, Tick};
use crate::types::{EngineError, Result, Value};
use serde::Serialize;
use serde_json::{Map, Number, Value as Json};

const DEFAULT_LINE_DELIMITER: &str = "\n";
const DEFAULT_COLUMN_DELIMITER: &str = ",";
/// Header names of a table without records
const COLUMNS_FIELD: &str = "columns";

/// Type a single cell: finite numbers first, string fallback
fn typed_cell(cell: &str) -> Json {
    let trimmed = cell.trim();
    if !trimmed.is_empty() {
        if let Some(number) = trimmed
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .and_then(Number::from_f64)
        {
            return Json::Number(number);
        }
    }
    Json::String(cell.to_string())
}

/// Render a JSON value as cell text
fn format_cell(value: &Json) -> String {
    match value {
        Json::Null => String::new(),
        Json::Bool(b) => b.to_string(),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.to_string()
            } else if let Some(u) = n.as_u64() {
                u.to_string()
            } else {
                // Shortest round-trip form; integral floats drop the ".0"
                n.as_f64().map(|f| f.to_string()).unwrap_or_default()
            }
        }
        Json::String(s) => s.clone(),
        nested => nested.to_string(),
    }
}

/// CSV reader block state
#[derive(Debug, Clone, Serialize)]
pub struct CsvReader {
    fragment_name: String,
    header_provided: bool,
    line_delimiter: String,
    column_delimiter: String,
    strict: bool,
    /// Records produced so far
    records_read: u64,
}

impl CsvReader {
    pub(crate) fn from_params(params: &Parameters<'_>) -> Result<Self> {
        Ok(Self {
            fragment_name: params.string_or("fragmentName", "data")?,
            header_provided: params.bool_or("isHeaderProvided", true)?,
            line_delimiter: params.delimiter_or("lineDelimitor", DEFAULT_LINE_DELIMITER)?,
            column_delimiter: params.delimiter_or("colDelimitor", DEFAULT_COLUMN_DELIMITER)?,
            strict: params.bool_or("strict", false)?,
            records_read: 0,
        })
    }

    pub fn records_read(&self) -> u64 {
        self.records_read
    }

    fn split_row<'t>(&self, line: &'t str) -> Vec<&'t str> {
        line.strip_suffix('\r')
            .unwrap_or(line)
            .split(self.column_delimiter.as_str())
            .collect()
    }

    /// Parse `text` into `{fragmentName: [records]}`
    ///
    /// Pure: the block's counters are only updated by a successful evaluation.
    pub fn parse(&self, text: &str) -> Result<Json> {
        let mut lines: Vec<&str> = text.split(self.line_delimiter.as_str()).collect();
        // A trailing delimiter does not start another row
        if lines.last().is_some_and(|l| l.is_empty()) {
            lines.pop();
        }

        let mut rows = lines
            .into_iter()
            .enumerate()
            .map(|(index, line)| (index + 1, self.split_row(line)));

        let mut records = Vec::new();
        let mut keys: Vec<String> = if self.header_provided {
            match rows.next() {
                Some((_, header)) => header.into_iter().map(str::to_string).collect(),
                None => Vec::new(),
            }
        } else {
            Vec::new()
        };
        self.check_header(&keys)?;
        let header = keys.clone();

        for (line_no, cells) in rows {
            if keys.is_empty() {
                // No header: the first row fixes the width
                keys = (1..=cells.len()).map(|i| format!("col{}", i)).collect();
            }

            if cells.len() != keys.len() {
                if self.strict {
                    return Err(EngineError::MalformedInput(format!(
                        "CSVReader line {}: expected {} columns, found {}",
                        line_no,
                        keys.len(),
                        cells.len()
                    )));
                }
                log::warn!(
                    "CSVReader line {}: expected {} columns, found {}; padding/truncating",
                    line_no,
                    keys.len(),
                    cells.len()
                );
            }

            let mut record = Map::new();
            for (i, key) in keys.iter().enumerate() {
                let cell = cells.get(i).copied().unwrap_or("");
                record.insert(key.clone(), typed_cell(cell));
            }
            records.push(Json::Object(record));
        }

        let empty = records.is_empty();
        let mut document = Map::new();
        document.insert(self.fragment_name.clone(), Json::Array(records));
        if empty && !header.is_empty() && self.fragment_name != COLUMNS_FIELD {
            let columns = header.into_iter().map(Json::String).collect();
            document.insert(COLUMNS_FIELD.to_string(), Json::Array(columns));
        }
        Ok(Json::Object(document))
    }

    fn check_header(&self, keys: &[String]) -> Result<()> {
        for (i, key) in keys.iter().enumerate() {
            if keys[..i].contains(key) {
                if self.strict {
                    return Err(EngineError::MalformedInput(format!(
                        "CSVReader header: duplicate column {:?}",
                        key
                    )));
                }
                log::warn!("CSVReader header: duplicate column {:?}, later cells win", key);
            }
        }
        Ok(())
    }
}

impl BlockAlgorithm for CsvReader {
    fn evaluate(&mut self, _ctx: &BlockContext<'_>, tick: &Tick<'_>) -> Result<Vec<Emission>> {
        let text = tick.value.as_str().ok_or_else(|| {
            EngineError::MalformedInput(format!("CSVReader.{} expects text, got {}", tick.input, tick.value))
        })?;

        let document = self.parse(text)?;
        let count = document[&self.fragment_name]
            .as_array()
            .map(|records| records.len())
            .unwrap_or(0);
        self.records_read += count as u64;
        log::debug!("CSVReader parsed {} records into '{}'", count, self.fragment_name);

        Ok(vec![Emission::output("jsonOutput", Value::Json(document))])
    }
}

/// CSV writer block state
#[derive(Debug, Clone, Serialize)]
pub struct CsvWriter {
    line_delimiter: String,
    column_delimiter: String,
    include_header: bool,
    fragment_name: Option<String>,
    strict: bool,
}

impl CsvWriter {
    pub(crate) fn from_params(params: &Parameters<'_>) -> Result<Self> {
        Ok(Self {
            line_delimiter: params.delimiter_or("lineDelimitor", DEFAULT_LINE_DELIMITER)?,
            column_delimiter: params.delimiter_or("colDelimitor", DEFAULT_COLUMN_DELIMITER)?,
            include_header: params.bool_or("includeHeader", true)?,
            fragment_name: params.optional_string("fragmentName")?,
            strict: params.bool_or("strict", false)?,
        })
    }

    /// Locate the record sequence inside a document
    fn records<'d>(&self, document: &'d Json) -> Result<&'d Vec<Json>> {
        let found = match (document, &self.fragment_name) {
            (Json::Array(records), _) => Some(records),
            (Json::Object(fields), Some(name)) => fields.get(name).and_then(Json::as_array),
            (Json::Object(fields), None) => fields.values().find_map(Json::as_array),
            _ => None,
        };
        found.ok_or_else(|| {
            EngineError::MalformedInput("CSVWriter input contains no record sequence".to_string())
        })
    }

    fn check_cell(&self, cell: String) -> Result<String> {
        if cell.contains(self.column_delimiter.as_str()) || cell.contains(self.line_delimiter.as_str()) {
            if self.strict {
                return Err(EngineError::MalformedInput(format!(
                    "CSVWriter cell {:?} contains a delimiter",
                    cell
                )));
            }
            log::warn!("CSVWriter cell {:?} contains a delimiter", cell);
        }
        Ok(cell)
    }

    /// Render a document as delimited text
    pub fn render(&self, document: &Json) -> Result<String> {
        let records = self.records(document)?;

        let mut rows: Vec<Vec<String>> = Vec::with_capacity(records.len() + 1);
        let mut columns: Vec<&str> = Vec::new();

        for (index, record) in records.iter().enumerate() {
            let fields = record.as_object().ok_or_else(|| {
                EngineError::MalformedInput(format!("CSVWriter record {} is not an object", index))
            })?;

            if index == 0 {
                columns = fields.keys().map(String::as_str).collect();
                if self.include_header {
                    let header = columns
                        .iter()
                        .map(|c| self.check_cell(c.to_string()))
                        .collect::<Result<Vec<_>>>()?;
                    rows.push(header);
                }
            } else if fields.len() != columns.len() || !columns.iter().all(|c| fields.contains_key(*c)) {
                if self.strict {
                    return Err(EngineError::MalformedInput(format!(
                        "CSVWriter record {} does not match the columns of the first record",
                        index
                    )));
                }
                log::warn!("CSVWriter record {} has different keys; padding/ignoring", index);
            }

            let row = columns
                .iter()
                .map(|c| self.check_cell(fields.get(*c).map(format_cell).unwrap_or_default()))
                .collect::<Result<Vec<_>>>()?;
            rows.push(row);
        }

        if records.is_empty() && self.include_header {
            if let Some(header) = document.get(COLUMNS_FIELD).and_then(Json::as_array) {
                let header = header
                    .iter()
                    .map(|c| self.check_cell(format_cell(c)))
                    .collect::<Result<Vec<_>>>()?;
                rows.push(header);
            }
        }

        Ok(rows
            .into_iter()
            .map(|row| row.join(&self.column_delimiter))
            .collect::<Vec<_>>()
            .join(&self.line_delimiter))
    }
}

impl BlockAlgorithm for CsvWriter {
    fn evaluate(&mut self, _ctx: &BlockContext<'_>, tick: &Tick<'_>) -> Result<Vec<Emission>> {
        let parsed;
        let document = match tick.value {
            Value::Json(Json::String(text)) | Value::Text(text) => {
                parsed = serde_json::from_str::<Json>(text).map_err(|e| {
                    EngineError::MalformedInput(format!("CSVWriter input is not JSON: {}", e))
                })?;
                &parsed
            }
            Value::Json(document) => document,
            other => {
                return Err(EngineError::MalformedInput(format!(
                    "CSVWriter.{} expects a JSON document, got {}",
                    tick.input, other
                )))
            }
        };

        let text = self.render(document)?;
        Ok(vec![Emission::output("csvOutput", text)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Properties;
    use serde_json::json;

    fn reader(params: Json) -> CsvReader {
        let params: Properties = params.as_object().cloned().unwrap();
        CsvReader::from_params(&Parameters::new("CSVReader", &params)).unwrap()
    }

    fn writer(params: Json) -> CsvWriter {
        let params: Properties = params.as_object().cloned().unwrap();
        CsvWriter::from_params(&Parameters::new("CSVWriter", &params)).unwrap()
    }

    #[test]
    fn test_reader_without_header_synthesizes_keys() {
        let r = reader(json!({"fragmentName": "infile", "isHeaderProvided": "false"}));
        let doc = r.parse("field1,field2,field3\n11,12,13\n21,22,23\n31,32,33").unwrap();

        let records = doc["infile"].as_array().unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(records[0]["col1"], json!("field1"));
        assert_eq!(records[1]["col2"], json!(12.0));
        assert_eq!(records[3]["col3"], json!(33.0));
    }

    #[test]
    fn test_reader_with_custom_delimiters() {
        let r = reader(json!({"fragmentName": "infile", "lineDelimitor": " | ", "colDelimitor": ";"}));
        let doc = r.parse("field1;field2;field3 | 11;12;13 | 21;22;23 | 31;32;33").unwrap();

        let records = doc["infile"].as_array().unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0], json!({"field1": 11.0, "field2": 12.0, "field3": 13.0}));
        assert_eq!(records[2]["field3"], json!(33.0));
    }

    #[test]
    fn test_reader_ragged_rows() {
        let lenient = reader(json!({}));
        let doc = lenient.parse("a,b,c\n1,2\n3,4,5,6\n").unwrap();
        let records = doc["data"].as_array().unwrap();
        assert_eq!(records[0], json!({"a": 1.0, "b": 2.0, "c": ""}));
        assert_eq!(records[1], json!({"a": 3.0, "b": 4.0, "c": 5.0}));

        let strict = reader(json!({"strict": true}));
        assert!(matches!(
            strict.parse("a,b,c\n1,2"),
            Err(EngineError::MalformedInput(_))
        ));
    }

    #[test]
    fn test_writer_uses_first_record_key_order() {
        let w = writer(json!({"lineDelimitor": "|", "colDelimitor": ";"}));
        let doc: Json = serde_json::from_str(
            r#"{"infile": [{"field1": 11,"field2": 12,"field3": 13},{"field1": 21,"field2": 22,"field3": 23},{"field1": 31,"field2": 32,"field3": 33}]}"#,
        )
        .unwrap();
        assert_eq!(w.render(&doc).unwrap(), "field1;field2;field3|11;12;13|21;22;23|31;32;33");
    }

    #[test]
    fn test_writer_strict_rejects_mismatched_records() {
        let doc = json!([{"a": 1, "b": 2}, {"a": 3}]);
        assert_eq!(writer(json!({})).render(&doc).unwrap(), "a,b\n1,2\n3,");
        assert!(writer(json!({"strict": true})).render(&doc).is_err());
    }

    #[test]
    fn test_text_round_trip() {
        let text = "name;speed;ok|pump;1.5;true|fan;20;false";
        let params = json!({"fragmentName": "t", "lineDelimitor": "|", "colDelimitor": ";"});
        let doc = reader(params.clone()).parse(text).unwrap();
        assert_eq!(writer(params).render(&doc).unwrap(), text);
    }

    #[test]
    fn test_header_only_table_round_trip() {
        let doc = reader(json!({})).parse("a,b").unwrap();
        assert_eq!(doc, json!({"data": [], "columns": ["a", "b"]}));
        assert_eq!(writer(json!({})).render(&doc).unwrap(), "a,b");
        assert_eq!(writer(json!({"includeHeader": false})).render(&doc).unwrap(), "");
    }

    #[test]
    fn test_empty_cells_in_single_column_round_trip() {
        let r = reader(json!({}));
        let doc = r.parse("a\n\nb").unwrap();
        assert_eq!(doc["data"], json!([{"a": ""}, {"a": "b"}]));
        assert_eq!(writer(json!({})).render(&doc).unwrap(), "a\n\nb");

        // Only the final delimiter is dropped
        let doc = r.parse("a\n1\n\n").unwrap();
        assert_eq!(doc["data"], json!([{"a": 1.0}, {"a": ""}]));
    }

    #[test]
    fn test_duplicate_header_names() {
        let doc = reader(json!({})).parse("a,a\n1,2").unwrap();
        assert_eq!(doc["data"], json!([{"a": 2.0}]));
        assert!(matches!(
            reader(json!({"strict": true})).parse("a,a\n1,2"),
            Err(EngineError::MalformedInput(_))
        ));
    }

    #[test]
    fn test_records_round_trip() {
        let doc = json!({"data": [{"x": 1.0, "label": "a"}, {"x": 2.5, "label": "b"}]});
        let text = writer(json!({})).render(&doc).unwrap();
        assert_eq!(reader(json!({})).parse(&text).unwrap(), doc);
    }
}

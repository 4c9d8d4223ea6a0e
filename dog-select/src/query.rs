//! Select query description: the expression plus how the server should read
//! the source object and serialize the matching records.
//!
//! Field names follow the object-store wire names so a query can be written
//! as JSON:
//!
//! ```rust
//! use dog_select::SelectQuery;
//!
//! let query: SelectQuery = serde_json::from_str(r#"{
//!     "Expression": "select * from COSObject",
//!     "InputSerialization": { "CSV": { "FileHeaderInfo": "USE" } },
//!     "OutputSerialization": { "JSON": { "RecordDelimiter": "\n" } }
//! }"#).unwrap();
//!
//! assert_eq!(query.output.extension(), "json");
//! ```

use serde::{Deserialize, Serialize};

/// A server-side select request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SelectQuery {
    pub expression: String,

    #[serde(default)]
    pub expression_type: ExpressionType,

    #[serde(rename = "InputSerialization")]
    pub input: InputSerialization,

    #[serde(rename = "OutputSerialization")]
    pub output: OutputSerialization,

    #[serde(default)]
    pub request_progress: bool,
}

impl SelectQuery {
    /// SQL query reading CSV with a header row and writing CSV
    pub fn sql<S: Into<String>>(expression: S) -> Self {
        Self {
            expression: expression.into(),
            expression_type: ExpressionType::Sql,
            input: InputSerialization::csv(CsvInput::default()),
            output: OutputSerialization::Csv(CsvOutput::default()),
            request_progress: false,
        }
    }

    pub fn with_input(mut self, input: InputSerialization) -> Self {
        self.input = input;
        self
    }

    pub fn with_output(mut self, output: OutputSerialization) -> Self {
        self.output = output;
        self
    }

    pub fn with_request_progress(mut self) -> Self {
        self.request_progress = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExpressionType {
    #[default]
    #[serde(rename = "SQL")]
    Sql,
}

impl ExpressionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sql => "SQL",
        }
    }
}

/// How the server reads the source object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSerialization {
    #[serde(rename = "CompressionType", default, skip_serializing_if = "Option::is_none")]
    pub compression: Option<CompressionType>,

    #[serde(flatten)]
    pub format: InputFormat,
}

impl InputSerialization {
    pub fn csv(input: CsvInput) -> Self {
        Self {
            compression: None,
            format: InputFormat::Csv(input),
        }
    }

    pub fn json(json_type: JsonType) -> Self {
        Self {
            compression: None,
            format: InputFormat::Json(JsonInput { json_type }),
        }
    }

    pub fn parquet() -> Self {
        Self {
            compression: None,
            format: InputFormat::Parquet(ParquetInput {}),
        }
    }

    pub fn with_compression(mut self, compression: CompressionType) -> Self {
        self.compression = Some(compression);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InputFormat {
    #[serde(rename = "CSV")]
    Csv(CsvInput),
    #[serde(rename = "JSON")]
    Json(JsonInput),
    #[serde(rename = "Parquet")]
    Parquet(ParquetInput),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CompressionType {
    None,
    Gzip,
    Bzip2,
}

impl CompressionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Gzip => "GZIP",
            Self::Bzip2 => "BZIP2",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FileHeaderInfo {
    #[default]
    Use,
    Ignore,
    None,
}

impl FileHeaderInfo {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Use => "USE",
            Self::Ignore => "IGNORE",
            Self::None => "NONE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CsvInput {
    pub file_header_info: FileHeaderInfo,
    pub record_delimiter: String,
    pub field_delimiter: String,
    pub quote_character: String,
    pub quote_escape_character: String,
    pub comments: Option<String>,
    pub allow_quoted_record_delimiter: bool,
}

impl Default for CsvInput {
    fn default() -> Self {
        Self {
            file_header_info: FileHeaderInfo::Use,
            record_delimiter: "\n".to_string(),
            field_delimiter: ",".to_string(),
            quote_character: "\"".to_string(),
            quote_escape_character: "\"".to_string(),
            comments: None,
            allow_quoted_record_delimiter: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JsonType {
    #[default]
    Document,
    Lines,
}

impl JsonType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Document => "DOCUMENT",
            Self::Lines => "LINES",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JsonInput {
    #[serde(rename = "Type", default)]
    pub json_type: JsonType,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ParquetInput {}

/// How the server serializes matching records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OutputSerialization {
    #[serde(rename = "CSV")]
    Csv(CsvOutput),
    #[serde(rename = "JSON")]
    Json(JsonOutput),
}

impl OutputSerialization {
    /// File extension of the declared output format
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv(_) => "csv",
            Self::Json(_) => "json",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Csv(_) => "text/csv",
            Self::Json(_) => "application/json",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QuoteFields {
    #[default]
    Asneeded,
    Always,
}

impl QuoteFields {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asneeded => "ASNEEDED",
            Self::Always => "ALWAYS",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CsvOutput {
    pub quote_fields: QuoteFields,
    pub record_delimiter: String,
    pub field_delimiter: String,
    pub quote_character: String,
    pub quote_escape_character: String,
}

impl Default for CsvOutput {
    fn default() -> Self {
        Self {
            quote_fields: QuoteFields::Asneeded,
            record_delimiter: "\n".to_string(),
            field_delimiter: ",".to_string(),
            quote_character: "\"".to_string(),
            quote_escape_character: "\"".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct JsonOutput {
    pub record_delimiter: String,
}

impl Default for JsonOutput {
    fn default() -> Self {
        Self {
            record_delimiter: "\n".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_csv_to_json_query() {
        let query: SelectQuery = serde_json::from_str(
            r##"{
                "Expression": "Select * from COSObject",
                "ExpressionType": "SQL",
                "InputSerialization": {
                    "CompressionType": "GZIP",
                    "CSV": { "FileHeaderInfo": "IGNORE", "Comments": "#" }
                },
                "OutputSerialization": { "JSON": { "RecordDelimiter": "\n" } },
                "RequestProgress": true
            }"##,
        )
        .unwrap();

        assert_eq!(query.expression_type, ExpressionType::Sql);
        assert_eq!(query.input.compression, Some(CompressionType::Gzip));
        match &query.input.format {
            InputFormat::Csv(csv) => {
                assert_eq!(csv.file_header_info, FileHeaderInfo::Ignore);
                assert_eq!(csv.comments.as_deref(), Some("#"));
                assert_eq!(csv.field_delimiter, ",");
            }
            other => panic!("expected CSV input, got {:?}", other),
        }
        assert_eq!(query.output.extension(), "json");
        assert_eq!(query.output.content_type(), "application/json");
        assert!(query.request_progress);
    }

    #[test]
    fn test_parses_json_lines_input() {
        let query: SelectQuery = serde_json::from_str(
            r#"{
                "Expression": "select s.id from COSObject s",
                "InputSerialization": { "JSON": { "Type": "LINES" } },
                "OutputSerialization": { "CSV": {} }
            }"#,
        )
        .unwrap();

        assert_eq!(query.input.format, InputFormat::Json(JsonInput { json_type: JsonType::Lines }));
        assert_eq!(query.output, OutputSerialization::Csv(CsvOutput::default()));
        assert_eq!(query.output.extension(), "csv");
    }
}

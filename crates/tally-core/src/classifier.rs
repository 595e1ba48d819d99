//! Decides which rendering variant a backend reply maps to.
//!
//! Replies arrive either as a spreadsheet byte stream or as a JSON record
//! with loosely typed `isTable`/`isChart` flags. Classification turns both
//! into one closed [`Classification`] so nothing downstream has to re-check
//! flags against payload presence.

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::BackendError;
use crate::message::{ChartKind, ChartSpec, Message, Row, Table};

/// Saved file name when the backend does not suggest a usable one.
pub const FALLBACK_FILENAME: &str = "financial-report.xlsx";

const SPREADSHEET_CONTENT_TYPES: &[&str] = &[
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.ms-excel",
];

const SPREADSHEET_EXTENSIONS: &[&str] = &[".xlsx", ".xls"];

/// A backend reply before interpretation.
#[derive(Debug, Clone, Default)]
pub struct RawReply {
    pub status: u16,
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
    pub body: Vec<u8>,
}

impl RawReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether the content type names a spreadsheet.
    pub fn is_spreadsheet(&self) -> bool {
        self.content_type.as_deref().is_some_and(|ct| {
            let mime = ct.split(';').next().unwrap_or_default().trim();
            SPREADSHEET_CONTENT_TYPES
                .iter()
                .any(|known| mime.eq_ignore_ascii_case(known))
        })
    }

    /// Whether the disposition asks for the body to be saved rather than shown.
    pub fn is_attachment(&self) -> bool {
        self.content_disposition.as_deref().is_some_and(|d| {
            d.split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .eq_ignore_ascii_case("attachment")
        })
    }
}

fn has_spreadsheet_extension(filename: &str) -> bool {
    let lower = filename.to_ascii_lowercase();
    SPREADSHEET_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Wire shape of a structured reply. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StructuredReply {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    is_table: Option<bool>,
    #[serde(default)]
    table_data: Option<Value>,
    #[serde(default)]
    is_chart: Option<bool>,
    #[serde(default)]
    chart_config: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartConfig {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    options: Option<Value>,
}

/// The outcome of classifying one reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    /// Spreadsheet bytes to be saved under `filename`.
    FileTransfer { filename: String, bytes: Vec<u8> },
    ServerError { detail: Option<String> },
    Table { text: String, table: Table },
    Chart { text: String, chart: ChartSpec },
    UnsupportedChart { requested: String },
    PlainText { text: String },
}

impl Classification {
    /// Conversation entry for this reply. For a file transfer this is the
    /// acknowledgement, so the bytes must be saved before calling it.
    pub fn into_message(self) -> Message {
        match self {
            Classification::FileTransfer { filename, .. } => Message::download_ack(filename),
            Classification::ServerError { detail } => Message::server_error(detail),
            Classification::Table { text, table } => Message::table(text, table),
            Classification::Chart { text, chart } => Message::chart(text, chart),
            Classification::UnsupportedChart { requested } => Message::unsupported_chart(requested),
            Classification::PlainText { text } => Message::assistant(text),
        }
    }

    pub fn variant_name(&self) -> &'static str {
        match self {
            Classification::FileTransfer { .. } => "file_transfer",
            Classification::ServerError { .. } => "server_error",
            Classification::Table { .. } => "table",
            Classification::Chart { .. } => "chart",
            Classification::UnsupportedChart { .. } => "unsupported_chart",
            Classification::PlainText { .. } => "plain_text",
        }
    }
}

pub struct ReplyClassifier {
    /// RFC 5987 form: `filename*=UTF-8''percent%20encoded.xlsx`.
    encoded_filename: Regex,
    plain_filename: Regex,
}

impl ReplyClassifier {
    /// # Errors
    /// Returns an error if a disposition pattern fails to compile.
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            encoded_filename: Regex::new(r"(?i)filename\*\s*=\s*[\w-]*'[^']*'([^;\s]+)")?,
            plain_filename: Regex::new(
                r#"(?i)(?:^|[;\s])filename\s*=\s*(?:"([^"]*)"|([^;\s]+))"#,
            )?,
        })
    }

    /// Classify a reply.
    ///
    /// # Errors
    /// Returns [`BackendError::MalformedReply`] when a successful reply is
    /// neither a spreadsheet nor a JSON object.
    pub fn classify(&self, raw: RawReply) -> Result<Classification, BackendError> {
        let suggested = raw
            .content_disposition
            .as_deref()
            .and_then(|d| self.filename_from_disposition(d));

        // Some servers send spreadsheets as application/octet-stream; the
        // attachment's extension still identifies them.
        let named_spreadsheet =
            raw.is_attachment() && suggested.as_deref().is_some_and(has_spreadsheet_extension);

        if raw.is_spreadsheet() || named_spreadsheet {
            return Ok(Classification::FileTransfer {
                filename: suggested.unwrap_or_else(|| FALLBACK_FILENAME.to_string()),
                bytes: raw.body,
            });
        }

        if !raw.is_success() {
            // A failing backend may not send JSON at all; it was still reachable.
            let detail = serde_json::from_slice::<StructuredReply>(&raw.body)
                .ok()
                .and_then(|reply| reply.error);
            return Ok(Classification::ServerError { detail });
        }

        let reply: StructuredReply = serde_json::from_slice(&raw.body)?;
        Ok(classify_structured(reply))
    }

    /// Extract the suggested file name from a content-disposition value.
    ///
    /// `filename*=` wins when it percent-decodes to valid UTF-8; otherwise
    /// the plain `filename=` value is used.
    pub fn filename_from_disposition(&self, disposition: &str) -> Option<String> {
        let encoded = self
            .encoded_filename
            .captures(disposition)
            .and_then(|c| c.get(1))
            .and_then(|m| urlencoding::decode(m.as_str()).ok())
            .map(|name| name.trim().to_string());

        let plain = || {
            let captures = self.plain_filename.captures(disposition)?;
            let name = captures.get(1).or_else(|| captures.get(2))?.as_str().trim();
            Some(name.to_string())
        };

        encoded
            .filter(|name| !name.is_empty())
            .or_else(plain)
            .filter(|name| !name.is_empty())
    }
}

fn classify_structured(reply: StructuredReply) -> Classification {
    let text = reply.response.unwrap_or_default();

    if text.is_empty() {
        if let Some(error) = reply.error.filter(|e| !e.trim().is_empty()) {
            return Classification::ServerError {
                detail: Some(error),
            };
        }
    }

    if reply.is_table.unwrap_or(false) {
        match reply.table_data.and_then(table_rows).and_then(Table::new) {
            Some(table) => return Classification::Table { text, table },
            None => debug!("isTable set without usable tableData; falling back to text"),
        }
    }

    if reply.is_chart.unwrap_or(false) {
        let config = reply
            .chart_config
            .filter(Value::is_object)
            .and_then(|v| serde_json::from_value::<ChartConfig>(v).ok());
        match config {
            Some(config) => {
                let kind = match config.kind.as_deref() {
                    None => Some(ChartKind::Bar),
                    Some(name) => ChartKind::from_name(name),
                };
                return match kind {
                    Some(kind) => Classification::Chart {
                        text,
                        chart: ChartSpec {
                            kind,
                            data: config.data,
                            options: config.options,
                        },
                    },
                    None => Classification::UnsupportedChart {
                        requested: config.kind.unwrap_or_default(),
                    },
                };
            }
            None => debug!("isChart set without usable chartConfig; falling back to text"),
        }
    }

    Classification::PlainText { text }
}

/// Rows of a table payload; `None` unless every entry is an object.
fn table_rows(data: Value) -> Option<Vec<Row>> {
    let Value::Array(items) = data else {
        return None;
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::Object(row) => Some(row),
            _ => None,
        })
        .collect()
}

//! Conversation entries and the payload shapes a reply can take.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    User,
    Assistant,
}

/// One turn of the conversation.
///
/// Messages are never edited once appended to a conversation; the store only
/// hands out clones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub origin: Origin,
    pub text: String,
    pub payload: Payload,
}

/// The rendering variant attached to a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    PlainText,
    Table(Table),
    Chart(ChartSpec),
    FileDownloadAck { filename: String },
    Notice(NoticeKind),
}

/// Visible failure notices. Each one ends a turn in place of a normal reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "notice", rename_all = "snake_case")]
pub enum NoticeKind {
    ServerError,
    UnsupportedChart { requested: String },
    NetworkError,
    DownloadFailed,
}

pub const GENERIC_SERVER_ERROR: &str = "Sorry, something went wrong on the server.";
pub const NETWORK_ERROR: &str = "Sorry, a network error occurred. Please check the connection.";

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            origin: Origin::User,
            text: text.into(),
            payload: Payload::PlainText,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            origin: Origin::Assistant,
            text: text.into(),
            payload: Payload::PlainText,
        }
    }

    pub fn table(text: impl Into<String>, table: Table) -> Self {
        Self {
            origin: Origin::Assistant,
            text: text.into(),
            payload: Payload::Table(table),
        }
    }

    pub fn chart(text: impl Into<String>, chart: ChartSpec) -> Self {
        Self {
            origin: Origin::Assistant,
            text: text.into(),
            payload: Payload::Chart(chart),
        }
    }

    /// Acknowledges that a file transfer was saved locally.
    pub fn download_ack(filename: impl Into<String>) -> Self {
        let filename = filename.into();
        Self {
            origin: Origin::Assistant,
            text: format!("Your download for \"{}\" has started.", filename),
            payload: Payload::FileDownloadAck { filename },
        }
    }

    /// Server-side failure. The backend's own message is shown verbatim when
    /// it sent one.
    pub fn server_error(detail: Option<String>) -> Self {
        let text = detail
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| GENERIC_SERVER_ERROR.to_string());
        Self::notice(NoticeKind::ServerError, text)
    }

    pub fn unsupported_chart(requested: impl Into<String>) -> Self {
        let requested = requested.into();
        Self::notice(
            NoticeKind::UnsupportedChart {
                requested: requested.clone(),
            },
            format!("Unsupported chart type: {}", requested),
        )
    }

    /// Transport failure. Only the short diagnostic label is appended.
    pub fn network_error(diagnostic: &str) -> Self {
        Self::notice(
            NoticeKind::NetworkError,
            format!("{} ({})", NETWORK_ERROR, diagnostic),
        )
    }

    pub fn download_failed(filename: &str) -> Self {
        Self::notice(
            NoticeKind::DownloadFailed,
            format!("Sorry, the download for \"{}\" could not be saved.", filename),
        )
    }

    fn notice(kind: NoticeKind, text: String) -> Self {
        Self {
            origin: Origin::Assistant,
            text,
            payload: Payload::Notice(kind),
        }
    }

    pub fn is_notice(&self) -> bool {
        matches!(self.payload, Payload::Notice(_))
    }
}

/// A message as the backend expects it in the `history` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Origin,
    pub content: String,
}

/// Project messages into backend history entries, in order.
///
/// Pure function of its input; callers decide which messages to include.
pub fn to_backend_history(messages: &[Message]) -> Vec<HistoryEntry> {
    messages
        .iter()
        .map(|msg| HistoryEntry {
            role: msg.origin,
            content: msg.text.clone(),
        })
        .collect()
}

// ============================================================================
// Tables
// ============================================================================

/// One table row: column name to scalar, in backend key order.
pub type Row = Map<String, Value>;

/// Tabular reply data. Always holds at least one row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    rows: Vec<Row>,
}

impl Table {
    /// Returns `None` for an empty row set.
    pub fn new(rows: Vec<Row>) -> Option<Self> {
        if rows.is_empty() {
            None
        } else {
            Some(Self { rows })
        }
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Column names, taken from the first row's keys in insertion order.
    pub fn columns(&self) -> Vec<&str> {
        self.rows
            .first()
            .map(|row| row.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Display label for a column (`tax_year` -> `tax year`).
    pub fn header_label(column: &str) -> String {
        column.replace('_', " ")
    }

    /// Display text for one cell. Keys missing from a row render empty.
    pub fn cell_text(row: &Row, column: &str) -> String {
        match row.get(column) {
            None => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }
}

// ============================================================================
// Charts
// ============================================================================

/// Chart kinds the presentation layer knows how to draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Bar,
    Line,
    Pie,
    Doughnut,
    Radar,
    PolarArea,
    Bubble,
    Scatter,
}

impl ChartKind {
    pub fn all() -> Vec<ChartKind> {
        vec![
            ChartKind::Bar,
            ChartKind::Line,
            ChartKind::Pie,
            ChartKind::Doughnut,
            ChartKind::Radar,
            ChartKind::PolarArea,
            ChartKind::Bubble,
            ChartKind::Scatter,
        ]
    }

    /// Case-insensitive; `polarArea`, `polar-area` and `polar_area` all match.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "bar" => Some(ChartKind::Bar),
            "line" => Some(ChartKind::Line),
            "pie" => Some(ChartKind::Pie),
            "doughnut" => Some(ChartKind::Doughnut),
            "radar" => Some(ChartKind::Radar),
            "polararea" | "polar-area" | "polar_area" => Some(ChartKind::PolarArea),
            "bubble" => Some(ChartKind::Bubble),
            "scatter" => Some(ChartKind::Scatter),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChartKind::Bar => "bar",
            ChartKind::Line => "line",
            ChartKind::Pie => "pie",
            ChartKind::Doughnut => "doughnut",
            ChartKind::Radar => "radar",
            ChartKind::PolarArea => "polar-area",
            ChartKind::Bubble => "bubble",
            ChartKind::Scatter => "scatter",
        }
    }

    /// Scatter and bubble plot `{x, y}` points instead of labelled values.
    pub fn is_point_based(&self) -> bool {
        matches!(self, ChartKind::Bubble | ChartKind::Scatter)
    }
}

/// A renderable chart: kind, Chart.js-shaped data and optional overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    pub kind: ChartKind,
    pub data: Value,
    pub options: Option<Value>,
}

/// Options applied to every chart before the reply's own overrides.
pub fn default_chart_options() -> Value {
    json!({
        "responsive": true,
        "maintainAspectRatio": false,
        "plugins": {
            "legend": { "position": "top" },
            "title": { "display": false }
        },
        "scales": {
            "x": {
                "ticks": { "autoSkip": false, "maxRotation": 45, "minRotation": 30, "font": { "size": 12 } },
                "grid": { "display": false }
            },
            "y": {
                "beginAtZero": true,
                "ticks": { "font": { "size": 12 } },
                "grid": { "color": "#eee" }
            }
        }
    })
}

/// A numeric data point. Category charts only fill `y`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataPoint {
    pub x: Option<f64>,
    pub y: f64,
    pub r: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub label: String,
    /// `None` marks a gap (non-numeric entry).
    pub values: Vec<Option<DataPoint>>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChartSeries {
    pub labels: Vec<String>,
    pub datasets: Vec<Dataset>,
}

impl ChartSpec {
    /// Defaults shallow-merged with the reply's options; reply keys win.
    pub fn effective_options(&self) -> Value {
        let mut merged = default_chart_options();
        if let (Value::Object(base), Some(Value::Object(overrides))) =
            (&mut merged, self.options.as_ref())
        {
            for (key, value) in overrides {
                base.insert(key.clone(), value.clone());
            }
        }
        merged
    }

    /// Whether dataset names are shown (`plugins.legend.display`, default on).
    pub fn legend_visible(&self) -> bool {
        self.effective_options()
            .pointer("/plugins/legend/display")
            .and_then(Value::as_bool)
            .unwrap_or(true)
    }

    /// Title text when `plugins.title.display` is on and text is given.
    pub fn title(&self) -> Option<String> {
        let options = self.effective_options();
        let title = options.pointer("/plugins/title")?;
        if !title.get("display").and_then(Value::as_bool).unwrap_or(false) {
            return None;
        }
        let text = match title.get("text")? {
            Value::String(s) => s.trim().to_string(),
            // Multi-line titles arrive as an array of lines.
            Value::Array(lines) => lines
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(" "),
            _ => return None,
        };
        Some(text).filter(|t| !t.is_empty())
    }

    /// Pull labels and datasets out of Chart.js-shaped `data`.
    pub fn series(&self) -> ChartSeries {
        let labels = self
            .data
            .get("labels")
            .and_then(Value::as_array)
            .map(|labels| {
                labels
                    .iter()
                    .map(|l| match l {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let datasets = self
            .data
            .get("datasets")
            .and_then(Value::as_array)
            .map(|sets| {
                sets.iter()
                    .enumerate()
                    .map(|(i, set)| Dataset {
                        label: set
                            .get("label")
                            .and_then(Value::as_str)
                            .map(str::to_string)
                            .unwrap_or_else(|| format!("Series {}", i + 1)),
                        values: set
                            .get("data")
                            .and_then(Value::as_array)
                            .map(|points| points.iter().map(parse_point).collect())
                            .unwrap_or_default(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        ChartSeries { labels, datasets }
    }
}

fn parse_point(value: &Value) -> Option<DataPoint> {
    match value {
        Value::Number(n) => n.as_f64().map(|y| DataPoint { x: None, y, r: None }),
        Value::Object(obj) => {
            let y = obj.get("y").and_then(Value::as_f64)?;
            Some(DataPoint {
                x: obj.get("x").and_then(Value::as_f64),
                y,
                r: obj.get("r").and_then(Value::as_f64),
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_columns_follow_first_row_order() {
        let table = Table::new(vec![
            row(json!({"name": "A", "value": 1})),
            row(json!({"value": 2, "name": "B"})),
        ])
        .unwrap();
        assert_eq!(table.columns(), vec!["name", "value"]);
    }

    #[test]
    fn test_empty_table_is_rejected() {
        assert!(Table::new(Vec::new()).is_none());
    }

    #[test]
    fn test_cell_text_stringifies_scalars() {
        let r = row(json!({"entity": "Tropicana", "etr": 17.5, "filed": true, "note": null}));
        assert_eq!(Table::cell_text(&r, "entity"), "Tropicana");
        assert_eq!(Table::cell_text(&r, "etr"), "17.5");
        assert_eq!(Table::cell_text(&r, "filed"), "true");
        assert_eq!(Table::cell_text(&r, "note"), "null");
        assert_eq!(Table::cell_text(&r, "missing"), "");
    }

    #[test]
    fn test_header_label_replaces_underscores() {
        assert_eq!(Table::header_label("statutory_tax_rate"), "statutory tax rate");
    }

    #[test]
    fn test_chart_kind_names() {
        assert_eq!(ChartKind::from_name("pie"), Some(ChartKind::Pie));
        assert_eq!(ChartKind::from_name("BAR"), Some(ChartKind::Bar));
        assert_eq!(ChartKind::from_name("polarArea"), Some(ChartKind::PolarArea));
        assert_eq!(ChartKind::from_name("polar-area"), Some(ChartKind::PolarArea));
        assert_eq!(ChartKind::from_name("polar_area"), Some(ChartKind::PolarArea));
        assert_eq!(ChartKind::from_name(" Doughnut "), Some(ChartKind::Doughnut));
        assert_eq!(ChartKind::from_name("unknownkind"), None);
        assert_eq!(ChartKind::from_name("b-a-r"), None);
        assert_eq!(ChartKind::from_name("pi_e"), None);
        assert_eq!(ChartKind::from_name("polar--area"), None);
        for kind in ChartKind::all() {
            assert_eq!(ChartKind::from_name(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn test_effective_options_override_top_level_keys() {
        let spec = ChartSpec {
            kind: ChartKind::Line,
            data: json!({}),
            options: Some(json!({"responsive": false, "indexAxis": "y"})),
        };
        let options = spec.effective_options();
        assert_eq!(options["responsive"], json!(false));
        assert_eq!(options["indexAxis"], json!("y"));
        assert_eq!(options["maintainAspectRatio"], json!(false));
        assert_eq!(options["plugins"]["legend"]["position"], json!("top"));
    }

    #[test]
    fn test_effective_options_without_overrides_are_defaults() {
        let spec = ChartSpec {
            kind: ChartKind::Bar,
            data: json!({}),
            options: None,
        };
        assert_eq!(spec.effective_options(), default_chart_options());
    }

    #[test]
    fn test_legend_and_title_follow_merged_options() {
        let plain = ChartSpec {
            kind: ChartKind::Bar,
            data: json!({}),
            options: None,
        };
        assert!(plain.legend_visible());
        assert_eq!(plain.title(), None);

        let styled = ChartSpec {
            kind: ChartKind::Bar,
            data: json!({}),
            options: Some(json!({
                "plugins": {
                    "legend": {"display": false},
                    "title": {"display": true, "text": ["Top 5 ETR", "YA 2024"]}
                }
            })),
        };
        assert!(!styled.legend_visible());
        assert_eq!(styled.title(), Some("Top 5 ETR YA 2024".to_string()));

        // Overriding `plugins` replaces the default block wholesale.
        let hidden_title = ChartSpec {
            kind: ChartKind::Line,
            data: json!({}),
            options: Some(json!({"plugins": {"title": {"display": false, "text": "QE vs CA"}}})),
        };
        assert!(hidden_title.legend_visible());
        assert_eq!(hidden_title.title(), None);
    }

    #[test]
    fn test_series_from_category_data() {
        let spec = ChartSpec {
            kind: ChartKind::Pie,
            data: json!({
                "labels": ["Alpha", "Beta", 2024],
                "datasets": [{"label": "ETR", "data": [12.5, "n/a", 30]}]
            }),
            options: None,
        };
        let series = spec.series();
        assert_eq!(series.labels, vec!["Alpha", "Beta", "2024"]);
        assert_eq!(series.datasets.len(), 1);
        assert_eq!(series.datasets[0].label, "ETR");
        assert_eq!(
            series.datasets[0].values,
            vec![
                Some(DataPoint { x: None, y: 12.5, r: None }),
                None,
                Some(DataPoint { x: None, y: 30.0, r: None }),
            ]
        );
    }

    #[test]
    fn test_series_from_point_data() {
        let spec = ChartSpec {
            kind: ChartKind::Bubble,
            data: json!({"datasets": [{"data": [{"x": 1, "y": 2, "r": 5}]}]}),
            options: None,
        };
        let series = spec.series();
        assert!(series.labels.is_empty());
        assert_eq!(series.datasets[0].label, "Series 1");
        assert_eq!(
            series.datasets[0].values,
            vec![Some(DataPoint { x: Some(1.0), y: 2.0, r: Some(5.0) })]
        );
    }

    #[test]
    fn test_backend_history_roles() {
        let messages = vec![
            Message::user("What is the ETR?"),
            Message::assistant("About 17%."),
            Message::network_error("timeout"),
        ];
        let history = to_backend_history(&messages);
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].role, Origin::User);
        assert_eq!(history[1].role, Origin::Assistant);
        assert_eq!(history[2].role, Origin::Assistant);
        assert_eq!(history[1].content, "About 17%.");

        let wire = serde_json::to_value(&history[0]).unwrap();
        assert_eq!(wire, json!({"role": "user", "content": "What is the ETR?"}));
    }

    #[test]
    fn test_notice_texts() {
        let msg = Message::download_ack("report.xlsx");
        assert_eq!(msg.text, "Your download for \"report.xlsx\" has started.");

        let msg = Message::server_error(None);
        assert_eq!(msg.text, GENERIC_SERVER_ERROR);
        let msg = Message::server_error(Some("Query quota exceeded".to_string()));
        assert_eq!(msg.text, "Query quota exceeded");

        let msg = Message::unsupported_chart("unknownkind");
        assert_eq!(msg.text, "Unsupported chart type: unknownkind");
        assert!(msg.is_notice());

        let msg = Message::network_error("timeout");
        assert!(msg.text.starts_with(NETWORK_ERROR));
        assert!(msg.text.ends_with("(timeout)"));
    }
}

//! Local persistence for file transfers and table exports.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::info;

use crate::error::DownloadError;
use crate::message::Table;

/// Somewhere to put files the backend sends us.
#[async_trait]
pub trait FileSink: Send + Sync {
    /// Save `bytes` under `filename`, returning where they ended up.
    async fn save(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf, DownloadError>;
}

/// Saves into a single directory, created on first use.
#[derive(Debug, Clone)]
pub struct DownloadDir {
    dir: PathBuf,
}

impl DownloadDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Target path for `filename`, confined to the download directory.
    pub fn target_for(&self, filename: &str) -> Result<PathBuf, DownloadError> {
        let name = safe_file_name(filename)
            .ok_or_else(|| DownloadError::EmptyFilename(filename.to_string()))?;
        Ok(self.dir.join(name))
    }
}

#[async_trait]
impl FileSink for DownloadDir {
    async fn save(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf, DownloadError> {
        let target = self.target_for(filename)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(&target, bytes).await?;
        info!(path = %target.display(), bytes = bytes.len(), "saved download");
        Ok(target)
    }
}

/// Final path component of a backend-suggested name, if it has one.
fn safe_file_name(filename: &str) -> Option<String> {
    let last = filename.rsplit(['/', '\\']).next()?.trim();
    if last.is_empty() || last == "." || last == ".." {
        None
    } else {
        Some(last.to_string())
    }
}

// ============================================================================
// Table export
// ============================================================================

/// Serialize a table to CSV: header labels, then one line per row.
pub fn table_to_csv(table: &Table) -> String {
    let columns = table.columns();
    let mut out = String::new();

    let header: Vec<String> = columns
        .iter()
        .map(|c| csv_field(&Table::header_label(c)))
        .collect();
    out.push_str(&header.join(","));
    out.push('\n');

    for row in table.rows() {
        let cells: Vec<String> = columns
            .iter()
            .map(|c| csv_field(&Table::cell_text(row, c)))
            .collect();
        out.push_str(&cells.join(","));
        out.push('\n');
    }

    out
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Write a table as `table-<n>.csv` through `sink`.
pub async fn export_table(
    sink: &dyn FileSink,
    table: &Table,
    n: usize,
) -> Result<PathBuf, DownloadError> {
    let filename = format!("table-{}.csv", n);
    sink.save(&filename, table_to_csv(table).as_bytes()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn sample_table() -> Table {
        let rows = vec![
            json!({"entity_name": "Tropicana, Ltd", "etr": 17.5}),
            json!({"entity_name": "Say \"hi\"", "etr": null}),
        ]
        .into_iter()
        .map(|v| v.as_object().unwrap().clone())
        .collect();
        Table::new(rows).unwrap()
    }

    #[test]
    fn test_safe_file_name_strips_directories() {
        assert_eq!(safe_file_name("report.xlsx"), Some("report.xlsx".to_string()));
        assert_eq!(safe_file_name("../../etc/passwd"), Some("passwd".to_string()));
        assert_eq!(safe_file_name("C:\\temp\\q1.xlsx"), Some("q1.xlsx".to_string()));
        assert_eq!(safe_file_name("reports/"), None);
        assert_eq!(safe_file_name(".."), None);
        assert_eq!(safe_file_name("  "), None);
    }

    #[tokio::test]
    async fn test_save_writes_into_download_dir() {
        let tmp = TempDir::new().unwrap();
        let sink = DownloadDir::new(tmp.path().join("downloads"));

        let path = sink.save("../report.xlsx", b"PK\x03\x04").await.unwrap();
        assert_eq!(path, tmp.path().join("downloads").join("report.xlsx"));
        assert_eq!(std::fs::read(&path).unwrap(), b"PK\x03\x04".to_vec());
    }

    #[tokio::test]
    async fn test_save_rejects_empty_name() {
        let tmp = TempDir::new().unwrap();
        let sink = DownloadDir::new(tmp.path());
        let err = sink.save("/", b"x").await.unwrap_err();
        assert!(matches!(err, DownloadError::EmptyFilename(_)));
    }

    #[test]
    fn test_table_to_csv_quotes_fields() {
        let csv = table_to_csv(&sample_table());
        assert_eq!(
            csv,
            "entity name,etr\n\"Tropicana, Ltd\",17.5\n\"Say \"\"hi\"\"\",null\n"
        );
    }

    #[tokio::test]
    async fn test_export_table_names_file_by_index() {
        let tmp = TempDir::new().unwrap();
        let sink = DownloadDir::new(tmp.path());
        let path = export_table(&sink, &sample_table(), 3).await.unwrap();
        assert_eq!(path.file_name().unwrap(), "table-3.csv");
        let written = std::fs::read_to_string(path).unwrap();
        assert!(written.starts_with("entity name,etr\n"));
    }
}

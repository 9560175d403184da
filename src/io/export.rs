//! Whole-store JSON export: `{table: [row, ...]}` with facts before derived
//! tables and columns in schema order.

use serde_json::{Map, Value};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::errors::Result;
use crate::store::DoraStore;

pub struct JsonExporter<W: Write> {
    writer: W,
}

impl<W: Write> JsonExporter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write every table; returns the number of rows written.
    pub fn write_store(&mut self, store: &DoraStore) -> Result<usize> {
        let mut document = Map::new();
        let mut rows = 0;
        for table in DoraStore::table_names() {
            let table_rows = store.table_rows(table)?;
            rows += table_rows.len();
            document.insert(
                table.to_string(),
                Value::Array(table_rows.into_iter().map(Value::Object).collect()),
            );
        }
        serde_json::to_writer_pretty(&mut self.writer, &Value::Object(document))?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(rows)
    }
}

/// Export the store to `path`, creating parent directories as needed.
pub fn export_all(store: &DoraStore, path: &Path) -> Result<usize> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    let rows = JsonExporter::new(BufWriter::new(file)).write_store(store)?;
    tracing::info!(path = %path.display(), rows, "Exported tables to JSON");
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::IngestRun;
    use crate::testkit::{deployment, ts};

    #[test]
    fn test_export_keeps_table_and_column_order() {
        let mut store = DoraStore::open_in_memory().unwrap();
        store
            .upsert_deployments(
                &[deployment(5, "a1", Some("2024-01-01T00:00:00Z"), "success")],
                &IngestRun::starting_at(ts("2024-02-01T00:00:00Z")),
            )
            .unwrap();

        let mut buffer = Vec::new();
        let rows = JsonExporter::new(&mut buffer).write_store(&store).unwrap();
        assert_eq!(rows, 1);

        let doc: Value = serde_json::from_slice(&buffer).unwrap();
        let tables: Vec<&str> = doc.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(tables, DoraStore::table_names().collect::<Vec<_>>());
        let deployment = &doc["fact_deployment"][0];
        let columns: Vec<&str> = deployment
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .take(3)
            .collect();
        assert_eq!(columns, ["deployment_id", "environment", "created_at_utc"]);
        assert_eq!(deployment["deployment_id"], 5);
        assert_eq!(deployment["sha"], "a1");
        assert_eq!(deployment["finished_at_utc"], "2024-01-01T00:00:00Z");
        assert!(doc["dora_events"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_export_all_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/nested/dora.json");
        let store = DoraStore::open_in_memory().unwrap();
        export_all(&store, &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"dora_summary_daily\": []"));
    }
}

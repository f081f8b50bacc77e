// src/schema.rs

use std::{fs, path::Path};

use anyhow::{Context, Result};
use schemars::schema_for;
use serde::Serialize;
use tracing::info;

use crate::{
    catalog::CatalogSnapshot,
    command::{Command, Outcome},
    config::EngineConfig,
    flow::model::FlowDocument,
    realtime::RealtimeEvent,
};

/// Writes one JSON schema per wire type into `out_dir` and returns the file
/// names written.
pub fn write_schema(out_dir: &Path) -> Result<Vec<String>> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create schema directory {}", out_dir.display()))?;

    let schemas = [
        ("flow.schema.json", to_json(&schema_for!(FlowDocument))?),
        ("event.schema.json", to_json(&schema_for!(RealtimeEvent))?),
        ("command.schema.json", to_json(&schema_for!(Command))?),
        ("outcome.schema.json", to_json(&schema_for!(Outcome))?),
        ("catalog.schema.json", to_json(&schema_for!(CatalogSnapshot))?),
        ("config.schema.json", to_json(&schema_for!(EngineConfig))?),
    ];

    let mut written = Vec::with_capacity(schemas.len());
    for (file, json) in schemas {
        let path = out_dir.join(file);
        fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        written.push(file.to_string());
    }
    info!(count = written.len(), dir = %out_dir.display(), "Wrote JSON schemas");
    Ok(written)
}

fn to_json<T: Serialize>(schema: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(schema)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn writes_parseable_schemas() {
        let dir = tempdir().unwrap();
        let written = write_schema(dir.path()).unwrap();
        assert_eq!(written.len(), 6);

        let flow: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("flow.schema.json")).unwrap()).unwrap();
        assert_eq!(flow["title"], "FlowDocument");
        assert!(flow["properties"]["liveMode"].is_object());
    }
}

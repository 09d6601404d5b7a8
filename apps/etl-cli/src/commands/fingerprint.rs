//! Fingerprint command

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;

use etl_core::Fingerprint;

use crate::output::{self, OutputFormat};

#[derive(Debug, Serialize)]
struct Entry {
    path: String,
    fingerprint: Fingerprint,
}

pub async fn run(paths: &[PathBuf], format: OutputFormat) -> Result<()> {
    let mut entries = Vec::with_capacity(paths.len());
    for path in paths {
        let content = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        entries.push(Entry {
            path: path.display().to_string(),
            fingerprint: Fingerprint::of(&content),
        });
    }

    match output::format_structured(&entries, format)? {
        Some(rendered) => println!("{}", rendered),
        None => {
            for entry in &entries {
                println!("{}  {}", entry.fingerprint, entry.path);
            }
        }
    }
    Ok(())
}

//! Schema inspection command

use anyhow::Result;
use tabled::{settings::Style, Table, Tabled};

use etl_core::{timestamp, SchemaVersion};
use etl_ingestion::IngestionPipeline;

use crate::output::{self, OutputFormat};

#[derive(Tabled)]
struct FieldRow {
    #[tabled(rename = "Field")]
    field: String,
    #[tabled(rename = "Type")]
    tag: String,
}

#[derive(Tabled)]
struct VersionRow {
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Fields")]
    fields: usize,
    #[tabled(rename = "Added")]
    added: usize,
    #[tabled(rename = "Removed")]
    removed: usize,
    #[tabled(rename = "Changed")]
    changed: usize,
}

impl From<&SchemaVersion> for VersionRow {
    fn from(version: &SchemaVersion) -> Self {
        let diff = version.diff_from_prev.clone().unwrap_or_default();
        Self {
            version: timestamp::format(&version.version_ts),
            fields: version.schema.len(),
            added: diff.added.len(),
            removed: diff.removed.len(),
            changed: diff.changed.len(),
        }
    }
}

pub async fn run(pipeline: &IngestionPipeline, history: bool, format: OutputFormat) -> Result<()> {
    if history {
        let versions = pipeline.schemas().history().await?;
        match output::format_structured(&versions, format)? {
            Some(rendered) => println!("{}", rendered),
            None if versions.is_empty() => output::info("No schema recorded yet"),
            None => {
                let rows: Vec<VersionRow> = versions.iter().map(VersionRow::from).collect();
                println!("{}", Table::new(rows).with(Style::rounded()));
            }
        }
        return Ok(());
    }

    let latest = pipeline.schemas().latest().await?;
    match output::format_structured(&latest, format)? {
        Some(rendered) => println!("{}", rendered),
        None => match latest {
            None => output::info("No schema recorded yet"),
            Some(version) => print_version(&version),
        },
    }
    Ok(())
}

fn print_version(version: &SchemaVersion) {
    output::key_value("Version", &timestamp::format(&version.version_ts));
    output::key_value("Fields", &version.schema.len().to_string());

    output::section("Schema");
    let rows: Vec<FieldRow> = version
        .schema
        .iter()
        .map(|(field, tag)| FieldRow {
            field: field.clone(),
            tag: tag.to_string(),
        })
        .collect();
    println!("{}", Table::new(rows).with(Style::rounded()));

    if let Some(diff) = version.diff_from_prev.as_ref().filter(|d| !d.is_empty()) {
        output::section("Changes from previous version");
        for (field, tag) in &diff.added {
            println!("  + {} ({})", field, tag);
        }
        for (field, tag) in &diff.removed {
            println!("  - {} ({})", field, tag);
        }
        for (field, change) in &diff.changed {
            println!("  ~ {} ({} -> {})", field, change.from, change.to);
        }
    }
}

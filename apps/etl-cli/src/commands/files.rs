//! Registered files command

use anyhow::Result;
use tabled::{settings::Style, Table, Tabled};

use etl_core::timestamp;
use etl_ingestion::IngestionPipeline;

use crate::output::{self, OutputFormat};

#[derive(Tabled)]
struct FileRow {
    #[tabled(rename = "Fingerprint")]
    fingerprint: String,
    #[tabled(rename = "File")]
    filename: String,
    #[tabled(rename = "Ingested at")]
    ingested_at: String,
}

pub async fn run(pipeline: &IngestionPipeline, format: OutputFormat) -> Result<()> {
    let files = pipeline.registry().list().await?;

    match output::format_structured(&files, format)? {
        Some(rendered) => println!("{}", rendered),
        None if files.is_empty() => output::info("No files ingested yet"),
        None => {
            let rows: Vec<FileRow> = files
                .iter()
                .map(|f| FileRow {
                    fingerprint: f.fingerprint.to_string(),
                    filename: output::truncate(&f.filename, 48),
                    ingested_at: timestamp::format(&f.ingested_at),
                })
                .collect();
            println!("{}", Table::new(rows).with(Style::rounded()));
            output::key_value("Total", &files.len().to_string());
        }
    }
    Ok(())
}

//! Ingest command

use anyhow::{bail, Result};
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;
use tabled::{settings::Style, Table, Tabled};

use etl_core::Fingerprint;
use etl_ingestion::{IngestionPipeline, RawFile};

use crate::output::{self, OutputFormat};

#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
enum Status {
    Ingested,
    Duplicate,
    Failed,
}

/// Per-file line of the run summary
#[derive(Debug, Serialize)]
struct FileReport {
    filename: String,
    size: usize,
    status: Status,
    fingerprint: Option<Fingerprint>,
    inserted_count: u64,
    schema_changed: bool,
    message: String,
}

#[derive(Tabled)]
struct Row {
    #[tabled(rename = "File")]
    file: String,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Fingerprint")]
    fingerprint: String,
    #[tabled(rename = "Inserted")]
    inserted: u64,
    #[tabled(rename = "Status")]
    status: String,
}

impl From<&FileReport> for Row {
    fn from(report: &FileReport) -> Self {
        let status = match report.status {
            Status::Ingested if report.schema_changed => "ingested (new schema)".green().to_string(),
            Status::Ingested => "ingested".green().to_string(),
            Status::Duplicate => "duplicate".yellow().to_string(),
            Status::Failed => "failed".red().to_string(),
        };
        Self {
            file: output::truncate(&report.filename, 40),
            size: output::format_size(report.size),
            fingerprint: report
                .fingerprint
                .as_ref()
                .map(|fp| fp.short().to_string())
                .unwrap_or_else(|| "-".to_string()),
            inserted: report.inserted_count,
            status,
        }
    }
}

pub async fn run(pipeline: &IngestionPipeline, paths: &[PathBuf], format: OutputFormat) -> Result<()> {
    let mut reports = Vec::with_capacity(paths.len());
    let mut files = Vec::with_capacity(paths.len());

    for path in paths {
        match RawFile::from_file(path).await {
            Ok(file) => files.push(file),
            Err(e) => reports.push(FileReport {
                filename: path.display().to_string(),
                size: 0,
                status: Status::Failed,
                fingerprint: None,
                inserted_count: 0,
                schema_changed: false,
                message: e.to_string(),
            }),
        }
    }

    let sizes: Vec<usize> = files.iter().map(|f| f.content.len()).collect();
    for ((filename, result), size) in pipeline.ingest_many(&files).await.into_iter().zip(sizes) {
        reports.push(match result {
            Ok(outcome) => FileReport {
                filename,
                size,
                status: if outcome.duplicate {
                    Status::Duplicate
                } else {
                    Status::Ingested
                },
                fingerprint: Some(outcome.fingerprint),
                inserted_count: outcome.inserted_count,
                schema_changed: outcome.schema_changed,
                message: outcome.message,
            },
            Err(e) => FileReport {
                filename,
                size,
                status: Status::Failed,
                fingerprint: None,
                inserted_count: 0,
                schema_changed: false,
                message: e.to_string(),
            },
        });
    }

    let failed = reports
        .iter()
        .filter(|r| matches!(r.status, Status::Failed))
        .count();

    match output::format_structured(&reports, format)? {
        Some(rendered) => println!("{}", rendered),
        None => print_summary(&reports, failed),
    }

    if failed > 0 {
        bail!("{} of {} files failed to ingest", failed, reports.len());
    }
    Ok(())
}

fn print_summary(reports: &[FileReport], failed: usize) {
    let rows: Vec<Row> = reports.iter().map(Row::from).collect();
    println!("{}", Table::new(rows).with(Style::rounded()));

    for report in reports.iter().filter(|r| matches!(r.status, Status::Failed)) {
        output::error(&format!("{}: {}", report.filename, report.message));
    }

    let inserted: u64 = reports.iter().map(|r| r.inserted_count).sum();
    let duplicates = reports
        .iter()
        .filter(|r| matches!(r.status, Status::Duplicate))
        .count();
    let summary = format!(
        "{} files, {} records inserted, {} duplicates skipped, {} failed",
        reports.len(),
        inserted,
        duplicates,
        failed
    );

    if failed > 0 {
        output::warning(&summary);
    } else {
        output::success(&summary);
    }
}

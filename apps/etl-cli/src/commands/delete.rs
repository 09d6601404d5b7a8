//! Delete command

use anyhow::{bail, Result};

use etl_ingestion::IngestionPipeline;

use crate::output::{self, OutputFormat};

pub async fn run(pipeline: &IngestionPipeline, fingerprint: &str, format: OutputFormat) -> Result<()> {
    let report = pipeline.delete(fingerprint).await?;

    match output::format_structured(&report, format)? {
        Some(rendered) => println!("{}", rendered),
        None => {
            output::key_value("Fingerprint", report.fingerprint.as_str());
            output::key_value("Records deleted", &report.records_deleted.to_string());
            output::key_value("Registry entries deleted", &report.registry_deleted.to_string());
            output::key_value(
                "Archive deleted",
                if report.archive_deleted { "yes" } else { "no" },
            );

            for failure in &report.failures {
                output::warning(&format!("{} not cleaned up: {}", failure.target, failure.message));
            }

            if report.is_complete() {
                if report.removed_anything() {
                    output::success("File removed");
                } else {
                    output::info("Nothing stored under this fingerprint");
                }
            }
        }
    }

    if !report.is_complete() {
        bail!(
            "Delete incomplete: {} of 3 targets failed",
            report.failures.len()
        );
    }
    Ok(())
}

use std::fmt;
use std::path::Path;

#[cfg(feature = "colorized_output")]
use console::style;

use nexuslims_extract::extractors::Extraction;

/// Per-file outcome
#[derive(Debug, Clone)]
struct FileReport {
    path: String,
    records: usize,
    warnings: Vec<String>,
    failure: Option<String>,
}

/// Warnings and recovered failures across an extraction run
#[derive(Debug, Default)]
pub struct ExtractionSummary {
    files: Vec<FileReport>,
}

impl ExtractionSummary {
    pub fn add(&mut self, path: &Path, outcome: &Extraction) {
        let mut warnings: Vec<String> = Vec::new();
        for record in outcome.records() {
            for warning in &record.warnings {
                if !warnings.contains(warning) {
                    warnings.push(warning.clone());
                }
            }
        }
        self.files.push(FileReport {
            path: path.display().to_string(),
            records: outcome.records().len(),
            warnings,
            failure: outcome.reason().map(str::to_string),
        });
    }

    pub fn has_warnings(&self) -> bool {
        self.files
            .iter()
            .any(|f| f.failure.is_some() || !f.warnings.is_empty())
    }

    fn failure_count(&self) -> usize {
        self.files.iter().filter(|f| f.failure.is_some()).count()
    }

    fn record_count(&self) -> usize {
        self.files.iter().map(|f| f.records).sum()
    }

    /// Format the summary with colors (requires console feature)
    pub fn format_colored(&self) -> String {
        #[cfg(feature = "colorized_output")]
        {
            use console::Emoji;

            static OK: Emoji<'_, '_> = Emoji("✓", "[OK]");
            static WARN: Emoji<'_, '_> = Emoji("⚠", "[WARN]");
            static FAIL: Emoji<'_, '_> = Emoji("✗", "[FAIL]");

            let mut output = String::new();
            output.push_str(&format!("{}\n", style("Extraction Summary").bold().cyan()));
            output.push_str(&format!("{}\n", style("==================").cyan()));

            for file in &self.files {
                match (&file.failure, file.warnings.is_empty()) {
                    (Some(reason), _) => output.push_str(&format!(
                        "[{}] {} - {}: {}\n",
                        FAIL,
                        style(&file.path).red(),
                        style("RECOVERED").red().bold(),
                        reason
                    )),
                    (None, false) => output.push_str(&format!(
                        "[{}] {} - {}: {}\n",
                        WARN,
                        style(&file.path).yellow(),
                        style("flagged").yellow().bold(),
                        file.warnings.join(", ")
                    )),
                    (None, true) => output.push_str(&format!("[{}] {}\n", OK, style(&file.path).green())),
                }
            }

            output.push_str(&format!(
                "\n{}: {} files, {} records, {} recovered\n",
                style("Summary").bold(),
                self.files.len(),
                style(self.record_count()).green(),
                style(self.failure_count()).red()
            ));
            output
        }

        #[cfg(not(feature = "colorized_output"))]
        {
            format!("{}", self)
        }
    }
}

impl fmt::Display for ExtractionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Extraction Summary")?;
        writeln!(f, "==================")?;
        for file in &self.files {
            match (&file.failure, file.warnings.is_empty()) {
                (Some(reason), _) => writeln!(f, "[✗] {} - RECOVERED: {}", file.path, reason)?,
                (None, false) => writeln!(f, "[⚠] {} - flagged: {}", file.path, file.warnings.join(", "))?,
                (None, true) => writeln!(f, "[✓] {}", file.path)?,
            }
        }
        writeln!(f)?;
        writeln!(
            f,
            "Summary: {} files, {} records, {} recovered",
            self.files.len(),
            self.record_count(),
            self.failure_count()
        )
    }
}

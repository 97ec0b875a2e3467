//! HTML report generation
//!
//! Renders validation results into a static HTML table. Values are
//! escaped by handlebars; the file is written atomically so a reader never
//! sees a half-written report.

use crate::core::error::{Error, Result};
use crate::core::results::ValidationRun;
use crate::core::validator::Summary;
use handlebars::Handlebars;
use serde_json::json;
use std::io::Write;
use std::path::Path;
use tracing::info;

pub const REPORT_TITLE: &str = "Firewall Rule Validation Report";

const REPORT_TEMPLATE_NAME: &str = "validation_report";

const REPORT_TEMPLATE: &str = r#"<html>
<head>
    <meta charset="utf-8">
    <title>{{title}}</title>
</head>
<body>
    <h1>{{title}}</h1>
    <p>Rules: {{rules_file}}</p>
    <p>Generated {{generated_at}}: {{summary.passed}} passed, {{summary.failed}} failed, {{summary.total}} total.</p>
    <table border="1">
        <tr>
            <th>Rule ID</th>
            <th>Protocol</th>
            <th>Port</th>
            <th>Direction</th>
            <th>Expected Action</th>
            <th>Observed Action</th>
            <th>Status</th>
        </tr>
        {{#each results}}
        <tr>
            <td>{{rule_id}}</td>
            <td>{{protocol}}</td>
            <td>{{port}}</td>
            <td>{{direction}}</td>
            <td>{{expected_action}}</td>
            <td>{{observed_action}}</td>
            <td>{{status}}</td>
        </tr>
        {{/each}}
    </table>
</body>
</html>
"#;

/// HTML report generator
pub struct ReportGenerator {
    handlebars: Handlebars<'static>,
}

impl ReportGenerator {
    /// Creates a generator with the report template registered.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Template`] if the template fails to compile.
    pub fn new() -> Result<Self> {
        let mut hb = Handlebars::new();
        hb.register_template_string(REPORT_TEMPLATE_NAME, REPORT_TEMPLATE)
            .map_err(|e| Error::Template(e.to_string()))?;

        Ok(Self { handlebars: hb })
    }

    /// Renders a validation run to an HTML document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Render`] if rendering fails.
    pub fn render(&self, run: &ValidationRun) -> Result<String> {
        let data = json!({
            "title": REPORT_TITLE,
            "rules_file": run.source.path.display().to_string(),
            "generated_at": run.validated_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            "summary": Summary::from_results(&run.results),
            "results": run.results,
        });

        Ok(self.handlebars.render(REPORT_TEMPLATE_NAME, &data)?)
    }

    /// Renders a run and writes the report to `output_file`.
    ///
    /// The parent directory is created if needed. The report is written to a
    /// temporary file in the same directory and renamed into place.
    ///
    /// # Errors
    ///
    /// Returns `Err` if rendering fails or the file cannot be written.
    pub fn generate_html_report(&self, run: &ValidationRun, output_file: &Path) -> Result<()> {
        let html = self.render(run)?;
        write_atomic(output_file, html.as_bytes())?;
        info!("Report generated: {}", output_file.display());
        Ok(())
    }
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(contents)?;
    temp.flush()?;

    // Reports are meant to be shared; NamedTempFile starts out at 0o600
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        temp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o644))?;
    }

    temp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

//! Colored terminal output utilities.

use std::path::Path;

use console::{Style, Term};

/// Terminal output formatter.
pub(crate) struct Output {
    term: Term,
    green: Style,
    red: Style,
    dim: Style,
    cyan_bold: Style,
}

impl Output {
    /// Create a new output formatter.
    #[must_use]
    pub(crate) fn new() -> Self {
        Self {
            term: Term::stderr(),
            green: Style::new().green(),
            red: Style::new().red(),
            dim: Style::new().dim(),
            cyan_bold: Style::new().cyan().bold(),
        }
    }

    /// Print an info message.
    pub(crate) fn info(&self, msg: &str) {
        let _ = self.term.write_line(msg);
    }

    /// Print a success message (green).
    pub(crate) fn success(&self, msg: &str) {
        let _ = self.term.write_line(&self.green.apply_to(msg).to_string());
    }

    /// Print an error message (red).
    pub(crate) fn error(&self, msg: &str) {
        let _ = self.term.write_line(&self.red.apply_to(msg).to_string());
    }

    /// Print a highlighted message (cyan bold).
    pub(crate) fn highlight(&self, msg: &str) {
        let _ = self
            .term
            .write_line(&self.cyan_bold.apply_to(msg).to_string());
    }

    /// Print a failed build: headline, the diagnostic from the error marker,
    /// and where the marker lives.
    pub(crate) fn build_failure(&self, error_file: &Path) {
        let diagnostic = std::fs::read_to_string(error_file).unwrap_or_default();
        let (headline, body, footer) = failure_report(error_file, &diagnostic);

        self.error(&headline);
        for line in body {
            let _ = self.term.write_line(&self.dim.apply_to(line).to_string());
        }
        self.info(&footer);
    }
}

/// Build failure report: headline, indented diagnostic body and footer.
fn failure_report(error_file: &Path, diagnostic: &str) -> (String, Vec<String>, String) {
    let mut lines = diagnostic.lines().skip_while(|l| l.trim().is_empty());
    let headline = lines
        .next()
        .map_or_else(|| "Build failed".to_owned(), |first| format!("Build failed: {first}"));
    let body = lines.map(|l| format!("  {l}")).collect();
    let footer = format!(
        "Diagnostic written to {} (forwarded to live pages)",
        error_file.display()
    );
    (headline, body, footer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_failure_report_uses_marker_diagnostic() {
        let diagnostic = "Error: Could not resolve \"foo\"\nLocation: src/main.js:1:7\n\n  1 | import \"foo\"";

        let (headline, body, footer) =
            failure_report(Path::new("public/build/main.js.error"), diagnostic);

        assert_eq!(headline, "Build failed: Error: Could not resolve \"foo\"");
        assert_eq!(
            body,
            vec!["  Location: src/main.js:1:7", "  ", "    1 | import \"foo\""]
        );
        assert_eq!(
            footer,
            "Diagnostic written to public/build/main.js.error (forwarded to live pages)"
        );
    }

    #[test]
    fn test_failure_report_without_diagnostic() {
        let (headline, body, _) = failure_report(Path::new("main.js.error"), "");

        assert_eq!(headline, "Build failed");
        assert!(body.is_empty());
    }
}

//! Human-readable formatting of bundler errors.

use crate::bundler::BundleError;

/// How [`format_error`] assembles the diagnostic lines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Join<'a> {
    /// Keep the individual lines.
    Lines,
    /// Join with `\n`.
    Newline,
    /// Join with a custom separator.
    With(&'a str),
}

/// A formatted diagnostic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Formatted {
    /// Individual lines (from [`Join::Lines`]).
    Lines(Vec<String>),
    /// Joined text.
    Text(String),
}

impl Formatted {
    /// The diagnostic as a single newline-joined string.
    #[must_use]
    pub fn into_text(self) -> String {
        match self {
            Self::Lines(lines) => lines.join("\n"),
            Self::Text(text) => text,
        }
    }
}

/// Produce the diagnostic lines for a bundler error.
///
/// Returns `None` when the error carries neither a location nor a source
/// frame, i.e. it is not shaped like a build error.
#[must_use]
pub fn error_lines(err: &BundleError) -> Option<Vec<String>> {
    if err.loc.is_none() && err.frame.is_none() {
        return None;
    }

    let mut lines = vec![format!("Error: {}", headline(err))];

    if let Some(loc) = &err.loc {
        let file = loc
            .file
            .as_deref()
            .or(err.id.as_deref())
            .unwrap_or("<unknown>");
        lines.push(format!("    at {file}:{}:{}", loc.line, loc.column));
    }
    if let Some(id) = &err.id {
        lines.push(format!("    id: {id}"));
    }
    if let Some(code) = &err.code {
        lines.push(format!("    code: {code}"));
    }
    if let Some(frame) = &err.frame {
        lines.push(String::new());
        lines.push(frame.clone());
    }

    Some(lines)
}

/// Format a bundler error according to `join`.
#[must_use]
pub fn format_error(err: &BundleError, join: Join<'_>) -> Option<Formatted> {
    let lines = error_lines(err)?;
    Some(match join {
        Join::Lines => Formatted::Lines(lines),
        Join::Newline => Formatted::Text(lines.join("\n")),
        Join::With(separator) => Formatted::Text(lines.join(separator)),
    })
}

/// Message with a redundant `"<id>: "` prefix removed.
fn headline(err: &BundleError) -> &str {
    err.id
        .as_deref()
        .and_then(|id| err.message.strip_prefix(id))
        .and_then(|rest| rest.strip_prefix(": "))
        .unwrap_or(&err.message)
}

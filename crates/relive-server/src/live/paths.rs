//! Marker path conventions.
//!
//! Keys and targets are POSIX-style strings relative to the web root,
//! independent of the host path separator.

use std::path::{Component, Path};

/// Suffix of link marker files.
pub(crate) const LINK_SUFFIX: &str = ".lnk";

/// Infix marking a minified artifact name.
const MIN_INFIX: &str = ".min.";

/// Render a relative path with `/` separators.
pub(crate) fn to_posix(path: &Path) -> String {
    let mut out = String::new();
    for component in path.components() {
        let segment = match component {
            Component::Normal(s) => s.to_string_lossy(),
            Component::ParentDir => "..".into(),
            Component::CurDir | Component::RootDir | Component::Prefix(_) => continue,
        };
        if !out.is_empty() {
            out.push('/');
        }
        out.push_str(&segment);
    }
    out
}

/// Asset key for a link marker: its relative path without the suffix.
pub(crate) fn asset_key(marker: &Path) -> Option<String> {
    let posix = to_posix(marker);
    posix
        .strip_suffix(LINK_SUFFIX)
        .filter(|key| !key.is_empty())
        .map(str::to_owned)
}

/// Target of a link marker: `content` resolved against the marker's directory.
pub(crate) fn link_target(marker: &Path, content: &str) -> String {
    let dir = marker.parent().map(to_posix).unwrap_or_default();
    join(&dir, content)
}

/// De-minified alias for a key whose file name carries `.min.`.
///
/// `js/app.min.js` yields `js/app.js`; keys without the infix yield `None`.
pub(crate) fn minified_alias(key: &str) -> Option<String> {
    let (dir, name) = match key.rfind('/') {
        Some(idx) => key.split_at(idx + 1),
        None => ("", key),
    };
    name.contains(MIN_INFIX)
        .then(|| format!("{dir}{}", name.replacen(MIN_INFIX, ".", 1)))
}

/// Lexically join and normalize two POSIX paths.
///
/// Leading `..` segments that climb above `base` are preserved. An absolute
/// `rel` replaces `base`.
pub(crate) fn join(base: &str, rel: &str) -> String {
    let absolute = rel.starts_with('/') || base.starts_with('/');
    let combined = if rel.starts_with('/') {
        rel.to_owned()
    } else {
        format!("{base}/{rel}")
    };

    let mut segments: Vec<&str> = Vec::new();
    for segment in combined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.last().is_some_and(|s| *s != "..") {
                    segments.pop();
                } else if !absolute {
                    segments.push("..");
                }
            }
            s => segments.push(s),
        }
    }

    let joined = segments.join("/");
    if absolute {
        format!("/{joined}")
    } else if joined.is_empty() {
        ".".to_owned()
    } else {
        joined
    }
}

/// Key under which a page reference is looked up in the live views.
pub(crate) fn request_key(path: &str) -> String {
    let key = join("", path.trim_start_matches('/'));
    if key == "." { String::new() } else { key }
}

/// Normalized relative path for an HTTP request path, or `None` if it
/// escapes the web root.
pub(crate) fn request_path(path: &str) -> Option<String> {
    let relative = path.trim_start_matches('/');
    is_contained(relative).then(|| request_key(relative))
}

/// Whether `path` stays inside the directory it is joined to.
pub(crate) fn is_contained(path: &str) -> bool {
    let mut depth = 0usize;
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if depth == 0 {
                    return false;
                }
                depth -= 1;
            }
            _ => depth += 1,
        }
    }
    true
}

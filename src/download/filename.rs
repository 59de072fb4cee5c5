//! Filename derivation, sanitization, and unique path resolution.
//!
//! A destination is chosen once, when a job is submitted: the suggested name
//! if the host supplied one, else the last URL path segment, else a
//! timestamped placeholder. Collisions get a `(n)` disambiguator before the
//! extension. The choice is not re-validated later, so an outside process
//! creating the same file in between is not detected.

use std::path::{Component, Path, PathBuf};

use chrono::Local;
use tracing::debug;
use url::Url;

/// Extensions a host treats as "this link is a file, not a page".
const DOWNLOADABLE_EXTENSIONS: &[&str] = &[
    ".exe", ".zip", ".rar", ".7z", ".msi", ".pdf", ".doc", ".docx", ".xls", ".xlsx", ".ppt",
    ".pptx", ".mp3", ".wav", ".mp4", ".avi", ".mkv", ".jpg", ".jpeg", ".png", ".gif", ".bmp",
    ".torrent", ".iso", ".dmg",
];

/// Upper bound on `(n)` suffixes tried before falling back to a timestamp.
const MAX_DISAMBIGUATOR: usize = 10_000;

/// Picks the bare file name for a new job.
///
/// `suggested` wins when it sanitizes to something usable; otherwise the URL's
/// last path segment (percent-decoded); otherwise [`placeholder_filename`].
#[must_use]
pub fn derive_filename(url: &str, suggested: Option<&str>) -> String {
    if let Some(name) = suggested
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(sanitize_filename)
        .filter(|name| is_usable(name))
    {
        return name;
    }

    Url::parse(url.trim())
        .ok()
        .and_then(|parsed| filename_from_url(&parsed))
        .unwrap_or_else(placeholder_filename)
}

/// Last non-empty path segment of `url`, decoded and sanitized.
pub(crate) fn filename_from_url(url: &Url) -> Option<String> {
    let last = url.path_segments()?.next_back()?;
    if last.is_empty() {
        return None;
    }
    let decoded = urlencoding::decode(last).unwrap_or_else(|e| {
        debug!(segment = %last, error = %e, "URL decoding failed, using raw segment");
        last.into()
    });
    let name = sanitize_filename(&decoded);
    is_usable(&name).then_some(name)
}

/// Timestamped name used when nothing better is available.
#[must_use]
pub fn placeholder_filename() -> String {
    Local::now().format("download_%Y%m%d_%H%M%S").to_string()
}

/// Sanitizes filename for filesystem safety.
///
/// Replaces characters that are invalid on common filesystems:
/// / \ : * ? " < > |
pub(crate) fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if is_safe_filename_segment(&sanitized) {
        sanitized
    } else {
        sanitized.replace('.', "_")
    }
}

fn is_usable(name: &str) -> bool {
    !name.trim_matches(|c| c == '_' || c == '.').is_empty()
}

fn is_safe_filename_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}

/// Resolves a free path for `filename` inside `dir`.
///
/// A candidate is taken if it exists on disk or `is_reserved` says so (paths
/// already handed to other jobs whose files may not exist yet). Collisions
/// yield `name(1).ext`, `name(2).ext`, ...
pub(crate) fn resolve_unique_path(
    dir: &Path,
    filename: &str,
    is_reserved: impl Fn(&Path) -> bool,
) -> PathBuf {
    let taken = |path: &Path| path.exists() || is_reserved(path);

    let base_path = dir.join(filename);
    if !taken(&base_path) {
        return base_path;
    }

    let (stem, ext) = split_extension(filename);
    for counter in 1..MAX_DISAMBIGUATOR {
        let candidate = dir.join(format!("{stem}({counter}){ext}"));
        if !taken(&candidate) {
            return candidate;
        }
    }

    // Fallback (extremely unlikely)
    dir.join(format!("{stem}_{}{ext}", placeholder_filename()))
}

/// Splits `report.final.pdf` into (`report.final`, `.pdf`).
///
/// A leading dot is part of the stem, so `.bashrc` has no extension.
fn split_extension(filename: &str) -> (&str, &str) {
    match filename.rfind('.') {
        Some(pos) if pos > 0 => (&filename[..pos], &filename[pos..]),
        _ => (filename, ""),
    }
}

/// Returns true when the URL path ends in a known downloadable extension.
#[must_use]
pub fn is_downloadable_url(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url.trim()) else {
        return false;
    };
    let path = parsed.path().to_ascii_lowercase();
    DOWNLOADABLE_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

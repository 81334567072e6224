//! Filename sanitization and collision-free name resolution.
//!
//! Names are made safe for Windows as well as Unix filesystems: reserved
//! characters become `_`, trailing dots and spaces are dropped, device names
//! such as `CON` are prefixed, and the result never exceeds 255 characters.

use std::path::Path;

use tracing::{debug, warn};

use super::Storage;
use super::constants::{MAX_FILENAME_CHARS, MAX_UNIQUE_NAME_ATTEMPTS};
use super::format::extension_for_format;

/// Base name used when sanitizing leaves nothing meaningful.
pub const DEFAULT_BASE_NAME: &str = "video";

/// Characters rejected by Windows filesystems.
const RESERVED_CHARS: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Replacement for reserved characters.
const PLACEHOLDER: char = '_';

/// Extensions longer than this are not preserved during truncation.
const MAX_PRESERVED_EXTENSION_CHARS: usize = 16;

/// Device names Windows refuses as file stems, regardless of extension.
const WINDOWS_DEVICE_NAMES: [&str; 22] = [
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Makes `name` safe to use as a single path segment.
///
/// Total: never panics and never returns an empty string.
#[must_use]
pub fn sanitize(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| {
            if RESERVED_CHARS.contains(&c) || c.is_control() {
                PLACEHOLDER
            } else {
                c
            }
        })
        .collect();

    let trimmed = replaced.trim().trim_end_matches(['.', ' ']);
    if trimmed.is_empty() || trimmed.chars().all(|c| c == PLACEHOLDER) {
        return DEFAULT_BASE_NAME.to_string();
    }

    let guarded = guard_device_name(trimmed);
    truncate_preserving_extension(&guarded, MAX_FILENAME_CHARS)
}

/// Builds the on-disk name for a video from its display name and format tag.
///
/// The extension derived from `format_tag` is appended unless the
/// sanitized name already carries it.
#[must_use]
pub fn file_name_for(display_name: &str, format_tag: &str) -> String {
    let extension = extension_for_format(format_tag);
    let safe = sanitize(display_name);
    if safe.to_lowercase().ends_with(&format!(".{extension}")) {
        return safe;
    }
    sanitize(&format!("{safe}.{extension}"))
}

/// Returns a name that does not yet exist in `directory`.
///
/// Probes `name.ext`, then `name(1).ext`, `name(2).ext`, ... up to
/// [`MAX_UNIQUE_NAME_ATTEMPTS`] suffixes. When every probe is taken the
/// original name is returned (the later write replaces that file).
pub async fn resolve_unique(storage: &dyn Storage, directory: &Path, safe_name: &str) -> String {
    if !storage.path_exists(&directory.join(safe_name)).await {
        return safe_name.to_string();
    }

    let (stem, extension) = split_extension(safe_name);
    for index in 1..=MAX_UNIQUE_NAME_ATTEMPTS {
        let candidate = with_suffix(stem, &format!("({index})"), extension);
        if !storage.path_exists(&directory.join(&candidate)).await {
            debug!(original = %safe_name, resolved = %candidate, "resolved name collision");
            return candidate;
        }
    }

    warn!(
        name = %safe_name,
        attempts = MAX_UNIQUE_NAME_ATTEMPTS,
        "no free suffixed name; falling back to original name"
    );
    safe_name.to_string()
}

/// Splits `name` into stem and extension (extension keeps its leading dot).
///
/// Leading-dot names such as `.hidden` and names ending in a dot have no extension.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(pos) if pos > 0 && pos + 1 < name.len() => (&name[..pos], &name[pos..]),
        _ => (name, ""),
    }
}

fn with_suffix(stem: &str, suffix: &str, extension: &str) -> String {
    let fixed = suffix.chars().count() + extension.chars().count();
    let keep = MAX_FILENAME_CHARS.saturating_sub(fixed).max(1);
    let stem: String = stem.chars().take(keep).collect();
    format!("{stem}{suffix}{extension}")
}

fn guard_device_name(name: &str) -> String {
    let (stem, _) = split_extension(name);
    if WINDOWS_DEVICE_NAMES
        .iter()
        .any(|device| device.eq_ignore_ascii_case(stem.trim_end()))
    {
        format!("{PLACEHOLDER}{name}")
    } else {
        name.to_string()
    }
}

fn truncate_preserving_extension(name: &str, max_chars: usize) -> String {
    if name.chars().count() <= max_chars {
        return name.to_string();
    }

    let (stem, extension) = split_extension(name);
    let extension_chars = extension.chars().count();
    if extension_chars == 0 || extension_chars > MAX_PRESERVED_EXTENSION_CHARS {
        let truncated: String = name.chars().take(max_chars).collect();
        return non_empty(truncated.trim_end().to_string());
    }

    let stem: String = stem.chars().take(max_chars - extension_chars).collect();
    let stem = stem.trim_end();
    if stem.is_empty() {
        return DEFAULT_BASE_NAME.to_string();
    }
    format!("{stem}{extension}")
}

fn non_empty(value: String) -> String {
    if value.is_empty() {
        DEFAULT_BASE_NAME.to_string()
    } else {
        value
    }
}

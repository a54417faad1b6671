//! Filesystem-safe, collision-resistant names for accepted uploads.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use chrono::Utc;
use uuid::Uuid;

/// Fallback stem when sanitizing leaves nothing usable.
const FALLBACK_STEM: &str = "upload";

/// Reduces a client-supplied filename to `[A-Za-z0-9._-]`.
///
/// Directory separators become word breaks, whitespace runs collapse to `_`,
/// runs of dots collapse to one, and leading/trailing `.`/`_` are stripped.
/// The result never contains `/`, `\` or `..`.
pub fn secure_filename(name: &str) -> String {
    let spaced: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();
    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");

    let mut out = String::with_capacity(joined.len());
    for c in joined.chars() {
        if !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')) {
            continue;
        }
        if c == '.' && out.ends_with('.') {
            continue;
        }
        out.push(c);
    }

    out.trim_matches(|c| c == '.' || c == '_').to_string()
}

/// Derives the on-disk name for an upload: `<stem>_<hash><.ext>`.
///
/// The 16-hex-digit hash covers the sanitized name, the current timestamp in
/// nanoseconds and a random nonce, so two uploads of the same file never share
/// a name, even within the same clock tick.
pub fn name_for(declared_filename: &str) -> String {
    let base = secure_filename(declared_filename);

    let (stem, ext) = match base.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (base.as_str(), None),
    };
    let stem = if stem.is_empty() { FALLBACK_STEM } else { stem };

    let mut hasher = DefaultHasher::new();
    base.hash(&mut hasher);
    Utc::now().timestamp_nanos_opt().hash(&mut hasher);
    Uuid::new_v4().hash(&mut hasher);
    let hash = hasher.finish();

    match ext {
        Some(ext) => format!("{stem}_{hash:016x}.{ext}"),
        None => format!("{stem}_{hash:016x}"),
    }
}

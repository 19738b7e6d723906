use chrono::Local;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

/// CSI/escape sequences emitted by assertion libraries and terminal-aware tools
static ANSI_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\x1b\x{9b}][\[()#;?]*(?:[0-9]{1,4}(?:;[0-9]{0,4})*)?[0-9A-ORZcf-nqry=><]")
        .expect("ANSI pattern is valid")
});

/// Sanitize a name for use in filenames. Keeps `[A-Za-z0-9._-]`.
pub fn sanitize_name(name: &str) -> String {
    let safe: String = name
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '-' | '_' => c,
            _ => '_',
        })
        .collect();
    if safe.is_empty() || safe.chars().all(|c| c == '.') {
        format!("evidence{}", safe.replace('.', "_"))
    } else {
        safe
    }
}

/// Return `dir/stem.ext`, or `dir/stem-N.ext` for the first N that is not taken yet
pub fn unique_path(dir: &Path, stem: &str, extension: &str) -> PathBuf {
    let candidate = dir.join(format!("{}.{}", stem, extension));
    if !candidate.exists() {
        return candidate;
    }
    (1..)
        .map(|n| dir.join(format!("{}-{}.{}", stem, n, extension)))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

/// Remove ANSI escape sequences from an error message
pub fn strip_ansi(text: &str) -> String {
    ANSI_PATTERN.replace_all(text, "").into_owned()
}

/// Generate a fixed-width timestamp in ddmmyyyyHHMMSS format (local time)
pub fn generate_timestamp() -> String {
    Local::now().format("%d%m%Y%H%M%S").to_string()
}

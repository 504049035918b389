use std::path::{Component, Path};

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Characters left as-is in mirror paths: unreserved marks plus `/ , = ?`.
const PATH_SAFE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'/')
    .remove(b',')
    .remove(b'=')
    .remove(b'?');

const UNITS: [&str; 8] = ["", "Ki", "Mi", "Gi", "Ti", "Pi", "Ei", "Zi"];

/// Forward-slash form of a path string.
pub fn normalize_separators(p: &str) -> String {
    p.replace('\\', "/")
}

/// `path` relative to `root`, forward-slashed, without `.` components.
pub fn rel_path(root: &Path, path: &Path) -> String {
    let rel = pathdiff::diff_paths(path, root).unwrap_or_else(|| path.to_path_buf());
    let parts: Vec<String> = rel
        .components()
        .filter_map(|c| match c {
            Component::CurDir => None,
            other => Some(other.as_os_str().to_string_lossy().into_owned()),
        })
        .collect();
    parts.join("/")
}

/// Percent-encode a mirror-relative path, segment by segment.
pub fn encode_path(p: &str) -> String {
    utf8_percent_encode(p, PATH_SAFE).to_string()
}

/// Join URL path pieces with exactly one `/` between non-empty pieces.
pub fn join_url_path(pieces: &[&str]) -> String {
    let mut out = String::new();
    for piece in pieces {
        if piece.is_empty() {
            continue;
        }
        if out.is_empty() {
            out.push_str(piece);
            continue;
        }
        match (out.ends_with('/'), piece.starts_with('/')) {
            (true, true) => out.push_str(&piece[1..]),
            (false, false) => {
                out.push('/');
                out.push_str(piece);
            }
            _ => out.push_str(piece),
        }
    }
    out
}

/// 1024-based size with one decimal: `1.0 Ki`, `3.5 Gi`, `512.0`.
pub fn human_size(bytes: u64) -> String {
    let mut num = bytes as f64;
    for unit in UNITS {
        if num.abs() < 1024.0 {
            return render(num, unit);
        }
        num /= 1024.0;
    }
    render(num, "Yi")
}

fn render(num: f64, unit: &str) -> String {
    if unit.is_empty() {
        format!("{num:.1}")
    } else {
        format!("{num:.1} {unit}")
    }
}

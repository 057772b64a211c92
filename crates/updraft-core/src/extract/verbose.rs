use std::path::PathBuf;

/// One member line from `tar` verbose output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerboseEntry {
    /// Uncompressed size in bytes, when the line carries one.
    pub size: Option<u64>,
    /// Member path relative to the extraction root, without a leading `./`.
    pub path: PathBuf,
    pub is_dir: bool,
}

/// Parse a line of `tar -tvv` or `tar -xvv` output.
///
/// Understands the GNU layout (`mode owner/group size date time path`), the
/// BSD listing layout (`mode links owner group size month day time path`) and
/// the bsdtar extraction echo (`x path`). Anything else, including warnings
/// and device entries without a byte size, yields `None`.
#[must_use]
pub fn parse_verbose_line(line: &str) -> Option<VerboseEntry> {
    let line = line.trim_end();

    if let Some(path) = line.strip_prefix("x ") {
        return entry(None, path, None);
    }

    let (head, _) = take_fields(line, 2)?;
    let mode = head[0];
    if !looks_like_mode(mode) {
        return None;
    }
    let kind = mode.chars().next();

    let (size, rest) = if head[1].contains('/') {
        let (fields, rest) = take_fields(line, 5)?;
        (fields[2].parse::<u64>().ok()?, rest)
    } else {
        let (fields, rest) = take_fields(line, 8)?;
        (fields[4].parse::<u64>().ok()?, rest)
    };

    let path = match kind {
        Some('l') => rest.split(" -> ").next().unwrap_or(rest),
        Some('h') => rest.split(" link to ").next().unwrap_or(rest),
        _ => rest,
    };

    entry(Some(size), path, kind)
}

fn entry(size: Option<u64>, raw_path: &str, kind: Option<char>) -> Option<VerboseEntry> {
    let mut path = raw_path.trim();
    while let Some(stripped) = path.strip_prefix("./") {
        path = stripped;
    }
    if path.is_empty() || path == "." {
        return None;
    }

    let is_dir = kind == Some('d') || path.ends_with('/');
    Some(VerboseEntry {
        size,
        path: PathBuf::from(path.trim_end_matches('/')),
        is_dir,
    })
}

fn looks_like_mode(field: &str) -> bool {
    field.len() >= 10
        && field
            .chars()
            .next()
            .is_some_and(|kind| "-dlhcbpsC".contains(kind))
}

/// Split off `count` whitespace separated fields and return them with the
/// non-empty remainder.
fn take_fields(line: &str, count: usize) -> Option<(Vec<&str>, &str)> {
    let mut rest = line.trim_start();
    let mut fields = Vec::with_capacity(count);
    for _ in 0..count {
        let end = rest.find(char::is_whitespace)?;
        fields.push(&rest[..end]);
        rest = rest[end..].trim_start();
    }
    (!rest.is_empty()).then_some((fields, rest))
}

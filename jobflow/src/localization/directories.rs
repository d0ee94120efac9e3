//! Collapsing required directories into one `mkdir -p` call.

/// Returns the minimal sorted argument list for `mkdir -p`.
///
/// Paths are sorted and a path replaces the previous entry when that entry
/// is a string prefix of it. This is string-prefix merging, not a
/// filesystem-hierarchy check (`/tmp/a` is absorbed by `/tmp/ab`); every
/// staging path spells out its ancestors literally.
#[must_use]
pub fn merge_directories<I, S>(paths: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut sorted: Vec<String> = paths.into_iter().map(Into::into).collect();
    sorted.sort();

    let mut merged: Vec<String> = Vec::with_capacity(sorted.len());
    for path in sorted {
        match merged.last_mut() {
            Some(last) if path.starts_with(last.as_str()) => *last = path,
            _ => merged.push(path),
        }
    }
    merged
}

/// Builds the `mkdir -p` command for the given directories, or `None` when
/// there is nothing to create.
#[must_use]
pub fn mkdir_command<I, S>(paths: I) -> Option<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let merged = merge_directories(paths);
    if merged.is_empty() {
        return None;
    }
    Some(format!("mkdir -p {}", merged.join(" ")))
}

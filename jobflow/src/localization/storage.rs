//! Storage specifiers and the staging actions built from them.

use crate::core::{Action, ActionFlag, Mount};

/// Root under which staging directories live on the working disk.
pub const STAGING_ROOT: &str = "/mnt/google/.google";

/// Where the service writes the combined pipeline log.
pub const LOG_PATH: &str = "/google/logs/output";

/// Returns the staging directory `dir` on the working disk.
#[must_use]
pub fn staging_path(dir: &str) -> String {
    format!("{STAGING_ROOT}/{dir}")
}

/// How much of a remote prefix a specifier covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Glob {
    /// A single object.
    None,
    /// `/*`: the immediate contents of a directory.
    Flat,
    /// `/**`: a directory and all subdirectories.
    Recursive,
}

impl Glob {
    /// Detects the glob suffix of `path`.
    #[must_use]
    pub fn of(path: &str) -> Self {
        if path.ends_with("/**") {
            Self::Recursive
        } else if path.ends_with("/*") {
            Self::Flat
        } else {
            Self::None
        }
    }

    /// Whether the specifier names a directory.
    #[must_use]
    pub fn is_directory(self) -> bool {
        !matches!(self, Self::None)
    }
}

/// One `[NAME=]path` entry of an input or output list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Specifier {
    /// Environment variable the staged path is exposed as.
    pub name: String,
    /// The path as written, including any glob suffix.
    pub path: String,
}

impl Specifier {
    /// Parses a list of specifiers, naming unnamed entries
    /// `<prefix><index>` by their 0-based position. Empty entries are
    /// skipped but still consume an index.
    #[must_use]
    pub fn parse_list(entries: &[String], prefix: &str) -> Vec<Self> {
        entries
            .iter()
            .enumerate()
            .filter_map(|(n, entry)| match entry.find('=') {
                Some(i) if i > 0 => Some(Self {
                    name: entry[..i].to_string(),
                    path: entry[i + 1..].to_string(),
                }),
                _ if entry.is_empty() => None,
                _ => Some(Self {
                    name: format!("{prefix}{n}"),
                    path: entry.clone(),
                }),
            })
            .collect()
    }

    /// The glob suffix.
    #[must_use]
    pub fn glob(&self) -> Glob {
        Glob::of(&self.path)
    }

    /// The path with any glob suffix removed (a trailing `/` remains).
    #[must_use]
    pub fn base(&self) -> &str {
        if self.glob().is_directory() {
            self.path.trim_end_matches('*')
        } else {
            &self.path
        }
    }

    /// The bucket, when the path is a storage URI.
    #[must_use]
    pub fn bucket(&self) -> Option<&str> {
        bucket_of(&self.path)
    }

    /// Where the specifier lands under `root`, keeping the remote shape.
    #[must_use]
    pub fn target_under(&self, root: &str) -> String {
        join_paths(&[root, strip_scheme(self.base())])
    }
}

/// Returns the bucket of a `scheme://bucket/...` URI.
#[must_use]
pub fn bucket_of(path: &str) -> Option<&str> {
    let (scheme, rest) = path.split_once("://")?;
    if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    let bucket = rest.split('/').next().unwrap_or_default();
    (!bucket.is_empty()).then_some(bucket)
}

fn strip_scheme(path: &str) -> &str {
    match path.split_once("://") {
        Some((_, rest)) if bucket_of(path).is_some() => rest,
        _ => path,
    }
}

/// Joins path segments and cleans the result, keeping a URI scheme on the
/// first segment intact.
#[must_use]
pub fn join_paths(parts: &[&str]) -> String {
    let scheme = parts
        .first()
        .filter(|first| bucket_of(first).is_some())
        .and_then(|first| first.split_once("://"))
        .map(|(scheme, _)| scheme);

    let joined = parts
        .iter()
        .map(|p| strip_scheme(p))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("/");

    match scheme {
        Some(scheme) => format!("{scheme}://{}", clean(&joined).trim_start_matches('/')),
        None => clean(&joined),
    }
}

/// Lexically cleans a slash-separated path.
fn clean(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.last().is_some_and(|s| *s != "..") {
                    segments.pop();
                } else if !rooted {
                    segments.push("..");
                }
            }
            s => segments.push(s),
        }
    }
    let body = segments.join("/");
    match (rooted, body.is_empty()) {
        (true, _) => format!("/{body}"),
        (false, true) => ".".to_string(),
        (false, false) => body,
    }
}

/// The parent directory of a cleaned absolute path.
#[must_use]
pub fn parent_dir(path: &str) -> String {
    match path.trim_end_matches('/').rsplit_once('/') {
        Some(("", _)) | None => "/".to_string(),
        Some((parent, _)) => parent.to_string(),
    }
}

/// Builds an action that runs `gsutil -q <arguments>` in the SDK image.
#[must_use]
pub fn gsutil(image: &str, arguments: &[&str]) -> Action {
    Action::bash(image, [format!("gsutil -q {}", arguments.join(" "))])
}

/// Builds the copy action for a transfer whose remote side is described by
/// `glob`.
#[must_use]
pub fn transfer(image: &str, glob: Glob, from: &str, to: &str) -> Action {
    let contents = join_paths(&[from, "*"]);
    match glob {
        Glob::Recursive => gsutil(image, &["-m", "cp", "-r", contents.as_str(), to]),
        Glob::Flat => gsutil(image, &["-m", "cp", contents.as_str(), to]),
        Glob::None => gsutil(image, &["cp", from, to]),
    }
}

/// Builds an action that writes `contents` to `target`, creating its parent.
#[must_use]
pub fn upload(image: &str, contents: &[u8], target: &str) -> Action {
    use base64::{engine::general_purpose::STANDARD, Engine};

    let encoded = STANDARD.encode(contents);
    Action::bash(
        image,
        [
            format!("mkdir -p {:?}", parent_dir(target)),
            format!("echo {encoded:?} | base64 -d > {target:?}"),
        ],
    )
}

/// Builds the mount and wait actions for one bucket.
#[must_use]
pub fn fuse_mount(image: &str, bucket: &str, path: &str) -> [Action; 2] {
    let mount = Action::new(image)
        .with_commands(["--implicit-dirs", "--foreground", bucket, path])
        .with_flag(ActionFlag::EnableFuse)
        .with_flag(ActionFlag::RunInBackground)
        .with_mount(Mount::working_root());
    let wait = Action::new(image)
        .with_commands(["wait", path])
        .with_mount(Mount::working_root());
    [mount, wait]
}

use crate::expire::function_path;
use crate::expire::report::Reporter;
use crate::expire::result_error::error::Error;
use crate::expire::result_error::result::Result;
use crate::expire::result_error::AddFunctionName;

use chrono::{DateTime, Local, NaiveDateTime};
use derive_more::{Display, From};
use dyn_iter::{DynIter, IntoDynIterator};
use function_name::named;
use getset::Getters;
use globset::{Glob, GlobBuilder, GlobMatcher};
use serde::de::Visitor;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::Level;
use walkdir::{DirEntry, WalkDir};

use std::fmt::Formatter;
use std::fs::FileType;
use std::path::{Path, PathBuf};
use std::result;

pub static METADATA_GLOB: &str = "*.backup";
pub static BACKUP_DIR_GLOB: &str = "*bck*";
pub static ANY_GLOB: &str = "*";

/// A glob pattern wrapper that handles custom deserialization
///
/// Wraps `globset::Glob` so patterns can be read from YAML strings. Patterns
/// are matched against base names only.
#[derive(Clone, Debug, From, Display, Serialize, PartialEq, Eq, Getters)]
#[serde(transparent)]
#[getset(get = "pub")]
pub struct CustomDeserializedGlob {
    glob: Glob,
}

impl CustomDeserializedGlob {
    pub fn new<S: AsRef<str>>(pattern: S) -> Result<Self> {
        Ok(GlobBuilder::new(pattern.as_ref())
            .literal_separator(true)
            .build()?
            .into())
    }

    fn from_static(pattern: &'static str) -> Self {
        Self::new(pattern).expect("built-in glob pattern is valid")
    }

    pub fn metadata() -> Self {
        Self::from_static(METADATA_GLOB)
    }

    pub fn backup_dir() -> Self {
        Self::from_static(BACKUP_DIR_GLOB)
    }

    pub fn any() -> Self {
        Self::from_static(ANY_GLOB)
    }
}

struct CustomGlobVisitor;

impl Visitor<'_> for CustomGlobVisitor {
    type Value = CustomDeserializedGlob;

    fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
        formatter.write_str("a glob pattern")
    }

    fn visit_str<E>(self, v: &str) -> result::Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        GlobBuilder::new(v)
            .literal_separator(true)
            .build()
            .map(CustomDeserializedGlob::from)
            .map_err(serde::de::Error::custom)
    }
}

impl<'de> Deserialize<'de> for CustomDeserializedGlob {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> result::Result<Self, D::Error> {
        deserializer.deserialize_str(CustomGlobVisitor)
    }
}

/// What kind of filesystem entry a scan collects
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    /// Regular files, and symlinks which are removed as links
    File,
    /// Directories; a matching directory is not descended into
    Dir,
}

impl EntryKind {
    fn accepts(&self, file_type: FileType) -> bool {
        match self {
            EntryKind::File => file_type.is_file() || file_type.is_symlink(),
            EntryKind::Dir => file_type.is_dir(),
        }
    }
}

/// A scanned entry together with its last modification time
#[derive(Clone, Debug, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct AgedEntry {
    path: PathBuf,
    modified: NaiveDateTime,
}

impl AgedEntry {
    pub fn new<P: Into<PathBuf>>(path: P, modified: NaiveDateTime) -> Self {
        Self {
            path: path.into(),
            modified,
        }
    }

    pub fn into_path(self) -> PathBuf {
        self.path
    }
}

struct MatchingEntries<'a> {
    reporter: &'a dyn Reporter,
    root: PathBuf,
    walker: walkdir::IntoIter,
    matcher: GlobMatcher,
    kind: EntryKind,
}

impl Iterator for MatchingEntries<'_> {
    type Item = Result<PathBuf>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().unwrap_or(&self.root).to_path_buf();
                    return Some(Err(Error::entry("Walking", path, e)));
                }
            };
            if self.is_wanted(&entry) {
                if self.kind == EntryKind::Dir {
                    self.walker.skip_current_dir();
                }
                self.reporter
                    .report(Level::TRACE, format_args!("Matched {:?}", entry.path()));
                return Some(Ok(entry.into_path()));
            }
        }
    }
}

impl MatchingEntries<'_> {
    fn is_wanted(&self, entry: &DirEntry) -> bool {
        self.kind.accepts(entry.file_type()) && self.matcher.is_match(entry.file_name())
    }
}

/// Lazily walks `dir` and yields every entry of `kind` whose base name matches
/// `glob`. `dir` itself is never yielded.
///
/// Entries that cannot be read show up as `Err` items for the caller to report;
/// the walk carries on with their siblings.
#[named]
pub fn find_entries<'a, P: AsRef<Path>>(
    dir: P,
    glob: &CustomDeserializedGlob,
    kind: EntryKind,
    reporter: &'a dyn Reporter,
) -> Result<DynIter<'a, Result<PathBuf>>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(Error::entry(
            "Scanning",
            dir,
            std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
        )
        .add_fn_name(function_path!()));
    }
    reporter.debug(format_args!(
        "Scanning {:?} for {:?} matching {}",
        dir, kind, glob
    ));

    let entries = MatchingEntries {
        reporter,
        root: dir.to_path_buf(),
        walker: WalkDir::new(dir)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter(),
        matcher: glob.glob.compile_matcher(),
        kind,
    };
    Ok(entries.into_dyn_iter())
}

/// Backup history files below the WAL archive.
pub fn find_backup_metadata_files<'a, P: AsRef<Path>>(
    wal_dir: P,
    glob: &CustomDeserializedGlob,
    reporter: &'a dyn Reporter,
) -> Result<DynIter<'a, Result<PathBuf>>> {
    find_entries(wal_dir, glob, EntryKind::File, reporter)
}

/// Attaches the last modification time (in local time) to every entry.
pub fn with_modified<'a, I>(entries: I) -> DynIter<'a, Result<AgedEntry>>
where
    I: IntoIterator<Item = Result<PathBuf>>,
    I::IntoIter: 'a,
{
    entries
        .into_iter()
        .map(|res| {
            res.and_then(|path| match modified_time(&path) {
                Ok(modified) => Ok(AgedEntry::new(path, modified)),
                Err(e) => Err(Error::entry("Reading modification time of", path, e)),
            })
        })
        .into_dyn_iter()
}

/// Keeps the entries modified strictly before `cutoff`. Errors are passed
/// through untouched.
///
/// Takes the output of [`with_modified`] so a caller can look at every stat
/// result before the cut.
pub fn older_than<'a, I>(entries: I, cutoff: NaiveDateTime) -> DynIter<'a, Result<AgedEntry>>
where
    I: IntoIterator<Item = Result<AgedEntry>>,
    I::IntoIter: 'a,
{
    entries
        .into_iter()
        .filter(move |res| match res {
            Ok(entry) => entry.modified < cutoff,
            Err(_) => true,
        })
        .into_dyn_iter()
}

fn modified_time(path: &Path) -> std::io::Result<NaiveDateTime> {
    let modified = std::fs::symlink_metadata(path)?.modified()?;
    Ok(DateTime::<Local>::from(modified).naive_local())
}

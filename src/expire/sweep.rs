use crate::expire::record::BackupRecord;
use crate::expire::report::Reporter;
use crate::expire::result_error::error::Error;
use crate::expire::scanner::{
    find_entries, older_than, with_modified, AgedEntry, CustomDeserializedGlob, EntryKind,
};

use bon::Builder;
use chrono::NaiveDateTime;
use getset::Getters;

use std::path::{Path, PathBuf};

/// How a sweep treats the two archive trees
#[derive(Clone, Debug, Builder, Getters)]
#[getset(get = "pub")]
pub struct SweepOptions {
    /// Log and list candidates, delete nothing
    #[builder(default)]
    dry_run: bool,
    #[builder(default = CustomDeserializedGlob::any())]
    wal_glob: CustomDeserializedGlob,
    #[builder(default = CustomDeserializedGlob::backup_dir())]
    backup_dir_glob: CustomDeserializedGlob,
    /// When the run began; anything modified later is being written right now
    started_at: NaiveDateTime,
}

/// What a sweep did, entry by entry
#[derive(Debug, Default)]
pub struct SweepReport {
    pub dry_run: bool,
    pub deleted: Vec<PathBuf>,
    pub would_delete: Vec<PathBuf>,
    pub errors: Vec<Error>,
    pub newer_than_start: usize,
}

impl SweepReport {
    pub fn failed_count(&self) -> usize {
        self.errors.len()
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Deletes every WAL file and backup directory modified strictly before the
/// boundary's stop time.
///
/// Without a boundary nothing is touched. Each deletion stands on its own: a
/// failure is recorded in the report and the sweep moves on.
pub fn expire<P1: AsRef<Path>, P2: AsRef<Path>>(
    boundary: Option<&BackupRecord>,
    wal_dir: P1,
    data_dir: P2,
    options: &SweepOptions,
    reporter: &dyn Reporter,
) -> SweepReport {
    let mut report = SweepReport {
        dry_run: options.dry_run,
        ..SweepReport::default()
    };

    let Some((boundary, cutoff)) = boundary.and_then(|b| b.stop_time().map(|t| (b, t))) else {
        reporter.info(format_args!("No expiration boundary, nothing to delete"));
        return report;
    };
    reporter.info(format_args!(
        "Expiring everything modified before {} (boundary {})",
        cutoff,
        boundary.name()
    ));

    sweep_tree(
        &mut report,
        wal_dir.as_ref(),
        &options.wal_glob,
        EntryKind::File,
        boundary,
        cutoff,
        options,
        reporter,
    );
    sweep_tree(
        &mut report,
        data_dir.as_ref(),
        &options.backup_dir_glob,
        EntryKind::Dir,
        boundary,
        cutoff,
        options,
        reporter,
    );

    if report.newer_than_start > 0 {
        reporter.warn(format_args!(
            "{} entries changed after this run started, is another backup or expiration running?",
            report.newer_than_start
        ));
    }
    report
}

#[allow(clippy::too_many_arguments)]
fn sweep_tree(
    report: &mut SweepReport,
    dir: &Path,
    glob: &CustomDeserializedGlob,
    kind: EntryKind,
    boundary: &BackupRecord,
    cutoff: NaiveDateTime,
    options: &SweepOptions,
    reporter: &dyn Reporter,
) {
    let entries = match find_entries(dir, glob, kind, reporter) {
        Ok(entries) => entries,
        Err(e) => {
            reporter.error(format_args!("Cannot scan {:?}: {}", dir, e));
            report.errors.push(e);
            return;
        }
    };

    let mut newer_than_start = 0;
    let stated = with_modified(entries).inspect(|res| {
        if let Ok(entry) = res {
            if *entry.modified() > options.started_at {
                newer_than_start += 1;
                reporter.warn(format_args!(
                    "{:?} was modified at {}, after this run started",
                    entry.path(),
                    entry.modified()
                ));
            }
        }
    });
    let candidates: Vec<_> = older_than(stated, cutoff).collect();
    report.newer_than_start += newer_than_start;

    for candidate in candidates {
        match candidate {
            Ok(entry) if is_boundary_entry(boundary, &entry, kind) => {
                reporter.debug(format_args!(
                    "Keeping {:?}, it belongs to the boundary backup",
                    entry.path()
                ));
            }
            Ok(entry) => remove_entry(report, entry, kind, options.dry_run, reporter),
            Err(e) => {
                reporter.warn(format_args!("Skipping entry: {}", e));
                report.errors.push(e);
            }
        }
    }
}

fn is_boundary_entry(boundary: &BackupRecord, entry: &AgedEntry, kind: EntryKind) -> bool {
    match kind {
        EntryKind::File => boundary.source().as_deref() == Some(entry.path().as_path()),
        EntryKind::Dir => boundary
            .label()
            .as_deref()
            .and_then(|label| Path::new(label).file_name())
            .is_some_and(|name| entry.path().file_name() == Some(name)),
    }
}

fn remove_entry(
    report: &mut SweepReport,
    entry: AgedEntry,
    kind: EntryKind,
    dry_run: bool,
    reporter: &dyn Reporter,
) {
    let modified = *entry.modified();
    let path = entry.into_path();
    if dry_run {
        reporter.info(format_args!(
            "Would remove {:?} (modified {})",
            path, modified
        ));
        report.would_delete.push(path);
        return;
    }

    let res = match kind {
        EntryKind::File => std::fs::remove_file(&path),
        EntryKind::Dir => std::fs::remove_dir_all(&path),
    };
    match res {
        Ok(()) => {
            reporter.info(format_args!("Removed {:?} (modified {})", path, modified));
            report.deleted.push(path);
        }
        Err(e) => {
            let error = Error::entry("Removing", path, e);
            reporter.error(format_args!("{}", error));
            report.errors.push(error);
        }
    }
}

use chrono::{Duration, Local, NaiveDateTime, TimeZone, Timelike};
use filetime::{set_file_mtime, FileTime};
use pg_expire_backup::expire::expire_config::{ExpireConfig, RunSummary};
use pg_expire_backup::expire::report::MemoryReporter;
use pg_expire_backup::expire::result_error::error::Error;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct PgArchive {
    root: TempDir,
    now: NaiveDateTime,
}

impl PgArchive {
    fn new() -> Self {
        let root = TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("wal")).unwrap();
        std::fs::create_dir_all(root.path().join("data")).unwrap();
        Self {
            root,
            now: Local::now().naive_local().with_nanosecond(0).unwrap(),
        }
    }

    fn at(&self, days_ago: i64) -> NaiveDateTime {
        self.now - Duration::days(days_ago)
    }

    fn touch(path: &Path, at: NaiveDateTime) {
        let local = Local.from_local_datetime(&at).earliest().unwrap();
        set_file_mtime(path, FileTime::from_unix_time(local.timestamp(), 0)).unwrap();
    }

    fn wal(&self, name: &str) -> PathBuf {
        self.root.path().join("wal").join(name)
    }

    fn data(&self, name: &str) -> PathBuf {
        self.root.path().join("data").join(name)
    }

    /// Lays out what a finished base backup leaves behind: the segment it
    /// stopped in, its history file and the backup directory.
    fn backup(&self, segment: &str, days_ago: i64) -> (PathBuf, PathBuf, PathBuf) {
        let stop = self.at(days_ago);
        let start = stop - Duration::seconds(20);
        let label = format!("bck_{}", days_ago);

        let dir = self.data(&label);
        std::fs::create_dir_all(dir.join("base/1")).unwrap();
        std::fs::write(dir.join("PG_VERSION"), "16").unwrap();
        Self::touch(&dir, start);

        let wal = self.wal(segment);
        std::fs::write(&wal, "segment").unwrap();
        Self::touch(&wal, stop + Duration::seconds(1));

        let history = self.wal(&format!("{}.00000028.backup", segment));
        std::fs::write(
            &history,
            format!(
                "START WAL LOCATION: 0/2000028 (file {segment})\n\
                 STOP WAL LOCATION: 0/2000100 (file {segment})\n\
                 CHECKPOINT LOCATION: 0/2000060\n\
                 BACKUP METHOD: pg_start_backup\n\
                 BACKUP FROM: master\n\
                 START TIME: {} CET\n\
                 LABEL: data/{label}\n\
                 START TIMELINE: 1\n\
                 STOP TIME: {} CET\n\
                 STOP TIMELINE: 1\n",
                start.format("%Y-%m-%d %H:%M:%S"),
                stop.format("%Y-%m-%d %H:%M:%S"),
            ),
        )
        .unwrap();
        Self::touch(&history, stop);

        (wal, history, dir)
    }

    fn segment(&self, name: &str, days_ago: i64) -> PathBuf {
        let path = self.wal(name);
        std::fs::write(&path, "segment").unwrap();
        Self::touch(&path, self.at(days_ago));
        path
    }

    fn config(&self, keep_days: u32, dry_run: bool) -> ExpireConfig {
        ExpireConfig::builder()
            .archive_root(self.root.path())
            .keep_days(keep_days)
            .dry_run(dry_run)
            .build()
    }

    fn run(&self, keep_days: u32, dry_run: bool) -> RunSummary {
        self.config(keep_days, dry_run)
            .run(self.now, &MemoryReporter::default())
    }
}

#[test]
fn test_expires_everything_before_newest_old_enough_backup() {
    let archive = PgArchive::new();
    let before_all = archive.segment("000000010000000000000001", 14);
    let (wal_12, history_12, dir_12) = archive.backup("000000010000000000000002", 12);
    let between = archive.segment("000000010000000000000003", 11);
    let (wal_10, history_10, dir_10) = archive.backup("000000010000000000000004", 10);
    let (wal_5, history_5, dir_5) = archive.backup("000000010000000000000005", 5);
    let (wal_1, history_1, dir_1) = archive.backup("000000010000000000000006", 1);

    let summary = archive.run(7, false);

    assert_eq!(summary.failed_count(), 0, "{summary}");
    let boundary = summary.boundary.as_ref().unwrap();
    assert_eq!(boundary.label().as_deref(), Some("data/bck_10"));
    assert_eq!(summary.cutoff, archive.at(7));

    for gone in [&before_all, &wal_12, &history_12, &between, &dir_12] {
        assert!(!gone.exists(), "{:?} should be expired", gone);
    }
    for kept in [
        &wal_10, &history_10, &dir_10, &wal_5, &history_5, &dir_5, &wal_1, &history_1, &dir_1,
    ] {
        assert!(kept.exists(), "{:?} should be kept", kept);
    }
    assert_eq!(summary.sweep.deleted.len(), 5);
}

#[test]
fn test_second_run_is_a_no_op() {
    let archive = PgArchive::new();
    archive.segment("000000010000000000000001", 14);
    archive.backup("000000010000000000000002", 12);
    archive.backup("000000010000000000000004", 10);

    let first = archive.run(7, false);
    let second = archive.run(7, false);

    assert_eq!(first.sweep.deleted.len(), 4);
    assert!(second.sweep.deleted.is_empty());
    assert_eq!(second.failed_count(), 0);
    assert_eq!(
        first.boundary.as_ref().unwrap().label(),
        second.boundary.as_ref().unwrap().label()
    );
}

#[test]
fn test_all_backups_recent_deletes_nothing() {
    let archive = PgArchive::new();
    let old = archive.segment("000000010000000000000001", 30);
    archive.backup("000000010000000000000002", 3);
    archive.backup("000000010000000000000003", 1);

    let summary = archive.run(7, false);

    assert!(summary.boundary.is_none());
    assert!(summary.sweep.deleted.is_empty());
    assert!(old.exists());
}

#[test]
fn test_history_without_stop_time_is_reported_and_ignored() {
    let archive = PgArchive::new();
    let old = archive.segment("000000010000000000000001", 30);
    std::fs::write(
        archive.wal("000000010000000000000001.00000028.backup"),
        "START WAL LOCATION: 0/1000028 (file 000000010000000000000001)\nLABEL: data/bck_broken\n",
    )
    .unwrap();

    let summary = archive.run(7, false);

    assert!(summary.boundary.is_none());
    assert_eq!(summary.failed_count(), 1);
    assert!(matches!(
        &summary.record_errors[0],
        Error::MissingStopTime(name) if name == "data/bck_broken"
    ));
    assert!(old.exists());
}

#[test]
fn test_unparsable_history_is_excluded_but_run_continues() {
    let archive = PgArchive::new();
    let old = archive.segment("000000010000000000000001", 30);
    let (_, _, dir_10) = archive.backup("000000010000000000000004", 10);
    let broken = archive.wal("000000010000000000000002.00000028.backup");
    std::fs::write(&broken, "STOP TIME: someday CET\n").unwrap();
    PgArchive::touch(&broken, archive.at(1));

    let summary = archive.run(7, false);

    assert_eq!(
        summary.boundary.as_ref().unwrap().label().as_deref(),
        Some("data/bck_10")
    );
    assert_eq!(summary.record_errors.len(), 1);
    assert_eq!(summary.record_errors[0].path(), Some(broken.as_path()));
    assert!(!old.exists());
    assert!(dir_10.exists());
    assert!(summary.to_string().contains("errors: 1"));
}

#[test]
fn test_dry_run_keeps_everything() {
    let archive = PgArchive::new();
    let old = archive.segment("000000010000000000000001", 30);
    let (_, _, dir_12) = archive.backup("000000010000000000000002", 12);
    archive.backup("000000010000000000000004", 10);

    let summary = archive.run(7, true);

    assert!(summary.sweep.deleted.is_empty());
    assert_eq!(summary.sweep.would_delete.len(), 4);
    assert!(old.exists());
    assert!(dir_12.exists());
    assert!(summary.to_string().contains("would delete: 4"));
}

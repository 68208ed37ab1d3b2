use crate::expire::record::BackupRecord;
use crate::expire::report::Reporter;
use crate::expire::result_error::error::Error;
use crate::expire::result_error::result::Result;
use crate::expire::result_error::AddMsg;
use crate::expire::retention::{compute_boundary, RetentionWindow};
use crate::expire::scanner::{find_backup_metadata_files, CustomDeserializedGlob};
use crate::expire::sweep::{expire, SweepOptions, SweepReport};
use crate::expire::validate::validate_dir_exist;

use bon::Builder;
use chrono::NaiveDateTime;
use dyn_iter::IntoDynIterator;
use getset::Getters;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use validator::Validate;

use std::fmt::{Display, Formatter};
use std::fs::File;
use std::path::{Path, PathBuf};

static WAL_DIR: &str = "wal";
static DATA_DIR: &str = "data";

/// Fully resolved settings of one expiration run
///
/// The archive root holds `wal/` (archived segments plus `*.backup` history
/// files) and `data/` (one directory per base backup).
#[derive(Clone, Debug, Validate, Builder, Getters)]
#[getset(get = "pub")]
pub struct ExpireConfig {
    #[validate(custom(function = validate_dir_exist))]
    #[builder(into)]
    archive_root: PathBuf,
    #[builder(into)]
    keep_days: RetentionWindow,
    #[builder(default)]
    dry_run: bool,
    #[builder(default = CustomDeserializedGlob::metadata())]
    metadata_glob: CustomDeserializedGlob,
    #[builder(default = CustomDeserializedGlob::backup_dir())]
    backup_dir_glob: CustomDeserializedGlob,
}

/// One source of settings (command line, environment or YAML file) where
/// everything may be missing
#[skip_serializing_none]
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ExpireConfigLayer {
    pub archive_root: Option<PathBuf>,
    pub keep_days: Option<RetentionWindow>,
    pub dry_run: Option<bool>,
    pub metadata_glob: Option<CustomDeserializedGlob>,
    pub backup_dir_glob: Option<CustomDeserializedGlob>,
}

impl ExpireConfigLayer {
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        File::open(path)
            .map_err(|e| Error::entry("Opening", path, e))
            .and_then(|f| {
                serde_yml::from_reader::<_, ExpireConfigLayer>(f)
                    .map_err(Error::from)
                    .add_msg(format!("Parse YAML config failed: {:?}", path))
            })
    }

    /// Fills whatever `self` leaves unset from `lower`.
    pub fn or(self, lower: ExpireConfigLayer) -> ExpireConfigLayer {
        ExpireConfigLayer {
            archive_root: self.archive_root.or(lower.archive_root),
            keep_days: self.keep_days.or(lower.keep_days),
            dry_run: self.dry_run.or(lower.dry_run),
            metadata_glob: self.metadata_glob.or(lower.metadata_glob),
            backup_dir_glob: self.backup_dir_glob.or(lower.backup_dir_glob),
        }
    }
}

impl TryFrom<ExpireConfigLayer> for ExpireConfig {
    type Error = Error;

    fn try_from(layer: ExpireConfigLayer) -> Result<Self> {
        let archive_root = layer
            .archive_root
            .ok_or(Error::MissingConfig("archive location (-w or PGBCK)"))?;
        let keep_days = layer
            .keep_days
            .ok_or(Error::MissingConfig("retention days (-k or PGBCK_KEEP_DAYS)"))?;

        let config = ExpireConfig::builder()
            .archive_root(archive_root)
            .keep_days(keep_days)
            .dry_run(layer.dry_run.unwrap_or_default())
            .metadata_glob(layer.metadata_glob.unwrap_or_else(CustomDeserializedGlob::metadata))
            .backup_dir_glob(
                layer
                    .backup_dir_glob
                    .unwrap_or_else(CustomDeserializedGlob::backup_dir),
            )
            .build();

        config
            .validate()
            .map_err(Error::from)
            .add_msg(format!("Config validation failed: {:?}", config.archive_root))?;
        Ok(config)
    }
}

/// Everything one run found and did
#[derive(Debug)]
pub struct RunSummary {
    pub cutoff: NaiveDateTime,
    pub boundary: Option<BackupRecord>,
    /// History files that could not be found or used
    pub record_errors: Vec<Error>,
    pub sweep: SweepReport,
}

impl RunSummary {
    pub fn failed_count(&self) -> usize {
        self.record_errors.len() + self.sweep.failed_count()
    }

    /// Every error of the run folded into one `LotsOfError`, `None` when the
    /// run was clean.
    pub fn into_error(self) -> Option<Error> {
        let errors = self
            .record_errors
            .into_iter()
            .chain(self.sweep.errors)
            .collect_vec();
        (!errors.is_empty()).then(|| Error::from(errors))
    }
}

impl Display for RunSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "cutoff: {}", self.cutoff)?;
        match &self.boundary {
            Some(boundary) => writeln!(f, "boundary: {}", boundary)?,
            None => writeln!(f, "boundary: none")?,
        }
        if self.sweep.dry_run {
            writeln!(f, "would delete: {}", self.sweep.would_delete.len())?;
        } else {
            writeln!(f, "deleted: {}", self.sweep.deleted.len())?;
        }
        write!(f, "errors: {}", self.failed_count())
    }
}

impl ExpireConfig {
    pub fn wal_dir(&self) -> PathBuf {
        self.archive_root.join(WAL_DIR)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.archive_root.join(DATA_DIR)
    }

    /// Reads every backup history file, picks the boundary and sweeps the
    /// archive. `now` is both the retention reference and the run start.
    pub fn run(&self, now: NaiveDateTime, reporter: &dyn Reporter) -> RunSummary {
        let wal_dir = self.wal_dir();
        let data_dir = self.data_dir();
        reporter.debug(format_args!(
            "Archived wal location is {:?}, backup dir is {:?}, keeping {} days",
            wal_dir, data_dir, self.keep_days
        ));

        let mut record_errors = Vec::new();
        let files = find_backup_metadata_files(&wal_dir, &self.metadata_glob, reporter)
            .unwrap_or_else(|e| {
                reporter.error(format_args!("Cannot look for backup history files: {}", e));
                record_errors.push(e);
                std::iter::empty().into_dyn_iter()
            });

        let records = files.filter_map(|res| match res.and_then(BackupRecord::from_file) {
            Ok(record) => {
                reporter.debug(format_args!("Found backup {}", record));
                Some(record)
            }
            Err(e) => {
                reporter.warn(format_args!("Ignoring backup history file: {}", e));
                record_errors.push(e);
                None
            }
        });
        let evaluation = compute_boundary(records, self.keep_days, now, reporter);
        record_errors.extend(evaluation.excluded);

        let options = SweepOptions::builder()
            .dry_run(self.dry_run)
            .backup_dir_glob(self.backup_dir_glob.clone())
            .started_at(now)
            .build();
        let sweep = expire(
            evaluation.boundary.as_ref(),
            &wal_dir,
            &data_dir,
            &options,
            reporter,
        );

        RunSummary {
            cutoff: evaluation.cutoff,
            boundary: evaluation.boundary,
            record_errors,
            sweep,
        }
    }
}

use crate::expire::record::BackupRecord;
use crate::expire::report::Reporter;
use crate::expire::result_error::error::Error;

use chrono::{Duration, NaiveDateTime};
use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

use std::cmp::Ordering;

/// Number of days of history that must stay restorable
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into, Display,
    Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RetentionWindow(u32);

impl RetentionWindow {
    pub fn days(days: u32) -> Self {
        Self(days)
    }

    pub fn duration(&self) -> Duration {
        Duration::days(i64::from(self.0))
    }

    /// `now` minus the window; saturates at the earliest representable time.
    pub fn cutoff(&self, now: NaiveDateTime) -> NaiveDateTime {
        now.checked_sub_signed(self.duration())
            .unwrap_or(NaiveDateTime::MIN)
    }
}

/// Outcome of reducing all backup records to one boundary
#[derive(Debug)]
pub struct Evaluation {
    pub cutoff: NaiveDateTime,
    /// Newest backup finished at or before `cutoff`
    pub boundary: Option<BackupRecord>,
    /// Records that could not take part, with the reason
    pub excluded: Vec<Error>,
}

/// Picks the newest backup whose stop time is at or before `now - window`.
///
/// Single pass over `records` in any order. Equal stop times are resolved by
/// the smaller `(label, stop wal segment, source)` so repeated runs over the
/// same archive pick the same backup. Records without a stop time are skipped
/// and listed in [`Evaluation::excluded`].
pub fn compute_boundary<I>(
    records: I,
    window: RetentionWindow,
    now: NaiveDateTime,
    reporter: &dyn Reporter,
) -> Evaluation
where
    I: IntoIterator<Item = BackupRecord>,
{
    let cutoff = window.cutoff(now);
    let mut boundary: Option<BackupRecord> = None;
    let mut excluded = Vec::new();

    for record in records {
        let Some(stop_time) = *record.stop_time() else {
            reporter.warn(format_args!(
                "Ignoring backup {} without STOP TIME",
                record.name()
            ));
            excluded.push(Error::MissingStopTime(record.name()));
            continue;
        };

        reporter.debug(format_args!(
            "Is backup {} stopped at {} at or before cutoff {}: {}",
            record.name(),
            stop_time,
            cutoff,
            stop_time <= cutoff
        ));
        if stop_time > cutoff {
            continue;
        }

        if boundary
            .as_ref()
            .map_or(true, |current| supersedes(&record, current))
        {
            boundary = Some(record);
        }
    }

    match &boundary {
        Some(b) => reporter.info(format_args!("Expiration boundary is backup {}", b)),
        None => reporter.info(format_args!(
            "No backup finished at or before {}, nothing to expire",
            cutoff
        )),
    }

    Evaluation {
        cutoff,
        boundary,
        excluded,
    }
}

fn supersedes(candidate: &BackupRecord, current: &BackupRecord) -> bool {
    match candidate.stop_time().cmp(current.stop_time()) {
        Ordering::Greater => true,
        Ordering::Equal => candidate.tie_break_key() < current.tie_break_key(),
        Ordering::Less => false,
    }
}

//! Parsing of the `*.backup` history files PostgreSQL writes next to the
//! archived WAL segments when a base backup completes.

use crate::expire::result_error::error::Error;
use crate::expire::result_error::result::Result;
use crate::expire::result_error::AddMsg;

use bon::Builder;
use chrono::NaiveDateTime;
use getset::Getters;

use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// `YYYY-MM-DD HH:MM:SS`; the trailing zone abbreviation is split off first.
pub static STOP_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Completion metadata of one full backup
///
/// `stop_time` is `None` when the history file had no `STOP TIME` line; such a
/// record is kept around for reporting but never takes part in retention.
#[derive(Clone, Debug, Default, PartialEq, Eq, Builder, Getters)]
#[getset(get = "pub")]
pub struct BackupRecord {
    #[builder(into)]
    label: Option<String>,
    #[builder(into)]
    stop_wal_segment: Option<String>,
    stop_time: Option<NaiveDateTime>,
    #[builder(into)]
    source: Option<PathBuf>,
}

impl BackupRecord {
    /// Reads and parses one history file, remembering where it came from.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<BackupRecord> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| Error::entry("Reading", path, e))?;
        let mut record =
            parse_backup_record(content.lines()).map_err(|e| Error::entry("Parsing", path, e))?;
        record.source = Some(path.to_path_buf());
        Ok(record)
    }

    /// Best human readable handle: label, then source file.
    pub fn name(&self) -> String {
        match (&self.label, &self.source) {
            (Some(label), _) => label.clone(),
            (None, Some(source)) => source.display().to_string(),
            (None, None) => "<unlabeled>".to_string(),
        }
    }

    /// Ordering used when two records finished at the same second.
    pub(crate) fn tie_break_key(&self) -> (Option<&str>, Option<&str>, Option<&Path>) {
        (
            self.label.as_deref(),
            self.stop_wal_segment.as_deref(),
            self.source.as_deref(),
        )
    }
}

impl Display for BackupRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (stop wal {}, stop time {})",
            self.name(),
            self.stop_wal_segment.as_deref().unwrap_or("-"),
            self.stop_time
                .map(|t| t.to_string())
                .unwrap_or_else(|| "-".to_string())
        )
    }
}

/// Builds a record from the lines of a history file.
///
/// Lines are recognised by substring, so their order does not matter and
/// unknown directives are skipped. `STOP TIME` is only recognised with its
/// colon so the `STOP TIMELINE` line of newer servers is not mistaken for it.
/// A recognised line missing its value fails the whole record.
pub fn parse_backup_record<I, S>(lines: I) -> Result<BackupRecord>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut record = BackupRecord::default();
    for line in lines {
        let line = line.as_ref().trim_end();
        if line.contains("STOP WAL") {
            record.stop_wal_segment = Some(parse_wal_segment(line)?);
        } else if line.contains("STOP TIME:") {
            record.stop_time = Some(parse_stop_time(line)?);
        } else if line.contains("LABEL") {
            record.label = Some(parse_label(line)?);
        }
    }
    Ok(record)
}

fn missing(directive: &'static str, expected: &'static str, line: &str) -> Error {
    Error::MissingPattern {
        directive,
        expected,
        line: line.to_string(),
    }
}

fn parse_wal_segment(line: &str) -> Result<String> {
    line.match_indices("file")
        .find_map(|(idx, word)| {
            let rest = &line[idx + word.len()..];
            let id_start = rest.trim_start();
            if id_start.len() == rest.len() {
                return None;
            }
            let id: String = id_start
                .chars()
                .take_while(|c| c.is_ascii_hexdigit())
                .collect();
            (!id.is_empty()).then_some(id)
        })
        .ok_or_else(|| missing("STOP WAL", "segment file", line))
}

fn parse_stop_time(line: &str) -> Result<NaiveDateTime> {
    let (_, value) = line
        .split_once("TIME:")
        .ok_or_else(|| missing("STOP TIME", "timestamp", line))?;
    let (date_time, zone) = value
        .trim()
        .rsplit_once(char::is_whitespace)
        .ok_or_else(|| missing("STOP TIME", "time zone", line))?;
    if zone.is_empty() || zone.contains(':') {
        return Err(missing("STOP TIME", "time zone", line));
    }

    NaiveDateTime::parse_from_str(date_time.trim_end(), STOP_TIME_FORMAT)
        .map_err(Error::from)
        .add_msg(format!("Parsing STOP TIME from {:?} failed", line))
}

fn parse_label(line: &str) -> Result<String> {
    line.split_once("LABEL:")
        .map(|(_, label)| label.trim())
        .filter(|label| !label.is_empty())
        .map(str::to_string)
        .ok_or_else(|| missing("LABEL", "label", line))
}

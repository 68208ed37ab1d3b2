use crate::expire::result_error::{AddFunctionName, AddMsg};
use itertools::Itertools;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    WalkDir(#[from] walkdir::Error),
    #[error(transparent)]
    Glob(#[from] globset::Error),
    #[error(transparent)]
    ChronoParse(#[from] chrono::ParseError),
    #[error(transparent)]
    ValidationError(#[from] validator::ValidationErrors),
    #[error(transparent)]
    SerdeYml(#[from] serde_yml::Error),
    #[error("{directive} line has no {expected}: {line:?}")]
    MissingPattern {
        directive: &'static str,
        expected: &'static str,
        line: String,
    },
    #[error("backup record {0} has no STOP TIME")]
    MissingStopTime(String),
    #[error("{0} is not configured")]
    MissingConfig(&'static str),
    #[error("{} {:?} failed:\n{}", action, path, indent::indent_all_with("  ", error.to_string()))]
    Entry {
        action: &'static str,
        path: PathBuf,
        error: Box<Error>,
    },
    #[error("{}:\n{}", msg, indent::indent_all_with("  ", error.to_string()))]
    WithMsg { msg: String, error: Box<Error> },
    #[error("{} failed:\n{}", fn_name, indent::indent_all_with("  ", error.to_string()))]
    WithFunctionName { error: Box<Error>, fn_name: String },
    #[error("{}", itertools::join(.0, "\n\n"))]
    LotsOfError(Vec<Error>),
}

impl<S: Into<String>> AddFunctionName<S> for Error {
    fn add_fn_name(self, fn_name: S) -> Self {
        Error::WithFunctionName {
            error: Box::new(self),
            fn_name: fn_name.into(),
        }
    }
}

impl<S: Into<String>> AddMsg<S> for Error {
    fn add_msg(self, msg: S) -> Self {
        Self::WithMsg {
            msg: msg.into(),
            error: Box::new(self),
        }
    }
}

impl From<Vec<Error>> for Error {
    fn from(errors: Vec<Error>) -> Self {
        if errors.is_empty() {
            panic!("Should not create lots of errors when error is empty")
        }
        Self::LotsOfError(errors.into_iter().flat_map(Error::into_iter).collect_vec())
    }
}

impl Error {
    /// Wraps an error that concerns a single filesystem entry.
    pub fn entry<P: Into<PathBuf>, E: Into<Error>>(action: &'static str, path: P, error: E) -> Self {
        Error::Entry {
            action,
            path: path.into(),
            error: Box::new(error.into()),
        }
    }

    /// Path of the filesystem entry this error is about, if any.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Error::Entry { path, .. } => Some(path),
            Error::WithMsg { error, .. } | Error::WithFunctionName { error, .. } => error.path(),
            Error::WalkDir(e) => e.path(),
            _ => None,
        }
    }

    /// OS error code of the underlying io error, looking through wrappers.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Error::Io(e) => e.raw_os_error(),
            Error::WalkDir(e) => e.io_error().and_then(std::io::Error::raw_os_error),
            Error::Entry { error, .. }
            | Error::WithMsg { error, .. }
            | Error::WithFunctionName { error, .. } => error.raw_os_error(),
            _ => None,
        }
    }

    /// Flattens nested `LotsOfError` into the errors it holds.
    pub fn into_iter(self) -> Box<dyn Iterator<Item = Error>> {
        match self {
            Error::LotsOfError(v) => Box::new(v.into_iter().flat_map(Error::into_iter)),
            e => Box::new(std::iter::once(e)),
        }
    }
}

//! Validation functions for configuration values.

use validator::ValidationError;

use std::path::Path;

pub fn validate_dir_exist<P: AsRef<Path>>(dir: P) -> Result<(), ValidationError> {
    let dir = dir.as_ref();
    let invalid = |msg: String| ValidationError::new("InvalidDirectory").with_message(msg.into());
    match std::fs::metadata(dir) {
        Ok(md) if md.is_dir() => Ok(()),
        Ok(_) => Err(invalid(format!("{:?} is not a directory", dir))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(invalid(format!("{:?} not found", dir)))
        }
        Err(e) => Err(invalid(format!("cannot access {:?}: {}", dir, e))),
    }
}

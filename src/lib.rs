//! # pg_expire_backup
//!
//! Expires PostgreSQL base backups and archived WAL segments that fall out of a
//! retention window.
//!
//! ## How it decides
//!
//! - **History files**: every `wal/*.backup` file written by PostgreSQL at the
//!   end of a base backup is parsed for its label and `STOP TIME`
//! - **Boundary**: the newest backup that stopped at or before `now - keep_days`
//! - **Sweep**: WAL files and `data/*bck*` backup directories modified strictly
//!   before the boundary's stop time are removed; the boundary and anything
//!   newer stay
//!
//! ## Quick Start
//!
//! ```no_run
//! use pg_expire_backup::expire::expire_config::ExpireConfig;
//! use pg_expire_backup::expire::report::TracingReporter;
//!
//! let config = ExpireConfig::builder()
//!     .archive_root("/srv/pgbck")
//!     .keep_days(7u32)
//!     .dry_run(true)
//!     .build();
//!
//! let summary = config.run(chrono::Local::now().naive_local(), &TracingReporter);
//! println!("{summary}");
//! ```

pub mod expire;

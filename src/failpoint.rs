//! Env-var driven fault injection for exercising rollback paths in tests.
//!
//! `SHELF_MOVE_FAILPOINT` names a single site (e.g. `finalize-link`); when the
//! running code reaches that site it returns an injected I/O error instead of
//! performing the step. Unset in normal operation, so the per-site check is a
//! single env lookup.
//!
//! Known sites: `copy`, `finalize-rename`, `finalize-delete`, `finalize-link`,
//! `restore-unlink`, `restore-rename`, `restore-delete`.

use std::io;

pub const FAILPOINT_ENV: &str = "SHELF_MOVE_FAILPOINT";

/// Returns an injected error when `site` is armed via the environment.
pub(crate) fn hit(site: &str) -> io::Result<()> {
    match std::env::var(FAILPOINT_ENV) {
        Ok(v) if v == site => Err(io::Error::other(format!("injected failure at {site}"))),
        _ => Ok(()),
    }
}

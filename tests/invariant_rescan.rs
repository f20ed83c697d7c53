#![cfg(unix)]

//! The single-resident invariant: after any committed or rolled-back attempt,
//! re-scanning both stores finds exactly one of {real primary content, link to
//! real secondary content, secondary-only content} per identity — never two
//! independent real copies and never a link with a missing target.

use std::fs;
use std::path::Path;

use serial_test::serial;
use shelf_move::model::path_content_size;
use shelf_move::transfer::{shelve, unshelve, Outcome};
use shelf_move::{Config, FAILPOINT_ENV};
use shelf_move::model::Model;
use tempfile::tempdir;

struct Failpoint;

impl Failpoint {
    fn arm(site: &str) -> Self {
        unsafe { std::env::set_var(FAILPOINT_ENV, site) };
        Failpoint
    }
}

impl Drop for Failpoint {
    fn drop(&mut self) {
        unsafe { std::env::remove_var(FAILPOINT_ENV) };
    }
}

fn cfg_with_bases(td: &Path) -> Config {
    let primary = td.join("primary");
    let secondary = td.join("secondary");
    fs::create_dir_all(&primary).unwrap();
    fs::create_dir_all(&secondary).unwrap();
    Config::new(primary, secondary)
}

/// Assert the invariant holds for `identity` by direct filesystem inspection.
fn assert_single_resident(cfg: &Config, identity: &str) {
    let primary = cfg.primary_path(identity);
    let secondary = cfg.secondary_path(identity);

    let primary_meta = fs::symlink_metadata(&primary).ok();
    let primary_is_link = primary_meta
        .as_ref()
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false);
    let primary_real = primary_meta.is_some()
        && !primary_is_link
        && path_content_size(&primary).unwrap_or(0) > 0;
    let secondary_real = fs::symlink_metadata(&secondary).is_ok()
        && path_content_size(&secondary).unwrap_or(0) > 0;

    if primary_is_link {
        let target = fs::read_link(&primary).unwrap();
        assert!(
            path_content_size(&target).unwrap_or(0) > 0,
            "{identity}: link with missing/empty target"
        );
        assert!(
            !primary_real,
            "{identity}: link and real primary content at once"
        );
        return;
    }

    assert!(
        !(primary_real && secondary_real),
        "{identity}: two independent real copies"
    );
    assert!(
        primary_real || secondary_real,
        "{identity}: content vanished entirely"
    );
}

fn seed(cfg: &Config, identity: &str) {
    let dir = cfg.primary_path(identity);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("w.gguf"), b"invariant-payload").unwrap();
}

#[test]
fn invariant_holds_after_committed_shelve_and_restore() -> Result<(), Box<dyn std::error::Error>> {
    let td = tempdir()?;
    let cfg = cfg_with_bases(td.path());
    seed(&cfg, "m");

    let model = Model::inspect(&cfg, "m")?;
    assert_eq!(shelve(&cfg, &model).outcome, Outcome::Committed);
    assert_single_resident(&cfg, "m");

    let model = Model::inspect(&cfg, "m")?;
    assert_eq!(unshelve(&cfg, &model).outcome, Outcome::Committed);
    assert_single_resident(&cfg, "m");
    Ok(())
}

#[test]
#[serial]
fn invariant_holds_after_every_rolled_back_site() -> Result<(), Box<dyn std::error::Error>> {
    let td = tempdir()?;
    let cfg = cfg_with_bases(td.path());

    for site in ["copy", "finalize-rename", "finalize-delete"] {
        let identity = format!("m-{site}");
        seed(&cfg, &identity);
        let model = Model::inspect(&cfg, &identity)?;
        let res = {
            let _fp = Failpoint::arm(site);
            shelve(&cfg, &model)
        };
        assert_eq!(res.outcome, Outcome::RolledBack, "site {site}");
        assert_single_resident(&cfg, &identity);
    }

    for site in ["copy", "restore-unlink", "restore-rename"] {
        let identity = format!("r-{site}");
        seed(&cfg, &identity);
        let model = Model::inspect(&cfg, &identity)?;
        assert_eq!(shelve(&cfg, &model).outcome, Outcome::Committed);

        let model = Model::inspect(&cfg, &identity)?;
        let res = {
            let _fp = Failpoint::arm(site);
            unshelve(&cfg, &model)
        };
        assert_eq!(res.outcome, Outcome::RolledBack, "site {site}");
        assert_single_resident(&cfg, &identity);
    }
    Ok(())
}

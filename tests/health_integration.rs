#![cfg(unix)]

use std::fs;
use std::path::Path;

use shelf_move::health::{check_health, repair};
use shelf_move::inventory::{scan_store, AnomalyKind, Store};
use shelf_move::model::Model;
use shelf_move::transfer::{shelve, Outcome};
use shelf_move::Config;
use tempfile::tempdir;

fn cfg_with_bases(td: &Path) -> Config {
    let primary = td.join("primary");
    let secondary = td.join("secondary");
    fs::create_dir_all(&primary).unwrap();
    fs::create_dir_all(&secondary).unwrap();
    Config::new(primary, secondary)
}

fn shelved(cfg: &Config, identity: &str) {
    let dir = cfg.primary_path(identity);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("w.gguf"), b"payload").unwrap();
    let model = Model::inspect(cfg, identity).unwrap();
    assert_eq!(shelve(cfg, &model).outcome, Outcome::Committed);
}

#[test]
fn media_loss_shows_up_as_broken_and_repair_clears_it() -> Result<(), Box<dyn std::error::Error>> {
    let td = tempdir()?;
    let cfg = cfg_with_bases(td.path());
    shelved(&cfg, "lab/survivor");
    shelved(&cfg, "lab/victim");

    // Simulate the secondary media losing one entity's content.
    fs::remove_dir_all(cfg.secondary_path("lab/victim"))?;

    let report = check_health(&cfg)?;
    assert_eq!(report.healthy, vec!["lab/survivor"]);
    assert_eq!(report.broken, vec!["lab/victim"]);
    assert!(report.orphaned.is_empty());

    // Repair removes only the dead link; the survivor is untouched.
    let results = repair(&cfg, &report.broken);
    assert!(results.iter().all(|r| r.removed));
    assert!(fs::symlink_metadata(cfg.primary_path("lab/victim")).is_err());
    assert!(cfg.secondary_path("lab/survivor").join("w.gguf").exists());

    // After repair the monitor is clean and stays clean on a second pass.
    let after = check_health(&cfg)?;
    assert!(after.is_clean());
    assert_eq!(after, check_health(&cfg)?);
    Ok(())
}

#[test]
fn scanner_reports_broken_links_as_anomalies_after_media_loss(
) -> Result<(), Box<dyn std::error::Error>> {
    let td = tempdir()?;
    let cfg = cfg_with_bases(td.path());
    shelved(&cfg, "gone");
    fs::remove_dir_all(cfg.secondary_path("gone"))?;

    let outcome = scan_store(&cfg, Store::Primary)?;
    assert!(outcome.models.is_empty());
    assert_eq!(outcome.anomalies.len(), 1);
    assert_eq!(outcome.anomalies[0].identity, "gone");
    assert_eq!(outcome.anomalies[0].kind, AnomalyKind::BrokenLink);
    Ok(())
}

#[test]
fn hand_made_links_outside_the_secondary_store_are_orphaned(
) -> Result<(), Box<dyn std::error::Error>> {
    let td = tempdir()?;
    let cfg = cfg_with_bases(td.path());

    let elsewhere = td.path().join("some-other-disk");
    fs::create_dir_all(&elsewhere)?;
    fs::write(elsewhere.join("w.gguf"), b"not ours")?;
    std::os::unix::fs::symlink(&elsewhere, cfg.primary_path("stray"))?;

    let report = check_health(&cfg)?;
    assert_eq!(report.orphaned, vec!["stray"]);
    assert!(report.broken.is_empty());

    // Orphaned links are informational; repair of an empty broken list is a
    // no-op and the stray link survives.
    assert!(repair(&cfg, &report.broken).is_empty());
    assert!(fs::symlink_metadata(cfg.primary_path("stray"))?.file_type().is_symlink());
    Ok(())
}

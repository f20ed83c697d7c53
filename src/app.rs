//! Application orchestrator.
//! Loads/merges config, initializes logging, installs signal handlers,
//! validates the store roots, and drives scan -> plan -> transfer -> health
//! around the engine.

use anyhow::{bail, Result};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use shelf_move::cli::{Args, Selection};
use shelf_move::config::{default_config_path, ensure_default_config_exists, Config};
use shelf_move::config::xml::{apply_env_overrides, load_config_from_xml};
use shelf_move::health;
use shelf_move::inventory::{scan_store, ScanOutcome, Store};
use shelf_move::model::{Model, Residency, Shape};
use shelf_move::output as out;
use shelf_move::planner;
use shelf_move::platform;
use shelf_move::shutdown;
use shelf_move::transfer::{run_plan, MovePlan, MoveRequest, Outcome};

use crate::logging::init_tracing;

/// Run the CLI application.
pub fn run(args: Args) -> Result<()> {
    // Handle --print-config before logging init
    if args.print_config {
        match default_config_path() {
            Ok(p) => {
                out::print_info(&format!("shelf_move config path:\n  {}\n", p.display()));
                if std::env::var_os("SHELF_MOVE_CONFIG").is_some() {
                    out::print_info("Path comes from SHELF_MOVE_CONFIG; unset it to use the default location.");
                } else if p.exists() {
                    out::print_info("A config file already exists at that location.");
                } else {
                    out::print_info("No config file exists there yet. Run without --print-config to create a template.");
                }
            }
            Err(e) => {
                out::print_error(&format!("Could not determine a config path: {e}"));
            }
        }
        return Ok(());
    }

    // Create template config if none exists (before logging init)
    if let Some(path) = ensure_default_config_exists() {
        out::print_success(&format!(
            "A template shelf_move config was written to: {}",
            path.display()
        ));
        out::print_info("Edit the file to set `primary_base` and `secondary_base`, then re-run this command. To use a different location set SHELF_MOVE_CONFIG.");
        return Ok(());
    }

    // Build config: XML (if present) -> env overrides -> CLI overrides.
    let mut cfg = load_config_from_xml().unwrap_or_default();
    apply_env_overrides(&mut cfg);
    args.apply_overrides(&mut cfg);

    // Initialize logging and capture the guard so we can drop it on signal
    let guard_opt = init_tracing(&cfg.log_level, cfg.log_file.as_deref(), args.json)
        .inspect_err(|e| out::print_error(&format!("Failed to initialize logging: {e}")))?;

    let guard_slot = Arc::new(Mutex::new(guard_opt));
    {
        let guard_slot = Arc::clone(&guard_slot);
        ctrlc::set_handler(move || {
            shutdown::request();
            out::print_warn("Received interrupt; finishing the current entity then stopping...");
            if let Ok(mut g) = guard_slot.lock() {
                let _ = g.take(); // drop guard here to flush tracing_appender
            }
        })
        .expect("failed to install signal handler");
    }

    debug!("Starting shelf_move: {:?}", args);

    let result = run_inner(&args, &cfg);

    // Ensure logs are flushed before exit
    if let Ok(mut g) = guard_slot.lock() {
        let _ = g.take();
    }

    result
}

fn run_inner(args: &Args, cfg: &Config) -> Result<()> {
    cfg.validate()?;

    // Links written during finalization embed the secondary root verbatim;
    // resolve both roots so those targets are absolute.
    let cfg = &{
        let mut c = cfg.clone();
        c.normalize();
        c
    };

    if args.check_health || args.repair {
        return run_health(cfg, args.repair);
    }

    if args.show_secondary {
        let outcome = scan_store(cfg, Store::Secondary)?;
        print_listing("Secondary store", &outcome.models);
        return Ok(());
    }

    let outcome = scan_store(cfg, Store::Primary)?;
    report_anomalies(&outcome);
    print_overview(cfg, &outcome)?;

    if args.list_only {
        return Ok(());
    }

    let Some(selection) = args.selection() else {
        out::print_info("Nothing selected. Use --select all or --select id,id,... to move entities.");
        return Ok(());
    };

    let dest = if args.restore {
        Store::Primary
    } else {
        Store::Secondary
    };
    let plan = build_plan(&outcome, &selection, dest)?;
    if plan.requests.is_empty() {
        out::print_info("Selection matched no movable entities.");
        return Ok(());
    }

    print_preflight_summary(cfg, &plan, dest)?;

    let results = run_plan(cfg, &plan);

    let mut committed = 0usize;
    let mut bytes: u64 = 0;
    let mut followup = false;
    for r in &results {
        match r.outcome {
            Outcome::Committed => {
                committed += 1;
                bytes += r.bytes_moved;
                out::print_success(&format!(
                    "{}: {} ({} in {})",
                    r.identity,
                    r.outcome.label(),
                    out::format_bytes(r.bytes_moved),
                    out::format_duration(r.duration)
                ));
            }
            _ => {
                followup |= r.outcome.needs_followup();
                out::print_error(&format!(
                    "{}: {} — {}",
                    r.identity,
                    r.outcome.label(),
                    r.error.as_deref().unwrap_or("no detail")
                ));
            }
        }
    }

    out::print_user(&format!(
        "Moved {committed}/{} entities, {} total",
        results.len(),
        out::format_bytes(bytes)
    ));

    // Confirm the post-condition after a real batch.
    if !cfg.dry_run {
        let report = health::check_health(cfg)?;
        if !report.is_clean() {
            out::print_warn(&format!(
                "Post-transfer health check found {} broken link(s); run --repair",
                report.broken.len()
            ));
        }
    }
    if followup {
        out::print_warn("One or more entities finalized partially; run --check-health and resolve manually.");
    }

    if committed != results.len() {
        bail!("{} of {} entities did not commit", results.len() - committed, results.len());
    }
    Ok(())
}

fn run_health(cfg: &Config, do_repair: bool) -> Result<()> {
    let report = health::check_health(cfg)?;
    info!(
        healthy = report.healthy.len(),
        broken = report.broken.len(),
        orphaned = report.orphaned.len(),
        "health check"
    );

    if report.link_count() == 0 {
        out::print_info("No redirection links found under the primary store.");
        return Ok(());
    }
    for id in &report.healthy {
        out::print_success(&format!("{id}: healthy"));
    }
    for id in &report.orphaned {
        out::print_warn(&format!("{id}: orphaned (target outside the secondary store)"));
    }
    for id in &report.broken {
        out::print_error(&format!("{id}: broken"));
    }

    if !do_repair {
        if !report.is_clean() {
            out::print_info("Use --repair to remove broken redirection links.");
        }
        return Ok(());
    }

    if report.is_clean() {
        out::print_success("No repairs needed.");
        return Ok(());
    }

    let results = health::repair(cfg, &report.broken);
    let mut failed = 0usize;
    for r in &results {
        if r.removed {
            out::print_success(&format!("{}: removed broken link", r.identity));
        } else {
            failed += 1;
            out::print_error(&format!(
                "{}: repair failed — {}",
                r.identity,
                r.error.as_deref().unwrap_or("no detail")
            ));
        }
    }
    if failed > 0 {
        bail!("{failed} repair(s) failed");
    }
    Ok(())
}

fn report_anomalies(outcome: &ScanOutcome) {
    for a in &outcome.anomalies {
        out::print_warn(&format!("{}: skipped ({:?})", a.identity, a.kind));
    }
}

fn print_overview(cfg: &Config, outcome: &ScanOutcome) -> Result<()> {
    let resident: Vec<&Model> = outcome.resident().collect();
    let shelved: Vec<&Model> = outcome.shelved().collect();

    let resident_bytes: u64 = resident.iter().filter_map(|m| m.resolve_size().ok()).sum();
    let shelved_bytes: u64 = shelved.iter().filter_map(|m| m.resolve_size().ok()).sum();

    out::print_user(&format!(
        "Primary store: {} resident entities, {}",
        resident.len(),
        out::format_bytes(resident_bytes)
    ));
    out::print_user(&format!(
        "Shelved:       {} entities, {}",
        shelved.len(),
        out::format_bytes(shelved_bytes)
    ));
    let free = platform::free_space_bytes(&cfg.secondary_base)?;
    out::print_user(&format!(
        "Secondary free: {}",
        out::format_bytes(free)
    ));

    print_listing("Entities", &outcome.models);
    Ok(())
}

fn print_listing(title: &str, models: &[Model]) {
    if models.is_empty() {
        out::print_info(&format!("{title}: none found."));
        return;
    }
    out::print_user(&format!("{title}:"));
    for m in models {
        let size = m
            .resolve_size()
            .map(out::format_bytes)
            .unwrap_or_else(|_| "?".into());
        let place = match m.residency {
            Residency::Primary => "primary",
            Residency::Secondary => {
                if m.shape == Shape::Shelved {
                    "shelved"
                } else {
                    "secondary"
                }
            }
            Residency::Unknown => "broken",
        };
        out::print_user(&format!(
            "  {:<40} {:>10}  [{}] {}",
            m.identity,
            size,
            m.shape.label(),
            place
        ));
    }
}

fn build_plan(outcome: &ScanOutcome, selection: &Selection, dest: Store) -> Result<MovePlan> {
    let candidates: Vec<&Model> = match dest {
        Store::Secondary => outcome.resident().collect(),
        Store::Primary => outcome.shelved().collect(),
    };

    let identities: Vec<String> = match selection {
        Selection::All => candidates.iter().map(|m| m.identity.clone()).collect(),
        Selection::Identities(ids) => {
            // Unknown identities are still put on the plan; the engine reports
            // them per-entity instead of silently dropping them.
            ids.clone()
        }
    };

    Ok(MovePlan {
        requests: identities
            .into_iter()
            .map(|identity| MoveRequest { identity, dest })
            .collect(),
    })
}

fn print_preflight_summary(cfg: &Config, plan: &MovePlan, dest: Store) -> Result<()> {
    let mut required: u64 = 0;
    for req in &plan.requests {
        if let Ok(m) = Model::inspect(cfg, &req.identity) {
            let bytes = m.resolve_size().unwrap_or(0);
            required += bytes;
            out::print_user(&format!(
                "  - {} ({})",
                m.display_name(),
                out::format_bytes(bytes)
            ));
        }
    }
    let root = dest.root(cfg);
    let free = platform::free_space_bytes(root)?;
    let sample = planner::sample_write_throughput(root);
    let eta = planner::estimate_duration(required, sample);

    out::print_user(&format!(
        "About to move {} entities, {} -> {} store ({} free, margin {})",
        plan.requests.len(),
        out::format_bytes(required),
        dest.label(),
        out::format_bytes(free),
        out::format_bytes(cfg.free_space_margin)
    ));
    let qualifier = if sample.probed { "measured" } else { "assumed" };
    out::print_info(&format!(
        "Estimated transfer time: {} ({} {}/s)",
        out::format_duration(eta),
        qualifier,
        out::format_bytes(sample.bytes_per_sec)
    ));
    Ok(())
}

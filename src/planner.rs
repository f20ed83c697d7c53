//! Space planner: pre-flight feasibility and duration estimation.
//!
//! `plan` and `estimate_duration` are pure; free space and throughput are
//! measured by the caller and passed in, so the planner itself never touches
//! the filesystem. `sample_write_throughput` is the caller-side probe.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::debug;

/// Bytes-per-second estimate for the destination store, supplied by the
/// caller (e.g. from a timed probe write).
#[derive(Debug, Clone, Copy)]
pub struct ThroughputSample {
    pub bytes_per_sec: u64,
    /// False when the value is the fallback assumption rather than a probe.
    pub probed: bool,
}

/// Fallback when the destination cannot be probed (roughly USB 3.0 media).
pub const FALLBACK_BYTES_PER_SEC: u64 = 50 * 1024 * 1024;

const PROBE_SIZE: usize = 1024 * 1024;

/// Outcome of a feasibility check for one batch against one destination.
#[derive(Debug, Clone, Copy)]
pub struct SpacePlan {
    pub feasible: bool,
    pub required_bytes: u64,
    pub available_bytes: u64,
    pub margin_bytes: u64,
}

/// Check whether `required_bytes` fit on a destination reporting
/// `available_bytes` free, keeping `margin_bytes` untouched.
pub fn plan(required_bytes: u64, available_bytes: u64, margin_bytes: u64) -> SpacePlan {
    let usable = available_bytes.saturating_sub(margin_bytes);
    SpacePlan {
        feasible: required_bytes <= usable,
        required_bytes,
        available_bytes,
        margin_bytes,
    }
}

/// Wall-clock estimate for moving `bytes` at the sampled rate.
pub fn estimate_duration(bytes: u64, throughput: ThroughputSample) -> Duration {
    let rate = throughput.bytes_per_sec.max(1);
    let secs = bytes as f64 / rate as f64;
    Duration::from_secs_f64(secs)
}

/// Probe write throughput of `dir` with a 1 MiB fsynced write. This is the
/// caller-side sampler; the engine and `plan` never invoke it. Falls back to
/// a fixed assumption when the probe cannot run.
pub fn sample_write_throughput(dir: &Path) -> ThroughputSample {
    let probe = dir.join(format!(".shelf_move_speed_{}.tmp", std::process::id()));
    let data = vec![0u8; PROBE_SIZE];

    let measured = (|| -> std::io::Result<u64> {
        let start = Instant::now();
        let mut f = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&probe)?;
        f.write_all(&data)?;
        f.sync_all()?;
        drop(f);
        let elapsed = start.elapsed();
        std::fs::remove_file(&probe)?;
        let secs = elapsed.as_secs_f64();
        if secs <= 0.0 {
            return Ok(u64::MAX);
        }
        Ok((PROBE_SIZE as f64 / secs) as u64)
    })();

    match measured {
        Ok(rate) => {
            debug!(rate, dir = %dir.display(), "write throughput probed");
            ThroughputSample {
                bytes_per_sec: rate,
                probed: true,
            }
        }
        Err(e) => {
            let _ = std::fs::remove_file(&probe);
            debug!(error = %e, "throughput probe failed; using fallback rate");
            ThroughputSample {
                bytes_per_sec: FALLBACK_BYTES_PER_SEC,
                probed: false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn plan_respects_margin() {
        // 40 GB free, 50 GB requested: infeasible well before the margin.
        let p = plan(50_000_000_000, 40_000_000_000, 100 * 1024 * 1024);
        assert!(!p.feasible);

        // Fits with room to spare.
        let p = plan(1_000, 1_000_000, 100);
        assert!(p.feasible);

        // Exactly eats into the margin: rejected.
        let p = plan(950, 1_000, 100);
        assert!(!p.feasible);

        // Exactly at the usable boundary: accepted.
        let p = plan(900, 1_000, 100);
        assert!(p.feasible);
    }

    #[test]
    fn plan_margin_larger_than_free_is_infeasible() {
        let p = plan(1, 50, 100);
        assert!(!p.feasible);
    }

    #[test]
    fn duration_scales_with_bytes() {
        let tp = ThroughputSample {
            bytes_per_sec: 100,
            probed: true,
        };
        assert_eq!(estimate_duration(1_000, tp), Duration::from_secs(10));
        let zero = ThroughputSample {
            bytes_per_sec: 0,
            probed: false,
        };
        // Degenerate rate clamps instead of dividing by zero.
        assert!(estimate_duration(1_000, zero) <= Duration::from_secs(1_000));
    }

    #[test]
    fn probe_reports_a_rate_and_cleans_up() {
        let td = tempdir().unwrap();
        let sample = sample_write_throughput(td.path());
        assert!(sample.bytes_per_sec > 0);
        let leftovers: Vec<_> = std::fs::read_dir(td.path()).unwrap().collect();
        assert!(leftovers.is_empty(), "probe file should be removed");
    }

    #[test]
    fn probe_falls_back_on_unwritable_dir() {
        let td = tempdir().unwrap();
        let missing = td.path().join("absent");
        let sample = sample_write_throughput(&missing);
        assert!(!sample.probed);
        assert_eq!(sample.bytes_per_sec, FALLBACK_BYTES_PER_SEC);
    }
}

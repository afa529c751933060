//! Time-limited solves return on the calling thread and leave nothing running.
//!
//! Kept in its own test binary so no other test changes the thread count.

use kcmc_algo::{encode, solve, EncodeParams, Formulation, SolveParams, SolveStatus};
use kcmc_core::Instance;
use std::time::{Duration, Instant};

/// 8×8 sensor grid with a POI in every 2×2 cell and the sink along row 0.
fn grid_instance() -> Instance {
    const SIDE: u32 = 8;
    let sensor = |row: u32, col: u32| row * SIDE + col;
    let mut raw = format!("KCMC;{} {} 1;100 10 10;7;PI", (SIDE - 1) * (SIDE - 1), SIDE * SIDE);
    for row in 0..SIDE - 1 {
        for col in 0..SIDE - 1 {
            let poi = row * (SIDE - 1) + col;
            for (dr, dc) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
                raw.push_str(&format!(";{} {}", poi, sensor(row + dr, col + dc)));
            }
        }
    }
    raw.push_str(";II");
    for row in 0..SIDE {
        for col in 0..SIDE {
            if col + 1 < SIDE {
                raw.push_str(&format!(";{} {}", sensor(row, col), sensor(row, col + 1)));
            }
            if row + 1 < SIDE {
                raw.push_str(&format!(";{} {}", sensor(row, col), sensor(row + 1, col)));
            }
        }
    }
    raw.push_str(";IS");
    for col in 0..SIDE {
        raw.push_str(&format!(";{} 0", sensor(0, col)));
    }
    raw.push_str(";END");
    Instance::parse(&raw).unwrap()
}

#[cfg(target_os = "linux")]
fn thread_count() -> usize {
    let status = std::fs::read_to_string("/proc/self/status").unwrap();
    status
        .lines()
        .find_map(|line| line.strip_prefix("Threads:"))
        .and_then(|count| count.trim().parse().ok())
        .unwrap()
}

#[test]
fn short_time_limit_stops_the_backend() {
    let instance = grid_instance();
    let params = EncodeParams {
        k: 3,
        m: 2,
        y_binary: false,
    };
    let encoded = encode(&instance, Formulation::MultiFlow, &params).unwrap();
    let limit = Duration::from_millis(200);
    let solve_params = SolveParams {
        time_limit: limit,
        ..SolveParams::default()
    };

    #[cfg(target_os = "linux")]
    let threads_before = thread_count();
    let start = Instant::now();
    let outcome = solve(encoded.model(), &solve_params).unwrap();
    let elapsed = start.elapsed();

    assert!(
        elapsed < limit + Duration::from_secs(5),
        "solve returned after {elapsed:?}"
    );
    assert_ne!(outcome.status, SolveStatus::Infeasible);
    if let Some(values) = &outcome.values {
        assert!(encoded.model().is_feasible(values));
    }
    if outcome.status == SolveStatus::LimitReached {
        assert_eq!(outcome.diagnostics.mip_gap, None);
    }

    #[cfg(target_os = "linux")]
    {
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(thread_count(), threads_before, "solver left a thread behind");
    }
}

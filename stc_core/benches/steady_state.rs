use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use stc_core::config::{BinningCfg, DetectorCfg, IngestCfg};
use stc_core::mocks::thermal_rows;
use stc_core::{compute_section_medians, detect_steady_state, ingest};

// Cooling curve with a settled tail and additive noise
fn synth_temps(n: usize, noise_amp: f64, seed: u32) -> Vec<f64> {
    // tiny PRNG
    let mut state = seed.max(1);
    let mut next_f64 = || {
        let mut x = state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        state = x;
        f64::from(x) / (f64::from(u32::MAX) + 1.0)
    };
    (0..n)
        .map(|i| {
            let t = i as f64 / n as f64;
            let curve = 34.0 + 56.0 * (-4.0 * t).exp();
            curve + (next_f64() * 2.0 - 1.0) * noise_amp
        })
        .collect()
}

pub fn bench_pipeline(c: &mut Criterion) {
    let mut g = c.benchmark_group("steady_state");
    //   BENCH_SAMPLE_SIZE=10 BENCH_MEAS_MS=50 cargo bench -p stc_core --bench steady_state
    if let Ok(ss) = std::env::var("BENCH_SAMPLE_SIZE") {
        if let Ok(n) = ss.parse::<usize>() {
            g.sample_size(n.max(1));
        }
    } else {
        g.sample_size(50);
    }
    if let Ok(ms) = std::env::var("BENCH_MEAS_MS")
        && let Ok(ms_u64) = ms.parse::<u64>()
    {
        g.measurement_time(std::time::Duration::from_millis(ms_u64));
    }

    let detector = DetectorCfg::default();
    let binning = BinningCfg::default();
    let ingest_cfg = IngestCfg::default();

    for &noise in &[0.2f64, 1.5] {
        let rows = thermal_rows(45_717.0, 1.0, &synth_temps(100, noise, 0xC0FFEE));
        let log = ingest(&rows, &ingest_cfg).unwrap_or_else(|e| panic!("bench log: {e}"));

        g.bench_function(format!("detect_noise_{noise}"), |b| {
            b.iter_batched(
                || log.entries.clone(),
                |entries| {
                    let s = detect_steady_state(black_box(&entries), black_box(&detector));
                    black_box(s)
                },
                BatchSize::SmallInput,
            )
        });

        g.bench_function(format!("ingest_to_medians_noise_{noise}"), |b| {
            b.iter(|| {
                let log = ingest(black_box(&rows), &ingest_cfg).ok()?;
                let steady = detect_steady_state(&log.entries, &detector).ok()?;
                black_box(compute_section_medians(&steady.kept, &binning).ok())
            })
        });
    }
    g.finish();
}

criterion_group!(steady_state, bench_pipeline);
criterion_main!(steady_state);

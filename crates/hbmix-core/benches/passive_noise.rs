//! Benchmarks for passive noise and renormalization

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use hbmix_core::ScatteringData;
use ndarray::Array2;
use num_complex::Complex64;

fn create_test_data(nports: usize) -> ScatteringData {
    let s = Array2::from_shape_fn((nports, nports), |(i, j)| {
        let mag = if i == j { 0.2 } else { 0.5 / nports as f64 };
        Complex64::from_polar(mag, 0.3 * (i * nports + j) as f64)
    });
    ScatteringData::from_s(s, 50.0)
}

fn bench_passive_noise(c: &mut Criterion) {
    let mut group = c.benchmark_group("passive_noise");
    for nports in [2, 8, 32, 64].iter() {
        let data = create_test_data(*nports);
        group.bench_with_input(BenchmarkId::from_parameter(nports), nports, |b, _| {
            b.iter(|| {
                let mut d = data.clone();
                d.passive_noise(black_box(10e9), black_box(290.0));
                d
            })
        });
    }
    group.finish();
}

fn bench_renormalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("renormalize");
    for nports in [2, 8, 32, 64].iter() {
        let mut data = create_test_data(*nports);
        data.passive_noise(10e9, 290.0);
        group.bench_with_input(BenchmarkId::from_parameter(nports), nports, |b, _| {
            b.iter(|| black_box(data.renormalized(75.0).unwrap()))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_passive_noise, bench_renormalize);
criterion_main!(benches);

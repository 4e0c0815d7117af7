#[path = "../util/util.rs"]
mod util;

use util::benchmark_images;

use std::time::Duration;

use clusterquant::{
    kmeans::{self, CpuContext},
    ImageBuf, KmeansOptions, PaletteSize,
};
use criterion::{
    criterion_group, criterion_main, measurement::WallTime, Bencher, BenchmarkId, Criterion,
    SamplingMode,
};

fn bench(
    c: &mut Criterion,
    group: &str,
    mut f: impl FnMut(&mut Bencher<WallTime>, &(PaletteSize, &ImageBuf)),
) {
    let mut group = c.benchmark_group(group);
    group
        .sample_size(20)
        .noise_threshold(0.05)
        .sampling_mode(SamplingMode::Flat)
        .warm_up_time(Duration::from_millis(500));

    for (k, secs) in [(PaletteSize::MAX, 6), (64.into(), 4), (16.into(), 3)] {
        group.measurement_time(Duration::from_secs(secs));
        for (path, image) in benchmark_images() {
            group.bench_with_input(BenchmarkId::new(k.to_string(), path), &(k, image), &mut f);
        }
    }
}

fn kmeans_single(c: &mut Criterion) {
    let options = KmeansOptions::new();
    let context = CpuContext::new();
    bench(c, "kmeans_single", |b, &(k, image)| {
        b.iter(|| kmeans::cluster(&context, image, k, &options));
    });
}

fn kmeans_par(c: &mut Criterion) {
    let options = KmeansOptions::new();
    let context = CpuContext::parallel();
    bench(c, "kmeans_par", |b, &(k, image)| {
        b.iter(|| kmeans::cluster(&context, image, k, &options));
    });
}

criterion_group!(benches, kmeans_single, kmeans_par);
criterion_main!(benches);

#![deny(unsafe_code, unsafe_op_in_unsafe_fn)]
#![warn(
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::todo,
    clippy::unimplemented,
    clippy::unneeded_field_pattern,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::unnecessary_self_imports,
    clippy::str_to_string,
    clippy::string_to_string,
    clippy::string_slice
)]

use std::{
    path::{Path, PathBuf},
    time::Instant,
};

use anyhow::Context;
use clap::Parser;
use clusterquant::{ImagePipeline, IndexedImage, KmeansOptions, PaletteSize};
use flate2::Compression;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Reduces an image to a k-means palette and writes it as a dithered, palette-indexed PNG.
#[derive(Parser)]
#[command(version)]
struct Options {
    /// The image to compress.
    input: PathBuf,

    /// Where to write the PNG.
    output: PathBuf,

    /// The number of k-means clusters, which is the maximum palette size.
    #[arg(short, long, default_value_t = PaletteSize::default(), value_parser = parse_palette_size)]
    k: PaletteSize,

    /// The number of k-means iterations.
    #[arg(long, default_value_t = KmeansOptions::DEFAULT_ITERATIONS)]
    iterations: u32,

    /// Palette colors within this squared distance of each other are merged.
    #[arg(long, default_value_t = 0.0)]
    epsilon: f32,

    /// The seed for picking the initial centroids.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Also count the last row and column when updating centroids.
    #[arg(long)]
    include_trailing_edge: bool,

    /// Stop iterating once no centroid changes.
    #[arg(long)]
    stop_when_stable: bool,

    /// The zlib compression level, from 0 to 9.
    #[arg(long, default_value_t = 6, value_parser = clap::value_parser!(u32).range(0..=9))]
    level: u32,

    /// The number of threads for the assignment kernel. 0 uses all cores, 1 stays sequential.
    #[arg(short, long, default_value_t = 0)]
    threads: u8,
}

fn parse_palette_size(s: &str) -> Result<PaletteSize, String> {
    let value: u16 = s.parse().map_err(|e| format!("{e}"))?;
    value.try_into().map_err(|e| format!("{e}"))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clusterquant=info,compress_image=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().without_time())
        .init();

    let Options {
        input,
        output,
        k,
        iterations,
        epsilon,
        seed,
        include_trailing_edge,
        stop_when_stable,
        level,
        threads,
    } = Options::parse();

    let time = Instant::now();
    let image = image::open(&input)
        .with_context(|| format!("failed to read {}", input.display()))?
        .into_rgba8();
    tracing::info!(
        width = image.width(),
        height = image.height(),
        ms = time.elapsed().as_millis(),
        "read {}",
        input.display()
    );

    let kmeans = KmeansOptions::new()
        .iterations(iterations)
        .seed(seed)
        .include_trailing_edge(include_trailing_edge)
        .stop_when_stable(stop_when_stable);

    let pipeline = ImagePipeline::try_from(image)?
        .palette_size(k)
        .epsilon(epsilon)
        .kmeans(kmeans);

    let time = Instant::now();
    let indexed = match threads {
        0 => pipeline.indexed_image_par(),
        1 => pipeline.indexed_image(),
        t => rayon::ThreadPoolBuilder::new()
            .num_threads(t.into())
            .build()?
            .install(|| pipeline.indexed_image_par()),
    }?;
    tracing::info!(ms = time.elapsed().as_millis(), "clustered and dithered image");
    tracing::info!(
        "condensed palette from {} colors to {} colors",
        k,
        indexed.palette.len()
    );

    write_png(&indexed, Compression::new(level), &output)?;

    Ok(())
}

fn write_png(image: &IndexedImage, compression: Compression, output: &Path) -> anyhow::Result<()> {
    let time = Instant::now();
    let bytes = image.encode_png(compression)?;
    std::fs::write(output, &bytes)
        .with_context(|| format!("failed to write {}", output.display()))?;
    tracing::info!(
        bytes = bytes.len(),
        ms = time.elapsed().as_millis(),
        "wrote {}",
        output.display()
    );
    Ok(())
}

#![allow(dead_code)]

use std::sync::OnceLock;

use clusterquant::ImageBuf;
use palette::Srgba;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoroshiro128PlusPlus;

#[allow(clippy::cast_possible_truncation)]
pub fn gradient(width: u32, height: u32) -> ImageBuf {
    let pixels = (0..height)
        .flat_map(|y| {
            (0..width).map(move |x| {
                let r = (x * 255 / width.max(1)) as u8;
                let g = (y * 255 / height.max(1)) as u8;
                let b = ((x + y) * 127 / (width + height).max(1)) as u8;
                Srgba::new(r, g, b, 255)
            })
        })
        .collect();

    ImageBuf::new(width, height, pixels).unwrap()
}

pub fn noise(width: u32, height: u32, seed: u64) -> ImageBuf {
    let mut rng = Xoroshiro128PlusPlus::seed_from_u64(seed);
    let pixels = (0..(width * height))
        .map(|_| Srgba::new(rng.gen(), rng.gen(), rng.gen(), 255))
        .collect();

    ImageBuf::new(width, height, pixels).unwrap()
}

pub fn benchmark_images() -> &'static [(String, ImageBuf)] {
    static IMAGES: OnceLock<Vec<(String, ImageBuf)>> = OnceLock::new();
    IMAGES.get_or_init(|| {
        vec![
            ("gradient_640x480".to_owned(), gradient(640, 480)),
            ("gradient_1920x1080".to_owned(), gradient(1920, 1080)),
            ("noise_640x480".to_owned(), noise(640, 480, 0)),
        ]
    })
}

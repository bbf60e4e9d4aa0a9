use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use image::{DynamicImage, ImageFormat, RgbImage};
use roomstage::mask::{MaskConvention, MaskGenerator, MaskMargins, MaskStats};
use std::io::Cursor;

const SIZES: [(u32, u32); 3] = [(640, 480), (1536, 1024), (3546, 2660)];

fn room_png(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 251) as u8, (y % 241) as u8, ((x + y) % 239) as u8])
    });
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

fn benchmark_raster(c: &mut Criterion) {
    let mut group = c.benchmark_group("mask_raster");
    group.sample_size(10);

    for (width, height) in SIZES {
        let size = format!("{}x{}", width, height);
        let feathered = MaskGenerator::default();
        let hard = MaskGenerator::new(MaskMargins::default(), 0.0);

        group.bench_with_input(BenchmarkId::new("feathered", &size), &(width, height), |b, &(w, h)| {
            b.iter(|| feathered.build_raster(black_box(w), black_box(h), MaskConvention::Luminance));
        });
        group.bench_with_input(BenchmarkId::new("hard", &size), &(width, height), |b, &(w, h)| {
            b.iter(|| hard.build_raster(black_box(w), black_box(h), MaskConvention::Luminance));
        });
    }

    group.finish();
}

fn benchmark_encoded_mask(c: &mut Criterion) {
    let mut group = c.benchmark_group("mask_encoded");
    group.sample_size(10);
    let generator = MaskGenerator::default();

    for (width, height) in SIZES {
        let source = room_png(width, height);
        for convention in [MaskConvention::Alpha, MaskConvention::Luminance] {
            let id = BenchmarkId::new(format!("{:?}", convention), format!("{}x{}", width, height));
            group.bench_function(id, |b| {
                b.iter(|| generator.build_mask(black_box(&source), convention).unwrap());
            });
        }
    }

    group.finish();
}

fn benchmark_stats(c: &mut Criterion) {
    let raster = MaskGenerator::default().build_raster(1536, 1024, MaskConvention::Alpha);
    c.bench_function("mask_stats_1536x1024", |b| {
        b.iter(|| MaskStats::compute(black_box(&raster), MaskConvention::Alpha));
    });
}

criterion_group!(
    mask_benches,
    benchmark_raster,
    benchmark_encoded_mask,
    benchmark_stats
);
criterion_main!(mask_benches);

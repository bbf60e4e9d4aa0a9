use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use image::{DynamicImage, ImageFormat, RgbImage};
use roomstage::normalize::fit_pixel_ceiling;
use roomstage::validation::{validate_output, InputFingerprint, OutputSource};
use roomstage::{ImageNormalizer, NormalizerConfig};
use std::io::Cursor;

fn photo(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([
            (x * 255 / width) as u8,
            (y * 255 / height) as u8,
            ((x ^ y) & 0xFF) as u8,
        ])
    });
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut bytes), format)
        .unwrap();
    bytes
}

fn benchmark_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize");
    group.sample_size(10);
    let normalizer = ImageNormalizer::default();

    for (name, width, height) in [
        ("small_1024x768", 1024, 768),
        ("phone_4032x3024", 4032, 3024),
    ] {
        let jpeg = photo(width, height, ImageFormat::Jpeg);
        group.bench_with_input(BenchmarkId::new("jpeg", name), &jpeg, |b, raw| {
            b.iter(|| normalizer.normalize(black_box(raw)).unwrap());
        });
    }

    // Forces the shrink loop on every iteration
    let tight = ImageNormalizer::new(NormalizerConfig {
        max_bytes: 256 * 1024,
        ..NormalizerConfig::default()
    });
    let png = photo(1536, 1024, ImageFormat::Png);
    group.bench_function("png_shrink_loop_1536x1024", |b| {
        b.iter(|| tight.normalize_with_report(black_box(&png)).unwrap());
    });

    group.finish();
}

fn benchmark_fit(c: &mut Criterion) {
    c.bench_function("fit_pixel_ceiling", |b| {
        b.iter(|| fit_pixel_ceiling(black_box(6000), black_box(4000), black_box(9_437_184)));
    });
}

fn benchmark_validation(c: &mut Criterion) {
    let mut group = c.benchmark_group("output_validation");
    let input = photo(1024, 768, ImageFormat::Png);
    let output = photo(1024, 770, ImageFormat::Png);
    let fingerprint = InputFingerprint::new(&input);

    group.bench_function("fingerprint", |b| {
        b.iter(|| InputFingerprint::new(black_box(&input)));
    });
    group.bench_function("validate_edit_output", |b| {
        b.iter(|| {
            validate_output(
                black_box(&output),
                &input,
                &fingerprint,
                OutputSource::EditApi,
                "req_bench",
            )
        });
    });

    group.finish();
}

criterion_group!(
    normalize_benches,
    benchmark_normalize,
    benchmark_fit,
    benchmark_validation
);
criterion_main!(normalize_benches);

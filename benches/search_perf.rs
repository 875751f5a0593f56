//! Template search benchmarks
//!
//! Measures full-screen scans (1920x1080 source, 32x32 and 64x64 templates),
//! an ROI restricted scan and the integral-image setup that every search pays
//! once per source. The cross term is a direct sum, so scan cost grows with
//! template area.

use std::hint::black_box;
use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};
use image::{Rgb, RgbImage};
use screenscout::{
    model::Region,
    search::{Matcher, PreparedSource, SearchRequest, Template, TemplateStore},
};

fn noisy_scene(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            ((x * 31 + y * 17) % 251) as u8,
            ((x * 7 + y * 29) % 241) as u8,
            ((x ^ y) % 256) as u8,
        ])
    })
}

fn setup(width: u32, height: u32, size: u32) -> (Matcher, PreparedSource, SearchRequest) {
    let scene = noisy_scene(width, height);
    let template = image::imageops::crop_imm(&scene, width / 2, height / 3, size, size).to_image();

    let store = Arc::new(TemplateStore::new());
    let handle = store
        .insert(Template::new(template).expect("template is not empty"))
        .expect("handle space available");
    (Matcher::new(store), PreparedSource::new(scene), SearchRequest::new(handle, 0.9))
}

fn bench_full_hd_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("search");
    group.sample_size(10);
    for size in [32, 64] {
        let (matcher, source, request) = setup(1920, 1080, size);
        group.bench_function(format!("full_hd_{size}px"), |b| {
            b.iter(|| matcher.search(black_box(&source), black_box(&request)));
        });
    }
    group.finish();
}

fn bench_roi_scan(c: &mut Criterion) {
    let (matcher, source, request) = setup(1920, 1080, 32);
    let request = request.with_roi(Region::new(900, 300, 200, 150));

    c.bench_function("search_roi_200x150", |b| {
        b.iter(|| matcher.search(black_box(&source), black_box(&request)));
    });
}

fn bench_prepare_source(c: &mut Criterion) {
    let scene = noisy_scene(1920, 1080);

    c.bench_function("prepare_full_hd", |b| {
        b.iter(|| PreparedSource::new(black_box(scene.clone())));
    });
}

criterion_group!(benches, bench_full_hd_scan, bench_roi_scan, bench_prepare_source);
criterion_main!(benches);

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use xray_harness::{CaptureBackend, ContentType, Evidence, MockFramebuffer, ScreenshotOptions};

fn benchmark_page_capture(c: &mut Criterion) {
    let mut fb = MockFramebuffer::with_color(1280, 2400, [240, 240, 240]).with_viewport(720);
    fb.draw_text(20, 20, "Benchmark page", [0, 0, 0], [240, 240, 240]);

    c.bench_function("capture_viewport", |b| {
        b.iter(|| fb.capture(black_box(&ScreenshotOptions::default())).unwrap())
    });

    c.bench_function("capture_full_page", |b| {
        b.iter(|| fb.capture(black_box(&ScreenshotOptions::full_page())).unwrap())
    });
}

fn benchmark_evidence_encoding(c: &mut Criterion) {
    let mut fb = MockFramebuffer::new(1280, 720);
    let png = fb.capture(&ScreenshotOptions::default()).unwrap().image_data;

    c.bench_function("encode_screenshot_evidence", |b| {
        b.iter(|| Evidence::from_bytes("step-1-success.png", black_box(&png), ContentType::Png))
    });
}

criterion_group!(benches, benchmark_page_capture, benchmark_evidence_encoding);
criterion_main!(benches);

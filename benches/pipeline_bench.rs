use criterion::{black_box, criterion_group, criterion_main, Criterion};
use docshot::instrument::{diagram_block_count, instrument};
use docshot::naming::ArtifactNamer;
use docshot::preview::add_print_styles;
use docshot::sections::{build_ranges, tile_ranges, HeadingMark};
use docshot::{ImageFormat, RenderRequest};

fn sample_document(sections: usize) -> String {
    let mut body = String::new();
    for i in 0..sections {
        body.push_str(&format!("<h2>Section {}</h2>\n<p>{}</p>\n", i, "lorem ipsum ".repeat(40)));
        if i % 5 == 0 {
            body.push_str("<pre><code class=\"language-mermaid\">graph TD; A-->B;</code></pre>\n");
        }
    }
    format!("<html><head><title>bench</title></head><body>{}</body></html>", body)
}

fn bench_instrument(c: &mut Criterion) {
    let doc = sample_document(200);
    c.bench_function("instrument", |b| b.iter(|| instrument(black_box(&doc))));
    c.bench_function("diagram_block_count", |b| b.iter(|| diagram_block_count(black_box(&doc))));
    c.bench_function("add_print_styles", |b| b.iter(|| add_print_styles(black_box(&doc))));
}

fn bench_ranges(c: &mut Criterion) {
    let marks: Vec<HeadingMark> = (0..500)
        .map(|i| HeadingMark {
            title: format!("Section {}", i),
            top: f64::from(i) * 730.5,
        })
        .collect();
    c.bench_function("build_and_tile_ranges", |b| {
        b.iter(|| tile_ranges(build_ranges(black_box(&marks), 400_000), 1000))
    });
}

fn bench_naming(c: &mut Criterion) {
    let request = RenderRequest {
        file_name_prefix: Some("weekly".to_string()),
        ..RenderRequest::default()
    };
    let namer = ArtifactNamer::new("/tmp/images", &request);
    c.bench_function("artifact_batch_names", |b| {
        b.iter(|| {
            let batch = namer.batch(Some(3));
            ImageFormat::ALL.map(|format| batch.path(format))
        })
    });
}

criterion_group!(benches, bench_instrument, bench_ranges, bench_naming);
criterion_main!(benches);

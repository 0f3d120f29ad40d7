//! Analysis and resynthesis throughput.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pvoc_oracle::{
    compare, AnalysisParams, Analyzer, SampleBuffer, Synthesizer, ToleranceConfig, WindowType,
};

fn sine_buffer(seconds: usize) -> SampleBuffer {
    let samples: Vec<f32> = (0..44100 * seconds)
        .map(|i| (i as f32 * 440.0 * 2.0 * std::f32::consts::PI / 44100.0).sin() * 0.5)
        .collect();
    SampleBuffer::mono(samples, 44100).unwrap()
}

fn bench_analyze(c: &mut Criterion) {
    let input = sine_buffer(5);
    let analyzer = Analyzer::new(AnalysisParams::new(2048, 512, WindowType::Hann)).unwrap();

    c.bench_function("analyze_5s_2048_512", |b| {
        b.iter(|| analyzer.analyze(black_box(&input)).unwrap());
    });
}

fn bench_synthesize(c: &mut Criterion) {
    let input = sine_buffer(5);
    let analyzer = Analyzer::new(AnalysisParams::new(2048, 512, WindowType::Hann)).unwrap();
    let stream = analyzer.analyze(&input).unwrap();

    c.bench_function("synthesize_5s_2048_512", |b| {
        b.iter(|| Synthesizer::new().synthesize(black_box(&stream)).unwrap());
    });

    let dense = Analyzer::new(AnalysisParams::new(2048, 256, WindowType::Hann))
        .unwrap()
        .analyze(&input)
        .unwrap();
    c.bench_function("synthesize_stretch_2x", |b| {
        b.iter(|| Synthesizer::with_hop(512).synthesize(black_box(&dense)).unwrap());
    });
}

fn bench_compare(c: &mut Criterion) {
    let input = sine_buffer(5);
    let tolerance = ToleranceConfig::strict();

    c.bench_function("compare_5s", |b| {
        b.iter(|| compare(black_box(&input), black_box(&input), &tolerance).unwrap());
    });
}

criterion_group!(benches, bench_analyze, bench_synthesize, bench_compare);
criterion_main!(benches);

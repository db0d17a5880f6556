use criterion::{black_box, criterion_group, criterion_main, Criterion};
use num_complex::Complex32;
use sdr_demod::coeffs::low_pass_kernel;
use sdr_demod::fft::Fft;
use sdr_demod::filter::{Filter, Fir};

fn fir_bench(buf: &mut Vec<f32>, fir: &mut Fir) {
    fir.in_place(buf);
}

fn fft_bench(fft: &Fft, buf: &mut [Complex32]) {
    fft.transform_in_place(buf);
}

fn criterion_benchmark(c: &mut Criterion) {
    let kernel = low_pass_kernel(336_000.0, 75_000.0, 127, 1.0);
    let mut fir = Fir::new(kernel);
    let input: Vec<f32> = (0..4096).map(|i| (i as f32 * 0.01).sin()).collect();

    c.bench_function("fir_4096_tap127", |b| {
        b.iter(|| {
            let mut buf = input.clone();
            fir_bench(black_box(&mut buf), black_box(&mut fir));
        })
    });

    for &n in &[256usize, 1024, 4096] {
        let fft = Fft::of_length(n);
        let mut buf: Vec<Complex32> = (0..fft.len())
            .map(|i| Complex32::new((i as f32 * 0.037).sin(), 0.0))
            .collect();
        c.bench_function(&format!("fft_{}", fft.len()), |b| {
            b.iter(|| fft_bench(black_box(&fft), black_box(&mut buf)))
        });
    }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);

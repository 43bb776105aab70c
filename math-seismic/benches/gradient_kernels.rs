use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use math_seismic::element::{GeometricFactors, Gradient, QuadMap, VectorModes, VoigtModes};
use math_seismic::spectral::SpectralContext;
use ndarray::Array2;
use num_complex::Complex64;

fn field(npe: usize, seed: f64) -> Array2<Complex64> {
    Array2::from_shape_fn((npe, npe), |(i, j)| {
        Complex64::new((seed + i as f64).sin(), (seed * j as f64).cos())
    })
}

fn gradient(ctx: &SpectralContext, axial: bool) -> Gradient {
    let corners = if axial {
        [[0.0, 0.0], [1.0, 0.0], [1.1, 1.0], [0.0, 1.0]]
    } else {
        [[1.0, 0.0], [2.0, 0.1], [2.1, 1.0], [1.0, 0.9]]
    };
    let map = QuadMap::new(corners);
    let factors = GeometricFactors::new(&map, ctx.xi_basis(axial), &ctx.gll, axial)
        .expect("valid element");
    Gradient::new(factors, axial)
}

fn bench_vector_kernels(c: &mut Criterion) {
    let mut group = c.benchmark_group("grad_quad_vector");
    for npol in [4, 6] {
        let ctx = SpectralContext::init(npol, 16).expect("context");
        let npe = ctx.npe();
        for axial in [false, true] {
            let grad = gradient(&ctx, axial);
            let ops = ctx.operators(axial);
            for nu in [0, 4] {
                let u: VectorModes = (0..=nu)
                    .map(|m| std::array::from_fn(|k| field(npe, (m * 3 + k) as f64)))
                    .collect();
                let sigma: VoigtModes = (0..=nu)
                    .map(|m| std::array::from_fn(|k| field(npe, (m * 6 + k) as f64 + 0.5)))
                    .collect();
                let label = format!("npol{}_nu{}_{}", npol, nu, if axial { "axial" } else { "plain" });
                group.bench_with_input(BenchmarkId::new("grad", &label), &u, |b, u| {
                    b.iter(|| black_box(grad.grad_vector(ops, u, nu, false)))
                });
                group.bench_with_input(BenchmarkId::new("quad", &label), &sigma, |b, s| {
                    b.iter(|| black_box(grad.quad_vector(ops, s, nu, false)))
                });
            }
        }
    }
    group.finish();
}

criterion_group!(benches, bench_vector_kernels);
criterion_main!(benches);

use criterion::{Criterion, criterion_group, criterion_main};
use inception_rs::backend::{CpuBackend, MetaBackend, MetaTensor};
use inception_rs::graph::{GraphBuilder, Mode};
use inception_rs::models::inception::{build_classifier, inception_a};
use inception_rs::names::NamePath;
use inception_rs::nn::ConvSpec;
use inception_rs::params::ParamStore;
use inception_rs::shape::Layout;
use inception_rs::tensor::Tensor;
use std::hint::black_box;

fn benchmark_meta_build(c: &mut Criterion) {
    // Topology only: name paths, parameter registration, shape arithmetic.
    c.bench_function("meta_inception_v3_299", |b| {
        b.iter(|| {
            let backend = MetaBackend::new();
            let mut store = ParamStore::new();
            let mut g = GraphBuilder::new(&backend, &mut store, Mode::Inference);
            let x = MetaTensor::new([1, 3, 299, 299]);
            build_classifier(&mut g, black_box(&x), Layout::ChannelFirst).unwrap()
        })
    });
}

fn benchmark_cpu_block(c: &mut Criterion) {
    let backend = CpuBackend::new(0);
    let mut store = ParamStore::new();
    let template = ConvSpec::new(0, 1);
    let x = Tensor::<f32, 4>::ones([1, 192, 35, 35]);

    // First build registers the parameters; the timed builds reuse them.
    {
        let mut g = GraphBuilder::new(&backend, &mut store, Mode::Inference);
        inception_a(&mut g, &NamePath::empty(), &x, 0, &template).unwrap();
    }

    c.bench_function("cpu_inception_a_35x35", |b| {
        b.iter(|| {
            let mut g = GraphBuilder::new(&backend, &mut store, Mode::Inference);
            inception_a(&mut g, &NamePath::empty(), black_box(&x), 0, &template).unwrap()
        })
    });
}

criterion_group!(benches, benchmark_meta_build, benchmark_cpu_block);
criterion_main!(benches);

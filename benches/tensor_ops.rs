use std::rc::Rc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tesela::{
    Context, MemoryAccess, MemoryLayout, PipelineBarrier, PipelineStage, RecordingDevice,
    StorageType, Tensor, TensorSpec,
};

fn context() -> Rc<Context> {
    Context::with_defaults(Rc::new(RecordingDevice::new()))
}

fn bench_create(c: &mut Criterion) {
    let mut group = c.benchmark_group("tensor_create");
    let ctx = context();

    for storage in [StorageType::Buffer, StorageType::Texture3D] {
        let spec = TensorSpec::new(&[1, 64, 56, 56]).with_storage_type(storage);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{storage:?}")),
            &spec,
            |bench, spec| {
                bench.iter(|| black_box(Tensor::new(&ctx, black_box(spec)).unwrap()));
            },
        );
    }

    group.finish();
}

fn bench_virtual_ops(c: &mut Criterion) {
    let mut group = c.benchmark_group("virtual_ops");
    let ctx = context();

    // Metadata recompute only, no storage touched
    let mut texture = Tensor::new(&ctx, &TensorSpec::new(&[2, 64, 56, 56])).unwrap();
    group.bench_function("transpose_texture", |bench| {
        bench.iter(|| {
            texture.virtual_transpose(black_box(1), black_box(3));
        });
    });

    let mut resized = Tensor::new(&ctx, &TensorSpec::new(&[1, 64, 56, 56])).unwrap();
    let shapes = [[1, 64, 28, 28], [1, 64, 56, 56]];
    let mut i = 0;
    group.bench_function("resize_texture", |bench| {
        bench.iter(|| {
            i ^= 1;
            resized.virtual_resize(black_box(&shapes[i])).unwrap();
        });
    });

    let spec = TensorSpec::new(&[8, 16, 32])
        .with_storage_type(StorageType::Buffer)
        .with_memory_layout(MemoryLayout::WidthPacked);
    let mut buffer = Tensor::new(&ctx, &spec).unwrap();
    group.bench_function("reconfigure_buffer", |bench| {
        bench.iter(|| {
            buffer
                .virtual_reconfigure(black_box(&[16, 8, 32]), black_box(&[1, 0, 2]))
                .unwrap();
        });
    });

    group.finish();
}

fn bench_binding(c: &mut Criterion) {
    let mut group = c.benchmark_group("binding");
    let ctx = context();

    let mut t = Tensor::new(&ctx, &TensorSpec::new(&[1, 64, 56, 56])).unwrap();
    group.bench_function("image_read_write", |bench| {
        bench.iter(|| {
            let mut barrier = PipelineBarrier::new();
            t.image(&mut barrier, PipelineStage::COMPUTE, MemoryAccess::WRITE);
            t.image(&mut barrier, PipelineStage::COMPUTE, MemoryAccess::READ);
            black_box(barrier);
        });
    });

    group.bench_function("metadata_ubos", |bench| {
        bench.iter(|| {
            black_box(t.sizes_ubo().unwrap());
            black_box(t.logical_limits_ubo().unwrap());
        });
    });

    group.finish();
}

criterion_group!(benches, bench_create, bench_virtual_ops, bench_binding);
criterion_main!(benches);

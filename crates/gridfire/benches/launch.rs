//! Launch-path benchmarks against the emulated backend.

use criterion::{criterion_group, criterion_main, Criterion};

use gridfire::{BackendKind, DType, ExecBackend};

const VADD_PTX: &str = r#"
.version 7.0
.target sm_35
.address_size 64

.visible .entry vadd(
    .param .u64 a,
    .param .u64 b,
    .param .u64 c
)
{
    .reg .u32 %r<4>;
    .reg .u64 %rd<8>;
    .reg .f32 %f<3>;

    mov.u32 %r0, %ctaid.x;
    mov.u32 %r1, %ntid.x;
    mov.u32 %r2, %tid.x;
    mad.lo.u32 %r3, %r0, %r1, %r2;
    cvt.u64.u32 %rd0, %r3;
    mul.lo.u64 %rd1, %rd0, 4;
    ld.param.u64 %rd2, [a];
    add.u64 %rd3, %rd2, %rd1;
    ld.global.f32 %f0, [%rd3];
    ld.param.u64 %rd4, [b];
    add.u64 %rd5, %rd4, %rd1;
    ld.global.f32 %f1, [%rd5];
    add.f32 %f2, %f0, %f1;
    ld.param.u64 %rd6, [c];
    add.u64 %rd7, %rd6, %rd1;
    st.global.f32 [%rd7], %f2;
    ret;
}
"#;

fn bench_emulated_launch(c: &mut Criterion) {
    let backend = ExecBackend::builder()
        .backend(BackendKind::Emulated)
        .build()
        .unwrap();
    let n = 1024;

    let a = backend.alloc(n, DType::F32).unwrap();
    let b = backend.alloc(n, DType::F32).unwrap();
    let out = backend.alloc(n, DType::F32).unwrap();
    let host = vec![1.0f32; n];
    a.copy_in(bytemuck::cast_slice(&host)).unwrap();
    b.copy_in(bytemuck::cast_slice(&host)).unwrap();

    let program = backend.build(VADD_PTX, true).unwrap();

    c.bench_function("emulated_vadd_1024", |bench| {
        bench.iter(|| {
            backend
                .run(&program, 4u32, 256u32, &[&a, &b, &out], true)
                .unwrap()
        })
    });

    c.bench_function("compile_vadd", |bench| {
        bench.iter(|| backend.build(VADD_PTX, true).unwrap())
    });
}

criterion_group!(benches, bench_emulated_launch);
criterion_main!(benches);

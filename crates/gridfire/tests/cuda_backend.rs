//! Integration tests for the CUDA backend.
//!
//! These require CUDA hardware and are ignored by default; run them with
//! `cargo test -- --ignored` on a machine with a GPU.

use gridfire::{BackendKind, ContextKind, DType, ExecBackend, GridfireError};

/// Element-wise addition in the kernel source dialect; compiled through
/// the backend compiler.
const VADD_SRC: &str = r#"
extern "C" __global__ void vadd(const float* a, const float* b, float* c) {
    int i = blockIdx.x * blockDim.x + threadIdx.x;
    c[i] = a[i] + b[i];
}
"#;

fn cuda() -> ExecBackend {
    ExecBackend::builder()
        .backend(BackendKind::Cuda)
        .build()
        .expect("CUDA backend required for this test")
}

fn as_bytes(data: &[f32]) -> &[u8] {
    bytemuck::cast_slice(data)
}

#[test]
#[ignore] // Requires CUDA hardware
fn copy_roundtrip_is_bit_exact() {
    let backend = cuda();
    let buffer = backend.alloc(1024, DType::F32).unwrap();

    let data: Vec<f32> = (0..1024).map(|i| i as f32 * 0.5 - 17.0).collect();
    buffer.copy_in(as_bytes(&data)).unwrap();

    let mut readback = vec![0f32; 1024];
    buffer.copy_out(bytemuck::cast_slice_mut(&mut readback)).unwrap();
    assert_eq!(as_bytes(&data), as_bytes(&readback));
}

#[test]
#[ignore] // Requires CUDA hardware
fn compiles_and_runs_vector_add() {
    let backend = cuda();
    assert_eq!(backend.kind(), ContextKind::Cuda);
    let n = 1024;

    let a_host: Vec<f32> = (0..n).map(|i| i as f32).collect();
    let b_host: Vec<f32> = (0..n).map(|i| (n - i) as f32 * 0.25).collect();

    let a = backend.alloc(n, DType::F32).unwrap();
    let b = backend.alloc(n, DType::F32).unwrap();
    let c = backend.alloc(n, DType::F32).unwrap();
    a.copy_in(as_bytes(&a_host)).unwrap();
    b.copy_in(as_bytes(&b_host)).unwrap();

    let program = backend.build(VADD_SRC, false).unwrap();
    assert_eq!(program.entry_name(), "vadd");
    assert_eq!(program.arity(), 3);

    let elapsed = backend
        .run(&program, 4u32, 256u32, &[&a, &b, &c], true)
        .unwrap()
        .unwrap();
    assert!(elapsed >= 0.0);

    let mut result = vec![0f32; n];
    c.copy_out(bytemuck::cast_slice_mut(&mut result)).unwrap();
    for i in 0..n {
        assert_eq!(result[i], a_host[i] + b_host[i], "element {i}");
    }
}

#[test]
#[ignore] // Requires CUDA hardware
fn results_match_the_emulated_backend() {
    let cuda_backend = cuda();
    let emu_backend = ExecBackend::builder()
        .backend(BackendKind::Emulated)
        .build()
        .unwrap();
    let n = 1024;

    let a_host: Vec<f32> = (0..n).map(|i| (i as f32).sin()).collect();
    let b_host: Vec<f32> = (0..n).map(|i| (i as f32).cos()).collect();

    let mut outputs = Vec::new();
    for backend in [&cuda_backend, &emu_backend] {
        let a = backend.alloc(n, DType::F32).unwrap();
        let b = backend.alloc(n, DType::F32).unwrap();
        let c = backend.alloc(n, DType::F32).unwrap();
        a.copy_in(as_bytes(&a_host)).unwrap();
        b.copy_in(as_bytes(&b_host)).unwrap();

        // The CUDA backend compiles the dialect source; the emulated
        // variant runs the instruction stream it produced, so both see
        // the same kernel.
        let image = cuda_backend.context().compile(VADD_SRC).unwrap();
        let program = backend.build(&image, true).unwrap();
        backend
            .run(&program, 4u32, 256u32, &[&a, &b, &c], true)
            .unwrap();

        let mut result = vec![0f32; n];
        c.copy_out(bytemuck::cast_slice_mut(&mut result)).unwrap();
        outputs.push(result);
    }

    assert_eq!(as_bytes(&outputs[0]), as_bytes(&outputs[1]));
}

#[test]
#[ignore] // Requires CUDA hardware
fn invalid_source_is_a_compile_error() {
    let backend = cuda();
    let err = backend
        .build("__global__ void broken( {", false)
        .err()
        .unwrap();
    assert!(matches!(err, GridfireError::Compile(_)));
}

#[test]
#[ignore] // Requires CUDA hardware
fn oversized_grid_fails_before_any_work() {
    let backend = cuda();
    let n = 64;
    let a = backend.alloc(n, DType::F32).unwrap();
    let b = backend.alloc(n, DType::F32).unwrap();
    let c = backend.alloc(n, DType::F32).unwrap();

    let program = backend.build(VADD_SRC, false).unwrap();
    let err = backend
        .run(&program, (65_536, 1, 1), 64u32, &[&a, &b, &c], false)
        .unwrap_err();
    assert!(matches!(err, GridfireError::Launch(_)));
}

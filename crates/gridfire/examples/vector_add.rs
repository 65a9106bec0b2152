//! # Vector Add Example
//!
//! Allocates three buffers, runs an element-wise addition kernel, and
//! prints the measured launch time. The same precompiled instruction
//! stream runs under the real driver or the interpreter shim, whichever
//! the process selects at start.
//!
//! ## Run this example:
//! ```bash
//! cargo run -p gridfire --example vector_add
//! GRIDFIRE_EMULATE=1 cargo run -p gridfire --example vector_add
//! ```

use gridfire::{DType, ExecBackend};

const N: usize = 1024;

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

fn main() -> gridfire::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let backend = ExecBackend::from_env()?;
    println!("backend: {}", backend.kind());

    let a_host: Vec<f32> = (0..N).map(|i| i as f32).collect();
    let b_host: Vec<f32> = (0..N).map(|i| (N - i) as f32).collect();

    let a = backend.alloc(N, DType::F32)?;
    let b = backend.alloc(N, DType::F32)?;
    let c = backend.alloc(N, DType::F32)?;
    a.copy_in(bytemuck::cast_slice(&a_host))?;
    b.copy_in(bytemuck::cast_slice(&b_host))?;

    let program = backend.build(VADD_PTX, true)?;
    let elapsed = backend
        .run(&program, 4u32, 256u32, &[&a, &b, &c], true)?
        .expect("waited launch reports elapsed time");

    let mut result = vec![0f32; N];
    c.copy_out(bytemuck::cast_slice_mut(&mut result))?;

    println!("c[0] = {}, c[{}] = {}", result[0], N - 1, result[N - 1]);
    println!("kernel time: {:.3} us", elapsed * 1e6);
    Ok(())
}

//! Compiled kernel programs.

use std::sync::Arc;

use crate::artifact::{self, EntryPoint};
use crate::buffer::DeviceBuffer;
use crate::context::{DeviceContext, DeviceMemory, DeviceModule};
use crate::debug::DebugConfig;
use crate::diagnostics;
use crate::dims::Dim3;
use crate::error::{GridfireError, Result};

/// A kernel compiled, linked against its entry symbol, and loaded into a
/// device module.
///
/// Built once and reused for repeated launches. Callers that want to avoid
/// recompiling identical sources are expected to cache programs by source
/// hash themselves.
pub struct KernelProgram {
    ctx: Arc<dyn DeviceContext>,
    entry: EntryPoint,
    module: Box<dyn DeviceModule>,
}

impl KernelProgram {
    /// Compile `source` and resolve its entry symbol.
    ///
    /// When `binary` is true the source is already a device instruction
    /// stream and the compiler step is skipped. Construction fails with a
    /// compile error on rejection, a link error unless exactly one visible
    /// entry symbol is present, and a load error when the compiled form
    /// cannot be loaded; no partially constructed program survives any of
    /// these.
    pub fn compile(
        ctx: &Arc<dyn DeviceContext>,
        source: &str,
        binary: bool,
        debug: DebugConfig,
    ) -> Result<Self> {
        let image = if binary {
            source.to_string()
        } else {
            match ctx.compile(source) {
                Ok(image) => image,
                Err(e) => {
                    if debug.echo_failed_source() {
                        tracing::error!("failed to build kernel:\n{source}");
                    }
                    return Err(e);
                }
            }
        };

        if debug.dump_ir() {
            println!("{}", diagnostics::pretty_ptx(&image));
        }
        if debug.dump_native() {
            diagnostics::print_native_lowering(&ctx.arch(), &image);
        }

        let entry = artifact::single_entry(&image)?;
        let module = ctx.load_module(&image, &entry.name)?;

        tracing::debug!(entry = %entry.name, arity = entry.arity, "kernel program loaded");

        Ok(Self {
            ctx: Arc::clone(ctx),
            entry,
            module,
        })
    }

    /// Name of the resolved entry symbol.
    pub fn entry_name(&self) -> &str {
        &self.entry.name
    }

    /// Number of kernel arguments the entry symbol declares.
    pub fn arity(&self) -> usize {
        self.entry.arity
    }

    /// Launch the kernel over `grid`/`block` with `args` bound
    /// positionally.
    ///
    /// Grid and block extents are validated against the backend-declared
    /// maxima and the argument count against the entry's declared arity
    /// before anything is enqueued. Whether each buffer's size matches what
    /// the kernel indexes is not checked and remains the caller's
    /// responsibility.
    ///
    /// With `wait` set, a start marker is recorded immediately before
    /// issue and a stop marker immediately after; the call blocks on the
    /// stop marker and returns the elapsed device time in seconds. Without
    /// `wait` the call returns right after enqueueing and the kernel's
    /// effects are only guaranteed visible after a synchronizing
    /// operation.
    ///
    /// A failed launch leaves the program reusable.
    pub fn launch(
        &self,
        grid: Dim3,
        block: Dim3,
        args: &[&DeviceBuffer],
        wait: bool,
    ) -> Result<Option<f64>> {
        self.ctx.limits().validate(grid, block)?;
        if args.len() != self.entry.arity {
            return Err(GridfireError::launch(format!(
                "kernel `{}` declares {} parameters, {} arguments supplied",
                self.entry.name,
                self.entry.arity,
                args.len()
            )));
        }

        let raw: Vec<&dyn DeviceMemory> = args.iter().map(|b| b.raw()).collect();

        if wait {
            let mut timer = self.ctx.timer()?;
            timer.record_start()?;
            self.module.launch(grid, block, &raw)?;
            timer.record_stop()?;
            Ok(Some(timer.elapsed_secs()?))
        } else {
            self.module.launch(grid, block, &raw)?;
            Ok(None)
        }
    }
}

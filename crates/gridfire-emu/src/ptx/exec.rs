//! CPU interpreter for parsed PTX kernels.
//!
//! Executes the instruction stream over the same grid/block geometry and
//! ordered argument pointers the real driver would receive. Blocks run one
//! after another and threads within a block run sequentially between
//! barriers, so a given kernel, input, and geometry always produce the
//! same output.

use std::collections::HashMap;

use gridfire_core::Dim3;

use crate::mem::AddressSpace;
use crate::ptx::parse::{Inst, Kernel, Operand, Special};

/// First byte of the per-block shared segment, disjoint from the global
/// segment so generic addressing can tell them apart.
const SHARED_BASE: u64 = 0x7000_0000_0000_0000;

/// Execution fault, carrying the source line of the faulting instruction.
#[derive(Debug, thiserror::Error)]
#[error("line {line}: {msg}")]
pub struct ExecError {
    /// 1-based source line.
    pub line: usize,
    /// Fault description.
    pub msg: String,
}

/// Scalar type drawn from an opcode suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ty {
    F32,
    F64,
    S8,
    S16,
    S32,
    S64,
    U8,
    U16,
    U32,
    U64,
    B8,
    B16,
    B32,
    B64,
}

impl Ty {
    fn from_suffix(suffix: &str) -> Option<Self> {
        Some(match suffix {
            "f32" => Self::F32,
            "f64" => Self::F64,
            "s8" => Self::S8,
            "s16" => Self::S16,
            "s32" => Self::S32,
            "s64" => Self::S64,
            "u8" => Self::U8,
            "u16" => Self::U16,
            "u32" => Self::U32,
            "u64" => Self::U64,
            "b8" => Self::B8,
            "b16" => Self::B16,
            "b32" => Self::B32,
            "b64" => Self::B64,
            _ => return None,
        })
    }

    fn size(self) -> usize {
        match self {
            Self::S8 | Self::U8 | Self::B8 => 1,
            Self::S16 | Self::U16 | Self::B16 => 2,
            Self::F32 | Self::S32 | Self::U32 | Self::B32 => 4,
            Self::F64 | Self::S64 | Self::U64 | Self::B64 => 8,
        }
    }

    fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    fn is_signed(self) -> bool {
        matches!(self, Self::S8 | Self::S16 | Self::S32 | Self::S64)
    }

    /// Truncate raw bits to this width.
    fn truncate(self, bits: u64) -> u64 {
        match self.size() {
            1 => bits & 0xFF,
            2 => bits & 0xFFFF,
            4 => bits & 0xFFFF_FFFF,
            _ => bits,
        }
    }

    /// Interpret raw bits as a signed value.
    fn as_signed(self, bits: u64) -> i64 {
        match self.size() {
            1 => bits as u8 as i8 as i64,
            2 => bits as u16 as i16 as i64,
            4 => bits as u32 as i32 as i64,
            _ => bits as i64,
        }
    }

    /// Interpret raw bits as a float, widening f32 to f64.
    fn as_float(self, bits: u64) -> f64 {
        match self {
            Self::F32 => f32::from_bits(bits as u32) as f64,
            _ => f64::from_bits(bits),
        }
    }

    /// Encode a float value into raw bits of this width.
    fn float_bits(self, value: f64) -> u64 {
        match self {
            Self::F32 => (value as f32).to_bits() as u64,
            _ => value.to_bits(),
        }
    }
}

struct ThreadState {
    regs: HashMap<String, u64>,
    preds: HashMap<String, bool>,
    pc: usize,
    tid: [u32; 3],
    done: bool,
}

impl ThreadState {
    fn new(tid: [u32; 3]) -> Self {
        Self {
            regs: HashMap::new(),
            preds: HashMap::new(),
            pc: 0,
            tid,
            done: false,
        }
    }
}

enum ThreadStop {
    Done,
    Barrier,
}

/// Interprets one kernel over a grid/block iteration space.
pub struct Interpreter<'a> {
    kernel: &'a Kernel,
    space: &'a AddressSpace,
    params: Vec<u64>,
    grid: [u32; 3],
    block: [u32; 3],
    shared_layout: HashMap<&'a str, u64>,
    shared_size: usize,
}

impl<'a> Interpreter<'a> {
    /// Prepare a launch with positional parameter values (device
    /// addresses), in argument order.
    pub fn new(
        kernel: &'a Kernel,
        space: &'a AddressSpace,
        params: Vec<u64>,
        grid: Dim3,
        block: Dim3,
    ) -> Self {
        let mut shared_layout = HashMap::new();
        let mut offset = 0usize;
        for decl in &kernel.shared {
            shared_layout.insert(decl.name.as_str(), SHARED_BASE + offset as u64);
            offset += decl.size.next_multiple_of(16);
        }

        Self {
            kernel,
            space,
            params,
            grid: grid.as_array(),
            block: block.as_array(),
            shared_layout,
            shared_size: offset,
        }
    }

    /// Run the kernel to completion.
    pub fn run(&self) -> Result<(), ExecError> {
        for bz in 0..self.grid[2] {
            for by in 0..self.grid[1] {
                for bx in 0..self.grid[0] {
                    self.run_block([bx, by, bz])?;
                }
            }
        }
        Ok(())
    }

    fn run_block(&self, ctaid: [u32; 3]) -> Result<(), ExecError> {
        let mut shared = vec![0u8; self.shared_size];
        let mut threads = Vec::with_capacity(
            (self.block[0] * self.block[1] * self.block[2]) as usize,
        );
        for tz in 0..self.block[2] {
            for ty in 0..self.block[1] {
                for tx in 0..self.block[0] {
                    threads.push(ThreadState::new([tx, ty, tz]));
                }
            }
        }

        // Cooperative scheduling: each thread runs until it exits or
        // reaches a barrier; once every live thread has arrived, all of
        // them resume past it.
        loop {
            let mut waiting = false;
            for thread in threads.iter_mut() {
                if thread.done {
                    continue;
                }
                match self.run_thread(thread, ctaid, &mut shared)? {
                    ThreadStop::Done => thread.done = true,
                    ThreadStop::Barrier => waiting = true,
                }
            }
            if !waiting {
                return Ok(());
            }
        }
    }

    fn run_thread(
        &self,
        t: &mut ThreadState,
        ctaid: [u32; 3],
        shared: &mut [u8],
    ) -> Result<ThreadStop, ExecError> {
        loop {
            let Some(inst) = self.kernel.body.get(t.pc) else {
                return Ok(ThreadStop::Done);
            };

            if let Some((reg, negated)) = &inst.pred {
                let value = *t.preds.get(reg).ok_or_else(|| {
                    fault(inst, format!("uninitialized predicate {reg}"))
                })?;
                if value == *negated {
                    t.pc += 1;
                    continue;
                }
            }

            match inst.op.as_str() {
                "ret" | "exit" => return Ok(ThreadStop::Done),
                "bar" | "barrier" => {
                    t.pc += 1;
                    return Ok(ThreadStop::Barrier);
                }
                "bra" => {
                    let target = match inst.args.first() {
                        Some(Operand::Sym(label)) => label,
                        _ => return Err(fault(inst, "branch target must be a label")),
                    };
                    t.pc = *self
                        .kernel
                        .labels
                        .get(target)
                        .ok_or_else(|| fault(inst, format!("unknown label `{target}`")))?;
                }
                _ => {
                    self.step(inst, t, ctaid, shared)?;
                    t.pc += 1;
                }
            }
        }
    }

    fn step(
        &self,
        inst: &Inst,
        t: &mut ThreadState,
        ctaid: [u32; 3],
        shared: &mut [u8],
    ) -> Result<(), ExecError> {
        match inst.op.as_str() {
            "mov" | "cvta" => {
                let ty = self.ty(inst)?;
                let value = self.read(inst, t, ctaid, 1, ty)?;
                self.write_reg(inst, t, 0, value)
            }
            "ld" => {
                let ty = self.ty(inst)?;
                let value = if inst.mods.iter().any(|m| m == "param") {
                    self.read_param(inst)?
                } else {
                    let addr = self.address(inst, t, 1)?;
                    self.mem_load(inst, addr, ty.size(), shared)?
                };
                self.write_reg(inst, t, 0, ty.truncate(value))
            }
            "st" => {
                let ty = self.ty(inst)?;
                let value = self.read(inst, t, ctaid, 1, ty)?;
                let addr = self.address(inst, t, 0)?;
                self.mem_store(inst, addr, ty.size(), value, shared)
            }
            "add" | "sub" | "mul" | "div" | "rem" | "min" | "max" | "and" | "or" | "xor"
            | "shl" | "shr" => {
                let ty = self.ty(inst)?;
                let a = self.read(inst, t, ctaid, 1, ty)?;
                let b = self.read(inst, t, ctaid, 2, ty)?;
                let result = self.binop(inst, ty, a, b)?;
                self.write_reg(inst, t, 0, result)
            }
            "mad" | "fma" => {
                let ty = self.ty(inst)?;
                let a = self.read(inst, t, ctaid, 1, ty)?;
                let b = self.read(inst, t, ctaid, 2, ty)?;
                let c = self.read(inst, t, ctaid, 3, ty)?;
                let result = if ty.is_float() {
                    let fused = ty.as_float(a).mul_add(ty.as_float(b), ty.as_float(c));
                    ty.float_bits(fused)
                } else {
                    let wide = inst.mods.iter().any(|m| m == "wide");
                    let product = if ty.is_signed() {
                        (ty.as_signed(a) as i128 * ty.as_signed(b) as i128) as u128
                    } else {
                        ty.truncate(a) as u128 * ty.truncate(b) as u128
                    };
                    let sum = product.wrapping_add(if ty.is_signed() {
                        ty.as_signed(c) as i128 as u128
                    } else {
                        ty.truncate(c) as u128
                    });
                    if wide {
                        sum as u64
                    } else {
                        ty.truncate(sum as u64)
                    }
                };
                self.write_reg(inst, t, 0, result)
            }
            "neg" | "abs" | "not" | "sqrt" | "rsqrt" | "rcp" | "ex2" | "lg2" | "sin" | "cos" => {
                let ty = self.ty(inst)?;
                let a = self.read(inst, t, ctaid, 1, ty)?;
                let result = self.unop(inst, ty, a)?;
                self.write_reg(inst, t, 0, result)
            }
            "cvt" => {
                let (dst_ty, src_ty) = self.cvt_types(inst)?;
                let src = self.read(inst, t, ctaid, 1, src_ty)?;
                self.write_reg(inst, t, 0, convert(dst_ty, src_ty, src))
            }
            "setp" => {
                let ty = self.ty(inst)?;
                let cmp = inst
                    .mods
                    .first()
                    .ok_or_else(|| fault(inst, "setp without comparison"))?;
                let a = self.read(inst, t, ctaid, 1, ty)?;
                let b = self.read(inst, t, ctaid, 2, ty)?;
                let outcome = compare(cmp, ty, a, b)
                    .ok_or_else(|| fault(inst, format!("unsupported comparison `{cmp}`")))?;
                match inst.args.first() {
                    Some(Operand::Reg(name)) => {
                        t.preds.insert(name.clone(), outcome);
                        Ok(())
                    }
                    _ => Err(fault(inst, "setp destination must be a predicate register")),
                }
            }
            "selp" => {
                let ty = self.ty(inst)?;
                let a = self.read(inst, t, ctaid, 1, ty)?;
                let b = self.read(inst, t, ctaid, 2, ty)?;
                let pred = match inst.args.get(3) {
                    Some(Operand::Reg(name)) => *t.preds.get(name).ok_or_else(|| {
                        fault(inst, format!("uninitialized predicate {name}"))
                    })?,
                    _ => return Err(fault(inst, "selp selector must be a predicate register")),
                };
                self.write_reg(inst, t, 0, if pred { a } else { b })
            }
            "membar" | "fence" => Ok(()),
            other => Err(fault(inst, format!("unsupported instruction `{other}`"))),
        }
    }

    /// Scalar type of an instruction, from its last type-like suffix.
    fn ty(&self, inst: &Inst) -> Result<Ty, ExecError> {
        inst.mods
            .iter()
            .rev()
            .find_map(|m| Ty::from_suffix(m))
            .ok_or_else(|| fault(inst, "missing type suffix"))
    }

    /// Destination and source types of a `cvt`.
    fn cvt_types(&self, inst: &Inst) -> Result<(Ty, Ty), ExecError> {
        let types: Vec<Ty> = inst.mods.iter().filter_map(|m| Ty::from_suffix(m)).collect();
        match types.as_slice() {
            [dst, src] => Ok((*dst, *src)),
            [only] => Ok((*only, *only)),
            _ => Err(fault(inst, "cvt requires destination and source types")),
        }
    }

    fn read(
        &self,
        inst: &Inst,
        t: &ThreadState,
        ctaid: [u32; 3],
        index: usize,
        ty: Ty,
    ) -> Result<u64, ExecError> {
        let operand = inst
            .args
            .get(index)
            .ok_or_else(|| fault(inst, format!("missing operand {index}")))?;
        match operand {
            Operand::Reg(name) => t
                .regs
                .get(name)
                .copied()
                .ok_or_else(|| fault(inst, format!("uninitialized register {name}"))),
            Operand::Imm(value) => {
                if ty.is_float() {
                    Ok(ty.float_bits(*value as f64))
                } else {
                    Ok(ty.truncate(*value as u64))
                }
            }
            Operand::FImm(value) => Ok(ty.float_bits(*value)),
            Operand::FBits32(bits) => Ok(*bits as u64),
            Operand::FBits64(bits) => Ok(*bits),
            Operand::Special(special) => Ok(self.special(*special, t, ctaid) as u64),
            Operand::Sym(name) => self.symbol_address(inst, name),
            Operand::Mem(..) => Err(fault(inst, "unexpected memory operand")),
        }
    }

    fn special(&self, special: Special, t: &ThreadState, ctaid: [u32; 3]) -> u32 {
        match special {
            Special::Tid(axis) => t.tid[axis],
            Special::Ntid(axis) => self.block[axis],
            Special::Ctaid(axis) => ctaid[axis],
            Special::Nctaid(axis) => self.grid[axis],
        }
    }

    /// Address of a shared symbol or kernel parameter used as a value.
    fn symbol_address(&self, inst: &Inst, name: &str) -> Result<u64, ExecError> {
        if let Some(&base) = self.shared_layout.get(name) {
            return Ok(base);
        }
        if let Some(index) = self.kernel.params.iter().position(|p| p == name) {
            return Ok(self.params[index]);
        }
        Err(fault(inst, format!("unknown symbol `{name}`")))
    }

    fn write_reg(
        &self,
        inst: &Inst,
        t: &mut ThreadState,
        index: usize,
        value: u64,
    ) -> Result<(), ExecError> {
        match inst.args.get(index) {
            Some(Operand::Reg(name)) => {
                t.regs.insert(name.clone(), value);
                Ok(())
            }
            other => Err(fault(inst, format!("destination must be a register, found {other:?}"))),
        }
    }

    /// Evaluate a memory operand to an address.
    fn address(&self, inst: &Inst, t: &ThreadState, index: usize) -> Result<u64, ExecError> {
        let operand = inst
            .args
            .get(index)
            .ok_or_else(|| fault(inst, format!("missing operand {index}")))?;
        let Operand::Mem(base, offset) = operand else {
            return Err(fault(inst, "expected a memory operand"));
        };
        let base = match base.as_ref() {
            Operand::Reg(name) => t
                .regs
                .get(name)
                .copied()
                .ok_or_else(|| fault(inst, format!("uninitialized register {name}")))?,
            Operand::Sym(name) => self.symbol_address(inst, name)?,
            other => return Err(fault(inst, format!("bad address base {other:?}"))),
        };
        Ok(base.wrapping_add(*offset as u64))
    }

    /// Value of a `ld.param` source: the positional argument bound at
    /// launch.
    fn read_param(&self, inst: &Inst) -> Result<u64, ExecError> {
        let operand = inst
            .args
            .get(1)
            .ok_or_else(|| fault(inst, "ld.param without source"))?;
        let Operand::Mem(base, offset) = operand else {
            return Err(fault(inst, "ld.param source must be a memory operand"));
        };
        if *offset != 0 {
            return Err(fault(inst, "vector and struct parameters are unsupported"));
        }
        let name = match base.as_ref() {
            Operand::Sym(name) => name.as_str(),
            Operand::Reg(name) => name.as_str(),
            other => return Err(fault(inst, format!("bad parameter reference {other:?}"))),
        };
        let index = self
            .kernel
            .params
            .iter()
            .position(|p| p == name)
            .ok_or_else(|| fault(inst, format!("unknown parameter `{name}`")))?;
        Ok(self.params[index])
    }

    fn mem_load(
        &self,
        inst: &Inst,
        addr: u64,
        size: usize,
        shared: &[u8],
    ) -> Result<u64, ExecError> {
        if addr >= SHARED_BASE {
            let offset = (addr - SHARED_BASE) as usize;
            let end = offset + size;
            if end > shared.len() {
                return Err(fault(inst, format!("shared access out of bounds at {addr:#x}")));
            }
            return Ok(read_le(&shared[offset..end]));
        }
        let (data, offset, alloc_size) = self
            .space
            .resolve(addr)
            .ok_or_else(|| fault(inst, format!("global access outside any allocation at {addr:#x}")))?;
        if offset + size > alloc_size {
            return Err(fault(inst, format!("global access out of bounds at {addr:#x}")));
        }
        let guard = data.read();
        Ok(read_le(&guard[offset..offset + size]))
    }

    fn mem_store(
        &self,
        inst: &Inst,
        addr: u64,
        size: usize,
        value: u64,
        shared: &mut [u8],
    ) -> Result<(), ExecError> {
        if addr >= SHARED_BASE {
            let offset = (addr - SHARED_BASE) as usize;
            let end = offset + size;
            if end > shared.len() {
                return Err(fault(inst, format!("shared access out of bounds at {addr:#x}")));
            }
            write_le(&mut shared[offset..end], value);
            return Ok(());
        }
        let (data, offset, alloc_size) = self
            .space
            .resolve(addr)
            .ok_or_else(|| fault(inst, format!("global access outside any allocation at {addr:#x}")))?;
        if offset + size > alloc_size {
            return Err(fault(inst, format!("global access out of bounds at {addr:#x}")));
        }
        let mut guard = data.write();
        write_le(&mut guard[offset..offset + size], value);
        Ok(())
    }

    fn binop(&self, inst: &Inst, ty: Ty, a: u64, b: u64) -> Result<u64, ExecError> {
        if ty.is_float() {
            let (x, y) = (ty.as_float(a), ty.as_float(b));
            let result = match inst.op.as_str() {
                "add" => x + y,
                "sub" => x - y,
                "mul" => x * y,
                "div" => x / y,
                "min" => x.min(y),
                "max" => x.max(y),
                other => return Err(fault(inst, format!("`{other}` is not a float operation"))),
            };
            return Ok(ty.float_bits(result));
        }

        let wide = inst.mods.iter().any(|m| m == "wide");
        let hi = inst.mods.iter().any(|m| m == "hi");
        let signed = ty.is_signed();
        let (x, y) = (ty.truncate(a), ty.truncate(b));

        let result = match inst.op.as_str() {
            "add" => x.wrapping_add(y),
            "sub" => x.wrapping_sub(y),
            "mul" => {
                let product = if signed {
                    (ty.as_signed(a) as i128 * ty.as_signed(b) as i128) as u128
                } else {
                    x as u128 * y as u128
                };
                if wide {
                    product as u64
                } else if hi {
                    (product >> (ty.size() * 8)) as u64
                } else {
                    product as u64
                }
            }
            "div" => {
                if y == 0 {
                    return Err(fault(inst, "division by zero"));
                }
                if signed {
                    (ty.as_signed(a).wrapping_div(ty.as_signed(b))) as u64
                } else {
                    x / y
                }
            }
            "rem" => {
                if y == 0 {
                    return Err(fault(inst, "division by zero"));
                }
                if signed {
                    (ty.as_signed(a).wrapping_rem(ty.as_signed(b))) as u64
                } else {
                    x % y
                }
            }
            "min" => {
                if signed {
                    ty.as_signed(a).min(ty.as_signed(b)) as u64
                } else {
                    x.min(y)
                }
            }
            "max" => {
                if signed {
                    ty.as_signed(a).max(ty.as_signed(b)) as u64
                } else {
                    x.max(y)
                }
            }
            "and" => x & y,
            "or" => x | y,
            "xor" => x ^ y,
            "shl" => x.wrapping_shl(y as u32),
            "shr" => {
                if signed {
                    (ty.as_signed(a).wrapping_shr(y as u32)) as u64
                } else {
                    x.wrapping_shr(y as u32)
                }
            }
            other => return Err(fault(inst, format!("unsupported operation `{other}`"))),
        };
        Ok(if wide { result } else { ty.truncate(result) })
    }

    fn unop(&self, inst: &Inst, ty: Ty, a: u64) -> Result<u64, ExecError> {
        if ty.is_float() {
            let x = ty.as_float(a);
            let result = match inst.op.as_str() {
                "neg" => -x,
                "abs" => x.abs(),
                "sqrt" => x.sqrt(),
                "rsqrt" => x.sqrt().recip(),
                "rcp" => x.recip(),
                "ex2" => x.exp2(),
                "lg2" => x.log2(),
                "sin" => x.sin(),
                "cos" => x.cos(),
                other => return Err(fault(inst, format!("`{other}` is not a float operation"))),
            };
            return Ok(ty.float_bits(result));
        }

        let result = match inst.op.as_str() {
            "neg" => (ty.as_signed(a).wrapping_neg()) as u64,
            "abs" => ty.as_signed(a).unsigned_abs(),
            "not" => !a,
            other => return Err(fault(inst, format!("`{other}` is not an integer operation"))),
        };
        Ok(ty.truncate(result))
    }
}

fn compare(cmp: &str, ty: Ty, a: u64, b: u64) -> Option<bool> {
    if ty.is_float() {
        let (x, y) = (ty.as_float(a), ty.as_float(b));
        return Some(match cmp {
            "eq" => x == y,
            "ne" => x != y,
            "lt" => x < y,
            "le" => x <= y,
            "gt" => x > y,
            "ge" => x >= y,
            _ => return None,
        });
    }
    if ty.is_signed() {
        let (x, y) = (ty.as_signed(a), ty.as_signed(b));
        return Some(match cmp {
            "eq" => x == y,
            "ne" => x != y,
            "lt" => x < y,
            "le" => x <= y,
            "gt" => x > y,
            "ge" => x >= y,
            _ => return None,
        });
    }
    let (x, y) = (ty.truncate(a), ty.truncate(b));
    Some(match cmp {
        "eq" => x == y,
        "ne" => x != y,
        "lt" | "lo" => x < y,
        "le" | "ls" => x <= y,
        "gt" | "hi" => x > y,
        "ge" | "hs" => x >= y,
        _ => return None,
    })
}

fn convert(dst: Ty, src: Ty, bits: u64) -> u64 {
    if src.is_float() {
        let value = src.as_float(bits);
        if dst.is_float() {
            dst.float_bits(value)
        } else if dst.is_signed() {
            dst.truncate(value.round_ties_even() as i64 as u64)
        } else {
            dst.truncate(value.round_ties_even().max(0.0) as u64)
        }
    } else if dst.is_float() {
        if src.is_signed() {
            dst.float_bits(src.as_signed(bits) as f64)
        } else {
            dst.float_bits(src.truncate(bits) as f64)
        }
    } else if src.is_signed() {
        // Sign-extend to the destination width.
        dst.truncate(src.as_signed(bits) as u64)
    } else {
        dst.truncate(src.truncate(bits))
    }
}

fn read_le(bytes: &[u8]) -> u64 {
    let mut value = 0u64;
    for (i, &b) in bytes.iter().enumerate() {
        value |= (b as u64) << (8 * i);
    }
    value
}

fn write_le(bytes: &mut [u8], value: u64) {
    for (i, b) in bytes.iter_mut().enumerate() {
        *b = (value >> (8 * i)) as u8;
    }
}

fn fault(inst: &Inst, msg: impl Into<String>) -> ExecError {
    ExecError {
        line: inst.line,
        msg: msg.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ptx::parse;

    fn run_kernel(src: &str, entry: &str, params: Vec<u64>, grid: Dim3, block: Dim3, space: &AddressSpace) {
        let module = parse::parse(src).unwrap();
        let kernel = module.kernel(entry).unwrap();
        Interpreter::new(kernel, space, params, grid, block)
            .run()
            .unwrap();
    }

    #[test]
    fn scalar_store() {
        let space = AddressSpace::new();
        let out = space.allocate(4).unwrap();

        let src = r#"
.visible .entry store_42(.param .u64 out)
{
    .reg .u64 %rd<1>;
    .reg .u32 %r<1>;
    ld.param.u64 %rd0, [out];
    mov.u32 %r0, 42;
    st.global.u32 [%rd0], %r0;
    ret;
}
"#;
        run_kernel(src, "store_42", vec![out.base()], Dim3::linear(1), Dim3::linear(1), &space);

        let mut bytes = [0u8; 4];
        gridfire_core::DeviceMemory::copy_to_host(&out, &mut bytes).unwrap();
        assert_eq!(u32::from_le_bytes(bytes), 42);
    }

    #[test]
    fn thread_indexing_covers_grid() {
        let space = AddressSpace::new();
        let out = space.allocate(32 * 4).unwrap();

        // out[ctaid * ntid + tid] = ctaid * ntid + tid
        let src = r#"
.visible .entry iota(.param .u64 out)
{
    .reg .u32 %r<4>;
    .reg .u64 %rd<4>;
    mov.u32 %r0, %ctaid.x;
    mov.u32 %r1, %ntid.x;
    mov.u32 %r2, %tid.x;
    mad.lo.u32 %r3, %r0, %r1, %r2;
    cvt.u64.u32 %rd0, %r3;
    mul.lo.u64 %rd1, %rd0, 4;
    ld.param.u64 %rd2, [out];
    add.u64 %rd3, %rd2, %rd1;
    st.global.u32 [%rd3], %r3;
    ret;
}
"#;
        run_kernel(src, "iota", vec![out.base()], Dim3::linear(4), Dim3::linear(8), &space);

        let mut bytes = vec![0u8; 32 * 4];
        gridfire_core::DeviceMemory::copy_to_host(&out, &mut bytes).unwrap();
        let values: Vec<u32> = bytes
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
            .collect();
        let expected: Vec<u32> = (0..32).collect();
        assert_eq!(values, expected);
    }

    #[test]
    fn predicated_loop() {
        let space = AddressSpace::new();
        let out = space.allocate(4).unwrap();

        // Sum 1..=10 with a branch loop.
        let src = r#"
.visible .entry sum_loop(.param .u64 out)
{
    .reg .u32 %r<3>;
    .reg .u64 %rd<1>;
    .reg .pred %p<1>;
    mov.u32 %r0, 0;
    mov.u32 %r1, 1;
top:
    add.u32 %r0, %r0, %r1;
    add.u32 %r1, %r1, 1;
    setp.le.u32 %p0, %r1, 10;
    @%p0 bra top;
    ld.param.u64 %rd0, [out];
    st.global.u32 [%rd0], %r0;
    ret;
}
"#;
        run_kernel(src, "sum_loop", vec![out.base()], Dim3::linear(1), Dim3::linear(1), &space);

        let mut bytes = [0u8; 4];
        gridfire_core::DeviceMemory::copy_to_host(&out, &mut bytes).unwrap();
        assert_eq!(u32::from_le_bytes(bytes), 55);
    }

    #[test]
    fn shared_memory_tree_reduction() {
        let space = AddressSpace::new();
        let input = space.allocate(256 * 4).unwrap();
        let out = space.allocate(4).unwrap();

        let ones = vec![1.0f32; 256];
        gridfire_core::DeviceMemory::copy_from_host(&input, bytemuck::cast_slice(&ones)).unwrap();

        let src = r#"
.visible .entry block_sum(
    .param .u64 in,
    .param .u64 out
)
{
    .reg .u32 %r<4>;
    .reg .u64 %rd<10>;
    .reg .f32 %f<4>;
    .reg .pred %p<3>;
    .shared .align 4 .b8 sdata[1024];

    mov.u32 %r0, %tid.x;
    cvt.u64.u32 %rd0, %r0;
    mul.lo.u64 %rd1, %rd0, 4;
    ld.param.u64 %rd2, [in];
    add.u64 %rd3, %rd2, %rd1;
    ld.global.f32 %f0, [%rd3];
    mov.u64 %rd4, sdata;
    add.u64 %rd5, %rd4, %rd1;
    st.shared.f32 [%rd5], %f0;
    bar.sync 0;
    mov.u32 %r1, 128;
loop:
    setp.ge.u32 %p0, %r0, %r1;
    @%p0 bra skip;
    add.u32 %r2, %r0, %r1;
    cvt.u64.u32 %rd6, %r2;
    mul.lo.u64 %rd7, %rd6, 4;
    add.u64 %rd8, %rd4, %rd7;
    ld.shared.f32 %f1, [%rd8];
    ld.shared.f32 %f2, [%rd5];
    add.f32 %f2, %f2, %f1;
    st.shared.f32 [%rd5], %f2;
skip:
    bar.sync 0;
    shr.u32 %r1, %r1, 1;
    setp.gt.u32 %p1, %r1, 0;
    @%p1 bra loop;
    setp.ne.u32 %p2, %r0, 0;
    @%p2 bra done;
    ld.shared.f32 %f3, [%rd4];
    ld.param.u64 %rd9, [out];
    st.global.f32 [%rd9], %f3;
done:
    ret;
}
"#;
        run_kernel(
            src,
            "block_sum",
            vec![input.base(), out.base()],
            Dim3::linear(1),
            Dim3::linear(256),
            &space,
        );

        let mut bytes = [0u8; 4];
        gridfire_core::DeviceMemory::copy_to_host(&out, &mut bytes).unwrap();
        assert_eq!(f32::from_le_bytes(bytes), 256.0);
    }

    #[test]
    fn float_immediates_and_selp() {
        let space = AddressSpace::new();
        let out = space.allocate(8).unwrap();

        // out[0] = max(-2.5, 0.0) via selp, out[1] = 1.0 from raw bits.
        let src = r#"
.visible .entry clamp(.param .u64 out)
{
    .reg .u64 %rd<1>;
    .reg .f32 %f<4>;
    .reg .pred %p<1>;
    mov.f32 %f0, 0fC0200000;
    mov.f32 %f1, 0f00000000;
    setp.gt.f32 %p0, %f0, %f1;
    selp.f32 %f2, %f0, %f1, %p0;
    ld.param.u64 %rd0, [out];
    st.global.f32 [%rd0], %f2;
    mov.f32 %f3, 0f3F800000;
    st.global.f32 [%rd0+4], %f3;
    ret;
}
"#;
        run_kernel(src, "clamp", vec![out.base()], Dim3::linear(1), Dim3::linear(1), &space);

        let mut bytes = [0u8; 8];
        gridfire_core::DeviceMemory::copy_to_host(&out, &mut bytes).unwrap();
        let values: &[f32] = bytemuck::cast_slice(&bytes);
        assert_eq!(values[0], 0.0);
        assert_eq!(values[1], 1.0);
    }

    #[test]
    fn out_of_bounds_access_faults() {
        let space = AddressSpace::new();
        let out = space.allocate(4).unwrap();

        let src = r#"
.visible .entry oob(.param .u64 out)
{
    .reg .u64 %rd<1>;
    .reg .u32 %r<1>;
    ld.param.u64 %rd0, [out];
    mov.u32 %r0, 7;
    st.global.u32 [%rd0+64], %r0;
    ret;
}
"#;
        let module = parse::parse(src).unwrap();
        let kernel = module.kernel("oob").unwrap();
        let err = Interpreter::new(kernel, &space, vec![out.base()], Dim3::linear(1), Dim3::linear(1))
            .run()
            .unwrap_err();
        assert!(err.msg.contains("out of bounds") || err.msg.contains("outside any allocation"));
    }

    #[test]
    fn division_by_zero_faults() {
        let space = AddressSpace::new();
        let out = space.allocate(4).unwrap();

        let src = r#"
.visible .entry divz(.param .u64 out)
{
    .reg .u32 %r<3>;
    mov.u32 %r0, 1;
    mov.u32 %r1, 0;
    div.u32 %r2, %r0, %r1;
    ret;
}
"#;
        let module = parse::parse(src).unwrap();
        let kernel = module.kernel("divz").unwrap();
        let err = Interpreter::new(kernel, &space, vec![out.base()], Dim3::linear(1), Dim3::linear(1))
            .run()
            .unwrap_err();
        assert!(err.msg.contains("division by zero"));
    }
}

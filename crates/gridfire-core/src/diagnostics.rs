//! Human-facing renderings of compiled kernel artifacts.
//!
//! Nothing here is required for correctness: rendering failures are logged
//! and swallowed, never propagated into the compilation error taxonomy.

use std::io::{Error, ErrorKind};
use std::process::Command;

use colored::Colorize;
use sha2::{Digest, Sha256};

const SPACE_DIRECTIVES: [&str; 6] = ["param", "reg", "global", "shared", "local", "const"];
const MODULE_DIRECTIVES: [&str; 7] = [
    "version",
    "target",
    "address_size",
    "visible",
    "entry",
    "func",
    "align",
];

/// Render an instruction stream with terminal colors: registers and
/// identifiers blue, scalar types green, leading opcodes and numbers
/// yellow, storage and module directives magenta.
pub fn pretty_ptx(ptx: &str) -> String {
    let mut out = String::with_capacity(ptx.len() * 2);
    for line in ptx.lines() {
        out.push_str(&paint_line(line));
        out.push('\n');
    }
    out
}

fn paint_line(line: &str) -> String {
    let mut out = String::new();
    let mut word = String::new();
    let mut first_word = true;

    let mut flush = |word: &mut String, first_word: &mut bool, out: &mut String| {
        if !word.is_empty() {
            out.push_str(&paint_word(word, *first_word));
            *first_word = false;
            word.clear();
        }
    };

    for c in line.chars() {
        if c.is_alphanumeric() || matches!(c, '_' | '%' | '$' | '.') {
            word.push(c);
        } else {
            flush(&mut word, &mut first_word, &mut out);
            out.push(c);
        }
    }
    flush(&mut word, &mut first_word, &mut out);
    out
}

fn paint_word(word: &str, first_word: bool) -> String {
    if word.starts_with('%') || word.starts_with("buf") {
        return word.blue().to_string();
    }
    if is_number(word) {
        return word.yellow().to_string();
    }

    // Dotted tokens: opcodes (`mad.lo.u32`) and directives (`.visible`).
    let mut painted = Vec::new();
    for (i, seg) in word.split('.').enumerate() {
        if seg.is_empty() {
            painted.push(String::new());
        } else if is_scalar_type(seg) {
            painted.push(seg.green().to_string());
        } else if SPACE_DIRECTIVES.contains(&seg) || MODULE_DIRECTIVES.contains(&seg) {
            painted.push(seg.magenta().to_string());
        } else if i == 0 && first_word && !word.starts_with('.') {
            painted.push(seg.yellow().to_string());
        } else {
            painted.push(seg.to_string());
        }
    }
    painted.join(".")
}

fn is_scalar_type(seg: &str) -> bool {
    if seg == "pred" {
        return true;
    }
    let mut chars = seg.chars();
    matches!(chars.next(), Some('b' | 's' | 'u' | 'f'))
        && matches!(chars.as_str(), "8" | "16" | "32" | "64")
}

fn is_number(word: &str) -> bool {
    if word.starts_with("0x") || word.starts_with("0X") {
        return word[2..].chars().all(|c| c.is_ascii_hexdigit());
    }
    if (word.starts_with("0f") || word.starts_with("0F") || word.starts_with("0d"))
        && word.len() > 2
        && word[2..].chars().all(|c| c.is_ascii_hexdigit())
    {
        return true;
    }
    !word.is_empty() && word.chars().all(|c| c.is_ascii_digit())
}

/// Best-effort lowering to native machine code for inspection.
///
/// Runs the external assembler/disassembler pair and prints the result.
/// Any failure in this path is reported as a warning and swallowed.
pub fn print_native_lowering(arch: &str, ptx: &str) {
    match lower_to_native(arch, ptx) {
        Ok(disassembly) => println!("{disassembly}"),
        Err(e) => tracing::warn!("native lowering failed: {e}"),
    }
}

fn lower_to_native(arch: &str, ptx: &str) -> std::io::Result<String> {
    let digest = Sha256::digest(ptx.as_bytes());
    let stem = std::env::temp_dir().join(format!("gridfire_{digest:x}"));
    let ptx_path = stem.with_extension("ptx");
    let bin_path = stem.with_extension("cubin");

    std::fs::write(&ptx_path, ptx)?;

    let status = Command::new("ptxas")
        .arg(format!("-arch={arch}"))
        .arg("-o")
        .arg(&bin_path)
        .arg(&ptx_path)
        .status()?;
    if !status.success() {
        return Err(Error::new(
            ErrorKind::Other,
            format!("ptxas exited with {status}"),
        ));
    }

    let output = Command::new("nvdisasm").arg(&bin_path).output()?;
    if !output.status.success() {
        return Err(Error::new(
            ErrorKind::Other,
            format!(
                "nvdisasm exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pretty_ptx_preserves_text() {
        colored::control::set_override(false);
        let src = "    mad.lo.u32 %r3, %r0, %r1, %r2;\n.visible .entry vadd()\n";
        assert_eq!(pretty_ptx(src), src);
    }

    #[test]
    fn number_classification() {
        assert!(is_number("42"));
        assert!(is_number("0x1F"));
        assert!(is_number("0f3F800000"));
        assert!(!is_number("vadd"));
        assert!(!is_number("0fZZ"));
    }

    #[test]
    fn scalar_type_classification() {
        assert!(is_scalar_type("f32"));
        assert!(is_scalar_type("u64"));
        assert!(is_scalar_type("pred"));
        assert!(!is_scalar_type("f128"));
        assert!(!is_scalar_type("entry"));
    }
}

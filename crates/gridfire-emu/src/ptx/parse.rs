//! Parser for the PTX subset produced for generated kernels.
//!
//! The grammar covered here is the one the code generator's kernels lower
//! to: module directives, visible entries with scalar parameters, register
//! and shared-memory declarations, labels, and predicated instructions
//! with register, immediate, special-register, symbol, and memory
//! operands.

use std::collections::HashMap;

/// Parse failure with the line it occurred on.
#[derive(Debug, thiserror::Error)]
#[error("line {line}: {msg}")]
pub struct ParseError {
    /// 1-based source line.
    pub line: usize,
    /// What went wrong.
    pub msg: String,
}

/// A parsed PTX module.
#[derive(Debug, Clone, Default)]
pub struct Module {
    /// `.version` directive text.
    pub version: String,
    /// `.target` directive text.
    pub target: String,
    /// `.address_size` in bits.
    pub address_size: u32,
    /// Kernels defined by the module.
    pub kernels: Vec<Kernel>,
}

impl Module {
    /// Find a kernel by entry name.
    pub fn kernel(&self, name: &str) -> Option<&Kernel> {
        self.kernels.iter().find(|k| k.name == name)
    }
}

/// One kernel body.
#[derive(Debug, Clone)]
pub struct Kernel {
    /// Entry symbol name.
    pub name: String,
    /// Whether the symbol carries the `.visible` linking directive.
    pub visible: bool,
    /// Parameter names, in declaration order.
    pub params: Vec<String>,
    /// Shared-memory declarations.
    pub shared: Vec<SharedDecl>,
    /// Instruction stream.
    pub body: Vec<Inst>,
    /// Label name to instruction index.
    pub labels: HashMap<String, usize>,
}

/// A shared-memory declaration.
#[derive(Debug, Clone)]
pub struct SharedDecl {
    /// Symbol name.
    pub name: String,
    /// Size in bytes.
    pub size: usize,
}

/// Special (read-only) registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Special {
    /// Thread index within the block, per axis.
    Tid(usize),
    /// Block extent, per axis.
    Ntid(usize),
    /// Block index within the grid, per axis.
    Ctaid(usize),
    /// Grid extent, per axis.
    Nctaid(usize),
}

/// An instruction operand.
#[derive(Debug, Clone)]
pub enum Operand {
    /// A register, e.g. `%f0`.
    Reg(String),
    /// Integer immediate.
    Imm(i64),
    /// Decimal floating-point immediate.
    FImm(f64),
    /// `0f` hex immediate: raw f32 bits.
    FBits32(u32),
    /// `0d` hex immediate: raw f64 bits.
    FBits64(u64),
    /// A special register.
    Special(Special),
    /// A named symbol (kernel parameter or shared variable).
    Sym(String),
    /// A memory reference `[base + offset]`.
    Mem(Box<Operand>, i64),
}

/// One parsed instruction.
#[derive(Debug, Clone)]
pub struct Inst {
    /// Guard predicate: register name and whether it is negated.
    pub pred: Option<(String, bool)>,
    /// Opcode root, e.g. `mad` for `mad.lo.u32`.
    pub op: String,
    /// Dotted opcode suffixes, e.g. `["lo", "u32"]`.
    pub mods: Vec<String>,
    /// Operands in source order.
    pub args: Vec<Operand>,
    /// 1-based source line, for faults.
    pub line: usize,
}

/// Parse a PTX module.
pub fn parse(src: &str) -> Result<Module, ParseError> {
    Parser::new(src)?.module()
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Punct(char),
}

struct Parser {
    tokens: Vec<(Tok, usize)>,
    pos: usize,
}

impl Parser {
    fn new(src: &str) -> Result<Self, ParseError> {
        Ok(Self {
            tokens: tokenize(src),
            pos: 0,
        })
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos.min(self.tokens.len().saturating_sub(1)))
            .map(|(_, l)| *l)
            .unwrap_or(0)
    }

    fn err(&self, msg: impl Into<String>) -> ParseError {
        ParseError {
            line: self.line(),
            msg: msg.into(),
        }
    }

    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn next(&mut self) -> Option<Tok> {
        let tok = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat_punct(&mut self, c: char) -> bool {
        if self.peek() == Some(&Tok::Punct(c)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, c: char) -> Result<(), ParseError> {
        if self.eat_punct(c) {
            Ok(())
        } else {
            Err(self.err(format!("expected `{c}`")))
        }
    }

    fn expect_ident(&mut self) -> Result<String, ParseError> {
        match self.next() {
            Some(Tok::Ident(s)) => Ok(s),
            other => Err(self.err(format!("expected identifier, found {other:?}"))),
        }
    }

    fn skip_to_semicolon(&mut self) {
        while let Some(tok) = self.next() {
            if tok == Tok::Punct(';') {
                break;
            }
        }
    }

    fn skip_balanced_braces(&mut self) -> Result<(), ParseError> {
        self.expect_punct('{')?;
        let mut depth = 1usize;
        while depth > 0 {
            match self.next() {
                Some(Tok::Punct('{')) => depth += 1,
                Some(Tok::Punct('}')) => depth -= 1,
                Some(_) => {}
                None => return Err(self.err("unterminated function body")),
            }
        }
        Ok(())
    }

    fn module(&mut self) -> Result<Module, ParseError> {
        let mut module = Module {
            address_size: 64,
            ..Module::default()
        };

        while let Some(tok) = self.peek().cloned() {
            match tok {
                Tok::Ident(ref s) if s == ".version" => {
                    self.pos += 1;
                    module.version = self.expect_ident()?;
                }
                Tok::Ident(ref s) if s == ".target" => {
                    self.pos += 1;
                    module.target = self.expect_ident()?;
                    while self.eat_punct(',') {
                        let extra = self.expect_ident()?;
                        module.target.push_str(", ");
                        module.target.push_str(&extra);
                    }
                }
                Tok::Ident(ref s) if s == ".address_size" => {
                    self.pos += 1;
                    let bits = self.expect_ident()?;
                    module.address_size = bits
                        .parse()
                        .map_err(|_| self.err(format!("bad address size `{bits}`")))?;
                }
                Tok::Ident(ref s) if s == ".visible" => {
                    self.pos += 1;
                    match self.peek() {
                        Some(Tok::Ident(d)) if d == ".entry" => {
                            self.pos += 1;
                            module.kernels.push(self.kernel(true)?);
                        }
                        Some(Tok::Ident(d)) if d == ".func" => {
                            self.pos += 1;
                            self.skip_function()?;
                        }
                        _ => return Err(self.err("expected `.entry` or `.func` after `.visible`")),
                    }
                }
                Tok::Ident(ref s) if s == ".entry" => {
                    self.pos += 1;
                    module.kernels.push(self.kernel(false)?);
                }
                Tok::Ident(ref s) if s == ".func" => {
                    self.pos += 1;
                    self.skip_function()?;
                }
                Tok::Ident(ref s) if s == ".extern" || s == ".weak" => {
                    self.pos += 1;
                    self.skip_to_semicolon();
                }
                Tok::Ident(ref s) if s.starts_with('.') => {
                    // Other module-scope declarations (`.global`, `.const`,
                    // debug directives) end at a semicolon.
                    self.pos += 1;
                    self.skip_to_semicolon();
                }
                Tok::Ident(s) => {
                    return Err(self.err(format!("unexpected `{s}` at module scope")));
                }
                Tok::Punct(c) => {
                    return Err(self.err(format!("unexpected `{c}` at module scope")));
                }
            }
        }

        Ok(module)
    }

    fn skip_function(&mut self) -> Result<(), ParseError> {
        // Optional return value, name, optional parameter list, then body.
        while let Some(tok) = self.peek() {
            match tok {
                Tok::Punct('{') => return self.skip_balanced_braces(),
                Tok::Punct(';') => {
                    self.pos += 1;
                    return Ok(());
                }
                _ => self.pos += 1,
            }
        }
        Err(self.err("unterminated function declaration"))
    }

    fn kernel(&mut self, visible: bool) -> Result<Kernel, ParseError> {
        let name = self.expect_ident()?;
        let mut params = Vec::new();

        if self.eat_punct('(') {
            while !self.eat_punct(')') {
                if self.eat_punct(',') {
                    continue;
                }
                match self.next() {
                    Some(Tok::Ident(d)) if d == ".param" => {
                        params.push(self.param_name()?);
                    }
                    Some(_) => {}
                    None => return Err(self.err("unterminated parameter list")),
                }
            }
        }

        let mut kernel = Kernel {
            name,
            visible,
            params,
            shared: Vec::new(),
            body: Vec::new(),
            labels: HashMap::new(),
        };

        self.expect_punct('{')?;
        self.kernel_body(&mut kernel)?;
        Ok(kernel)
    }

    /// Consume declaration qualifiers after `.param` and return the
    /// parameter name, skipping any `[N]` array suffix.
    fn param_name(&mut self) -> Result<String, ParseError> {
        loop {
            match self.next() {
                Some(Tok::Ident(tok)) => {
                    // Type and alignment qualifiers start with `.`;
                    // alignment arguments are bare numbers.
                    if tok.starts_with('.') || tok.chars().all(|c| c.is_ascii_digit()) {
                        continue;
                    }
                    if self.eat_punct('[') {
                        while !self.eat_punct(']') {
                            if self.next().is_none() {
                                return Err(self.err("unterminated array suffix"));
                            }
                        }
                    }
                    return Ok(tok);
                }
                other => return Err(self.err(format!("expected parameter name, found {other:?}"))),
            }
        }
    }

    fn kernel_body(&mut self, kernel: &mut Kernel) -> Result<(), ParseError> {
        loop {
            let Some(tok) = self.peek().cloned() else {
                return Err(self.err("unterminated kernel body"));
            };
            match tok {
                Tok::Punct('}') => {
                    self.pos += 1;
                    return Ok(());
                }
                Tok::Ident(ref s) if s == ".reg" || s == ".local" => {
                    self.pos += 1;
                    self.skip_to_semicolon();
                }
                Tok::Ident(ref s) if s == ".shared" => {
                    self.pos += 1;
                    kernel.shared.push(self.shared_decl()?);
                }
                Tok::Punct('@') => {
                    self.pos += 1;
                    let negated = self.eat_punct('!');
                    let reg = self.expect_ident()?;
                    let inst = self.instruction(Some((reg, negated)))?;
                    kernel.body.push(inst);
                }
                Tok::Ident(name) => {
                    self.pos += 1;
                    if self.eat_punct(':') {
                        kernel.labels.insert(name, kernel.body.len());
                    } else {
                        self.pos -= 1;
                        let inst = self.instruction(None)?;
                        kernel.body.push(inst);
                    }
                }
                Tok::Punct(c) => return Err(self.err(format!("unexpected `{c}` in kernel body"))),
            }
        }
    }

    fn shared_decl(&mut self) -> Result<SharedDecl, ParseError> {
        let mut elem_size = 1usize;
        let mut count = 1usize;
        let name;

        loop {
            match self.next() {
                Some(Tok::Ident(tok)) if tok == ".align" => {
                    // Alignment argument; allocation is already max-aligned.
                    let _ = self.expect_ident()?;
                }
                Some(Tok::Ident(tok)) if tok.starts_with('.') => {
                    if let Some(size) = type_width(&tok[1..]) {
                        elem_size = size;
                    }
                }
                Some(Tok::Ident(tok)) => {
                    name = tok;
                    break;
                }
                other => {
                    return Err(self.err(format!("expected shared declaration, found {other:?}")))
                }
            }
        }

        if self.eat_punct('[') {
            let n = self.expect_ident()?;
            count = n
                .parse()
                .map_err(|_| self.err(format!("bad array length `{n}`")))?;
            self.expect_punct(']')?;
        }
        self.skip_to_semicolon();

        Ok(SharedDecl {
            name,
            size: elem_size * count,
        })
    }

    fn instruction(&mut self, pred: Option<(String, bool)>) -> Result<Inst, ParseError> {
        let line = self.line();
        let opcode = self.expect_ident()?;
        let mut parts = opcode.split('.');
        let op = parts
            .next()
            .filter(|root| !root.is_empty())
            .ok_or_else(|| self.err(format!("bad opcode `{opcode}`")))?
            .to_string();
        let mods: Vec<String> = parts.map(str::to_string).collect();

        let mut args = Vec::new();
        if !self.eat_punct(';') {
            loop {
                args.push(self.operand()?);
                if self.eat_punct(',') {
                    continue;
                }
                self.expect_punct(';')?;
                break;
            }
        }

        Ok(Inst {
            pred,
            op,
            mods,
            args,
            line,
        })
    }

    fn operand(&mut self) -> Result<Operand, ParseError> {
        if self.eat_punct('[') {
            let base = self.operand()?;
            let mut offset = 0i64;
            if self.eat_punct('+') {
                match self.next() {
                    Some(Tok::Ident(n)) => {
                        offset = parse_int(&n)
                            .ok_or_else(|| self.err(format!("bad address offset `{n}`")))?;
                    }
                    other => return Err(self.err(format!("expected offset, found {other:?}"))),
                }
            }
            self.expect_punct(']')?;
            return Ok(Operand::Mem(Box::new(base), offset));
        }

        let tok = self.expect_ident()?;
        Ok(classify_operand(&tok)
            .ok_or_else(|| self.err(format!("bad operand `{tok}`")))?)
    }
}

fn classify_operand(tok: &str) -> Option<Operand> {
    if let Some(rest) = tok.strip_prefix('%') {
        if let Some((root, axis)) = rest.split_once('.') {
            let axis = match axis {
                "x" => 0,
                "y" => 1,
                "z" => 2,
                _ => return Some(Operand::Reg(tok.to_string())),
            };
            let special = match root {
                "tid" => Special::Tid(axis),
                "ntid" => Special::Ntid(axis),
                "ctaid" => Special::Ctaid(axis),
                "nctaid" => Special::Nctaid(axis),
                _ => return Some(Operand::Reg(tok.to_string())),
            };
            return Some(Operand::Special(special));
        }
        return Some(Operand::Reg(tok.to_string()));
    }

    let first = tok.chars().next()?;
    if first.is_ascii_digit() || first == '-' {
        if let Some(bits) = tok
            .strip_prefix("0f")
            .or_else(|| tok.strip_prefix("0F"))
            .and_then(|h| u32::from_str_radix(h, 16).ok())
        {
            return Some(Operand::FBits32(bits));
        }
        if let Some(bits) = tok
            .strip_prefix("0d")
            .or_else(|| tok.strip_prefix("0D"))
            .and_then(|h| u64::from_str_radix(h, 16).ok())
        {
            return Some(Operand::FBits64(bits));
        }
        if let Some(value) = parse_int(tok) {
            return Some(Operand::Imm(value));
        }
        if let Ok(value) = tok.parse::<f64>() {
            return Some(Operand::FImm(value));
        }
        return None;
    }

    Some(Operand::Sym(tok.to_string()))
}

fn parse_int(tok: &str) -> Option<i64> {
    let (negative, body) = match tok.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, tok),
    };
    let value = if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()?
    } else {
        body.parse::<i64>().ok()?
    };
    Some(if negative { -value } else { value })
}

fn type_width(suffix: &str) -> Option<usize> {
    let mut chars = suffix.chars();
    if !matches!(chars.next(), Some('b' | 's' | 'u' | 'f')) {
        return None;
    }
    match chars.as_str() {
        "8" => Some(1),
        "16" => Some(2),
        "32" => Some(4),
        "64" => Some(8),
        _ => None,
    }
}

fn tokenize(src: &str) -> Vec<(Tok, usize)> {
    let mut tokens = Vec::new();
    let mut word = String::new();
    let mut word_line = 1;
    let mut line = 1;

    let mut chars = src.chars().peekable();
    let mut flush = |word: &mut String, line: usize, tokens: &mut Vec<(Tok, usize)>| {
        if !word.is_empty() {
            tokens.push((Tok::Ident(std::mem::take(word)), line));
        }
    };

    while let Some(c) = chars.next() {
        match c {
            '\n' => {
                flush(&mut word, word_line, &mut tokens);
                line += 1;
            }
            '/' if chars.peek() == Some(&'/') => {
                flush(&mut word, word_line, &mut tokens);
                for c in chars.by_ref() {
                    if c == '\n' {
                        line += 1;
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                flush(&mut word, word_line, &mut tokens);
                chars.next();
                let mut prev = '\0';
                for c in chars.by_ref() {
                    if c == '\n' {
                        line += 1;
                    }
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
            }
            '-' if word.is_empty() && chars.peek().is_some_and(|n| n.is_ascii_digit()) => {
                word_line = line;
                word.push(c);
            }
            c if c.is_alphanumeric() || matches!(c, '_' | '%' | '$' | '.') => {
                if word.is_empty() {
                    word_line = line;
                }
                word.push(c);
            }
            c if c.is_whitespace() => flush(&mut word, word_line, &mut tokens),
            c => {
                flush(&mut word, word_line, &mut tokens);
                tokens.push((Tok::Punct(c), line));
            }
        }
    }
    flush(&mut word, word_line, &mut tokens);
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    const VADD: &str = r#"
.version 7.0
.target sm_35
.address_size 64

.visible .entry vadd(
    .param .u64 a,
    .param .u64 b,
    .param .u64 c
)
{
    .reg .u32 %r<5>;
    .reg .u64 %rd<8>;
    .reg .f32 %f<4>;

    mov.u32 %r0, %ctaid.x;
    mov.u32 %r1, %ntid.x;
    mov.u32 %r2, %tid.x;
    mad.lo.u32 %r3, %r0, %r1, %r2;
    cvt.u64.u32 %rd0, %r3;
    mul.lo.u64 %rd1, %rd0, 4;
    ld.param.u64 %rd2, [a];
    add.u64 %rd3, %rd2, %rd1;
    ld.global.f32 %f0, [%rd3];
    ret;
}
"#;

    #[test]
    fn parses_module_directives() {
        let module = parse(VADD).unwrap();
        assert_eq!(module.version, "7.0");
        assert_eq!(module.target, "sm_35");
        assert_eq!(module.address_size, 64);
    }

    #[test]
    fn parses_entry_and_params() {
        let module = parse(VADD).unwrap();
        let kernel = module.kernel("vadd").unwrap();
        assert!(kernel.visible);
        assert_eq!(kernel.params, vec!["a", "b", "c"]);
        assert_eq!(kernel.body.len(), 10);
    }

    #[test]
    fn classifies_operands() {
        assert!(matches!(
            classify_operand("%tid.x"),
            Some(Operand::Special(Special::Tid(0)))
        ));
        assert!(matches!(classify_operand("%rd3"), Some(Operand::Reg(_))));
        assert!(matches!(classify_operand("-4"), Some(Operand::Imm(-4))));
        assert!(matches!(classify_operand("0x10"), Some(Operand::Imm(16))));
        assert!(matches!(
            classify_operand("0f3F800000"),
            Some(Operand::FBits32(0x3F80_0000))
        ));
        assert!(matches!(classify_operand("sdata"), Some(Operand::Sym(_))));
    }

    #[test]
    fn parses_labels_and_predicates() {
        let src = r#"
.visible .entry looped()
{
    .reg .u32 %r<2>;
    .reg .pred %p<1>;
    mov.u32 %r0, 0;
top:
    add.u32 %r0, %r0, 1;
    setp.lt.u32 %p0, %r0, 10;
    @%p0 bra top;
    @!%p0 bra done;
done:
    ret;
}
"#;
        let module = parse(src).unwrap();
        let kernel = module.kernel("looped").unwrap();
        assert_eq!(kernel.labels["top"], 1);
        assert_eq!(kernel.labels["done"], 5);

        let guarded = &kernel.body[3];
        assert_eq!(guarded.pred, Some(("%p0".to_string(), false)));
        let negated = &kernel.body[4];
        assert_eq!(negated.pred, Some(("%p0".to_string(), true)));
    }

    #[test]
    fn parses_shared_declarations() {
        let src = r#"
.visible .entry k()
{
    .shared .align 4 .b8 sdata[1024];
    .shared .f32 single[256];
    ret;
}
"#;
        let module = parse(src).unwrap();
        let kernel = module.kernel("k").unwrap();
        assert_eq!(kernel.shared[0].name, "sdata");
        assert_eq!(kernel.shared[0].size, 1024);
        assert_eq!(kernel.shared[1].name, "single");
        assert_eq!(kernel.shared[1].size, 1024);
    }

    #[test]
    fn parses_memory_operands_with_offsets() {
        let src = ".visible .entry k()\n{\n    ld.shared.f32 %f0, [%rd1+-4];\n    ret;\n}\n";
        let module = parse(src).unwrap();
        let inst = &module.kernel("k").unwrap().body[0];
        match &inst.args[1] {
            Operand::Mem(base, offset) => {
                assert!(matches!(**base, Operand::Reg(_)));
                assert_eq!(*offset, -4);
            }
            other => panic!("expected memory operand, got {other:?}"),
        }
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse(".visible .entry k(").is_err());
        assert!(parse(".visible .entry k()\n{\n    add.f32 %f0 %f1;\n}\n").is_err());
    }

    #[test]
    fn non_visible_entries_are_kept_but_marked() {
        let src = ".entry hidden()\n{\n    ret;\n}\n";
        let module = parse(src).unwrap();
        assert!(!module.kernel("hidden").unwrap().visible);
    }
}

//! Single-pass compiler from script source to a [`Module`].
//!
//! Expressions are typed while they are compiled. Operators are applied
//! strictly left to right with no precedence, and every right operand must
//! have the type the expression has so far. Parentheses group.

use tracing::debug;

use super::builtins::Builtin;
use super::lexer::{Span, Tok, Token, tokenize};
use super::module::{BinOp, Entry, GlobalVar, MAX_ENTRIES, MAX_GLOBALS, MAX_LOCALS, Module, Op, Slot, UnOp};
use super::value::ValueType;
use crate::{RiaError, RiaResult};

const CONTEXT_CHARS: usize = 50;

struct CompileError {
    message: String,
    span: Span,
}

type CResult<T> = Result<T, CompileError>;

struct Local {
    name: String,
    ty: Option<ValueType>,
}

struct Compiler {
    tokens: Vec<Token>,
    pos: usize,
    module: Module,
    locals: Vec<Local>,
}

/// Compile script source into a module.
pub fn compile(src: &str) -> RiaResult<Module> {
    let tokens = tokenize(src).map_err(|e| to_error(src, e.message.to_string(), e.span))?;
    let mut compiler = Compiler { tokens, pos: 0, module: Module::default(), locals: Vec::new() };
    compiler.module_items().map_err(|e| to_error(src, e.message, e.span))?;
    let module = compiler.module;
    debug!(
        entries = module.entries.len(),
        globals = module.globals.len(),
        ops = module.code.len(),
        "compiled script"
    );
    Ok(module)
}

fn to_error(src: &str, message: String, span: Span) -> RiaError {
    let near: String = src.get(span.offset..).unwrap_or("").chars().take(CONTEXT_CHARS).collect();
    RiaError::Compile { message, line: span.line, column: span.column, near }
}

impl Compiler {
    fn peek(&self) -> &Tok {
        self.peek_at(0)
    }

    fn peek_at(&self, ahead: usize) -> &Tok {
        let i = (self.pos + ahead).min(self.tokens.len() - 1);
        &self.tokens[i].tok
    }

    fn span(&self) -> Span {
        self.tokens[self.pos.min(self.tokens.len() - 1)].span
    }

    fn advance(&mut self) -> Tok {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn fail<T>(&self, message: &str) -> CResult<T> {
        Err(CompileError { message: message.to_string(), span: self.span() })
    }

    fn expect(&mut self, tok: Tok, message: &str) -> CResult<()> {
        if *self.peek() == tok {
            self.advance();
            Ok(())
        } else {
            self.fail(message)
        }
    }

    fn emit(&mut self, op: Op) -> u32 {
        self.module.code.push(op);
        (self.module.code.len() - 1) as u32
    }

    fn here(&self) -> u32 {
        self.module.code.len() as u32
    }

    fn patch(&mut self, at: u32, target: u32) {
        match &mut self.module.code[at as usize] {
            Op::Jump(t) | Op::JumpIfFalse(t) => *t = target,
            _ => {}
        }
    }

    fn module_items(&mut self) -> CResult<()> {
        loop {
            match self.peek().clone() {
                Tok::Eof => return Ok(()),
                Tok::Ident(name)
                    if name == "global"
                        && *self.peek_at(1) == Tok::LParen
                        && matches!(self.peek_at(2), Tok::Var(_)) =>
                {
                    self.global_decl()?
                }
                Tok::Ident(name) => self.entry(name)?,
                _ => return self.fail("syntax error"),
            }
        }
    }

    fn global_decl(&mut self) -> CResult<()> {
        self.advance();
        self.advance();
        let Tok::Var(name) = self.advance() else { return self.fail("syntax error") };
        let mut ty = None;
        if *self.peek() == Tok::Colon {
            self.advance();
            let Tok::Ident(decl) = self.peek().clone() else { return self.fail("syntax error") };
            let Some(declared) = ValueType::from_decl(&decl) else { return self.fail("unknown type") };
            ty = Some(declared);
            self.advance();
        }
        self.expect(Tok::RParen, "syntax error")?;
        if *self.peek() == Tok::Semi {
            self.advance();
        }
        if self.module.globals.iter().any(|g| g.name == name) {
            return self.fail("var was already defined somewhere");
        }
        if self.module.globals.len() >= MAX_GLOBALS {
            return self.fail("too many variables");
        }
        self.module.globals.push(GlobalVar { name, ty });
        Ok(())
    }

    fn entry(&mut self, name: String) -> CResult<()> {
        self.advance();
        self.expect(Tok::LParen, "syntax error")?;
        let params = match self.peek().clone() {
            Tok::Int(n) => {
                let Ok(count) = u8::try_from(n) else { return self.fail("wrong number of parameters") };
                self.advance();
                count
            }
            _ => 0,
        };
        self.expect(Tok::RParen, "syntax error")?;
        if self.module.entry(&name).is_some() {
            return self.fail("entry was already defined");
        }
        if self.module.entries.len() >= MAX_ENTRIES {
            return self.fail("too many functions");
        }
        self.locals.clear();
        let start = self.here();
        self.block()?;
        self.emit(Op::RetNone);
        self.module.entries.push(Entry { name, params, start, locals: self.locals.len() as u8 });
        Ok(())
    }

    fn block(&mut self) -> CResult<()> {
        self.expect(Tok::LBrace, "syntax error")?;
        loop {
            match self.peek() {
                Tok::RBrace => {
                    self.advance();
                    return Ok(());
                }
                Tok::Eof => return self.fail("syntax error"),
                _ => self.statement()?,
            }
        }
    }

    fn statement(&mut self) -> CResult<()> {
        match self.peek().clone() {
            Tok::Var(name) => self.assignment(name),
            Tok::Ident(kw) if kw == "return" => {
                self.advance();
                if *self.peek() == Tok::Semi {
                    self.advance();
                    self.emit(Op::RetNone);
                    return Ok(());
                }
                self.expr()?;
                self.expect(Tok::Semi, "; is absent")?;
                self.emit(Op::Ret);
                Ok(())
            }
            Tok::Ident(kw) if kw == "if" => self.if_statement(),
            Tok::Ident(kw) if kw == "while" => {
                self.advance();
                let top = self.here();
                self.condition()?;
                let exit = self.emit(Op::JumpIfFalse(0));
                self.block()?;
                self.emit(Op::Jump(top));
                let end = self.here();
                self.patch(exit, end);
                Ok(())
            }
            Tok::Ident(name) if *self.peek_at(1) == Tok::LParen => {
                self.call(&name, false)?;
                if *self.peek() == Tok::Semi {
                    self.advance();
                }
                Ok(())
            }
            _ => self.fail("syntax error"),
        }
    }

    fn if_statement(&mut self) -> CResult<()> {
        self.advance();
        self.condition()?;
        let skip_then = self.emit(Op::JumpIfFalse(0));
        self.block()?;
        if matches!(self.peek(), Tok::Ident(kw) if kw == "else") {
            self.advance();
            let skip_else = self.emit(Op::Jump(0));
            let else_start = self.here();
            self.patch(skip_then, else_start);
            if matches!(self.peek(), Tok::Ident(kw) if kw == "if") {
                self.if_statement()?;
            } else {
                self.block()?;
            }
            let end = self.here();
            self.patch(skip_else, end);
        } else {
            let end = self.here();
            self.patch(skip_then, end);
        }
        Ok(())
    }

    fn condition(&mut self) -> CResult<()> {
        let span = self.span();
        if self.expr()? != ValueType::Bool {
            return Err(CompileError { message: "condition must be boolean".into(), span });
        }
        Ok(())
    }

    fn assignment(&mut self, name: String) -> CResult<()> {
        self.advance();
        self.expect(Tok::Assign, "syntax error")?;
        let slot = match self.resolve(&name) {
            Some(slot) => slot,
            None => {
                if self.locals.len() >= MAX_LOCALS {
                    return self.fail("too many variables");
                }
                self.locals.push(Local { name, ty: None });
                Slot::Local((self.locals.len() - 1) as u8)
            }
        };
        let ty = self.expr()?;
        self.expect(Tok::Semi, "; is absent")?;
        match slot {
            Slot::Local(i) => self.locals[i as usize].ty = Some(ty),
            Slot::Global(i) => self.module.globals[i as usize].ty = Some(ty),
        }
        self.emit(Op::Store(slot));
        Ok(())
    }

    fn resolve(&self, name: &str) -> Option<Slot> {
        if let Some(i) = self.locals.iter().position(|l| l.name == name) {
            return Some(Slot::Local(i as u8));
        }
        self.module.globals.iter().position(|g| g.name == name).map(|i| Slot::Global(i as u8))
    }

    fn slot_type(&self, slot: Slot) -> Option<ValueType> {
        match slot {
            Slot::Local(i) => self.locals[i as usize].ty,
            Slot::Global(i) => self.module.globals[i as usize].ty,
        }
    }

    fn expr(&mut self) -> CResult<ValueType> {
        let unary = match self.peek() {
            Tok::Op(BinOp::Sub) => Some(UnOp::Neg),
            Tok::Tilde => Some(UnOp::BitNot),
            Tok::Bang => Some(UnOp::Not),
            _ => None,
        };
        if unary.is_some() {
            self.advance();
        }
        let first = self.span();
        let mut ty = self.operand()?;
        if let Some(op) = unary {
            if ty != op.operand_type() {
                return Err(CompileError { message: "bad operands type".into(), span: first });
            }
            self.emit(Op::Unary(op));
        }
        while let Tok::Op(op) = self.peek().clone() {
            self.advance();
            let span = self.span();
            let rhs = self.operand()?;
            let result = if rhs == ty { op.result_type(ty) } else { None };
            let Some(result) = result else {
                return Err(CompileError { message: "bad operands type".into(), span });
            };
            self.emit(Op::Binary(op));
            ty = result;
        }
        Ok(ty)
    }

    fn operand(&mut self) -> CResult<ValueType> {
        match self.peek().clone() {
            Tok::LParen => {
                self.advance();
                let ty = self.expr()?;
                self.expect(Tok::RParen, "unterminated expression")?;
                Ok(ty)
            }
            Tok::Var(name) => {
                let Some(slot) = self.resolve(&name) else { return self.fail("unknown variable") };
                let Some(ty) = self.slot_type(slot) else {
                    return self.fail("use of uninitialized variable");
                };
                self.advance();
                self.emit(Op::PushVar(slot));
                Ok(ty)
            }
            Tok::Param(n) => {
                self.advance();
                self.emit(Op::PushParam(n));
                Ok(ValueType::Str)
            }
            Tok::Str(s) => {
                self.advance();
                let index = self.module.intern(s);
                self.emit(Op::PushStr(index));
                Ok(ValueType::Str)
            }
            Tok::Int(n) => {
                self.advance();
                self.emit(Op::PushInt(n));
                Ok(ValueType::Int)
            }
            Tok::Ident(name) if *self.peek_at(1) == Tok::LParen => {
                let span = self.span();
                self.call(&name, true)?
                    .ok_or(CompileError { message: "function returns no value".into(), span })
            }
            Tok::Ident(_) => self.fail("unknown variable"),
            Tok::Eof | Tok::Semi | Tok::RParen | Tok::Comma => self.fail("unterminated expression"),
            _ => self.fail("syntax error"),
        }
    }

    fn call(&mut self, name: &str, keep: bool) -> CResult<Option<ValueType>> {
        let Some(builtin) = Builtin::lookup(name) else { return self.fail("unknown function") };
        let sig = builtin.signature();
        let call_span = self.span();
        self.advance();
        self.expect(Tok::LParen, "syntax error")?;
        let mut argc = 0usize;
        let mut out = None;
        if *self.peek() == Tok::RParen {
            self.advance();
        } else {
            loop {
                let bare_var = match (self.peek().clone(), self.peek_at(1)) {
                    (Tok::Var(v), Tok::Comma | Tok::RParen) => self.resolve(&v),
                    _ => None,
                };
                let span = self.span();
                let ty = self.expr()?;
                if let Some(expected) = sig.params.get(argc) {
                    if *expected != ty {
                        return Err(CompileError { message: "bad argument type".into(), span });
                    }
                }
                if sig.inout == Some(argc) {
                    out = bare_var;
                }
                argc += 1;
                match self.advance() {
                    Tok::Comma => continue,
                    Tok::RParen => break,
                    _ => return self.fail("unterminated expression"),
                }
            }
        }
        if argc != sig.params.len() {
            return Err(CompileError { message: "wrong number of parameters".into(), span: call_span });
        }
        self.emit(Op::Call { builtin, argc: argc as u8, keep, out });
        Ok(sig.ret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile_err(src: &str) -> String {
        match compile(src) {
            Err(RiaError::Compile { message, .. }) => message,
            other => panic!("expected compile error, got {other:?}"),
        }
    }

    #[test]
    fn test_compiles_entries_and_globals() {
        let module = compile(
            r#"
global($count:int)
global($name)

Start(1) {
    $count = 0;
    $name = @0 + "!";
    return($name);
}

next(0) { return $count; }
"#,
        )
        .unwrap();
        assert_eq!(module.entries.len(), 2);
        assert_eq!(module.entries[0].name, "start");
        assert_eq!(module.entries[0].params, 1);
        assert_eq!(module.globals[1].ty, Some(ValueType::Str));
        assert_eq!(module.code.last(), Some(&Op::RetNone));
    }

    #[test]
    fn test_locals_are_per_entry() {
        let module = compile("a(0){ $x = 1; $y = 2; } b(0){ $z = \"s\"; }").unwrap();
        assert_eq!(module.entries[0].locals, 2);
        assert_eq!(module.entries[1].locals, 1);
        assert_eq!(compile_err("a(0){ $x = 1; } b(0){ return $x; }"), "unknown variable");
    }

    #[test]
    fn test_error_classes() {
        assert_eq!(compile_err("a(0){ return $nope; }"), "unknown variable");
        assert_eq!(compile_err("a(0){ $x = $x + 1; }"), "use of uninitialized variable");
        assert_eq!(compile_err("a(0){ $x = frobnicate(1); }"), "unknown function");
        assert_eq!(compile_err("a(0){ $x = length(\"a\", \"b\"); }"), "wrong number of parameters");
        assert_eq!(compile_err("a(0){ $x = 1 }"), "; is absent");
        assert_eq!(compile_err("global($g) global($g)"), "var was already defined somewhere");
        assert_eq!(compile_err("a(0){ $x = 007; }"), "bad numeric constant");
        assert_eq!(compile_err("a(0){ $x = 1 + \"s\"; }"), "bad operands type");
        assert_eq!(compile_err("a(0){ if (1) { } }"), "condition must be boolean");
        assert_eq!(compile_err("a(0){ $x = set_header(\"a\", \"b\"); }"), "function returns no value");
        assert_eq!(compile_err("a(0){ $x = (1 + 2; }"), "unterminated expression");
        assert_eq!(compile_err("a(0){ $x = length(5); }"), "bad argument type");
        assert_eq!(compile_err("a(0){ } a(1){ }"), "entry was already defined");
        assert_eq!(compile_err("a(0){ $x = !1; }"), "bad operands type");
    }

    #[test]
    fn test_error_reports_position_and_context() {
        let err = compile("a(0){\n  $x = 1 +;\n}").unwrap_err();
        match err {
            RiaError::Compile { line, near, .. } => {
                assert_eq!(line, 2);
                assert!(near.starts_with(';'));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(compile("a(0){ $x = 1 +; }").unwrap_err().to_string().starts_with("script compilation error"));
    }

    #[test]
    fn test_comparison_changes_expression_type() {
        // after `<` the expression is boolean, so the next operand must be too
        assert!(compile("a(0){ $a = 1; if (($a < 1) && ($a > 0)) { } }").is_ok());
        assert_eq!(compile_err("a(0){ $a = 1; if ($a < 1 && $a > 0) { } }"), "bad operands type");
    }

    #[test]
    fn test_inout_position_is_bound_to_variable() {
        let module = compile("a(0){ $p = 0; $s = extract_string(\"abc\", $p, \"a\", \"c\"); }").unwrap();
        let call = module.code.iter().find(|op| matches!(op, Op::Call { .. })).unwrap();
        assert_eq!(
            call,
            &Op::Call { builtin: Builtin::ExtractString, argc: 4, keep: true, out: Some(Slot::Local(0)) }
        );
        let module = compile("a(0){ $s = extract_string(\"abc\", 0, \"a\", \"c\"); }").unwrap();
        assert!(module.code.iter().any(|op| matches!(op, Op::Call { out: None, .. })));
    }

    #[test]
    fn test_if_else_and_while_patch_jumps() {
        let module = compile(
            "a(0){ $i = 0; while ($i < 3) { $i = $i + 1; } if ($i == 3) { return \"y\"; } else if ($i == 4) { return \"z\"; } else { return \"n\"; } }",
        )
        .unwrap();
        let len = module.code.len() as u32;
        for op in &module.code {
            if let Op::Jump(t) | Op::JumpIfFalse(t) = op {
                assert!(*t <= len, "jump target {t} out of range");
                assert_ne!(*t, 0);
            }
        }
    }

    #[test]
    fn test_statement_call_discards_result() {
        let module = compile("a(0){ set_header(\"x\", \"y\") get_html(\"http://h/\"); }").unwrap();
        let calls: Vec<_> = module.code.iter().filter(|op| matches!(op, Op::Call { keep: false, .. })).collect();
        assert_eq!(calls.len(), 2);
    }
}

//! One-pass compiler: drives the lexer, resolves symbols, and appends
//! opcodes to the code segment as it parses. No syntax tree is built;
//! expression results are described by a single in-flight type register and
//! lvalues are recovered by rewriting the trailing load instruction.

use crate::bytecode::compile_error::CompileError;
use crate::bytecode::ir::{LineMark, Program};
use crate::bytecode::op::Op;
use crate::lexer::Lexer;
use crate::symbol::{Storage, SymbolTable};
use crate::token::{Prec, Token};
use crate::ty::{Type, WORD};

pub struct Compiler<'a> {
    lexer: Lexer<'a>,
    tok: Token,
    syms: SymbolTable,
    main_sym: usize,
    code: Vec<Op>,
    data: Vec<u8>,
    /// Type of the value most recently emitted into the accumulator.
    ty: Type,
    /// Frame offset bias of the function being compiled: parameter and
    /// local indices are subtracted from this to form `LEA` operands.
    loc: i64,
    marks: Vec<LineMark>,
    marked_line: usize,
}

/// Compile a whole source buffer into an executable [`Program`].
pub fn compile(source: &[u8]) -> Result<Program, CompileError> {
    Compiler::new(source).run()
}

impl<'a> Compiler<'a> {
    pub fn new(source: &'a [u8]) -> Self {
        let mut syms = SymbolTable::new();
        let main_sym = syms.seed();
        Compiler {
            lexer: Lexer::new(source),
            tok: Token::Eof,
            syms,
            main_sym,
            code: Vec::new(),
            data: Vec::new(),
            ty: Type::Int,
            loc: 0,
            marks: Vec::new(),
            marked_line: 0,
        }
    }

    pub fn run(mut self) -> Result<Program, CompileError> {
        self.bump();
        while self.tok != Token::Eof {
            self.declaration()?;
        }

        let main = self.syms.get(self.main_sym);
        let entry = match main.storage {
            Some(Storage::Func) => main.val as usize,
            _ => return Err(CompileError::MainNotDefined),
        };

        // Continuation for a `main` that returns normally: push its result
        // and exit with it.
        let epilogue = self.code.len();
        self.code.push(Op::Psh);
        self.code.push(Op::Exit);

        Ok(Program {
            code: self.code,
            data: self.data,
            entry,
            epilogue,
            marks: self.marks,
        })
    }

    fn line(&self) -> usize {
        self.lexer.line()
    }

    /// Fetch the next token, recording where each new source line starts in
    /// the code segment for the listing.
    fn bump(&mut self) {
        self.tok = self.lexer.next(&mut self.syms, &mut self.data);
        let line = self.lexer.line();
        while self.marked_line < line {
            self.marked_line += 1;
            self.marks.push(LineMark {
                line: self.marked_line,
                pos: self.code.len(),
            });
        }
    }

    fn expect(
        &mut self,
        tok: Token,
        err: fn(usize) -> CompileError,
    ) -> Result<(), CompileError> {
        if self.tok == tok {
            self.bump();
            Ok(())
        } else {
            Err(err(self.line()))
        }
    }

    fn emit(&mut self, op: Op) {
        self.code.push(op);
    }

    /// Emit a branch with a placeholder target, returning its slot index
    /// for later patching.
    fn emit_branch(&mut self, op: Op) -> usize {
        self.code.push(op);
        self.code.len() - 1
    }

    fn patch(&mut self, slot: usize, target: usize) {
        match &mut self.code[slot] {
            Op::Jmp(t) | Op::Bz(t) | Op::Bnz(t) => *t = target,
            other => debug_assert!(false, "patching non-branch {:?}", other),
        }
    }

    /// Append the load matching the current type: bytes for plain `char`,
    /// a word for everything else.
    fn emit_load(&mut self) {
        self.emit(if self.ty.is_char() { Op::Lc } else { Op::Li });
    }

    fn emit_store(&mut self) {
        self.emit(if self.ty.is_char() { Op::Sc } else { Op::Si });
    }

    /// Rewrite the trailing load so the address it consumed is pushed and
    /// the value reloaded: the lvalue recovery used by assignment and the
    /// increment operators. Anything else in the last slot is not an lvalue.
    fn reload_lvalue(&mut self, err: fn(usize) -> CompileError) -> Result<(), CompileError> {
        match self.code.last().copied() {
            Some(load @ (Op::Lc | Op::Li)) => {
                let slot = self.code.len() - 1;
                self.code[slot] = Op::Psh;
                self.emit(load);
                Ok(())
            }
            _ => Err(err(self.line())),
        }
    }

    /// Round the data cursor up past the current word boundary after a
    /// string literal. The zero fill doubles as the NUL terminator.
    fn align_data(&mut self) {
        let target = (self.data.len() + WORD as usize) & !(WORD as usize - 1);
        self.data.resize(target, 0);
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    /// One top-level declaration: an optional base type or enum block,
    /// then comma-separated globals or a function definition.
    fn declaration(&mut self) -> Result<(), CompileError> {
        let mut base = Type::Int;
        if self.tok == Token::Int {
            self.bump();
        } else if self.tok == Token::Char {
            self.bump();
            base = Type::Char;
        } else if self.tok == Token::Enum {
            self.bump();
            if self.tok != Token::LBrace {
                // Skip the optional tag.
                self.bump();
            }
            if self.tok == Token::LBrace {
                self.bump();
                self.enum_body()?;
                // A braced enum is a complete declaration on its own; a
                // trailing `;` is consumed as an empty declaration.
                return Ok(());
            }
        }

        while self.tok != Token::Semi && self.tok != Token::RBrace {
            let mut ty = base.clone();
            while self.tok == Token::Mul {
                self.bump();
                ty = ty.make_ptr();
            }
            let Token::Id(idx) = self.tok else {
                return Err(CompileError::BadGlobalDeclaration(self.line()));
            };
            if self.syms.get(idx).storage.is_some() {
                return Err(CompileError::DuplicateGlobal(self.line()));
            }
            self.bump();
            self.syms.get_mut(idx).ty = ty;

            if self.tok == Token::LParen {
                let sym = self.syms.get_mut(idx);
                sym.storage = Some(Storage::Func);
                sym.val = self.code.len() as i64;
                self.function_def()?;
            } else {
                let addr = self.data.len() as i64;
                let sym = self.syms.get_mut(idx);
                sym.storage = Some(Storage::Global);
                sym.val = addr;
                self.data.extend_from_slice(&[0u8; WORD as usize]);
            }

            if self.tok == Token::Comma {
                self.bump();
            }
        }
        self.bump();
        Ok(())
    }

    /// Comma-separated enum constants; `= N` resets the running counter.
    fn enum_body(&mut self) -> Result<(), CompileError> {
        let mut value = 0i64;
        while self.tok != Token::RBrace {
            let Token::Id(idx) = self.tok else {
                return Err(CompileError::BadEnumIdentifier(self.line()));
            };
            self.bump();
            if self.tok == Token::Assign {
                self.bump();
                let Token::Num(n) = self.tok else {
                    return Err(CompileError::BadEnumInitializer(self.line()));
                };
                value = n;
                self.bump();
            }
            let sym = self.syms.get_mut(idx);
            sym.storage = Some(Storage::Const);
            sym.ty = Type::Int;
            sym.val = value;
            value += 1;
            if self.tok == Token::Comma {
                self.bump();
            }
        }
        self.bump();
        Ok(())
    }

    /// Parameters, leading local declarations, `ENT`, statements, `LEV`,
    /// then the table sweep restoring every shadowed binding.
    fn function_def(&mut self) -> Result<(), CompileError> {
        self.bump(); // (
        let mut frame = 0i64;
        while self.tok != Token::RParen {
            let mut ty = Type::Int;
            if self.tok == Token::Int {
                self.bump();
            } else if self.tok == Token::Char {
                self.bump();
                ty = Type::Char;
            }
            while self.tok == Token::Mul {
                self.bump();
                ty = ty.make_ptr();
            }
            let Token::Id(idx) = self.tok else {
                return Err(CompileError::BadParameterDeclaration(self.line()));
            };
            if self.syms.get(idx).storage == Some(Storage::Local) {
                return Err(CompileError::DuplicateParameter(self.line()));
            }
            self.syms.shadow(idx, ty, frame);
            frame += 1;
            self.bump();
            if self.tok == Token::Comma {
                self.bump();
            }
        }
        self.bump();

        if self.tok != Token::LBrace {
            return Err(CompileError::BadFunctionDefinition(self.line()));
        }
        frame += 1;
        self.loc = frame;
        self.bump();

        // Leading local declarations, frame indices above all parameters.
        while self.tok == Token::Int || self.tok == Token::Char {
            let base = if self.tok == Token::Int {
                Type::Int
            } else {
                Type::Char
            };
            self.bump();
            while self.tok != Token::Semi {
                let mut ty = base.clone();
                while self.tok == Token::Mul {
                    self.bump();
                    ty = ty.make_ptr();
                }
                let Token::Id(idx) = self.tok else {
                    return Err(CompileError::BadLocalDeclaration(self.line()));
                };
                if self.syms.get(idx).storage == Some(Storage::Local) {
                    return Err(CompileError::DuplicateLocal(self.line()));
                }
                frame += 1;
                self.syms.shadow(idx, ty, frame);
                self.bump();
                if self.tok == Token::Comma {
                    self.bump();
                }
            }
            self.bump();
        }

        self.emit(Op::Ent((frame - self.loc) as usize));
        while self.tok != Token::RBrace {
            self.stmt()?;
        }
        self.emit(Op::Lev);

        self.syms.unshadow_locals();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn stmt(&mut self) -> Result<(), CompileError> {
        match self.tok {
            Token::If => {
                self.bump();
                self.expect(Token::LParen, CompileError::OpenParenExpected)?;
                self.expr(Prec::Assign)?;
                self.expect(Token::RParen, CompileError::CloseParenExpected)?;
                let skip_then = self.emit_branch(Op::Bz(0));
                self.stmt()?;
                if self.tok == Token::Else {
                    self.patch(skip_then, self.code.len() + 1);
                    let skip_else = self.emit_branch(Op::Jmp(0));
                    self.bump();
                    self.stmt()?;
                    self.patch(skip_else, self.code.len());
                } else {
                    self.patch(skip_then, self.code.len());
                }
            }
            Token::While => {
                self.bump();
                let top = self.code.len();
                self.expect(Token::LParen, CompileError::OpenParenExpected)?;
                self.expr(Prec::Assign)?;
                self.expect(Token::RParen, CompileError::CloseParenExpected)?;
                let exit = self.emit_branch(Op::Bz(0));
                self.stmt()?;
                self.emit(Op::Jmp(top));
                self.patch(exit, self.code.len());
            }
            Token::Return => {
                self.bump();
                if self.tok != Token::Semi {
                    self.expr(Prec::Assign)?;
                }
                self.emit(Op::Lev);
                self.expect(Token::Semi, CompileError::SemicolonExpected)?;
            }
            Token::LBrace => {
                self.bump();
                while self.tok != Token::RBrace {
                    self.stmt()?;
                }
                self.bump();
            }
            Token::Semi => self.bump(),
            _ => {
                self.expr(Prec::Assign)?;
                self.expect(Token::Semi, CompileError::SemicolonExpected)?;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    /// Precedence climbing: parse one prefix or primary atom, then keep
    /// consuming operators that bind at least as tightly as `lev`.
    fn expr(&mut self, lev: Prec) -> Result<(), CompileError> {
        self.primary()?;

        while let Some(prec) = self.tok.prec() {
            if prec < lev {
                break;
            }
            let lhs_ty = self.ty.clone();
            match self.tok {
                Token::Assign => {
                    self.bump();
                    match self.code.last().copied() {
                        Some(Op::Lc | Op::Li) => {
                            let slot = self.code.len() - 1;
                            self.code[slot] = Op::Psh;
                        }
                        _ => return Err(CompileError::BadLvalueAssignment(self.line())),
                    }
                    self.expr(Prec::Assign)?;
                    self.ty = lhs_ty;
                    self.emit_store();
                }
                Token::Cond => {
                    self.bump();
                    let skip_then = self.emit_branch(Op::Bz(0));
                    self.expr(Prec::Assign)?;
                    self.expect(Token::Colon, CompileError::MissingColon)?;
                    self.patch(skip_then, self.code.len() + 1);
                    let skip_else = self.emit_branch(Op::Jmp(0));
                    self.expr(Prec::Cond)?;
                    self.patch(skip_else, self.code.len());
                }
                Token::Lor => {
                    self.bump();
                    let short = self.emit_branch(Op::Bnz(0));
                    self.expr(Prec::Lan)?;
                    let target = self.code.len();
                    self.patch(short, target);
                    self.ty = Type::Int;
                }
                Token::Lan => {
                    self.bump();
                    let short = self.emit_branch(Op::Bz(0));
                    self.expr(Prec::Or)?;
                    let target = self.code.len();
                    self.patch(short, target);
                    self.ty = Type::Int;
                }
                Token::Or => self.binary(Op::Or, Prec::Xor)?,
                Token::Xor => self.binary(Op::Xor, Prec::And)?,
                Token::And => self.binary(Op::And, Prec::Eq)?,
                Token::Eq => self.binary(Op::Eq, Prec::Lt)?,
                Token::Ne => self.binary(Op::Ne, Prec::Lt)?,
                Token::Lt => self.binary(Op::Lt, Prec::Shl)?,
                Token::Gt => self.binary(Op::Gt, Prec::Shl)?,
                Token::Le => self.binary(Op::Le, Prec::Shl)?,
                Token::Ge => self.binary(Op::Ge, Prec::Shl)?,
                Token::Shl => self.binary(Op::Shl, Prec::Add)?,
                Token::Shr => self.binary(Op::Shr, Prec::Add)?,
                Token::Add => {
                    self.bump();
                    self.emit(Op::Psh);
                    self.expr(Prec::Mul)?;
                    self.ty = lhs_ty;
                    if self.ty.scales_word() {
                        self.emit(Op::Psh);
                        self.emit(Op::Imm(WORD));
                        self.emit(Op::Mul);
                    }
                    self.emit(Op::Add);
                }
                Token::Sub => {
                    self.bump();
                    self.emit(Op::Psh);
                    self.expr(Prec::Mul)?;
                    if lhs_ty.scales_word() && lhs_ty == self.ty {
                        // pointer - pointer: difference in elements
                        self.emit(Op::Sub);
                        self.emit(Op::Psh);
                        self.emit(Op::Imm(WORD));
                        self.emit(Op::Div);
                        self.ty = Type::Int;
                    } else {
                        self.ty = lhs_ty;
                        if self.ty.scales_word() {
                            self.emit(Op::Psh);
                            self.emit(Op::Imm(WORD));
                            self.emit(Op::Mul);
                        }
                        self.emit(Op::Sub);
                    }
                }
                Token::Mul => self.binary(Op::Mul, Prec::Inc)?,
                Token::Div => self.binary(Op::Div, Prec::Inc)?,
                Token::Mod => self.binary(Op::Mod, Prec::Inc)?,
                Token::Inc | Token::Dec => {
                    // Postfix: store the bumped value, leave the original
                    // in the accumulator by undoing the delta.
                    let inc = self.tok == Token::Inc;
                    self.reload_lvalue(CompileError::BadLvaluePostIncrement)?;
                    let delta = if self.ty.scales_word() { WORD } else { 1 };
                    self.emit(Op::Psh);
                    self.emit(Op::Imm(delta));
                    self.emit(if inc { Op::Add } else { Op::Sub });
                    self.emit_store();
                    self.emit(Op::Psh);
                    self.emit(Op::Imm(delta));
                    self.emit(if inc { Op::Sub } else { Op::Add });
                    self.bump();
                }
                Token::Brak => {
                    self.bump();
                    self.emit(Op::Psh);
                    self.expr(Prec::Assign)?;
                    self.expect(Token::RBrack, CompileError::CloseBracketExpected)?;
                    if lhs_ty.scales_word() {
                        self.emit(Op::Psh);
                        self.emit(Op::Imm(WORD));
                        self.emit(Op::Mul);
                    }
                    let Some(elem) = lhs_ty.deref() else {
                        return Err(CompileError::PointerTypeExpected(self.line()));
                    };
                    self.emit(Op::Add);
                    self.ty = elem;
                    self.emit_load();
                }
                _ => return Err(CompileError::Internal(self.line())),
            }
        }
        Ok(())
    }

    /// Simple left-associative binary operator: push the left value,
    /// compile the right side at `rhs`, combine. Result type is Int.
    fn binary(&mut self, op: Op, rhs: Prec) -> Result<(), CompileError> {
        self.bump();
        self.emit(Op::Psh);
        self.expr(rhs)?;
        self.emit(op);
        self.ty = Type::Int;
        Ok(())
    }

    /// Prefix operators and primary atoms. Sets the type register.
    fn primary(&mut self) -> Result<(), CompileError> {
        match self.tok.clone() {
            Token::Eof => Err(CompileError::UnexpectedEof(self.line())),
            Token::Num(n) => {
                self.emit(Op::Imm(n));
                self.bump();
                self.ty = Type::Int;
                Ok(())
            }
            Token::Str(addr) => {
                self.emit(Op::Imm(addr));
                self.bump();
                // Adjacent literals were interned contiguously by the lexer.
                while matches!(self.tok, Token::Str(_)) {
                    self.bump();
                }
                self.align_data();
                self.ty = Type::Char.make_ptr();
                Ok(())
            }
            Token::Sizeof => {
                self.bump();
                self.expect(Token::LParen, CompileError::OpenParenExpected)?;
                let mut ty = Type::Int;
                if self.tok == Token::Int {
                    self.bump();
                } else if self.tok == Token::Char {
                    self.bump();
                    ty = Type::Char;
                }
                while self.tok == Token::Mul {
                    self.bump();
                    ty = ty.make_ptr();
                }
                self.expect(Token::RParen, CompileError::CloseParenExpected)?;
                self.emit(Op::Imm(ty.size_of()));
                self.ty = Type::Int;
                Ok(())
            }
            Token::Id(idx) => {
                self.bump();
                if self.tok == Token::LParen {
                    self.call(idx)
                } else {
                    self.variable(idx)
                }
            }
            Token::LParen => {
                self.bump();
                if self.tok == Token::Int || self.tok == Token::Char {
                    // Cast: no code, only the type register changes.
                    let mut ty = if self.tok == Token::Int {
                        Type::Int
                    } else {
                        Type::Char
                    };
                    self.bump();
                    while self.tok == Token::Mul {
                        self.bump();
                        ty = ty.make_ptr();
                    }
                    if self.tok != Token::RParen {
                        return Err(CompileError::BadCast(self.line()));
                    }
                    self.bump();
                    self.expr(Prec::Inc)?;
                    self.ty = ty;
                } else {
                    self.expr(Prec::Assign)?;
                    self.expect(Token::RParen, CompileError::CloseParenExpected)?;
                }
                Ok(())
            }
            Token::Mul => {
                self.bump();
                self.expr(Prec::Inc)?;
                match self.ty.deref() {
                    Some(inner) => self.ty = inner,
                    None => return Err(CompileError::BadDereference(self.line())),
                }
                self.emit_load();
                Ok(())
            }
            Token::And => {
                self.bump();
                self.expr(Prec::Inc)?;
                // The operand just loaded itself; dropping the load leaves
                // its address in the accumulator.
                match self.code.last().copied() {
                    Some(Op::Lc | Op::Li) => {
                        self.code.pop();
                    }
                    _ => return Err(CompileError::BadAddressOf(self.line())),
                }
                self.ty = self.ty.clone().make_ptr();
                Ok(())
            }
            Token::Not => {
                self.bump();
                self.expr(Prec::Inc)?;
                self.emit(Op::Psh);
                self.emit(Op::Imm(0));
                self.emit(Op::Eq);
                self.ty = Type::Int;
                Ok(())
            }
            Token::Tilde => {
                self.bump();
                self.expr(Prec::Inc)?;
                self.emit(Op::Psh);
                self.emit(Op::Imm(-1));
                self.emit(Op::Xor);
                self.ty = Type::Int;
                Ok(())
            }
            Token::Add => {
                self.bump();
                self.expr(Prec::Inc)?;
                self.ty = Type::Int;
                Ok(())
            }
            Token::Sub => {
                self.bump();
                if let Token::Num(n) = self.tok {
                    self.emit(Op::Imm(n.wrapping_neg()));
                    self.bump();
                } else {
                    self.emit(Op::Imm(-1));
                    self.emit(Op::Psh);
                    self.expr(Prec::Inc)?;
                    self.emit(Op::Mul);
                }
                self.ty = Type::Int;
                Ok(())
            }
            Token::Inc | Token::Dec => {
                let inc = self.tok == Token::Inc;
                self.bump();
                self.expr(Prec::Inc)?;
                self.reload_lvalue(CompileError::BadLvaluePreIncrement)?;
                self.emit(Op::Psh);
                self.emit(Op::Imm(if self.ty.scales_word() { WORD } else { 1 }));
                self.emit(if inc { Op::Add } else { Op::Sub });
                self.emit_store();
                Ok(())
            }
            _ => Err(CompileError::BadExpression(self.line())),
        }
    }

    /// `f(a, b, …)`: arguments left to right, each pushed; then the jump or
    /// builtin opcode; then `ADJ` to pop the arguments.
    fn call(&mut self, idx: usize) -> Result<(), CompileError> {
        self.bump(); // (
        let mut argc = 0usize;
        while self.tok != Token::RParen {
            self.expr(Prec::Assign)?;
            self.emit(Op::Psh);
            argc += 1;
            if self.tok == Token::Comma {
                self.bump();
            }
        }
        self.bump();

        match self.syms.get(idx).storage {
            Some(Storage::Sys(builtin)) => self.emit(builtin.to_op(argc)),
            Some(Storage::Func) => {
                let addr = self.syms.get(idx).val as usize;
                self.emit(Op::Jsr(addr));
            }
            _ => return Err(CompileError::BadFunctionCall(self.line())),
        }
        if argc > 0 {
            self.emit(Op::Adj(argc));
        }
        self.ty = self.syms.get(idx).ty.clone();
        Ok(())
    }

    /// Plain identifier: enum constant, local (frame-relative), or global
    /// (absolute), with the matching load for the latter two.
    fn variable(&mut self, idx: usize) -> Result<(), CompileError> {
        let sym = self.syms.get(idx);
        let (storage, ty, val) = (sym.storage, sym.ty.clone(), sym.val);
        match storage {
            Some(Storage::Const) => {
                self.emit(Op::Imm(val));
                self.ty = Type::Int;
            }
            Some(Storage::Local) => {
                self.ty = ty;
                self.emit(Op::Lea(self.loc - val));
                self.emit_load();
            }
            Some(Storage::Global) => {
                self.ty = ty;
                self.emit(Op::Imm(val));
                self.emit_load();
            }
            _ => return Err(CompileError::UndefinedVariable(self.line())),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile_ok(source: &str) -> Program {
        compile(source.as_bytes()).expect("program should compile")
    }

    fn compile_err(source: &str) -> CompileError {
        compile(source.as_bytes()).expect_err("program should not compile")
    }

    /// Ops of `main`, excluding the shared epilogue.
    fn main_ops(program: &Program) -> &[Op] {
        &program.code[program.entry..program.epilogue]
    }

    #[test]
    fn test_return_constant() {
        let program = compile_ok("int main() { return 42; }");
        assert_eq!(
            main_ops(&program),
            &[Op::Ent(0), Op::Imm(42), Op::Lev, Op::Lev]
        );
    }

    #[test]
    fn test_precedence_emission() {
        // 1 + 2 * 3 must evaluate the multiplication on the right first.
        let program = compile_ok("int main() { return 1 + 2 * 3; }");
        assert_eq!(
            main_ops(&program),
            &[
                Op::Ent(0),
                Op::Imm(1),
                Op::Psh,
                Op::Imm(2),
                Op::Psh,
                Op::Imm(3),
                Op::Mul,
                Op::Add,
                Op::Lev,
                Op::Lev,
            ]
        );
    }

    #[test]
    fn test_local_load_and_store() {
        let program = compile_ok("int main() { int x; x = 7; return x; }");
        assert_eq!(
            main_ops(&program),
            &[
                Op::Ent(1),
                Op::Lea(-1),
                Op::Psh,
                Op::Imm(7),
                Op::Si,
                Op::Lea(-1),
                Op::Li,
                Op::Lev,
                Op::Lev,
            ]
        );
    }

    #[test]
    fn test_param_frame_offsets() {
        // Two params: first at bp+3, second at bp+2.
        let program = compile_ok("int f(int a, int b) { return a - b; } int main() { return f(1, 2); }");
        assert_eq!(
            &program.code[0..6],
            &[
                Op::Ent(0),
                Op::Lea(3),
                Op::Li,
                Op::Psh,
                Op::Lea(2),
                Op::Li,
            ]
        );
    }

    #[test]
    fn test_call_pushes_args_then_adjusts() {
        let program = compile_ok("int f(int a) { return a; } int main() { return f(9); }");
        let ops = main_ops(&program);
        assert_eq!(
            ops,
            &[
                Op::Ent(0),
                Op::Imm(9),
                Op::Psh,
                Op::Jsr(0),
                Op::Adj(1),
                Op::Lev,
                Op::Lev,
            ]
        );
    }

    #[test]
    fn test_builtin_call_carries_printf_arity() {
        let program = compile_ok(r#"int main() { printf("%d %d\n", 1, 2); return 0; }"#);
        assert!(main_ops(&program)
            .iter()
            .any(|op| *op == Op::Prtf(3)));
        assert!(main_ops(&program).iter().any(|op| *op == Op::Adj(3)));
    }

    #[test]
    fn test_pointer_add_scales_by_word() {
        let program = compile_ok("int main() { int *p; p = 0; return *(p + 2); }");
        let ops = main_ops(&program);
        assert!(ops.windows(7).any(|w| w
            == [
                Op::Psh,
                Op::Imm(2),
                Op::Psh,
                Op::Imm(WORD),
                Op::Mul,
                Op::Add,
                Op::Li,
            ]));
    }

    #[test]
    fn test_char_pointer_add_does_not_scale() {
        let program = compile_ok("int main() { char *p; p = 0; return *(p + 2); }");
        let ops = main_ops(&program);
        assert!(!ops.windows(2).any(|w| w == [Op::Imm(WORD), Op::Mul]));
        assert_eq!(ops.last(), Some(&Op::Lev));
        assert!(ops.contains(&Op::Lc));
    }

    #[test]
    fn test_pointer_difference_divides_by_word() {
        let program = compile_ok("int main() { int *p; int *q; p = 0; q = 0; return p - q; }");
        let ops = main_ops(&program);
        assert!(ops
            .windows(4)
            .any(|w| w == [Op::Sub, Op::Psh, Op::Imm(WORD), Op::Div]));
    }

    #[test]
    fn test_subscript_desugars_to_scaled_deref() {
        let program = compile_ok("int main() { int *p; p = 0; return p[1]; }");
        let ops = main_ops(&program);
        assert!(ops
            .windows(5)
            .any(|w| w == [Op::Psh, Op::Imm(WORD), Op::Mul, Op::Add, Op::Li]));
    }

    #[test]
    fn test_char_subscript_loads_bytes_unscaled() {
        let program = compile_ok("int main() { char *p; p = 0; return p[1]; }");
        let ops = main_ops(&program);
        assert!(ops.windows(2).any(|w| w == [Op::Add, Op::Lc]));
        assert!(!ops.windows(2).any(|w| w == [Op::Imm(WORD), Op::Mul]));
    }

    #[test]
    fn test_branch_targets_inside_code_segment() {
        let program = compile_ok(
            "int main() {
                int i;
                i = 0;
                while (i < 10) {
                    if (i == 5) i = i + 2; else i = i + 1;
                }
                return i > 0 ? 1 : 0;
            }",
        );
        for op in &program.code {
            if let Op::Jmp(t) | Op::Bz(t) | Op::Bnz(t) | Op::Jsr(t) = op {
                assert!(*t < program.code.len(), "unpatched or wild branch {:?}", op);
            }
        }
    }

    #[test]
    fn test_short_circuit_branches() {
        let program = compile_ok("int main() { return 1 && 0 || 1; }");
        let ops = main_ops(&program);
        assert!(ops.iter().any(|op| matches!(op, Op::Bz(_))));
        assert!(ops.iter().any(|op| matches!(op, Op::Bnz(_))));
    }

    #[test]
    fn test_enum_constants_fold_to_immediates() {
        let program = compile_ok("enum { A, B = 5, C } int main() { return A + B + C; }");
        let ops = main_ops(&program);
        assert!(ops.contains(&Op::Imm(0)));
        assert!(ops.contains(&Op::Imm(5)));
        assert!(ops.contains(&Op::Imm(6)));
    }

    #[test]
    fn test_global_allocated_one_word() {
        let program = compile_ok("int g; int h; int main() { g = 1; return h; }");
        assert_eq!(program.data.len(), 2 * WORD as usize);
        let ops = main_ops(&program);
        assert!(ops.contains(&Op::Imm(0)));
        assert!(ops.contains(&Op::Imm(WORD)));
    }

    #[test]
    fn test_string_interned_and_aligned() {
        let program = compile_ok(r#"int main() { char *s; s = "hi"; return 0; }"#);
        assert_eq!(&program.data[..2], b"hi");
        assert_eq!(program.data.len() % WORD as usize, 0);
        // The zero fill terminates the literal.
        assert_eq!(program.data[2], 0);
    }

    #[test]
    fn test_adjacent_strings_concatenate() {
        let program = compile_ok(r#"int main() { char *s; s = "ab" "cd"; return 0; }"#);
        assert_eq!(&program.data[..4], b"abcd");
    }

    #[test]
    fn test_sizeof_values() {
        let program = compile_ok("int main() { return sizeof(int) + sizeof(char) + sizeof(char *); }");
        let ops = main_ops(&program);
        assert!(ops.contains(&Op::Imm(WORD)));
        assert!(ops.contains(&Op::Imm(1)));
    }

    #[test]
    fn test_unary_minus_folds_literals() {
        let program = compile_ok("int main() { return -5; }");
        assert!(main_ops(&program).contains(&Op::Imm(-5)));
    }

    #[test]
    fn test_cast_emits_no_code() {
        let a = compile_ok("int main() { int x; x = 0; return x; }");
        let b = compile_ok("int main() { int x; x = 0; return (char)x; }");
        assert_eq!(main_ops(&a).len(), main_ops(&b).len());
    }

    #[test]
    fn test_pre_and_post_increment() {
        let pre = compile_ok("int main() { int x; x = 1; return ++x; }");
        assert!(main_ops(&pre)
            .windows(4)
            .any(|w| w == [Op::Psh, Op::Imm(1), Op::Add, Op::Si]));

        let post = compile_ok("int main() { int x; x = 1; return x++; }");
        assert!(main_ops(&post)
            .windows(3)
            .any(|w| w == [Op::Psh, Op::Imm(1), Op::Sub]));
    }

    #[test]
    fn test_main_not_defined() {
        assert_eq!(compile_err(""), CompileError::MainNotDefined);
        assert_eq!(
            compile_err("int f() { return 1; }"),
            CompileError::MainNotDefined
        );
    }

    #[test]
    fn test_error_reporting() {
        assert_eq!(
            compile_err("int main() { return 1 + ; }"),
            CompileError::BadExpression(1)
        );
        assert_eq!(
            compile_err("int g; int g; int main() { return 0; }"),
            CompileError::DuplicateGlobal(1)
        );
        assert_eq!(
            compile_err("int main() { 1 = 2; }"),
            CompileError::BadLvalueAssignment(1)
        );
        assert_eq!(
            compile_err("int main() { int x; return *x; }"),
            CompileError::BadDereference(1)
        );
        assert_eq!(
            compile_err("int main() { int x; return x[0]; }"),
            CompileError::PointerTypeExpected(1)
        );
        assert_eq!(
            compile_err("int main() { return &5; }"),
            CompileError::BadAddressOf(1)
        );
        assert_eq!(
            compile_err("enum { 3 } int main() { return 0; }"),
            CompileError::BadEnumIdentifier(1)
        );
        assert_eq!(
            compile_err("int main(int x, int x) { return 0; }"),
            CompileError::DuplicateParameter(1)
        );
        assert_eq!(
            compile_err("int main() { return undefined_thing; }"),
            CompileError::UndefinedVariable(1)
        );
        assert_eq!(
            compile_err("int main() { return 1 }"),
            CompileError::SemicolonExpected(1)
        );
    }

    #[test]
    fn test_error_line_numbers() {
        let err = compile_err("int g;\nint main() {\n  return bogus;\n}");
        assert_eq!(err, CompileError::UndefinedVariable(3));
        assert_eq!(err.to_string(), "3: undefined variable");
    }

    #[test]
    fn test_shadowing_restores_global_binding() {
        // The parameter x shadows the global inside f; after f's body the
        // global binding must be back, so main's x resolves to the global.
        let program = compile_ok(
            "int x; int f(int x) { return x + 1; } int main() { x = 5; return f(10) + x; }",
        );
        let ops = main_ops(&program);
        // Global access: IMM addr + LI; parameter access inside f: LEA + LI.
        assert!(program.code[..program.entry]
            .iter()
            .any(|op| matches!(op, Op::Lea(_))));
        assert!(ops.iter().any(|op| *op == Op::Imm(0)));
    }

    #[test]
    fn test_void_return_type_accepted() {
        let program = compile_ok("void f() { return; } int main() { f(); return 3; }");
        assert!(program.code.contains(&Op::Jsr(0)));
    }

    #[test]
    fn test_line_marks_are_monotone() {
        let program = compile_ok("int main()\n{\n  return 1;\n}\n");
        let mut prev_line = 0;
        let mut prev_pos = 0;
        for mark in &program.marks {
            assert!(mark.line > prev_line);
            assert!(mark.pos >= prev_pos);
            prev_line = mark.line;
            prev_pos = mark.pos;
        }
    }
}

//! Symbol table: one flat, append-only list of entries probed linearly by
//! (hash, name). Scope is handled by shadow triples: declaring a parameter
//! or local saves the entry's outer (storage, type, value) in place, and the
//! whole table is swept to restore them when the function body ends.

use crate::bytecode::op::Builtin;
use crate::lexer::Lexer;
use crate::token::Token;
use crate::ty::Type;

/// The concatenated identifier string fed through the lexer at startup:
/// keywords, host builtins, then `void` and `main`.
pub const SEED_NAMES: &str = "char else enum if int return sizeof while \
open read close printf malloc free memset memcmp exit void main";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    /// Enum constant; `val` is the literal value.
    Const,
    /// User function; `val` is the entry address in the code segment.
    Func,
    /// Host builtin; a call lowers to the carried opcode.
    Sys(Builtin),
    /// Global variable; `val` is its address in the data segment.
    Global,
    /// Parameter or local; `val` is the frame index.
    Local,
}

/// The outer binding saved while a Local shadows it.
#[derive(Debug, Clone, PartialEq)]
pub struct Shadow {
    pub storage: Option<Storage>,
    pub ty: Type,
    pub val: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    /// What the lexer returns when this name is scanned: a keyword tag for
    /// seeded keywords, `Id(index)` for everything else.
    pub token: Token,
    pub hash: i64,
    pub name: String,
    pub storage: Option<Storage>,
    pub ty: Type,
    pub val: i64,
    pub shadow: Option<Shadow>,
}

#[derive(Debug, Default, PartialEq)]
pub struct SymbolTable {
    syms: Vec<Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    pub fn len(&self) -> usize {
        self.syms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.syms.is_empty()
    }

    pub fn get(&self, idx: usize) -> &Symbol {
        &self.syms[idx]
    }

    pub fn get_mut(&mut self, idx: usize) -> &mut Symbol {
        &mut self.syms[idx]
    }

    /// Probe for (hash, name); append a fresh `Id` entry on a miss. The hash
    /// is a fast rejector only, the bytes decide.
    pub fn lookup_or_insert(&mut self, name: &[u8], hash: i64) -> usize {
        for (i, sym) in self.syms.iter().enumerate() {
            if sym.hash == hash && sym.name.as_bytes() == name {
                return i;
            }
        }
        let idx = self.syms.len();
        self.syms.push(Symbol {
            token: Token::Id(idx),
            hash,
            name: String::from_utf8_lossy(name).into_owned(),
            storage: None,
            ty: Type::Int,
            val: 0,
            shadow: None,
        });
        idx
    }

    /// Save the entry's current binding into its shadow slots and overwrite
    /// it with a Local one.
    pub fn shadow(&mut self, idx: usize, ty: Type, val: i64) {
        let sym = &mut self.syms[idx];
        sym.shadow = Some(Shadow {
            storage: sym.storage,
            ty: sym.ty.clone(),
            val: sym.val,
        });
        sym.storage = Some(Storage::Local);
        sym.ty = ty;
        sym.val = val;
    }

    /// Restore every Local entry from its shadow triple. Called once when a
    /// function body ends.
    pub fn unshadow_locals(&mut self) {
        for sym in &mut self.syms {
            if sym.storage == Some(Storage::Local) {
                if let Some(shadow) = sym.shadow.take() {
                    sym.storage = shadow.storage;
                    sym.ty = shadow.ty;
                    sym.val = shadow.val;
                }
            }
        }
    }

    /// Seed keywords and builtins by running the real lexer over
    /// [`SEED_NAMES`] and patching each entry as it is interned. Idempotent.
    /// Returns the index of the `main` entry, looked up later to locate the
    /// program entry point.
    pub fn seed(&mut self) -> usize {
        let mut data = Vec::new();
        let mut lexer = Lexer::new(SEED_NAMES.as_bytes());

        const KEYWORDS: [Token; 8] = [
            Token::Char,
            Token::Else,
            Token::Enum,
            Token::If,
            Token::Int,
            Token::Return,
            Token::Sizeof,
            Token::While,
        ];
        for keyword in KEYWORDS {
            lexer.next(self, &mut data);
            let idx = lexer.last_sym().expect("seed string yields identifiers");
            self.syms[idx].token = keyword;
        }

        for builtin in Builtin::ALL {
            lexer.next(self, &mut data);
            let idx = lexer.last_sym().expect("seed string yields identifiers");
            let sym = &mut self.syms[idx];
            sym.storage = Some(Storage::Sys(builtin));
            sym.ty = Type::Int;
        }

        // `void` is treated as a synonym for `char`.
        lexer.next(self, &mut data);
        let idx = lexer.last_sym().expect("seed string yields identifiers");
        self.syms[idx].token = Token::Char;

        lexer.next(self, &mut data);
        lexer.last_sym().expect("seed string yields identifiers")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash_of(name: &[u8]) -> i64 {
        let mut h = name[0] as i64;
        for &c in &name[1..] {
            h = h.wrapping_mul(147).wrapping_add(c as i64);
        }
        h.wrapping_shl(6).wrapping_add(name.len() as i64)
    }

    #[test]
    fn test_lookup_or_insert_dedupes() {
        let mut table = SymbolTable::new();
        let a = table.lookup_or_insert(b"x", hash_of(b"x"));
        let b = table.lookup_or_insert(b"y", hash_of(b"y"));
        let c = table.lookup_or_insert(b"x", hash_of(b"x"));
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_hash_is_rejector_only() {
        // Same hash, different bytes must still be distinct entries.
        let mut table = SymbolTable::new();
        let a = table.lookup_or_insert(b"ab", 7);
        let b = table.lookup_or_insert(b"cd", 7);
        assert_ne!(a, b);
    }

    #[test]
    fn test_seed_registers_keywords_and_builtins() {
        let mut table = SymbolTable::new();
        let main_idx = table.seed();

        assert_eq!(table.get(0).token, Token::Char);
        assert_eq!(table.get(0).name, "char");
        assert_eq!(table.get(7).token, Token::While);

        let open = table.get(8);
        assert_eq!(open.name, "open");
        assert_eq!(open.storage, Some(Storage::Sys(Builtin::Open)));
        let exit = table.get(16);
        assert_eq!(exit.name, "exit");
        assert_eq!(exit.storage, Some(Storage::Sys(Builtin::Exit)));

        // void masquerades as char; main is a plain identifier for now.
        assert_eq!(table.get(17).name, "void");
        assert_eq!(table.get(17).token, Token::Char);
        assert_eq!(table.get(main_idx).name, "main");
        assert_eq!(table.get(main_idx).storage, None);
    }

    #[test]
    fn test_seed_is_idempotent() {
        let mut once = SymbolTable::new();
        once.seed();
        let mut twice = SymbolTable::new();
        twice.seed();
        twice.seed();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_shadow_restores_outer_binding() {
        let mut table = SymbolTable::new();
        let idx = table.lookup_or_insert(b"x", hash_of(b"x"));
        {
            let sym = table.get_mut(idx);
            sym.storage = Some(Storage::Global);
            sym.ty = Type::Int;
            sym.val = 64;
        }

        table.shadow(idx, Type::Char, 3);
        assert_eq!(table.get(idx).storage, Some(Storage::Local));
        assert_eq!(table.get(idx).ty, Type::Char);
        assert_eq!(table.get(idx).val, 3);

        table.unshadow_locals();
        let sym = table.get(idx);
        assert_eq!(sym.storage, Some(Storage::Global));
        assert_eq!(sym.ty, Type::Int);
        assert_eq!(sym.val, 64);
        assert!(sym.shadow.is_none());
    }

    #[test]
    fn test_unshadow_leaves_undeclared_entries_unbound() {
        let mut table = SymbolTable::new();
        let idx = table.lookup_or_insert(b"tmp", hash_of(b"tmp"));
        table.shadow(idx, Type::Int, 5);
        table.unshadow_locals();
        assert_eq!(table.get(idx).storage, None);
    }
}

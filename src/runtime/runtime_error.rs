//! Fatal execution errors. Every pool access is checked, so a wild guest
//! program is reported instead of corrupting the interpreter.

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("address out of range: {0:#x}")]
    BadAddress(i64),
    #[error("program counter out of range: {0}")]
    BadPc(i64),
    #[error("stack overflow")]
    StackOverflow,
    #[error("division by zero")]
    DivisionByZero,
    #[error("out of memory")]
    OutOfMemory,
    #[error("cycle limit exceeded ({0})")]
    CycleLimit(u64),
}

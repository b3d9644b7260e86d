//! Compilation errors. All are fatal; the first one aborts the compile.
//! Messages render as `<line>: <message>`.

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("{0}: unexpected eof in expression")]
    UnexpectedEof(usize),
    #[error("{0}: bad expression")]
    BadExpression(usize),
    #[error("{0}: bad function call")]
    BadFunctionCall(usize),
    #[error("{0}: undefined variable")]
    UndefinedVariable(usize),
    #[error("{0}: bad cast")]
    BadCast(usize),
    #[error("{0}: bad dereference")]
    BadDereference(usize),
    #[error("{0}: bad address-of")]
    BadAddressOf(usize),
    #[error("{0}: bad lvalue in pre-increment")]
    BadLvaluePreIncrement(usize),
    #[error("{0}: bad lvalue in post-increment")]
    BadLvaluePostIncrement(usize),
    #[error("{0}: bad lvalue in assignment")]
    BadLvalueAssignment(usize),
    #[error("{0}: conditional missing colon")]
    MissingColon(usize),
    #[error("{0}: open paren expected")]
    OpenParenExpected(usize),
    #[error("{0}: close paren expected")]
    CloseParenExpected(usize),
    #[error("{0}: close bracket expected")]
    CloseBracketExpected(usize),
    #[error("{0}: semicolon expected")]
    SemicolonExpected(usize),
    #[error("{0}: pointer type expected")]
    PointerTypeExpected(usize),
    #[error("{0}: bad enum identifier")]
    BadEnumIdentifier(usize),
    #[error("{0}: bad enum initializer")]
    BadEnumInitializer(usize),
    #[error("{0}: bad global declaration")]
    BadGlobalDeclaration(usize),
    #[error("{0}: duplicate global definition")]
    DuplicateGlobal(usize),
    #[error("{0}: bad parameter declaration")]
    BadParameterDeclaration(usize),
    #[error("{0}: duplicate parameter definition")]
    DuplicateParameter(usize),
    #[error("{0}: bad function definition")]
    BadFunctionDefinition(usize),
    #[error("{0}: bad local declaration")]
    BadLocalDeclaration(usize),
    #[error("{0}: duplicate local definition")]
    DuplicateLocal(usize),
    /// Operator token the climb loop cannot dispatch. Should not happen:
    /// every token with a precedence has an arm.
    #[error("{0}: compiler error")]
    Internal(usize),
    #[error("main() not defined")]
    MainNotDefined,
}

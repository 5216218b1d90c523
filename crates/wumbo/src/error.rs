use thiserror::Error;

/// Errors produced while turning Lua source into a WebAssembly module.
///
/// Parse errors come from the tokenizer/parser, semantic errors from scope
/// analysis and code generation. Runtime errors do not appear here; they are
/// throws of the emitted module's `error` tag.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("{0}")]
    Parse(String),
    #[error("{0}")]
    Semantic(String),
    #[error("failed to render module text: {0}")]
    Print(String),
}

impl CompileError {
    pub fn parse(msg: impl Into<String>) -> Self {
        CompileError::Parse(msg.into())
    }

    pub fn semantic(msg: impl Into<String>) -> Self {
        CompileError::Semantic(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, CompileError>;

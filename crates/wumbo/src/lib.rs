// Lua 5.3 to WebAssembly-GC compiler
// Ahead-of-time; Lua values become GC-managed references, no linear memory

#[cfg(test)]
mod test;

pub mod ast;
pub mod backend;
pub mod error;
pub mod parser;
pub mod runtime;
pub mod wasm;

pub use error::CompileError;
pub use runtime::{FunctionAction, Runtime, RuntimeFn};

use backend::Compiler;
use wasm::ModuleBuilder;

/// Shape of the emitted module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Runtime and compiled chunk in one self-contained module.
    #[default]
    Standalone,
    /// Compiled chunk importing the runtime by name from module `"runtime"`.
    Minimal,
    /// The runtime alone, with every helper exported.
    Runtime,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Options {
    pub mode: Mode,
    /// Requested optimisation level; module optimisation is left to external
    /// tooling, so this is recorded but not acted upon.
    pub optimize: u32,
}

/// Compile a Lua chunk (or, in [`Mode::Runtime`], ignore the source and
/// produce the runtime module) into WebAssembly binary bytes.
pub fn compile(source: &str, options: &Options) -> Result<Vec<u8>, CompileError> {
    if options.mode == Mode::Runtime {
        return compile_runtime(options);
    }

    let chunk = parser::parse(source)?;
    ast::analyze::analyze(&chunk);

    let mut builder = ModuleBuilder::new();
    let mut rt = match options.mode {
        Mode::Standalone => Runtime::standalone(),
        Mode::Minimal => Runtime::minimal(),
        Mode::Runtime => unreachable!(),
    };
    let mut compiler = Compiler::new(&mut builder, &mut rt);
    compiler.convert(&chunk, options.mode == Mode::Standalone)?;
    rt.build(&mut builder);
    Ok(builder.finish())
}

/// Emit the standalone runtime module.
pub fn compile_runtime(_options: &Options) -> Result<Vec<u8>, CompileError> {
    let mut builder = ModuleBuilder::new();
    let mut rt = Runtime::runtime_module();
    rt.build(&mut builder);
    Ok(builder.finish())
}

/// Render a binary module in the text format.
pub fn print_text(bytes: &[u8]) -> Result<String, CompileError> {
    wasmprinter::print_bytes(bytes).map_err(|e| CompileError::Print(e.to_string()))
}

//! loxvm - A bytecode virtual machine for the Lox language
//!
//! This library provides the chunk format, heap and garbage collector,
//! execution engine and disassembler. Front ends plug in through the
//! [`Compiler`] trait.

pub mod compiler;
pub mod config;
pub mod error;
pub mod vm;

// Re-export commonly used types
pub use compiler::Compiler;
pub use config::{ConfigError, RuntimeConfig};
pub use error::{CompileError, InterpretError, InterpretResult, RuntimeError, TraceFrame};
pub use vm::{Chunk, FunctionBuilder, GcRef, Heap, Op, Value, VM};

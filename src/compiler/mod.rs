//! Compiler boundary.
//!
//! The VM does not ship a front end. A compiler turns source text into a
//! top-level function on the VM's heap, emitting bytecode through
//! [`FunctionBuilder`](crate::vm::FunctionBuilder).

pub use crate::error::CompileError;

use crate::vm::{GcRef, VM};

pub trait Compiler {
    /// Compile `source` into a script function allocated on `vm`'s heap.
    /// All diagnostics are reported together.
    fn compile(&mut self, source: &str, vm: &mut VM) -> Result<GcRef, Vec<CompileError>>;
}

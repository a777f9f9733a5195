mod builder;
mod chunk;
pub mod debug;
mod heap;
pub mod native;
pub mod object;
mod ops;
mod value;
mod vm;

pub use builder::FunctionBuilder;
pub use chunk::Chunk;
pub use debug::{Instruction, LineTable, disassemble, disassemble_chunk, disassemble_instruction};
pub use heap::{GcRef, GcStats, Heap};
pub use object::{Object, ObjectType};
pub use ops::Op;
pub use value::{Value, format_number};
pub use vm::VM;

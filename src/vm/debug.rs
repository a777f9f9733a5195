//! Debug information for mapping bytecode to source code, and the disassembler.

use std::fmt::{self, Write};

use super::chunk::MIN_CAPACITY;
use super::{Chunk, Heap, Op, Value};

/// Run-length line table: `counts[line - 1]` is the number of bytes emitted
/// for that source line.
///
/// The sum of counts for lines `<= L` equals the offset of the first byte on
/// line `L + 1`.
#[derive(Debug, Clone, Default)]
pub struct LineTable {
    counts: Vec<u32>,
}

impl LineTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one more byte for `line` (1-based).
    pub fn add(&mut self, line: u32) {
        if line < 1 {
            panic!("source line must be >= 1, got {}", line);
        }
        let index = (line - 1) as usize;

        if index >= self.counts.capacity() {
            let new_capacity = (index * 2).max(MIN_CAPACITY);
            self.counts.reserve_exact(new_capacity - self.counts.len());
        }
        if index >= self.counts.len() {
            // Lines that emitted nothing keep a zero count.
            self.counts.resize(index + 1, 0);
        }
        self.counts[index] += 1;
    }

    /// Find the source line for a given bytecode offset.
    pub fn line_for(&self, offset: usize) -> Option<u32> {
        let mut sum = 0usize;
        for (i, count) in self.counts.iter().enumerate() {
            sum += *count as usize;
            if sum > offset {
                return Some(i as u32 + 1);
            }
        }
        None
    }

    /// Highest line with a slot in the table.
    pub fn line_count(&self) -> usize {
        self.counts.len()
    }

    pub fn counts(&self) -> &[u32] {
        &self.counts
    }
}

/// One decoded instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub offset: usize,
    pub line: u32,
    pub mnemonic: &'static str,
    pub operands: String,
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04} {:4} ", self.offset, self.line)?;
        if self.operands.is_empty() {
            write!(f, "{}", self.mnemonic)
        } else {
            write!(f, "{:<16} {}", self.mnemonic, self.operands)
        }
    }
}

/// Decode every instruction of `chunk`.
pub fn disassemble(chunk: &Chunk, heap: &Heap) -> Vec<Instruction> {
    let mut instructions = Vec::new();
    let mut offset = 0;
    while offset < chunk.len() {
        let (instruction, next) = disassemble_instruction(chunk, heap, offset);
        instructions.push(instruction);
        offset = next;
    }
    instructions
}

/// Render a listing of `chunk` under a `== name ==` header. Repeated lines
/// are shown as `|`.
pub fn disassemble_chunk(chunk: &Chunk, heap: &Heap, name: &str) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "== {} ==", name);

    let mut previous_line = None;
    for instruction in disassemble(chunk, heap) {
        let _ = write!(output, "{:04} ", instruction.offset);
        if previous_line == Some(instruction.line) {
            output.push_str("   | ");
        } else {
            let _ = write!(output, "{:4} ", instruction.line);
        }
        if instruction.operands.is_empty() {
            let _ = writeln!(output, "{}", instruction.mnemonic);
        } else {
            let _ = writeln!(output, "{:<16} {}", instruction.mnemonic, instruction.operands);
        }
        previous_line = Some(instruction.line);
    }
    output
}

/// Decode the instruction at `offset`. Returns it with the offset of the next
/// instruction.
pub fn disassemble_instruction(chunk: &Chunk, heap: &Heap, offset: usize) -> (Instruction, usize) {
    let line = chunk.line_for(offset);
    let code = chunk.code();
    let byte = code[offset];

    let Some(op) = Op::from_u8(byte) else {
        let instruction = Instruction {
            offset,
            line,
            mnemonic: "UNKNOWN",
            operands: format!("{}", byte),
        };
        return (instruction, offset + 1);
    };

    let constant = |index: u8| -> String {
        match chunk.constants().get(index as usize) {
            Some(value) => format!("{:4} '{}'", index, heap.format_value(*value)),
            None => format!("{:4} <invalid constant>", index),
        }
    };

    let (operands, next) = match op {
        Op::Nil
        | Op::True
        | Op::False
        | Op::Pop
        | Op::Equal
        | Op::Greater
        | Op::Less
        | Op::Add
        | Op::Subtract
        | Op::Multiply
        | Op::Divide
        | Op::Not
        | Op::Negate
        | Op::Print
        | Op::CloseUpvalue
        | Op::Return
        | Op::Inherit => (String::new(), offset + 1),

        Op::PopN
        | Op::GetLocal
        | Op::SetLocal
        | Op::GetUpvalue
        | Op::SetUpvalue
        | Op::Call => (format!("{:4}", code[offset + 1]), offset + 2),

        Op::Constant
        | Op::GetGlobal
        | Op::DefineGlobal
        | Op::SetGlobal
        | Op::GetProperty
        | Op::SetProperty
        | Op::GetSuper
        | Op::Class
        | Op::Method => (constant(code[offset + 1]), offset + 2),

        Op::Jump | Op::JumpIfFalse | Op::Loop => {
            let jump = chunk.read_u16(offset + 1) as usize;
            let target = if op == Op::Loop {
                (offset + 3).wrapping_sub(jump)
            } else {
                offset + 3 + jump
            };
            (format!("{:4} -> {}", offset, target), offset + 3)
        }

        Op::Invoke | Op::SuperInvoke => {
            let argc = code[offset + 2];
            (
                format!("({} args) {}", argc, constant(code[offset + 1])),
                offset + 3,
            )
        }

        Op::Closure => {
            let index = code[offset + 1];
            let mut operands = constant(index);
            let upvalue_count = match chunk.constants().get(index as usize) {
                Some(Value::Obj(r)) => heap.function(*r).upvalue_count,
                _ => 0,
            };
            let mut next = offset + 2;
            for _ in 0..upvalue_count {
                let kind = if code[next] == 1 { "local" } else { "upvalue" };
                let _ = write!(operands, ", {} {}", kind, code[next + 1]);
                next += 2;
            }
            (operands, next)
        }
    };

    let instruction = Instruction {
        offset,
        line,
        mnemonic: op.name(),
        operands,
    };
    (instruction, next)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_table() {
        let mut table = LineTable::new();
        table.add(1);
        table.add(1);
        table.add(3);
        table.add(4);

        assert_eq!(table.counts(), &[2, 0, 1, 1]);
        assert_eq!(table.line_for(0), Some(1));
        assert_eq!(table.line_for(1), Some(1));
        assert_eq!(table.line_for(2), Some(3));
        assert_eq!(table.line_for(3), Some(4));
        assert_eq!(table.line_for(4), None);
    }

    #[test]
    fn test_line_table_prefix_sums() {
        let mut table = LineTable::new();
        for line in [1, 1, 1, 2, 5, 5, 9] {
            table.add(line);
        }
        // Sum of counts for lines <= L is the offset of the first byte on L + 1.
        let counts = table.counts();
        assert_eq!(counts[..1].iter().sum::<u32>(), 3); // line 2 starts at 3
        assert_eq!(counts[..4].iter().sum::<u32>(), 4); // line 5 starts at 4
        assert_eq!(counts[..8].iter().sum::<u32>(), 6); // line 9 starts at 6
    }

    #[test]
    fn test_line_table_grows_with_floor() {
        let mut table = LineTable::new();
        table.add(1);
        assert!(table.counts.capacity() >= 8);
        table.add(500);
        assert_eq!(table.line_count(), 500);
        assert!(table.counts.capacity() >= 998);
        assert_eq!(table.line_for(1), Some(500));
    }

    #[test]
    fn test_disassemble_simple_chunk() {
        let heap = Heap::default();
        let mut chunk = Chunk::new();
        let constant = chunk.add_constant(Value::Number(1.2));
        chunk.write_op(Op::Constant, 123);
        chunk.write(constant as u8, 123);
        chunk.write_op(Op::Negate, 129);
        chunk.write_op(Op::Return, 500);

        let listing = disassemble(&chunk, &heap);
        let lines: Vec<u32> = listing.iter().map(|i| i.line).collect();
        assert_eq!(lines, vec![123, 129, 500]);
        assert_eq!(listing[0].mnemonic, "OP_CONSTANT");
        assert_eq!(listing[0].operands, "   0 '1.2'");
        assert_eq!(listing[2].offset, 3);

        let text = disassemble_chunk(&chunk, &heap, "test chunk");
        assert!(text.starts_with("== test chunk ==\n"));
        assert!(text.contains("0000  123 OP_CONSTANT"));
        assert!(text.contains("0003  500 OP_RETURN"));
    }

    #[test]
    fn test_disassemble_repeated_line_marker() {
        let heap = Heap::default();
        let mut chunk = Chunk::new();
        chunk.write_op(Op::Nil, 7);
        chunk.write_op(Op::Return, 7);

        let text = disassemble_chunk(&chunk, &heap, "same");
        assert!(text.contains("0001    | OP_RETURN"));
    }

    #[test]
    fn test_disassemble_jumps() {
        let heap = Heap::default();
        let mut chunk = Chunk::new();
        chunk.write_op(Op::Jump, 1);
        chunk.write_u16(2, 1);
        chunk.write_op(Op::Nil, 1);
        chunk.write_op(Op::Pop, 1);
        chunk.write_op(Op::Loop, 2);
        chunk.write_u16(8, 2);

        let listing = disassemble(&chunk, &heap);
        assert_eq!(listing[0].operands, "   0 -> 5");
        assert_eq!(listing[3].operands, "   5 -> 0");
    }

    #[test]
    fn test_disassemble_does_not_mutate() {
        let heap = Heap::default();
        let mut chunk = Chunk::new();
        chunk.write_op(Op::Nil, 1);
        chunk.write_op(Op::Return, 1);
        let before = chunk.code().to_vec();
        let _ = disassemble(&chunk, &heap);
        assert_eq!(chunk.code(), before.as_slice());
    }
}

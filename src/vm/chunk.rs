//! Bytecode chunk: instructions, constants and line information.

use super::debug::LineTable;
use super::{Op, Value};

/// Smallest capacity allocated for a non-empty buffer.
pub(crate) const MIN_CAPACITY: usize = 8;

/// Doubling growth with a floor.
fn grow_capacity(capacity: usize) -> usize {
    if capacity < MIN_CAPACITY {
        MIN_CAPACITY
    } else {
        capacity * 2
    }
}

/// A chunk of bytecode for one function body.
#[derive(Debug, Default)]
pub struct Chunk {
    code: Vec<u8>,
    constants: Vec<Value>,
    lines: LineTable,
    resize_count: usize,
}

impl Chunk {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a byte produced by source line `line` (1-based).
    ///
    /// # Panics
    /// If `line` is 0.
    pub fn write(&mut self, byte: u8, line: u32) {
        self.lines.add(line);

        if self.code.len() == self.code.capacity() {
            let new_capacity = grow_capacity(self.code.capacity());
            self.code.reserve_exact(new_capacity - self.code.len());
            self.resize_count += 1;
        }
        self.code.push(byte);
    }

    pub fn write_op(&mut self, op: Op, line: u32) {
        self.write(op.into(), line);
    }

    /// Write a 16-bit operand (big-endian).
    pub fn write_u16(&mut self, value: u16, line: u32) {
        let [hi, lo] = value.to_be_bytes();
        self.write(hi, line);
        self.write(lo, line);
    }

    /// Read a 16-bit operand at `offset`.
    pub fn read_u16(&self, offset: usize) -> u16 {
        u16::from_be_bytes([self.code[offset], self.code[offset + 1]])
    }

    /// Overwrite a previously emitted 16-bit operand.
    pub fn patch_u16(&mut self, offset: usize, value: u16) {
        let [hi, lo] = value.to_be_bytes();
        self.code[offset] = hi;
        self.code[offset + 1] = lo;
    }

    /// Add a constant to the pool and return its index. Duplicates are kept.
    ///
    /// The value is not reachable from any root until the chunk's function is;
    /// heap-resident chunks should be extended through `VM::add_constant`.
    pub fn add_constant(&mut self, value: Value) -> usize {
        self.constants.push(value);
        self.constants.len() - 1
    }

    /// Source line of the instruction at `offset`.
    ///
    /// # Panics
    /// If no byte was ever written at `offset`.
    pub fn line_for(&self, offset: usize) -> u32 {
        match self.lines.line_for(offset) {
            Some(line) => line,
            None => panic!(
                "no line recorded for offset {} (chunk has {} bytes)",
                offset,
                self.code.len()
            ),
        }
    }

    /// Like [`Chunk::line_for`] but returns `None` for unrecorded offsets.
    pub fn try_line_for(&self, offset: usize) -> Option<u32> {
        self.lines.line_for(offset)
    }

    pub fn code(&self) -> &[u8] {
        &self.code
    }

    pub fn constants(&self) -> &[Value] {
        &self.constants
    }

    pub fn lines(&self) -> &LineTable {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.code.capacity()
    }

    /// Bytes the next `write` will add to the code buffer's capacity.
    pub fn write_growth(&self) -> usize {
        if self.code.len() == self.code.capacity() {
            grow_capacity(self.code.capacity()) - self.code.capacity()
        } else {
            0
        }
    }

    pub fn constants_capacity(&self) -> usize {
        self.constants.capacity()
    }

    /// Number of times the byte buffer has been grown.
    pub fn resize_count(&self) -> usize {
        self.resize_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_records_lines() {
        let mut chunk = Chunk::new();
        chunk.write_op(Op::Return, 1);
        chunk.write_op(Op::Return, 2);
        chunk.write_op(Op::Constant, 123);
        chunk.write(0, 123);
        chunk.write_op(Op::Return, 123);
        chunk.write_op(Op::Return, 500);

        assert_eq!(chunk.len(), 6);
        let lines: Vec<u32> = (0..6).map(|offset| chunk.line_for(offset)).collect();
        assert_eq!(lines, vec![1, 2, 123, 123, 123, 500]);
    }

    #[test]
    fn test_line_for_is_monotonic() {
        let mut chunk = Chunk::new();
        let mut expected = Vec::new();
        let mut line = 1;
        for i in 0..200u32 {
            if i % 7 == 0 {
                line += i % 3;
            }
            chunk.write(i as u8, line);
            expected.push(line);
        }

        let mut previous = 0;
        for (offset, want) in expected.iter().enumerate() {
            let got = chunk.line_for(offset);
            assert_eq!(got, *want, "offset {}", offset);
            assert!(got >= previous);
            previous = got;
        }
    }

    #[test]
    fn test_growth_is_logarithmic() {
        let mut chunk = Chunk::new();
        for i in 0..1000 {
            chunk.write(0, 1);
            assert!(chunk.capacity() >= i + 1);
        }
        assert_eq!(chunk.len(), 1000);
        // 8, 16, 32, ..., 1024
        assert!(chunk.resize_count() <= 8);
        assert!(chunk.resize_count() > 0);
    }

    #[test]
    fn test_constants_allow_duplicates() {
        let mut chunk = Chunk::new();
        assert_eq!(chunk.add_constant(Value::Number(1.2)), 0);
        assert_eq!(chunk.add_constant(Value::Number(1.2)), 1);
        assert_eq!(chunk.constants().len(), 2);
    }

    #[test]
    fn test_u16_operands() {
        let mut chunk = Chunk::new();
        chunk.write_op(Op::Jump, 1);
        chunk.write_u16(0xffff, 1);
        chunk.patch_u16(1, 0x0102);
        assert_eq!(chunk.code(), &[Op::Jump as u8, 0x01, 0x02]);
        assert_eq!(chunk.read_u16(1), 0x0102);
    }

    #[test]
    #[should_panic(expected = "line")]
    fn test_line_zero_is_fatal() {
        let mut chunk = Chunk::new();
        chunk.write(0, 0);
    }

    #[test]
    #[should_panic(expected = "no line recorded")]
    fn test_unrecorded_offset_is_fatal() {
        let mut chunk = Chunk::new();
        chunk.write(0, 1);
        chunk.line_for(1);
    }

    #[test]
    fn test_try_line_for() {
        let mut chunk = Chunk::new();
        chunk.write(0, 3);
        assert_eq!(chunk.try_line_for(0), Some(3));
        assert_eq!(chunk.try_line_for(1), None);
    }
}

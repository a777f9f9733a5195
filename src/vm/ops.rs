/// Bytecode operations for the lox VM.
///
/// Each opcode is a single byte followed by its operands. Operands are one byte
/// unless noted; jump distances are 16-bit big-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Op {
    // ========================================
    // Constants & Stack
    // ========================================
    /// CONSTANT <index>
    Constant = 0,
    Nil,
    True,
    False,
    Pop,
    /// POPN <count>
    PopN,

    // ========================================
    // Variables
    // ========================================
    /// GET_LOCAL <slot>
    GetLocal,
    /// SET_LOCAL <slot>
    SetLocal,
    /// GET_GLOBAL <name constant>
    GetGlobal,
    /// DEFINE_GLOBAL <name constant>
    DefineGlobal,
    /// SET_GLOBAL <name constant>
    SetGlobal,
    /// GET_UPVALUE <index>
    GetUpvalue,
    /// SET_UPVALUE <index>
    SetUpvalue,
    /// GET_PROPERTY <name constant>
    GetProperty,
    /// SET_PROPERTY <name constant>
    SetProperty,
    /// GET_SUPER <name constant>
    GetSuper,

    // ========================================
    // Comparison & Arithmetic
    // ========================================
    Equal,
    Greater,
    Less,
    Add,
    Subtract,
    Multiply,
    Divide,
    Not,
    Negate,

    Print,

    // ========================================
    // Control Flow
    // ========================================
    /// JUMP <offset:u16>
    Jump,
    /// JUMP_IF_FALSE <offset:u16> (condition stays on the stack)
    JumpIfFalse,
    /// LOOP <offset:u16> (backwards)
    Loop,
    /// CALL <argc>
    Call,
    /// INVOKE <name constant> <argc>
    Invoke,
    /// SUPER_INVOKE <name constant> <argc>
    SuperInvoke,
    /// CLOSURE <function constant> followed by (is_local, index) per upvalue
    Closure,
    CloseUpvalue,
    Return,

    // ========================================
    // Classes
    // ========================================
    /// CLASS <name constant>
    Class,
    Inherit,
    /// METHOD <name constant>
    Method,
}

impl Op {
    const ALL: [Op; 38] = [
        Op::Constant,
        Op::Nil,
        Op::True,
        Op::False,
        Op::Pop,
        Op::PopN,
        Op::GetLocal,
        Op::SetLocal,
        Op::GetGlobal,
        Op::DefineGlobal,
        Op::SetGlobal,
        Op::GetUpvalue,
        Op::SetUpvalue,
        Op::GetProperty,
        Op::SetProperty,
        Op::GetSuper,
        Op::Equal,
        Op::Greater,
        Op::Less,
        Op::Add,
        Op::Subtract,
        Op::Multiply,
        Op::Divide,
        Op::Not,
        Op::Negate,
        Op::Print,
        Op::Jump,
        Op::JumpIfFalse,
        Op::Loop,
        Op::Call,
        Op::Invoke,
        Op::SuperInvoke,
        Op::Closure,
        Op::CloseUpvalue,
        Op::Return,
        Op::Class,
        Op::Inherit,
        Op::Method,
    ];

    /// Decode an opcode byte.
    pub fn from_u8(byte: u8) -> Option<Op> {
        Self::ALL.get(byte as usize).copied()
    }

    /// Returns the mnemonic used by the disassembler.
    pub fn name(&self) -> &'static str {
        match self {
            Op::Constant => "OP_CONSTANT",
            Op::Nil => "OP_NIL",
            Op::True => "OP_TRUE",
            Op::False => "OP_FALSE",
            Op::Pop => "OP_POP",
            Op::PopN => "OP_POPN",
            Op::GetLocal => "OP_GET_LOCAL",
            Op::SetLocal => "OP_SET_LOCAL",
            Op::GetGlobal => "OP_GET_GLOBAL",
            Op::DefineGlobal => "OP_DEFINE_GLOBAL",
            Op::SetGlobal => "OP_SET_GLOBAL",
            Op::GetUpvalue => "OP_GET_UPVALUE",
            Op::SetUpvalue => "OP_SET_UPVALUE",
            Op::GetProperty => "OP_GET_PROPERTY",
            Op::SetProperty => "OP_SET_PROPERTY",
            Op::GetSuper => "OP_GET_SUPER",
            Op::Equal => "OP_EQUAL",
            Op::Greater => "OP_GREATER",
            Op::Less => "OP_LESS",
            Op::Add => "OP_ADD",
            Op::Subtract => "OP_SUBTRACT",
            Op::Multiply => "OP_MULTIPLY",
            Op::Divide => "OP_DIVIDE",
            Op::Not => "OP_NOT",
            Op::Negate => "OP_NEGATE",
            Op::Print => "OP_PRINT",
            Op::Jump => "OP_JUMP",
            Op::JumpIfFalse => "OP_JUMP_IF_FALSE",
            Op::Loop => "OP_LOOP",
            Op::Call => "OP_CALL",
            Op::Invoke => "OP_INVOKE",
            Op::SuperInvoke => "OP_SUPER_INVOKE",
            Op::Closure => "OP_CLOSURE",
            Op::CloseUpvalue => "OP_CLOSE_UPVALUE",
            Op::Return => "OP_RETURN",
            Op::Class => "OP_CLASS",
            Op::Inherit => "OP_INHERIT",
            Op::Method => "OP_METHOD",
        }
    }
}

impl From<Op> for u8 {
    fn from(op: Op) -> u8 {
        op as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_table_matches_discriminants() {
        for (i, op) in Op::ALL.iter().enumerate() {
            assert_eq!(*op as u8 as usize, i, "{} out of order", op.name());
            assert_eq!(Op::from_u8(i as u8), Some(*op));
        }
    }

    #[test]
    fn test_invalid_opcode() {
        assert!(Op::from_u8(Op::ALL.len() as u8).is_none());
        assert!(Op::from_u8(255).is_none());
    }
}

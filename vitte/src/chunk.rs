use crate::Value;

/// Bytecode opcodes.
///
/// Constant-pool indices, local slots, register indices and array counts are
/// 8-bit operands. Jump offsets are unsigned 16-bit big-endian operand pairs;
/// `Jump`/`JumpIfFalse` move the instruction pointer forward, `Loop` moves it
/// backward.
///
/// The block after [`Return`](OpCode::Return) is reserved: those opcodes are
/// declared (with operand widths, so the disassembler can walk over them) but
/// have no dispatch semantics yet, and hitting one at runtime is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    /// Push `constants[idx]`. Operands: `idx:u8`
    Const = 0,
    /// Push `nil`.
    Nil,
    /// Push `true`.
    True,
    /// Push `false`.
    False,
    /// Pop and discard the top of stack.
    Pop,
    /// Push `stack[slot]` if the slot is live, else do nothing.
    /// Operands: `slot:u8`
    GetLocal,
    /// `stack[slot] = peek(0)` without popping. Operands: `slot:u8`
    SetLocal,
    /// Pop b, pop a, push `a == b` (language equality).
    Equal,
    /// Pop b, pop a, push `!(a < b) && !(a == b)`.
    Greater,
    /// Pop b, pop a, push `a < b`.
    Less,
    Add,
    Subtract,
    Multiply,
    Divide,
    /// Pop v, push `!is_truthy(v)`.
    Not,
    /// Pop v, push its numeric negation (`nil` for non-numerics).
    Negate,
    /// Pop v, write its rendering to the output sink.
    Print,
    /// `ip += offset`. Operands: `offset:u16` (big-endian)
    Jump,
    /// `ip += offset` if `peek(0)` is falsy; does not pop.
    /// Operands: `offset:u16` (big-endian)
    JumpIfFalse,
    /// `ip -= offset`. Operands: `offset:u16` (big-endian)
    Loop,
    /// Pop `count` values in LIFO order into a fresh array (element order is
    /// the reverse of push order) and push it. Operands: `count:u8`
    Array,
    /// Stop the loop, report ok.
    Halt,
    /// Stop the loop, report ok.
    Return,

    // Reserved slots without execution semantics.
    /// Operands: `name_idx:u8`
    GetGlobal,
    /// Operands: `name_idx:u8`
    SetGlobal,
    /// Operands: `argc:u8`
    Call,
    /// Operands: `name_idx:u8`
    Class,
    /// Operands: `name_idx:u8`
    Method,
    /// Operands: `name_idx:u8`, `argc:u8`
    Invoke,
    IndexGet,
    IndexSet,
    /// Operands: `reg:u8`
    LoadReg,
    /// Operands: `reg:u8`
    StoreReg,
}

impl OpCode {
    pub const COUNT: usize = OpCode::StoreReg as usize + 1;

    pub fn from_byte(byte: u8) -> Option<Self> {
        Self::try_from(byte).ok()
    }

    /// Whether this opcode sits in the reserved block (no dispatch
    /// semantics yet).
    pub const fn is_reserved(self) -> bool {
        self as u8 > OpCode::Return as u8
    }

    pub const fn name(self) -> &'static str {
        match self {
            OpCode::Const => "const",
            OpCode::Nil => "nil",
            OpCode::True => "true",
            OpCode::False => "false",
            OpCode::Pop => "pop",
            OpCode::GetLocal => "get_local",
            OpCode::SetLocal => "set_local",
            OpCode::Equal => "equal",
            OpCode::Greater => "greater",
            OpCode::Less => "less",
            OpCode::Add => "add",
            OpCode::Subtract => "subtract",
            OpCode::Multiply => "multiply",
            OpCode::Divide => "divide",
            OpCode::Not => "not",
            OpCode::Negate => "negate",
            OpCode::Print => "print",
            OpCode::Jump => "jump",
            OpCode::JumpIfFalse => "jump_if_false",
            OpCode::Loop => "loop",
            OpCode::Array => "array",
            OpCode::Halt => "halt",
            OpCode::Return => "return",
            OpCode::GetGlobal => "get_global",
            OpCode::SetGlobal => "set_global",
            OpCode::Call => "call",
            OpCode::Class => "class",
            OpCode::Method => "method",
            OpCode::Invoke => "invoke",
            OpCode::IndexGet => "index_get",
            OpCode::IndexSet => "index_set",
            OpCode::LoadReg => "load_reg",
            OpCode::StoreReg => "store_reg",
        }
    }

    /// Number of operand bytes following the opcode byte.
    pub const fn operand_len(self) -> usize {
        match self {
            OpCode::Const
            | OpCode::GetLocal
            | OpCode::SetLocal
            | OpCode::Array
            | OpCode::GetGlobal
            | OpCode::SetGlobal
            | OpCode::Call
            | OpCode::Class
            | OpCode::Method
            | OpCode::LoadReg
            | OpCode::StoreReg => 1,
            OpCode::Jump | OpCode::JumpIfFalse | OpCode::Loop | OpCode::Invoke => 2,
            _ => 0,
        }
    }
}

impl TryFrom<u8> for OpCode {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, u8> {
        if byte < Self::COUNT as u8 {
            // SAFETY: OpCode is repr(u8) with contiguous variants starting at 0.
            Ok(unsafe { core::mem::transmute::<u8, OpCode>(byte) })
        } else {
            Err(byte)
        }
    }
}

/// A bytecode unit: code bytes, a constant pool, and a line table parallel to
/// the code. Built forward-only by the front end, consumed read-only by the
/// VM.
#[derive(Debug, Default)]
pub struct Chunk {
    pub code: Vec<u8>,
    pub constants: Vec<Value>,
    pub lines: Vec<u32>,
}

impl Chunk {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one code byte, recording the source line it came from.
    /// Operand bytes inherit the line of their instruction.
    pub fn write(&mut self, byte: u8, line: u32) {
        self.code.push(byte);
        self.lines.push(line);
    }

    pub fn write_op(&mut self, op: OpCode, line: u32) {
        self.write(op as u8, line);
    }

    /// Append a constant and return its stable index.
    pub fn add_constant(&mut self, value: Value) -> usize {
        self.constants.push(value);
        self.constants.len() - 1
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Source line of the code byte at `offset`, if in range.
    pub fn line_at(&self, offset: usize) -> Option<u32> {
        self.lines.get(offset).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_keeps_lines_parallel_to_code() {
        let mut chunk = Chunk::new();
        chunk.write_op(OpCode::Const, 1);
        chunk.write(0, 1);
        chunk.write_op(OpCode::Halt, 2);

        assert_eq!(chunk.code.len(), chunk.lines.len());
        assert_eq!(chunk.line_at(1), Some(1), "operand inherits its line");
        assert_eq!(chunk.line_at(2), Some(2));
        assert_eq!(chunk.line_at(3), None);
    }

    #[test]
    fn add_constant_returns_stable_indices() {
        let mut chunk = Chunk::new();
        let a = chunk.add_constant(Value::Int(1));
        let b = chunk.add_constant(Value::Int(2));
        assert_eq!((a, b), (0, 1));
        assert_eq!(chunk.constants[a], Value::Int(1));
        assert_eq!(chunk.constants[b], Value::Int(2));
    }

    #[test]
    fn opcode_byte_roundtrip() {
        for byte in 0..OpCode::COUNT as u8 {
            let op = OpCode::from_byte(byte).expect("every byte below COUNT is an opcode");
            assert_eq!(op as u8, byte);
        }
        assert_eq!(OpCode::from_byte(OpCode::COUNT as u8), None);
        assert_eq!(OpCode::from_byte(0xff), None);
    }

    #[test]
    fn operand_widths() {
        assert_eq!(OpCode::Const.operand_len(), 1);
        assert_eq!(OpCode::Add.operand_len(), 0);
        assert_eq!(OpCode::Jump.operand_len(), 2);
        assert_eq!(OpCode::Invoke.operand_len(), 2);
        assert_eq!(OpCode::Array.operand_len(), 1);
    }

    #[test]
    fn reserved_block_starts_after_return() {
        assert!(!OpCode::Halt.is_reserved());
        assert!(!OpCode::Return.is_reserved());
        assert!(OpCode::GetGlobal.is_reserved());
        assert!(OpCode::StoreReg.is_reserved());
    }
}

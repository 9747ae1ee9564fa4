use std::io::{self, Write};

use log::{debug, trace};

use crate::{Chunk, GcHeap, OpCode, Value, VmError, VmErrorKind, render_value};

/// Operand stack capacity.
pub const STACK_MAX: usize = 256;
/// Register file size.
pub const REGISTER_COUNT: usize = 16;
/// Call-frame stack depth.
pub const FRAMES_MAX: usize = 64;

/// One activation record: where to resume and where the callee's stack
/// window starts. Structural for now; `Call` is a reserved opcode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallFrame {
    pub return_ip: usize,
    pub stack_base: usize,
}

/// The dispatch engine: operand stack, register file, call-frame stack, and
/// the fetch-decode-execute loop over a [`Chunk`].
///
/// Faults raised by the internal helpers (`push`, `pop`, register access) are
/// sticky: the offending instruction runs to completion and the flag is
/// observed at the top of the next loop iteration, where it becomes the
/// returned error. The first fault wins.
pub struct Vm {
    stack: Box<[Value]>,
    stack_top: usize,
    registers: [Value; REGISTER_COUNT],
    frames: Box<[CallFrame]>,
    frame_count: usize,
    ip: usize,
    instruction_count: u64,
    fault: Option<(VmErrorKind, String)>,
    output: Box<dyn Write>,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    /// A VM writing `print` output to stdout.
    pub fn new() -> Self {
        Self::with_output(Box::new(io::stdout()))
    }

    /// A VM writing `print` output to the given sink.
    pub fn with_output(output: Box<dyn Write>) -> Self {
        Self {
            stack: vec![Value::Nil; STACK_MAX].into_boxed_slice(),
            stack_top: 0,
            registers: [Value::Nil; REGISTER_COUNT],
            frames: vec![CallFrame::default(); FRAMES_MAX].into_boxed_slice(),
            frame_count: 0,
            ip: 0,
            instruction_count: 0,
            fault: None,
            output,
        }
    }

    /// Clear stack, frames, counters and the fault flag without touching the
    /// backing storage.
    pub fn reset(&mut self) {
        self.stack_top = 0;
        self.frame_count = 0;
        self.ip = 0;
        self.instruction_count = 0;
        self.fault = None;
    }

    /// The live portion of the operand stack (the GC's primary root set).
    pub fn stack_slice(&self) -> &[Value] {
        &self.stack[..self.stack_top]
    }

    pub fn registers(&self) -> &[Value; REGISTER_COUNT] {
        &self.registers
    }

    pub fn stack_top(&self) -> usize {
        self.stack_top
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn instruction_count(&self) -> u64 {
        self.instruction_count
    }

    pub fn had_error(&self) -> bool {
        self.fault.is_some()
    }

    /// Record a sticky fault. Later faults are ignored until the dispatch
    /// loop observes and clears the first one.
    fn fault(&mut self, kind: VmErrorKind, message: impl Into<String>) {
        if self.fault.is_none() {
            self.fault = Some((kind, message.into()));
        }
    }

    pub fn push(&mut self, value: Value) {
        if self.stack_top == STACK_MAX {
            self.fault(VmErrorKind::StackOverflow, "stack overflow");
            return;
        }
        self.stack[self.stack_top] = value;
        self.stack_top += 1;
    }

    pub fn pop(&mut self) -> Value {
        if self.stack_top == 0 {
            self.fault(VmErrorKind::StackUnderflow, "stack underflow");
            return Value::Nil;
        }
        self.stack_top -= 1;
        self.stack[self.stack_top]
    }

    /// The value `distance` slots below the top, or `Nil` when that would
    /// read below the stack bottom. Never faults.
    pub fn peek(&self, distance: usize) -> Value {
        if distance >= self.stack_top {
            return Value::Nil;
        }
        self.stack[self.stack_top - distance - 1]
    }

    pub fn load_register(&mut self, index: u8, value: Value) {
        let Some(slot) = self.registers.get_mut(index as usize) else {
            self.fault(VmErrorKind::Runtime, format!("invalid register r{index}"));
            return;
        };
        *slot = value;
    }

    pub fn register(&mut self, index: u8) -> Value {
        match self.registers.get(index as usize) {
            Some(&value) => value,
            None => {
                self.fault(VmErrorKind::Runtime, format!("invalid register r{index}"));
                Value::Nil
            }
        }
    }

    pub fn push_frame(&mut self, return_ip: usize, stack_base: usize) {
        if self.frame_count == FRAMES_MAX {
            self.fault(VmErrorKind::StackOverflow, "call-frame stack overflow");
            return;
        }
        self.frames[self.frame_count] = CallFrame {
            return_ip,
            stack_base,
        };
        self.frame_count += 1;
    }

    pub fn pop_frame(&mut self) -> Option<CallFrame> {
        if self.frame_count == 0 {
            return None;
        }
        self.frame_count -= 1;
        Some(self.frames[self.frame_count])
    }

    /// Fetch one operand byte, faulting on truncated bytecode.
    fn read_byte(&mut self, chunk: &Chunk) -> u8 {
        match chunk.code.get(self.ip) {
            Some(&byte) => {
                self.ip += 1;
                byte
            }
            None => {
                self.fault(VmErrorKind::Runtime, "truncated bytecode: missing operand");
                0
            }
        }
    }

    /// Fetch a big-endian u16 operand pair.
    fn read_u16(&mut self, chunk: &Chunk) -> u16 {
        let hi = self.read_byte(chunk);
        let lo = self.read_byte(chunk);
        u16::from_be_bytes([hi, lo])
    }

    fn binary_op(&mut self, op: fn(Value, Value) -> Value) {
        let b = self.pop();
        let a = self.pop();
        self.push(op(a, b));
    }

    /// Run `chunk` from the beginning until `Halt`/`Return`, end-of-code
    /// (an implicit ok), or a sticky fault is observed.
    pub fn execute(&mut self, chunk: &Chunk, heap: &mut GcHeap) -> Result<(), VmError> {
        self.ip = 0;
        let mut op_ip = 0;
        debug!(
            "executing chunk: {} code bytes, {} constants",
            chunk.code.len(),
            chunk.constants.len()
        );

        loop {
            if let Some((kind, message)) = self.fault.take() {
                return Err(VmError::with_line(kind, message, chunk.line_at(op_ip)));
            }
            if self.ip >= chunk.code.len() {
                return Ok(());
            }

            op_ip = self.ip;
            let byte = chunk.code[self.ip];
            self.ip += 1;
            self.instruction_count += 1;

            let Some(op) = OpCode::from_byte(byte) else {
                return Err(VmError::with_line(
                    VmErrorKind::Runtime,
                    format!("unknown opcode {byte:#04x}"),
                    chunk.line_at(op_ip),
                ));
            };
            trace!("ip={op_ip:04} {}", op.name());

            match op {
                OpCode::Const => {
                    let index = self.read_byte(chunk) as usize;
                    match chunk.constants.get(index) {
                        Some(&value) => self.push(value),
                        None => self.fault(
                            VmErrorKind::Runtime,
                            format!("constant index {index} out of range"),
                        ),
                    }
                }
                OpCode::Nil => self.push(Value::Nil),
                OpCode::True => self.push(Value::Bool(true)),
                OpCode::False => self.push(Value::Bool(false)),
                OpCode::Pop => {
                    self.pop();
                }
                OpCode::GetLocal => {
                    let slot = self.read_byte(chunk) as usize;
                    if slot < self.stack_top {
                        let value = self.stack[slot];
                        self.push(value);
                    }
                }
                OpCode::SetLocal => {
                    let slot = self.read_byte(chunk) as usize;
                    if slot < STACK_MAX {
                        self.stack[slot] = self.peek(0);
                    }
                }
                OpCode::Equal => {
                    let b = self.pop();
                    let a = self.pop();
                    self.push(Value::Bool(a.equal(b)));
                }
                OpCode::Greater => {
                    let b = self.pop();
                    let a = self.pop();
                    self.push(Value::Bool(!a.less(b) && !a.equal(b)));
                }
                OpCode::Less => {
                    let b = self.pop();
                    let a = self.pop();
                    self.push(Value::Bool(a.less(b)));
                }
                OpCode::Add => self.binary_op(Value::add),
                OpCode::Subtract => self.binary_op(Value::subtract),
                OpCode::Multiply => self.binary_op(Value::multiply),
                OpCode::Divide => self.binary_op(Value::divide),
                OpCode::Not => {
                    let value = self.pop();
                    self.push(Value::Bool(!value.is_truthy()));
                }
                OpCode::Negate => {
                    let value = self.pop();
                    self.push(value.negate());
                }
                OpCode::Print => {
                    let value = self.pop();
                    let rendered = render_value(value);
                    if writeln!(self.output, "{rendered}").is_err() {
                        self.fault(VmErrorKind::Runtime, "failed to write to output sink");
                    }
                }
                OpCode::Jump => {
                    let offset = self.read_u16(chunk) as usize;
                    self.ip += offset;
                }
                OpCode::JumpIfFalse => {
                    let offset = self.read_u16(chunk) as usize;
                    if !self.peek(0).is_truthy() {
                        self.ip += offset;
                    }
                }
                OpCode::Loop => {
                    let offset = self.read_u16(chunk) as usize;
                    if offset > self.ip {
                        self.fault(
                            VmErrorKind::Runtime,
                            "loop offset underflows the instruction pointer",
                        );
                    } else {
                        self.ip -= offset;
                    }
                }
                OpCode::Array => {
                    let count = self.read_byte(chunk) as usize;
                    // popped in LIFO order: element order is the reverse of
                    // push order
                    let mut values = Vec::with_capacity(count);
                    for _ in 0..count {
                        values.push(self.pop());
                    }
                    match heap.alloc_array(values) {
                        Ok(array) => self.push(array),
                        Err(err) => self.fault(err.kind(), err.message().to_string()),
                    }
                }
                OpCode::Halt | OpCode::Return => return Ok(()),
                _ => {
                    debug_assert!(op.is_reserved());
                    return Err(VmError::with_line(
                        VmErrorKind::Runtime,
                        format!("opcode `{}` is reserved and has no semantics", op.name()),
                        chunk.line_at(op_ip),
                    ));
                }
            }
        }
    }
}

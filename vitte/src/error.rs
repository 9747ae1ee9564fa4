use std::{error::Error, fmt};

/// Error taxonomy of the execution core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmErrorKind {
    /// Reserved for the front end; never raised by this core.
    Compile,
    /// Unknown or reserved opcode, truncated bytecode, or any other sticky
    /// fault without a more specific kind.
    Runtime,
    /// A push beyond the operand stack or call-frame capacity.
    StackOverflow,
    /// A pop below zero.
    StackUnderflow,
    /// Reserved; current arithmetic coerces instead of rejecting.
    Type,
    /// The GC heap's byte budget was exceeded.
    OutOfMemory,
}

impl fmt::Display for VmErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VmErrorKind::Compile => "compile error",
            VmErrorKind::Runtime => "runtime error",
            VmErrorKind::StackOverflow => "stack overflow",
            VmErrorKind::StackUnderflow => "stack underflow",
            VmErrorKind::Type => "type error",
            VmErrorKind::OutOfMemory => "out of memory",
        };
        f.write_str(name)
    }
}

/// A failed execution: kind, best-effort diagnostic message, and the source
/// line of the faulting instruction when the chunk's line table has one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmError {
    kind: VmErrorKind,
    message: String,
    line: Option<u32>,
}

impl VmError {
    pub fn new(kind: VmErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            line: None,
        }
    }

    pub fn with_line(kind: VmErrorKind, message: impl Into<String>, line: Option<u32>) -> Self {
        Self {
            kind,
            message: message.into(),
            line,
        }
    }

    pub fn kind(&self) -> VmErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn line(&self) -> Option<u32> {
        self.line
    }
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{} at line {}: {}", self.kind, line, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl Error for VmError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_line_when_known() {
        let err = VmError::with_line(VmErrorKind::StackUnderflow, "stack underflow", Some(3));
        assert_eq!(err.to_string(), "stack underflow at line 3: stack underflow");

        let err = VmError::new(VmErrorKind::Runtime, "unknown opcode 0xff");
        assert_eq!(err.to_string(), "runtime error: unknown opcode 0xff");
    }
}

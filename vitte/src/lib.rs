mod chunk;
mod error;
mod format;
mod heap;
mod natives;
mod value;
mod vm;

pub use chunk::{Chunk, OpCode};
pub use error::{VmError, VmErrorKind};
pub use format::{disassemble, disassemble_instruction, format_float, render_value};
pub use heap::{GC_THRESHOLD_FLOOR, GcHeap, HEAP_LIMIT_DEFAULT};
pub use natives::{NATIVES, Native, NativeFn, find_native};
pub use value::{ArrayObject, FLOAT_EQ_EPSILON, Gc, StrObject, Value};
pub use vm::{CallFrame, FRAMES_MAX, REGISTER_COUNT, STACK_MAX, Vm};

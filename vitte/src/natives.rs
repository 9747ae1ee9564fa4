use crate::{GcHeap, Value, VmError, VmErrorKind, format_float};

/// A host function callable from the runtime. Heap access lets natives mint
/// new strings and arrays through the tracked allocator.
pub type NativeFn = fn(&mut GcHeap, &[Value]) -> Result<Value, VmError>;

#[derive(Clone, Copy)]
pub struct Native {
    pub name: &'static str,
    pub arity: u8,
    pub func: NativeFn,
}

impl Native {
    /// Invoke with an arity check; the registry never trusts its callers.
    pub fn call(&self, heap: &mut GcHeap, args: &[Value]) -> Result<Value, VmError> {
        if args.len() != self.arity as usize {
            return Err(VmError::new(
                VmErrorKind::Runtime,
                format!(
                    "{} expects {} argument(s), got {}",
                    self.name,
                    self.arity,
                    args.len()
                ),
            ));
        }
        (self.func)(heap, args)
    }
}

/// Registry of every builtin, in lookup order.
pub const NATIVES: &[Native] = &[
    Native { name: "strlen", arity: 1, func: native_strlen },
    Native { name: "substr", arity: 3, func: native_substr },
    Native { name: "strcat", arity: 2, func: native_strcat },
    Native { name: "strtoupper", arity: 1, func: native_strtoupper },
    Native { name: "sqrt", arity: 1, func: native_sqrt },
    Native { name: "abs", arity: 1, func: native_abs },
    Native { name: "floor", arity: 1, func: native_floor },
    Native { name: "ceil", arity: 1, func: native_ceil },
    Native { name: "pow", arity: 2, func: native_pow },
    Native { name: "array_len", arity: 1, func: native_array_len },
    Native { name: "array_push", arity: 2, func: native_array_push },
    Native { name: "array_pop", arity: 1, func: native_array_pop },
    Native { name: "to_int", arity: 1, func: native_to_int },
    Native { name: "to_float", arity: 1, func: native_to_float },
    Native { name: "to_string", arity: 1, func: native_to_string },
    Native { name: "type_of", arity: 1, func: native_type_of },
];

/// Linear scan by name; the table is small enough that anything fancier
/// would be noise.
pub fn find_native(name: &str) -> Option<&'static Native> {
    NATIVES.iter().find(|n| n.name == name)
}

fn want_str(native: &str, value: Value) -> Result<String, VmError> {
    match value {
        // SAFETY: arguments are rooted by the caller for the duration of
        // the call
        Value::Str(s) => Ok(unsafe { s.as_ref() }.to_string_lossy()),
        other => Err(type_error(native, "a string", other)),
    }
}

fn type_error(native: &str, wanted: &str, got: Value) -> VmError {
    VmError::new(
        VmErrorKind::Type,
        format!("{native} expects {wanted}, got {}", got.type_name()),
    )
}

fn native_strlen(_heap: &mut GcHeap, args: &[Value]) -> Result<Value, VmError> {
    match args[0] {
        Value::Str(s) => Ok(Value::Int(unsafe { s.as_ref() }.len() as i64)),
        other => Err(type_error("strlen", "a string", other)),
    }
}

fn native_substr(heap: &mut GcHeap, args: &[Value]) -> Result<Value, VmError> {
    let s = want_str("substr", args[0])?;
    let (Value::Int(start), Value::Int(len)) = (args[1], args[2]) else {
        return Err(type_error("substr", "integer start and length", args[1]));
    };
    let bytes = s.as_bytes();
    // an out-of-range request yields nil, never a clamped string
    if start < 0 || len < 0 {
        return Ok(Value::Nil);
    }
    let (start, len) = (start as usize, len as usize);
    let Some(end) = start.checked_add(len).filter(|&end| end <= bytes.len()) else {
        return Ok(Value::Nil);
    };
    heap.alloc_str_bytes(&bytes[start..end])
}

fn native_strcat(heap: &mut GcHeap, args: &[Value]) -> Result<Value, VmError> {
    let mut joined = want_str("strcat", args[0])?;
    joined.push_str(&want_str("strcat", args[1])?);
    heap.alloc_str(&joined)
}

fn native_strtoupper(heap: &mut GcHeap, args: &[Value]) -> Result<Value, VmError> {
    let s = want_str("strtoupper", args[0])?;
    heap.alloc_str(&s.to_uppercase())
}

fn native_sqrt(_heap: &mut GcHeap, args: &[Value]) -> Result<Value, VmError> {
    Ok(Value::Float(args[0].as_f64().sqrt()))
}

fn native_abs(_heap: &mut GcHeap, args: &[Value]) -> Result<Value, VmError> {
    match args[0] {
        Value::Int(n) => Ok(Value::Int(n.wrapping_abs())),
        Value::Float(f) => Ok(Value::Float(f.abs())),
        _ => Ok(Value::Nil),
    }
}

fn native_floor(_heap: &mut GcHeap, args: &[Value]) -> Result<Value, VmError> {
    match args[0] {
        Value::Int(_) | Value::Float(_) => Ok(Value::Float(args[0].as_f64().floor())),
        _ => Ok(Value::Nil),
    }
}

fn native_ceil(_heap: &mut GcHeap, args: &[Value]) -> Result<Value, VmError> {
    match args[0] {
        Value::Int(_) | Value::Float(_) => Ok(Value::Float(args[0].as_f64().ceil())),
        _ => Ok(Value::Nil),
    }
}

fn native_pow(_heap: &mut GcHeap, args: &[Value]) -> Result<Value, VmError> {
    Ok(Value::Float(args[0].as_f64().powf(args[1].as_f64())))
}

fn native_array_len(_heap: &mut GcHeap, args: &[Value]) -> Result<Value, VmError> {
    match args[0] {
        Value::Array(a) => Ok(Value::Int(unsafe { a.as_ref() }.values.len() as i64)),
        other => Err(type_error("array_len", "an array", other)),
    }
}

fn native_array_push(_heap: &mut GcHeap, args: &[Value]) -> Result<Value, VmError> {
    match args[0] {
        Value::Array(a) => {
            // SAFETY: the array is rooted by the caller; no other reference
            // is live during the call
            let values = &mut unsafe { a.as_mut() }.values;
            values.push(args[1]);
            Ok(Value::Int(values.len() as i64))
        }
        other => Err(type_error("array_push", "an array", other)),
    }
}

fn native_array_pop(_heap: &mut GcHeap, args: &[Value]) -> Result<Value, VmError> {
    match args[0] {
        Value::Array(a) => {
            let values = &mut unsafe { a.as_mut() }.values;
            Ok(values.pop().unwrap_or(Value::Nil))
        }
        other => Err(type_error("array_pop", "an array", other)),
    }
}

/// `atoll`-style parse: optional leading whitespace and sign, then digits;
/// anything else (or no digits at all) yields 0.
fn parse_int_prefix(s: &str) -> i64 {
    let s = s.trim_start();
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let mut value: i64 = 0;
    for c in digits.chars() {
        let Some(d) = c.to_digit(10) else { break };
        value = value.wrapping_mul(10).wrapping_add(d as i64);
    }
    if negative { value.wrapping_neg() } else { value }
}

/// `strtod`-style parse of the longest numeric prefix; 0.0 when none.
fn parse_float_prefix(s: &str) -> f64 {
    let s = s.trim_start();
    let mut end = 0;
    let bytes = s.as_bytes();
    if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
        end += 1;
    }
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
    }
    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && (bytes[exp_end] == b'+' || bytes[exp_end] == b'-') {
            exp_end += 1;
        }
        let digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > digits_start {
            end = exp_end;
        }
    }
    s[..end].parse().unwrap_or(0.0)
}

fn native_to_int(_heap: &mut GcHeap, args: &[Value]) -> Result<Value, VmError> {
    let n = match args[0] {
        Value::Int(n) => n,
        Value::Float(f) => f as i64,
        Value::Bool(b) => b as i64,
        Value::Str(s) => parse_int_prefix(&unsafe { s.as_ref() }.to_string_lossy()),
        Value::Nil | Value::Array(_) => 0,
    };
    Ok(Value::Int(n))
}

fn native_to_float(_heap: &mut GcHeap, args: &[Value]) -> Result<Value, VmError> {
    let f = match args[0] {
        Value::Str(s) => parse_float_prefix(&unsafe { s.as_ref() }.to_string_lossy()),
        other => other.as_f64(),
    };
    Ok(Value::Float(f))
}

fn native_to_string(heap: &mut GcHeap, args: &[Value]) -> Result<Value, VmError> {
    if let Value::Str(_) = args[0] {
        return Ok(args[0]);
    }
    let rendered = match args[0] {
        Value::Nil => "nil".to_string(),
        Value::Bool(true) => "true".to_string(),
        Value::Bool(false) => "false".to_string(),
        Value::Int(n) => n.to_string(),
        Value::Float(f) => format_float(f),
        _ => "[object]".to_string(),
    };
    heap.alloc_str(&rendered)
}

fn native_type_of(heap: &mut GcHeap, args: &[Value]) -> Result<Value, VmError> {
    heap.alloc_str(args[0].type_name())
}

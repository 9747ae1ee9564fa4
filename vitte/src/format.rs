use std::fmt::Write;

use crate::{Chunk, OpCode, Value};

/// Render a value the way `print` shows it. Strings appear without quotes;
/// arrays render as an opaque placeholder, never element-wise (the heap
/// allows cyclic arrays, so there is no safe recursive rendering).
pub fn render_value(value: Value) -> String {
    match value {
        Value::Nil => "nil".to_string(),
        Value::Bool(true) => "true".to_string(),
        Value::Bool(false) => "false".to_string(),
        Value::Int(n) => n.to_string(),
        Value::Float(f) => format_float(f),
        // SAFETY: rendering only happens on live (rooted) values
        Value::Str(s) => unsafe { s.as_ref() }.to_string_lossy(),
        Value::Array(_) => "[object]".to_string(),
    }
}

/// `printf("%g")`-style float rendering: six significant digits, trailing
/// zeros stripped, scientific notation outside [1e-4, 1e6).
pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f < 0.0 { "-inf" } else { "inf" }.to_string();
    }
    if f == 0.0 {
        return "0".to_string();
    }

    let exponent = f.abs().log10().floor() as i32;
    if exponent < -4 || exponent >= 6 {
        let mantissa = trim_zeros(&format!("{:.5}", f / 10f64.powi(exponent)));
        return format!("{mantissa}e{}{:02}", if exponent < 0 { '-' } else { '+' }, exponent.abs());
    }

    // fixed notation with 6 significant digits
    let decimals = (5 - exponent).max(0) as usize;
    trim_zeros(&format!("{f:.decimals$}"))
}

fn trim_zeros(s: &str) -> String {
    if !s.contains('.') {
        return s.to_string();
    }
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Print a human-readable listing of every instruction in `chunk`.
pub fn disassemble(chunk: &Chunk, name: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "== {name} ==");
    let mut offset = 0;
    while offset < chunk.code.len() {
        offset = disassemble_instruction(&mut out, chunk, offset);
    }
    out
}

/// Append one instruction to `out` and return the offset of the next one.
/// A `|` in the line column marks an instruction on the same source line as
/// its predecessor.
pub fn disassemble_instruction(out: &mut String, chunk: &Chunk, offset: usize) -> usize {
    let _ = write!(out, "{offset:04} ");
    match (offset, chunk.line_at(offset)) {
        (o, line) if o > 0 && line == chunk.line_at(o - 1) => {
            let _ = write!(out, "   | ");
        }
        (_, Some(line)) => {
            let _ = write!(out, "{line:4} ");
        }
        (_, None) => {
            let _ = write!(out, "   ? ");
        }
    }

    let byte = chunk.code[offset];
    let Some(op) = OpCode::from_byte(byte) else {
        let _ = writeln!(out, "bad opcode {byte:#04x}");
        return offset + 1;
    };

    match op.operand_len() {
        0 => {
            let _ = writeln!(out, "{}", op.name());
            offset + 1
        }
        1 => {
            let Some(&operand) = chunk.code.get(offset + 1) else {
                let _ = writeln!(out, "{} <truncated>", op.name());
                return chunk.code.len();
            };
            match op {
                OpCode::Const => {
                    let rendered = chunk
                        .constants
                        .get(operand as usize)
                        .map(|&v| render_value(v))
                        .unwrap_or_else(|| "<bad index>".to_string());
                    let _ = writeln!(out, "{:<16} {operand:4} '{rendered}'", op.name());
                }
                _ => {
                    let _ = writeln!(out, "{:<16} {operand:4}", op.name());
                }
            }
            offset + 2
        }
        _ => {
            let (Some(&hi), Some(&lo)) =
                (chunk.code.get(offset + 1), chunk.code.get(offset + 2))
            else {
                let _ = writeln!(out, "{} <truncated>", op.name());
                return chunk.code.len();
            };
            let operand = u16::from_be_bytes([hi, lo]);
            match op {
                OpCode::Jump | OpCode::JumpIfFalse => {
                    let target = offset + 3 + operand as usize;
                    let _ = writeln!(out, "{:<16} {operand:4} -> {target:04}", op.name());
                }
                OpCode::Loop => {
                    let target = (offset + 3).wrapping_sub(operand as usize);
                    let _ = writeln!(out, "{:<16} {operand:4} -> {target:04}", op.name());
                }
                _ => {
                    let _ = writeln!(out, "{:<16} {hi:4} {lo:4}", op.name());
                }
            }
            offset + 3
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GcHeap;

    #[test]
    fn floats_render_like_percent_g() {
        assert_eq!(format_float(0.0), "0");
        assert_eq!(format_float(1.0), "1");
        assert_eq!(format_float(2.5), "2.5");
        assert_eq!(format_float(-3.25), "-3.25");
        assert_eq!(format_float(0.1), "0.1");
        assert_eq!(format_float(100000.0), "100000");
        assert_eq!(format_float(1000000.0), "1e+06");
        assert_eq!(format_float(0.0001), "0.0001");
        assert_eq!(format_float(0.00001), "1e-05");
        assert_eq!(format_float(f64::INFINITY), "inf");
        assert_eq!(format_float(f64::NEG_INFINITY), "-inf");
        assert_eq!(format_float(f64::NAN), "nan");
        assert_eq!(format_float(1.0 / 3.0), "0.333333", "six significant digits");
    }

    #[test]
    fn values_render_without_quotes() {
        let mut heap = GcHeap::new();
        assert_eq!(render_value(Value::Nil), "nil");
        assert_eq!(render_value(Value::Bool(true)), "true");
        assert_eq!(render_value(Value::Int(-7)), "-7");
        let s = heap.alloc_str("abc").expect("alloc");
        assert_eq!(render_value(s), "abc");
    }

    #[test]
    fn arrays_render_as_the_placeholder_token() {
        let mut heap = GcHeap::new();
        let array = heap
            .alloc_array(vec![Value::Int(1), Value::Int(2)])
            .expect("alloc");
        assert_eq!(render_value(array), "[object]");
        let empty = heap.alloc_array(Vec::new()).expect("alloc");
        assert_eq!(render_value(empty), "[object]");
    }

    #[test]
    fn rendering_a_cyclic_array_terminates() {
        let mut heap = GcHeap::new();
        let cyclic = heap.alloc_array(Vec::new()).expect("alloc");
        if let Value::Array(gc) = cyclic {
            // SAFETY: just allocated, no other reference held
            unsafe { gc.as_mut() }.values.push(cyclic);
        }
        assert_eq!(render_value(cyclic), "[object]");
    }

    #[test]
    fn listing_shows_constants_and_jump_targets() {
        let mut chunk = Chunk::new();
        let idx = chunk.add_constant(Value::Int(50));
        chunk.write_op(OpCode::Const, 1);
        chunk.write(idx as u8, 1);
        chunk.write_op(OpCode::JumpIfFalse, 2);
        chunk.write(0, 2);
        chunk.write(3, 2);
        chunk.write_op(OpCode::Halt, 2);

        let listing = disassemble(&chunk, "demo");
        assert!(listing.starts_with("== demo ==\n"));
        assert!(listing.contains("const"));
        assert!(listing.contains("'50'"));
        assert!(listing.contains("-> 0008"), "jump target is resolved:\n{listing}");
        assert!(listing.contains("   | "), "same-line marker appears");
    }
}

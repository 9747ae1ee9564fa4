//! Value: the tagged union every stack slot, register and constant holds.
//!
//! Scalar tags (`Nil`, `Bool`, `Int`, `Float`) carry their payload inline.
//! `Str` and `Array` carry a [`Gc`] pointer to a heap payload owned by the
//! GC heap; those payloads are only ever minted through
//! [`GcHeap`](crate::GcHeap), which registers them in its tracking table.

/// Tolerance used for `Float` equality instead of bitwise comparison.
pub const FLOAT_EQ_EPSILON: f64 = 1e-9;

/// A typed pointer to a GC-managed payload.
///
/// Same idea as a raw `*mut T`, but `Copy` and with the conversions the VM
/// needs in one place. A `Gc<T>` is only valid while its address is present
/// in the GC heap's tracking table.
#[repr(transparent)]
#[derive(Debug)]
pub struct Gc<T> {
    ptr: *mut T,
}

// we need custom clone/copy implementations as the defaults consider "owning" T
// but this represents a pointer to a T, not T itself
impl<T> Clone for Gc<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Gc<T> {}

impl<T> PartialEq for Gc<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr
    }
}

impl<T> Gc<T> {
    /// Wrap a raw payload pointer. Only the GC heap's allocators call this.
    pub(crate) fn from_ptr(ptr: *mut T) -> Self {
        debug_assert!(!ptr.is_null(), "Gc pointer must not be null");
        Self { ptr }
    }

    #[inline]
    pub fn as_ptr(self) -> *mut T {
        self.ptr
    }

    /// The pointer address, used as the key into the GC tracking table.
    #[inline]
    pub fn addr(self) -> usize {
        self.ptr as usize
    }

    /// Get a reference to the payload.
    ///
    /// # Safety
    /// The payload must still be tracked by the GC heap (not yet swept).
    #[inline]
    pub unsafe fn as_ref<'a>(self) -> &'a T {
        // SAFETY: caller guarantees the payload has not been swept
        unsafe { &*self.ptr }
    }

    /// Get a mutable reference to the payload.
    ///
    /// # Safety
    /// Same liveness requirement as [`as_ref`](Gc::as_ref), and no other
    /// reference to the payload may be alive.
    #[inline]
    pub unsafe fn as_mut<'a>(self) -> &'a mut T {
        // SAFETY: caller guarantees liveness and exclusivity
        unsafe { &mut *self.ptr }
    }
}

/// Heap payload of a `Str` value: an owned byte buffer.
#[derive(Debug)]
pub struct StrObject {
    pub bytes: Box<[u8]>,
}

impl StrObject {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Lossy UTF-8 view, for rendering and the string natives.
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// Heap payload of an `Array` value. Elements may themselves reference heap
/// data, so the GC mark phase walks them recursively.
#[derive(Debug)]
pub struct ArrayObject {
    pub values: Vec<Value>,
}

impl ArrayObject {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// The closed tagged union of runtime values.
///
/// Derived `PartialEq` is structural identity (`Str`/`Array` compare by
/// pointer, `Float` bitwise); language-level equality with the float epsilon
/// and string content comparison is [`Value::equal`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Gc<StrObject>),
    Array(Gc<ArrayObject>),
}

impl Value {
    pub fn is_nil(self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn is_bool(self) -> bool {
        matches!(self, Value::Bool(_))
    }

    pub fn is_int(self) -> bool {
        matches!(self, Value::Int(_))
    }

    pub fn is_float(self) -> bool {
        matches!(self, Value::Float(_))
    }

    pub fn is_str(self) -> bool {
        matches!(self, Value::Str(_))
    }

    pub fn is_array(self) -> bool {
        matches!(self, Value::Array(_))
    }

    pub fn type_name(self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Array(_) => "array",
        }
    }

    /// Truthiness: `Nil` and zero are false, empty strings are false,
    /// everything else is true.
    pub fn is_truthy(self) -> bool {
        match self {
            Value::Nil => false,
            Value::Bool(b) => b,
            Value::Int(n) => n != 0,
            Value::Float(f) => f != 0.0,
            // SAFETY: values in circulation reference live tracked payloads
            Value::Str(s) => !unsafe { s.as_ref() }.is_empty(),
            Value::Array(_) => true,
        }
    }

    /// Coercion used when mixed arithmetic promotes to `Float`.
    /// Arithmetic never rejects a type; non-numerics contribute 0.0
    /// (`Bool` contributes 0.0/1.0).
    pub fn as_f64(self) -> f64 {
        match self {
            Value::Int(n) => n as f64,
            Value::Float(f) => f,
            Value::Bool(b) => {
                if b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Nil | Value::Str(_) | Value::Array(_) => 0.0,
        }
    }

    /// `Int + Int` stays `Int` (wrapping); anything else promotes to `Float`.
    pub fn add(self, rhs: Value) -> Value {
        if let (Value::Int(a), Value::Int(b)) = (self, rhs) {
            return Value::Int(a.wrapping_add(b));
        }
        Value::Float(self.as_f64() + rhs.as_f64())
    }

    pub fn subtract(self, rhs: Value) -> Value {
        if let (Value::Int(a), Value::Int(b)) = (self, rhs) {
            return Value::Int(a.wrapping_sub(b));
        }
        Value::Float(self.as_f64() - rhs.as_f64())
    }

    pub fn multiply(self, rhs: Value) -> Value {
        if let (Value::Int(a), Value::Int(b)) = (self, rhs) {
            return Value::Int(a.wrapping_mul(b));
        }
        Value::Float(self.as_f64() * rhs.as_f64())
    }

    /// Integer division for `Int / Int` with a non-zero divisor; everything
    /// else promotes to `Float`. A zero float divisor yields IEEE infinity,
    /// never an error.
    pub fn divide(self, rhs: Value) -> Value {
        if let (Value::Int(a), Value::Int(b)) = (self, rhs)
            && b != 0
        {
            return Value::Int(a.wrapping_div(b));
        }
        Value::Float(self.as_f64() / rhs.as_f64())
    }

    /// Negates `Int`/`Float`; any other tag yields `Nil`.
    pub fn negate(self) -> Value {
        match self {
            Value::Int(n) => Value::Int(n.wrapping_neg()),
            Value::Float(f) => Value::Float(-f),
            _ => Value::Nil,
        }
    }

    /// Language equality: false across tags, epsilon-tolerant for floats,
    /// content comparison for strings. Arrays are not equal-comparable.
    pub fn equal(self, rhs: Value) -> bool {
        match (self, rhs) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => (a - b).abs() < FLOAT_EQ_EPSILON,
            (Value::Str(a), Value::Str(b)) => {
                // SAFETY: values in circulation reference live tracked payloads
                let (a, b) = unsafe { (a.as_ref(), b.as_ref()) };
                a.bytes == b.bytes
            }
            _ => false,
        }
    }

    /// Numeric-only ordering; mixed `Int`/`Float` promotes to `Float`.
    /// Non-numeric operands are never less than anything.
    pub fn less(self, rhs: Value) -> bool {
        match (self, rhs) {
            (Value::Int(a), Value::Int(b)) => a < b,
            (Value::Int(a), Value::Float(b)) => (a as f64) < b,
            (Value::Float(a), Value::Int(b)) => a < b as f64,
            (Value::Float(a), Value::Float(b)) => a < b,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GcHeap;

    #[test]
    fn int_arithmetic_stays_int() {
        assert_eq!(Value::Int(2).add(Value::Int(3)), Value::Int(5));
        assert_eq!(Value::Int(2).subtract(Value::Int(3)), Value::Int(-1));
        assert_eq!(Value::Int(6).multiply(Value::Int(7)), Value::Int(42));
        assert_eq!(Value::Int(7).divide(Value::Int(2)), Value::Int(3));
    }

    #[test]
    fn mixed_arithmetic_promotes_to_float() {
        assert_eq!(Value::Int(2).add(Value::Float(3.5)), Value::Float(5.5));
        assert_eq!(Value::Float(1.5).multiply(Value::Int(2)), Value::Float(3.0));
    }

    #[test]
    fn int_overflow_wraps() {
        assert_eq!(
            Value::Int(i64::MAX).add(Value::Int(1)),
            Value::Int(i64::MIN),
            "Int addition uses wrapping semantics"
        );
        assert_eq!(
            Value::Int(i64::MIN).divide(Value::Int(-1)),
            Value::Int(i64::MIN),
            "Int division uses wrapping semantics"
        );
    }

    #[test]
    fn division_by_zero_falls_through_to_infinity() {
        let result = Value::Int(4).divide(Value::Int(0));
        match result {
            Value::Float(f) => {
                assert!(f.is_infinite() && f > 0.0, "expected +inf, got {f}")
            }
            other => panic!("expected a Float result, got {other:?}"),
        }
    }

    #[test]
    fn float_equality_uses_epsilon() {
        let sum = Value::Float(0.1 + 0.2);
        assert!(
            sum.equal(Value::Float(0.3)),
            "0.1 + 0.2 must compare equal to 0.3 under the epsilon"
        );
        assert!(!Value::Float(0.3).equal(Value::Float(0.3 + 1e-8)));
    }

    #[test]
    fn equality_is_false_across_tags() {
        assert!(!Value::Int(1).equal(Value::Float(1.0)));
        assert!(!Value::Nil.equal(Value::Bool(false)));
        assert!(Value::Nil.equal(Value::Nil));
    }

    #[test]
    fn string_equality_compares_content() {
        let mut heap = GcHeap::new();
        let a = heap.alloc_str("hello").expect("alloc");
        let b = heap.alloc_str("hello").expect("alloc");
        let c = heap.alloc_str("other").expect("alloc");

        assert_ne!(a, b, "distinct allocations have distinct identity");
        assert!(a.equal(b), "same content must compare equal");
        assert!(!a.equal(c));
    }

    #[test]
    fn arrays_are_not_equal_comparable() {
        let mut heap = GcHeap::new();
        let a = heap.alloc_array(vec![Value::Int(1)]).expect("alloc");
        assert!(!a.equal(a), "arrays are defined as never equal");
    }

    #[test]
    fn truthiness_table() {
        let mut heap = GcHeap::new();
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::Bool(true).is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(Value::Int(-1).is_truthy());
        assert!(!Value::Float(0.0).is_truthy());
        assert!(Value::Float(0.5).is_truthy());

        let empty = heap.alloc_str("").expect("alloc");
        let full = heap.alloc_str("x").expect("alloc");
        assert!(!empty.is_truthy(), "empty string is falsy");
        assert!(full.is_truthy());

        let arr = heap.alloc_array(Vec::new()).expect("alloc");
        assert!(arr.is_truthy(), "arrays are always truthy");
    }

    #[test]
    fn negate_non_numeric_yields_nil() {
        assert_eq!(Value::Int(3).negate(), Value::Int(-3));
        assert_eq!(Value::Float(2.5).negate(), Value::Float(-2.5));
        assert_eq!(Value::Bool(true).negate(), Value::Nil);
        assert_eq!(Value::Nil.negate(), Value::Nil);
    }

    #[test]
    fn less_promotes_mixed_numerics() {
        assert!(Value::Int(1).less(Value::Float(1.5)));
        assert!(Value::Float(0.5).less(Value::Int(1)));
        assert!(!Value::Int(2).less(Value::Int(2)));
        assert!(
            !Value::Bool(false).less(Value::Bool(true)),
            "ordering is numeric-only"
        );
    }
}

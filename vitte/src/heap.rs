use std::collections::HashMap;
use std::mem;

use log::debug;

use crate::{ArrayObject, Gc, StrObject, Value, Vm, VmError, VmErrorKind};

/// The next-collection threshold never drops below this.
pub const GC_THRESHOLD_FLOOR: usize = 1024 * 1024;

/// Default heap byte budget. Exceeding the budget is reported as an
/// out-of-memory error to the caller, never an abort.
pub const HEAP_LIMIT_DEFAULT: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ObjKind {
    Str,
    Array,
}

#[derive(Debug, Clone, Copy)]
struct ObjEntry {
    size: usize,
    marked: bool,
    kind: ObjKind,
}

/// Mark-sweep heap: a tracking table from payload address to size and mark
/// bit, plus the collection threshold policy.
///
/// Every heap `Value` payload is minted here and registered in the table at
/// allocation time; an untracked payload would be invisible to collection.
/// Collection is a stop-the-world pass the caller invokes between
/// executions, typically when [`should_collect`](GcHeap::should_collect)
/// reports the threshold was crossed.
#[derive(Debug)]
pub struct GcHeap {
    objects: HashMap<usize, ObjEntry, ahash::RandomState>,
    bytes_allocated: usize,
    next_gc: usize,
    max_bytes: usize,
    gc_runs: usize,
}

impl Default for GcHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl GcHeap {
    pub fn new() -> Self {
        Self::with_limit(HEAP_LIMIT_DEFAULT)
    }

    pub fn with_limit(max_bytes: usize) -> Self {
        Self {
            objects: HashMap::default(),
            bytes_allocated: 0,
            next_gc: GC_THRESHOLD_FLOOR,
            max_bytes,
            gc_runs: 0,
        }
    }

    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }

    pub fn next_gc(&self) -> usize {
        self.next_gc
    }

    pub fn gc_runs(&self) -> usize {
        self.gc_runs
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn is_tracked(&self, addr: usize) -> bool {
        self.objects.contains_key(&addr)
    }

    /// Recorded allocation size of a tracked object.
    pub fn tracked_size(&self, addr: usize) -> Option<usize> {
        self.objects.get(&addr).map(|entry| entry.size)
    }

    /// Whether allocation pressure has crossed the collection threshold.
    pub fn should_collect(&self) -> bool {
        self.bytes_allocated > self.next_gc
    }

    fn check_budget(&self, size: usize) -> Result<(), VmError> {
        if self.bytes_allocated + size > self.max_bytes {
            return Err(VmError::new(
                VmErrorKind::OutOfMemory,
                format!(
                    "heap limit exceeded: {} live + {} requested > {} budget",
                    self.bytes_allocated, size, self.max_bytes
                ),
            ));
        }
        Ok(())
    }

    fn track(&mut self, addr: usize, size: usize, kind: ObjKind) {
        debug_assert!(!self.objects.contains_key(&addr), "address tracked twice");
        self.objects.insert(
            addr,
            ObjEntry {
                size,
                marked: false,
                kind,
            },
        );
        self.bytes_allocated += size;
    }

    /// Allocate and track a string payload.
    pub fn alloc_str(&mut self, text: &str) -> Result<Value, VmError> {
        self.alloc_str_bytes(text.as_bytes())
    }

    pub fn alloc_str_bytes(&mut self, bytes: &[u8]) -> Result<Value, VmError> {
        let size = mem::size_of::<StrObject>() + bytes.len();
        self.check_budget(size)?;

        let payload = Box::new(StrObject {
            bytes: bytes.to_vec().into_boxed_slice(),
        });
        let ptr = Box::into_raw(payload);
        self.track(ptr as usize, size, ObjKind::Str);
        Ok(Value::Str(Gc::from_ptr(ptr)))
    }

    /// Allocate and track an array payload taking ownership of `values`.
    pub fn alloc_array(&mut self, values: Vec<Value>) -> Result<Value, VmError> {
        let size = mem::size_of::<ArrayObject>() + values.len() * mem::size_of::<Value>();
        self.check_budget(size)?;

        let payload = Box::new(ArrayObject { values });
        let ptr = Box::into_raw(payload);
        self.track(ptr as usize, size, ObjKind::Array);
        Ok(Value::Array(Gc::from_ptr(ptr)))
    }

    /// Clear all mark bits; the start of a collection cycle.
    pub fn reset_marks(&mut self) {
        for entry in self.objects.values_mut() {
            entry.marked = false;
        }
    }

    /// Mark one value. Arrays are marked before their elements are visited,
    /// so a cyclic array graph terminates: an already-marked array is not
    /// descended into again.
    pub fn mark_value(&mut self, value: Value) {
        match value {
            Value::Str(s) => {
                if let Some(entry) = self.objects.get_mut(&s.addr()) {
                    entry.marked = true;
                }
            }
            Value::Array(a) => {
                match self.objects.get_mut(&a.addr()) {
                    Some(entry) if entry.marked => return,
                    Some(entry) => entry.marked = true,
                    None => return,
                }
                // SAFETY: the entry exists and sweep has not run, so the
                // payload behind the pointer is live
                let len = unsafe { a.as_ref() }.values.len();
                for index in 0..len {
                    // SAFETY: same liveness argument; elements are copied out
                    let element = unsafe { a.as_ref() }.values[index];
                    self.mark_value(element);
                }
            }
            _ => {}
        }
    }

    /// Mark everything reachable from the VM's roots: the live operand-stack
    /// slots and every register.
    pub fn mark_roots(&mut self, vm: &Vm) {
        for &value in vm.stack_slice() {
            self.mark_value(value);
        }
        for &value in vm.registers() {
            self.mark_value(value);
        }
    }

    /// Free every unmarked object and clear survivor marks for the next
    /// cycle. Returns (objects freed, bytes freed).
    pub fn sweep(&mut self) -> (usize, usize) {
        let dead: Vec<(usize, ObjEntry)> = self
            .objects
            .iter()
            .filter(|(_, entry)| !entry.marked)
            .map(|(&addr, &entry)| (addr, entry))
            .collect();

        let mut freed_bytes = 0;
        for (addr, entry) in &dead {
            self.objects.remove(addr);
            self.bytes_allocated -= entry.size;
            freed_bytes += entry.size;
            // SAFETY: the payload came from Box::into_raw in alloc_* and is
            // unreachable from every root, so no live Value refers to it
            unsafe { free_payload(*addr, entry.kind) };
        }

        for entry in self.objects.values_mut() {
            entry.marked = false;
        }
        (dead.len(), freed_bytes)
    }

    /// One full collection cycle over the given VM's roots. Returns
    /// (objects freed, bytes freed).
    pub fn collect(&mut self, vm: &Vm) -> (usize, usize) {
        self.reset_marks();
        self.mark_roots(vm);
        let (freed_objects, freed_bytes) = self.sweep();
        self.next_gc = (self.bytes_allocated * 2).max(GC_THRESHOLD_FLOOR);
        self.gc_runs += 1;
        debug!(
            "gc #{}: freed {} objects / {} bytes, {} bytes live, next collection at {}",
            self.gc_runs, freed_objects, freed_bytes, self.bytes_allocated, self.next_gc
        );
        (freed_objects, freed_bytes)
    }
}

/// # Safety
/// `addr` must be an address produced by `Box::into_raw` for a payload of
/// `kind`, and no live `Value` may still refer to it.
unsafe fn free_payload(addr: usize, kind: ObjKind) {
    // SAFETY: forwarded from the caller
    unsafe {
        match kind {
            ObjKind::Str => drop(Box::from_raw(addr as *mut StrObject)),
            ObjKind::Array => drop(Box::from_raw(addr as *mut ArrayObject)),
        }
    }
}

impl Drop for GcHeap {
    fn drop(&mut self) {
        for (&addr, entry) in &self.objects {
            // SAFETY: the heap owns every tracked payload; the tagged Values
            // pointing at them die with the heap
            unsafe { free_payload(addr, entry.kind) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Vm;

    fn addr_of(value: Value) -> usize {
        match value {
            Value::Str(s) => s.addr(),
            Value::Array(a) => a.addr(),
            other => panic!("not a heap value: {other:?}"),
        }
    }

    #[test]
    fn allocation_tracks_size_accounting() {
        let mut heap = GcHeap::new();
        assert_eq!(heap.bytes_allocated(), 0);

        let s = heap.alloc_str("hello").expect("alloc");
        let expected = mem::size_of::<StrObject>() + 5;
        assert_eq!(heap.bytes_allocated(), expected);
        assert_eq!(heap.tracked_size(addr_of(s)), Some(expected));

        let a = heap.alloc_array(vec![Value::Int(1), Value::Int(2)]).expect("alloc");
        assert!(heap.is_tracked(addr_of(a)));
        assert_eq!(heap.object_count(), 2);
    }

    #[test]
    fn collect_frees_unreachable_and_keeps_reachable() {
        let mut heap = GcHeap::new();
        let mut vm = Vm::new();

        let live = heap.alloc_str("live").expect("alloc");
        let dead = heap.alloc_str("dead value").expect("alloc");
        let live_size = heap.tracked_size(addr_of(live)).expect("tracked");
        let dead_size = heap.tracked_size(addr_of(dead)).expect("tracked");
        let before = heap.bytes_allocated();

        vm.push(live);
        heap.collect(&vm);

        assert!(heap.is_tracked(addr_of(live)), "rooted object survives");
        assert_eq!(
            heap.tracked_size(addr_of(live)),
            Some(live_size),
            "survivor keeps its recorded size"
        );
        assert!(!heap.is_tracked(addr_of(dead)));
        assert_eq!(
            heap.bytes_allocated(),
            before - dead_size,
            "accounting shrinks by exactly the dead object's size"
        );
        assert_eq!(heap.gc_runs(), 1);
    }

    #[test]
    fn registers_are_roots() {
        let mut heap = GcHeap::new();
        let mut vm = Vm::new();

        let value = heap.alloc_str("in a register").expect("alloc");
        vm.load_register(3, value);

        heap.collect(&vm);
        assert!(heap.is_tracked(addr_of(value)));

        vm.load_register(3, Value::Nil);
        heap.collect(&vm);
        assert!(!heap.is_tracked(addr_of(value)));
    }

    #[test]
    fn mark_walks_nested_arrays() {
        let mut heap = GcHeap::new();
        let mut vm = Vm::new();

        let inner_str = heap.alloc_str("leaf").expect("alloc");
        let inner = heap.alloc_array(vec![inner_str]).expect("alloc");
        let outer = heap.alloc_array(vec![inner, Value::Int(7)]).expect("alloc");

        vm.push(outer);
        heap.collect(&vm);

        assert!(heap.is_tracked(addr_of(outer)));
        assert!(heap.is_tracked(addr_of(inner)));
        assert!(heap.is_tracked(addr_of(inner_str)), "marking is transitive");
    }

    #[test]
    fn mark_tolerates_cyclic_arrays() {
        let mut heap = GcHeap::new();
        let mut vm = Vm::new();

        let cyclic = heap.alloc_array(Vec::new()).expect("alloc");
        if let Value::Array(gc) = cyclic {
            // SAFETY: just allocated, still tracked, no other reference held
            unsafe { gc.as_mut() }.values.push(cyclic);
        }

        vm.push(cyclic);
        heap.collect(&vm);
        assert!(heap.is_tracked(addr_of(cyclic)), "cycle marked exactly once");

        vm.pop();
        heap.collect(&vm);
        assert!(
            !heap.is_tracked(addr_of(cyclic)),
            "unreachable cycle is swept"
        );
    }

    #[test]
    fn threshold_grows_after_collection() {
        let mut heap = GcHeap::new();
        let vm = Vm::new();

        heap.collect(&vm);
        assert_eq!(
            heap.next_gc(),
            GC_THRESHOLD_FLOOR,
            "threshold never drops below the floor"
        );
        assert!(!heap.should_collect());
    }

    #[test]
    fn exceeding_the_budget_is_out_of_memory() {
        let mut heap = GcHeap::with_limit(64);
        let err = heap
            .alloc_str("a string that certainly does not fit in 64 bytes")
            .expect_err("budget must reject the allocation");
        assert_eq!(err.kind(), VmErrorKind::OutOfMemory);
        assert_eq!(heap.bytes_allocated(), 0, "failed allocation leaves no trace");
    }
}

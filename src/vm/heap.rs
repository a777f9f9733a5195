use std::collections::HashMap;
use std::time::Instant;

use super::object::{
    BoundMethod, Class, Closure, Function, Instance, LoxString, Native, Object, ObjectType,
    Upvalue, hash_string,
};
use super::value::format_number;
use super::Value;
use crate::config::RuntimeConfig;

// =============================================================================
// GcRef - Stable handle to a heap object
// =============================================================================

/// Reference to a heap object: an index into the heap's arena. Handles stay
/// valid until the object is swept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GcRef {
    index: usize,
}

impl GcRef {
    pub(crate) fn from_index(index: usize) -> Self {
        Self { index }
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

/// One arena slot: the object plus its collector bookkeeping.
#[derive(Debug)]
struct HeapEntry {
    marked: bool,
    /// Next object in allocation order (intrusive list).
    next: Option<GcRef>,
    /// Bytes charged for this object.
    size: usize,
    object: Object,
}

/// GC statistics.
#[derive(Debug, Clone, Default)]
pub struct GcStats {
    pub cycles: usize,
    pub objects_freed: usize,
    pub bytes_freed: usize,
    pub total_pause_us: u64,
    pub max_pause_us: u64,
}

// =============================================================================
// Heap - Arena with an intrusive allocation list and mark-sweep collection
// =============================================================================

/// The garbage-collected heap.
///
/// Objects live in an arena of slots; freed slots go on a free list and are
/// reused by later allocations. Every live object is also linked into one
/// allocation list, which the sweep phase walks.
pub struct Heap {
    entries: Vec<Option<HeapEntry>>,
    free_slots: Vec<usize>,
    /// Most recently allocated object
    head: Option<GcRef>,
    /// Intern set, bucketed by string hash. Weak: never marked.
    strings: HashMap<u32, Vec<GcRef>>,
    /// Values protected while their owner is under construction
    temp_roots: Vec<Value>,
    /// Marked objects whose children are not traced yet
    gray: Vec<GcRef>,
    bytes_allocated: usize,
    next_gc: usize,
    min_threshold: usize,
    growth_factor: usize,
    gc_enabled: bool,
    stress: bool,
    stats: GcStats,
}

impl Heap {
    pub fn new(config: &RuntimeConfig) -> Self {
        Self {
            entries: Vec::new(),
            free_slots: Vec::new(),
            head: None,
            strings: HashMap::new(),
            temp_roots: Vec::new(),
            gray: Vec::new(),
            bytes_allocated: 0,
            next_gc: config.gc_initial_threshold,
            min_threshold: config.gc_min_threshold,
            growth_factor: config.gc_growth_factor.max(1),
            gc_enabled: config.gc_enabled,
            stress: config.gc_stress,
            stats: GcStats::default(),
        }
    }

    /// Check if allocating `additional` bytes should trigger a collection.
    pub fn should_collect(&self, additional: usize) -> bool {
        self.gc_enabled && (self.stress || self.bytes_allocated + additional > self.next_gc)
    }

    /// Place `object` on the heap. Never collects; callers decide that first
    /// with [`Heap::should_collect`].
    pub fn alloc(&mut self, object: Object) -> GcRef {
        let size = object.size();
        let entry = HeapEntry {
            marked: false,
            next: self.head,
            size,
            object,
        };

        let r = match self.free_slots.pop() {
            Some(index) => {
                self.entries[index] = Some(entry);
                GcRef { index }
            }
            None => {
                self.entries.push(Some(entry));
                GcRef {
                    index: self.entries.len() - 1,
                }
            }
        };

        self.head = Some(r);
        self.bytes_allocated += size;
        tracing::trace!(index = r.index, size, "allocate");
        r
    }

    /// Return the interned string with this content, allocating it if needed.
    pub fn alloc_string(&mut self, chars: &str) -> GcRef {
        if let Some(r) = self.find_string(chars) {
            return r;
        }
        self.alloc_interned(LoxString::new(chars))
    }

    /// Allocate `string` and register it in the intern set. The caller has
    /// checked that no string with the same content exists.
    pub fn alloc_interned(&mut self, string: LoxString) -> GcRef {
        let hash = string.hash();
        let r = self.alloc(Object::String(string));
        self.strings.entry(hash).or_default().push(r);
        r
    }

    /// Look up an interned string by content.
    pub fn find_string(&self, chars: &str) -> Option<GcRef> {
        let bucket = self.strings.get(&hash_string(chars))?;
        bucket
            .iter()
            .copied()
            .find(|r| self.string(*r).as_str() == chars)
    }

    /// Charge `bytes` of growth inside an existing object (e.g. a chunk).
    pub fn grow(&mut self, r: GcRef, bytes: usize) {
        self.entry_mut(r).size += bytes;
        self.bytes_allocated += bytes;
    }

    // -------------------------------------------------------------------------
    // Access
    // -------------------------------------------------------------------------

    fn entry(&self, r: GcRef) -> &HeapEntry {
        match self.entries.get(r.index) {
            Some(Some(entry)) => entry,
            _ => panic!("dangling object reference #{}", r.index),
        }
    }

    fn entry_mut(&mut self, r: GcRef) -> &mut HeapEntry {
        match self.entries.get_mut(r.index) {
            Some(Some(entry)) => entry,
            _ => panic!("dangling object reference #{}", r.index),
        }
    }

    pub fn get(&self, r: GcRef) -> &Object {
        &self.entry(r).object
    }

    pub fn get_mut(&mut self, r: GcRef) -> &mut Object {
        &mut self.entry_mut(r).object
    }

    /// Whether `r` still names a live (unswept) object.
    pub fn is_live(&self, r: GcRef) -> bool {
        matches!(self.entries.get(r.index), Some(Some(_)))
    }

    pub fn object_type(&self, r: GcRef) -> ObjectType {
        self.get(r).object_type()
    }

    pub fn string(&self, r: GcRef) -> &LoxString {
        match self.get(r) {
            Object::String(s) => s,
            other => panic!("expected string at #{}, found {:?}", r.index, other.object_type()),
        }
    }

    pub fn upvalue(&self, r: GcRef) -> &Upvalue {
        match self.get(r) {
            Object::Upvalue(u) => u,
            other => panic!("expected upvalue at #{}, found {:?}", r.index, other.object_type()),
        }
    }

    pub fn upvalue_mut(&mut self, r: GcRef) -> &mut Upvalue {
        match self.get_mut(r) {
            Object::Upvalue(u) => u,
            other => panic!("expected upvalue at #{}, found {:?}", r.index, other.object_type()),
        }
    }

    pub fn function(&self, r: GcRef) -> &Function {
        match self.get(r) {
            Object::Function(f) => f,
            other => panic!("expected function at #{}, found {:?}", r.index, other.object_type()),
        }
    }

    pub fn function_mut(&mut self, r: GcRef) -> &mut Function {
        match self.get_mut(r) {
            Object::Function(f) => f,
            other => panic!("expected function at #{}, found {:?}", r.index, other.object_type()),
        }
    }

    pub fn closure(&self, r: GcRef) -> &Closure {
        match self.get(r) {
            Object::Closure(c) => c,
            other => panic!("expected closure at #{}, found {:?}", r.index, other.object_type()),
        }
    }

    pub fn closure_mut(&mut self, r: GcRef) -> &mut Closure {
        match self.get_mut(r) {
            Object::Closure(c) => c,
            other => panic!("expected closure at #{}, found {:?}", r.index, other.object_type()),
        }
    }

    pub fn class(&self, r: GcRef) -> &Class {
        match self.get(r) {
            Object::Class(c) => c,
            other => panic!("expected class at #{}, found {:?}", r.index, other.object_type()),
        }
    }

    pub fn class_mut(&mut self, r: GcRef) -> &mut Class {
        match self.get_mut(r) {
            Object::Class(c) => c,
            other => panic!("expected class at #{}, found {:?}", r.index, other.object_type()),
        }
    }

    pub fn instance(&self, r: GcRef) -> &Instance {
        match self.get(r) {
            Object::Instance(i) => i,
            other => panic!("expected instance at #{}, found {:?}", r.index, other.object_type()),
        }
    }

    pub fn instance_mut(&mut self, r: GcRef) -> &mut Instance {
        match self.get_mut(r) {
            Object::Instance(i) => i,
            other => panic!("expected instance at #{}, found {:?}", r.index, other.object_type()),
        }
    }

    pub fn bound_method(&self, r: GcRef) -> &BoundMethod {
        match self.get(r) {
            Object::BoundMethod(b) => b,
            other => panic!("expected bound method at #{}, found {:?}", r.index, other.object_type()),
        }
    }

    pub fn native(&self, r: GcRef) -> &Native {
        match self.get(r) {
            Object::Native(n) => n,
            other => panic!("expected native at #{}, found {:?}", r.index, other.object_type()),
        }
    }

    /// Type name of a value, looking through object references.
    pub fn type_name(&self, value: Value) -> &'static str {
        match value {
            Value::Obj(r) => match self.object_type(r) {
                ObjectType::String => "string",
                ObjectType::Function | ObjectType::Closure | ObjectType::BoundMethod => "function",
                ObjectType::Native => "native",
                ObjectType::Upvalue => "upvalue",
                ObjectType::Class => "class",
                ObjectType::Instance => "instance",
            },
            other => other.type_name(),
        }
    }

    /// Render a value the way `print` shows it.
    pub fn format_value(&self, value: Value) -> String {
        match value {
            Value::Nil => "nil".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(n),
            Value::Obj(r) => self.format_object(r),
        }
    }

    fn format_object(&self, r: GcRef) -> String {
        match self.get(r) {
            Object::String(s) => s.as_str().to_string(),
            Object::Function(f) => match f.name {
                Some(name) => format!("<fn {}>", self.string(name).as_str()),
                None => "<script>".to_string(),
            },
            Object::Closure(c) => self.format_object(c.function),
            Object::Upvalue(_) => "upvalue".to_string(),
            Object::Class(c) => self.string(c.name).as_str().to_string(),
            Object::Instance(i) => {
                format!("{} instance", self.string(self.class(i.class).name).as_str())
            }
            Object::BoundMethod(b) => self.format_object(b.method),
            Object::Native(_) => "<native fn>".to_string(),
        }
    }

    // -------------------------------------------------------------------------
    // Scoped roots
    // -------------------------------------------------------------------------

    /// Protect `value` from collection until it is popped.
    pub fn push_root(&mut self, value: Value) {
        self.temp_roots.push(value);
    }

    pub fn pop_root(&mut self) -> Option<Value> {
        self.temp_roots.pop()
    }

    /// Drop the most recent registration of `value`.
    pub fn remove_root(&mut self, value: Value) -> bool {
        match self.temp_roots.iter().rposition(|v| *v == value) {
            Some(position) => {
                self.temp_roots.remove(position);
                true
            }
            None => false,
        }
    }

    pub fn temp_root_count(&self) -> usize {
        self.temp_roots.len()
    }

    // -------------------------------------------------------------------------
    // Collection
    // -------------------------------------------------------------------------

    /// Mark a value reachable.
    pub fn mark_value(&mut self, value: Value) {
        if let Value::Obj(r) = value {
            self.mark_object(r);
        }
    }

    /// Mark an object and queue it for tracing on first visit.
    pub fn mark_object(&mut self, r: GcRef) {
        let entry = self.entry_mut(r);
        if entry.marked {
            return;
        }
        entry.marked = true;
        self.gray.push(r);
    }

    /// Drain the gray worklist, marking everything reachable from it.
    fn trace_references(&mut self) {
        let mut children = Vec::new();
        while let Some(r) = self.gray.pop() {
            children.clear();
            self.get(r).trace(&mut children);
            for child in children.drain(..) {
                self.mark_object(child);
            }
        }
    }

    /// Sweep phase: unlink and free every unmarked object, clear marks on
    /// survivors. Freed strings leave the intern set in the same pass.
    fn sweep(&mut self) -> (usize, usize) {
        let mut freed_objects = 0;
        let mut freed_bytes = 0;
        let mut previous: Option<GcRef> = None;
        let mut current = self.head;

        while let Some(r) = current {
            let entry = self.entry_mut(r);
            let next = entry.next;

            if entry.marked {
                entry.marked = false;
                previous = Some(r);
            } else {
                match previous {
                    Some(p) => self.entry_mut(p).next = next,
                    None => self.head = next,
                }
                freed_bytes += self.release(r);
                freed_objects += 1;
            }

            current = next;
        }

        (freed_objects, freed_bytes)
    }

    /// Free one unlinked object. Returns the bytes released.
    fn release(&mut self, r: GcRef) -> usize {
        let Some(entry) = self.entries[r.index].take() else {
            panic!("double free of object #{}", r.index);
        };

        if let Object::String(s) = &entry.object {
            if let Some(bucket) = self.strings.get_mut(&s.hash()) {
                bucket.retain(|candidate| *candidate != r);
                if bucket.is_empty() {
                    self.strings.remove(&s.hash());
                }
            }
        }

        tracing::trace!(index = r.index, kind = ?entry.object.object_type(), "free");
        self.free_slots.push(r.index);
        self.bytes_allocated -= entry.size;
        entry.size
    }

    /// Perform a full garbage collection cycle. Scoped roots are always
    /// included in addition to `roots`.
    pub fn collect(&mut self, roots: &[Value]) {
        let start = Instant::now();
        let before = self.bytes_allocated;
        tracing::debug!(bytes = before, "gc begin");

        for i in 0..self.temp_roots.len() {
            let value = self.temp_roots[i];
            self.mark_value(value);
        }
        for value in roots {
            self.mark_value(*value);
        }
        self.trace_references();
        let (freed_objects, freed_bytes) = self.sweep();

        self.next_gc = (self.bytes_allocated * self.growth_factor).max(self.min_threshold);

        let pause_us = start.elapsed().as_micros() as u64;
        self.stats.cycles += 1;
        self.stats.objects_freed += freed_objects;
        self.stats.bytes_freed += freed_bytes;
        self.stats.total_pause_us += pause_us;
        self.stats.max_pause_us = self.stats.max_pause_us.max(pause_us);

        tracing::debug!(
            collected = freed_bytes,
            objects = freed_objects,
            from = before,
            to = self.bytes_allocated,
            next_gc = self.next_gc,
            "gc end"
        );
    }

    /// Live objects in allocation list order, newest first.
    pub fn objects(&self) -> impl Iterator<Item = GcRef> + '_ {
        std::iter::successors(self.head, |r| self.entry(*r).next)
    }

    /// Get count of live objects, walking the allocation list.
    pub fn object_count(&self) -> usize {
        self.objects().count()
    }

    /// Number of distinct strings in the intern set.
    pub fn interned_count(&self) -> usize {
        self.strings.values().map(Vec::len).sum()
    }

    /// Get the number of bytes currently allocated.
    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }

    pub fn next_gc(&self) -> usize {
        self.next_gc
    }

    pub fn stats(&self) -> &GcStats {
        &self.stats
    }

    #[cfg(test)]
    fn is_marked(&self, r: GcRef) -> bool {
        self.entry(r).marked
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new(&RuntimeConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heap() -> Heap {
        Heap::default()
    }

    #[test]
    fn test_alloc_and_get() {
        let mut heap = heap();
        let r = heap.alloc(Object::Upvalue(Upvalue::Closed(Value::Number(42.0))));
        assert!(heap.is_live(r));
        assert_eq!(*heap.upvalue(r), Upvalue::Closed(Value::Number(42.0)));
        assert_eq!(heap.object_count(), 1);
        assert!(heap.bytes_allocated() > 0);
    }

    #[test]
    fn test_strings_are_interned() {
        let mut heap = heap();
        let a = heap.alloc_string("hello");
        let b = heap.alloc_string("hello");
        let c = heap.alloc_string("world");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(heap.object_count(), 2);
        assert_eq!(heap.find_string("world"), Some(c));
        assert_eq!(heap.find_string("absent"), None);
    }

    #[test]
    fn test_gc_marks_reachable() {
        let mut heap = heap();
        let r1 = heap.alloc_string("root");
        heap.mark_value(Value::Obj(r1));
        assert!(heap.is_marked(r1));
    }

    #[test]
    fn test_gc_traces_references() {
        let mut heap = heap();
        let name = heap.alloc_string("Point");
        let class = heap.alloc(Object::Class(Class::new(name)));
        let instance = heap.alloc(Object::Instance(Instance::new(class)));
        let garbage = heap.alloc_string("garbage");

        heap.collect(&[Value::Obj(instance)]);

        assert!(heap.is_live(instance));
        assert!(heap.is_live(class));
        assert!(heap.is_live(name));
        assert!(!heap.is_live(garbage));
        assert!(!heap.is_marked(instance), "marks are cleared after sweep");
    }

    #[test]
    fn test_gc_all_garbage() {
        let mut heap = heap();
        for i in 0..10 {
            heap.alloc_string(&format!("s{}", i));
        }
        assert_eq!(heap.object_count(), 10);

        heap.collect(&[]);

        assert_eq!(heap.object_count(), 0);
        assert_eq!(heap.bytes_allocated(), 0);
        assert_eq!(heap.stats().cycles, 1);
        assert_eq!(heap.stats().objects_freed, 10);
    }

    #[test]
    fn test_sweep_unlinks_from_middle_of_list() {
        let mut heap = heap();
        let a = heap.alloc_string("a");
        let b = heap.alloc_string("b");
        let c = heap.alloc_string("c");

        heap.collect(&[Value::Obj(a), Value::Obj(c)]);

        assert!(heap.is_live(a));
        assert!(!heap.is_live(b));
        assert!(heap.is_live(c));
        assert_eq!(heap.object_count(), 2);
    }

    #[test]
    fn test_intern_table_is_weak() {
        let mut heap = heap();
        let kept = heap.alloc_string("kept");
        heap.alloc_string("dropped");
        assert_eq!(heap.interned_count(), 2);

        heap.collect(&[Value::Obj(kept)]);

        assert_eq!(heap.interned_count(), 1);
        assert_eq!(heap.find_string("dropped"), None);
        assert_eq!(heap.find_string("kept"), Some(kept));
    }

    #[test]
    fn test_free_slots_are_reused() {
        let mut heap = heap();
        let dead = heap.alloc_string("dead");
        heap.collect(&[]);
        assert!(!heap.is_live(dead));

        let reused = heap.alloc_string("new");
        assert_eq!(reused.index(), dead.index());
    }

    #[test]
    fn test_temp_roots_survive_collection() {
        let mut heap = heap();
        let r = heap.alloc_string("protected");
        heap.push_root(Value::Obj(r));
        heap.collect(&[]);
        assert!(heap.is_live(r));

        assert_eq!(heap.pop_root(), Some(Value::Obj(r)));
        heap.collect(&[]);
        assert!(!heap.is_live(r));
    }

    #[test]
    fn test_remove_root_takes_latest() {
        let mut heap = heap();
        let a = Value::Obj(heap.alloc_string("a"));
        let b = Value::Obj(heap.alloc_string("b"));
        heap.push_root(a);
        heap.push_root(b);
        heap.push_root(a);

        assert!(heap.remove_root(a));
        assert_eq!(heap.temp_root_count(), 2);
        assert_eq!(heap.pop_root(), Some(b));
        assert!(!heap.remove_root(Value::Nil));
    }

    #[test]
    fn test_threshold_after_collection() {
        let config = RuntimeConfig {
            gc_initial_threshold: 64,
            gc_min_threshold: 16,
            gc_growth_factor: 3,
            ..RuntimeConfig::default()
        };
        let mut heap = Heap::new(&config);
        let r = heap.alloc_string("x");
        assert!(heap.should_collect(1024));

        heap.collect(&[Value::Obj(r)]);
        let live = heap.bytes_allocated();
        assert_eq!(heap.next_gc(), (live * 3).max(16));
    }

    #[test]
    fn test_stress_and_disabled_modes() {
        let stress = Heap::new(&RuntimeConfig::stress());
        assert!(stress.should_collect(0));

        let disabled = Heap::new(&RuntimeConfig {
            gc_enabled: false,
            gc_stress: true,
            ..RuntimeConfig::default()
        });
        assert!(!disabled.should_collect(usize::MAX / 2));
    }

    #[test]
    fn test_closed_upvalue_keeps_value_alive() {
        let mut heap = heap();
        let s = heap.alloc_string("captured");
        let up = heap.alloc(Object::Upvalue(Upvalue::Closed(Value::Obj(s))));
        heap.collect(&[Value::Obj(up)]);
        assert!(heap.is_live(s));
    }

    #[test]
    fn test_format_values() {
        let mut heap = heap();
        let name = heap.alloc_string("Point");
        let class = heap.alloc(Object::Class(Class::new(name)));
        let instance = heap.alloc(Object::Instance(Instance::new(class)));
        let script = heap.alloc(Object::Function(Function::new(None, 0)));
        let fn_name = heap.alloc_string("add");
        let function = heap.alloc(Object::Function(Function::new(Some(fn_name), 2)));

        assert_eq!(heap.format_value(Value::Number(-1.2)), "-1.2");
        assert_eq!(heap.format_value(Value::Nil), "nil");
        assert_eq!(heap.format_value(Value::Bool(true)), "true");
        assert_eq!(heap.format_value(Value::Obj(class)), "Point");
        assert_eq!(heap.format_value(Value::Obj(instance)), "Point instance");
        assert_eq!(heap.format_value(Value::Obj(script)), "<script>");
        assert_eq!(heap.format_value(Value::Obj(function)), "<fn add>");
        assert_eq!(heap.type_name(Value::Obj(name)), "string");
    }

    #[test]
    #[should_panic(expected = "dangling")]
    fn test_dangling_reference_is_fatal() {
        let mut heap = heap();
        let r = heap.alloc_string("gone");
        heap.collect(&[]);
        heap.get(r);
    }
}

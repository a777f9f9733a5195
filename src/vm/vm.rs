use std::collections::HashMap;
use std::io::{self, Write};

use crate::compiler::Compiler;
use crate::config::RuntimeConfig;
use crate::error::{InterpretError, RuntimeError, TraceFrame};
use crate::vm::debug::disassemble_instruction;
use crate::vm::native::BUILTINS;
use crate::vm::object::{
    BoundMethod, Class, Closure, Instance, LoxString, Native, NativeFn, Object, ObjectType,
    Upvalue,
};
use crate::vm::{GcRef, GcStats, Heap, Op, Value};

/// A call frame for the VM.
#[derive(Debug)]
struct CallFrame {
    closure: GcRef,
    /// The closure's function, cached to avoid a lookup per instruction
    function: GcRef,
    /// Offset of the next instruction in the function's chunk
    ip: usize,
    /// Stack index of slot 0 (the callee itself)
    slot_base: usize,
}

/// The lox virtual machine.
pub struct VM {
    stack: Vec<Value>,
    stack_max: usize,
    frames: Vec<CallFrame>,
    frames_max: usize,
    globals: HashMap<GcRef, Value>,
    /// Open upvalues as (stack slot, upvalue), sorted by slot
    open_upvalues: Vec<(usize, GcRef)>,
    heap: Heap,
    init_string: GcRef,
    trace_execution: bool,
    gc_stats: bool,
    /// Output stream for print statements
    output: Box<dyn Write>,
}

impl VM {
    pub fn new() -> Self {
        Self::new_with_config(&RuntimeConfig::default(), Box::new(io::stdout()))
    }

    /// Create a VM with a custom output stream.
    pub fn with_output(output: Box<dyn Write>) -> Self {
        Self::new_with_config(&RuntimeConfig::default(), output)
    }

    /// Create a VM with a custom configuration, printing to stdout.
    pub fn with_config(config: &RuntimeConfig) -> Self {
        Self::new_with_config(config, Box::new(io::stdout()))
    }

    /// Create a new VM with full configuration.
    pub fn new_with_config(config: &RuntimeConfig, output: Box<dyn Write>) -> Self {
        let mut heap = Heap::new(config);
        let init_string = heap.alloc_string("init");

        let mut vm = Self {
            stack: Vec::with_capacity(config.stack_max()),
            stack_max: config.stack_max(),
            frames: Vec::with_capacity(config.frames_max),
            frames_max: config.frames_max,
            globals: HashMap::new(),
            open_upvalues: Vec::new(),
            heap,
            init_string,
            trace_execution: config.trace_execution,
            gc_stats: config.gc_stats,
            output,
        };

        for (name, arity, function) in BUILTINS {
            vm.define_native(name, *arity, *function);
        }
        vm
    }

    /// Get immutable reference to the heap.
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Get mutable reference to the heap.
    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    /// Get GC statistics.
    pub fn gc_stats(&self) -> &GcStats {
        self.heap.stats()
    }

    pub fn stack_len(&self) -> usize {
        self.stack.len()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn open_upvalue_count(&self) -> usize {
        self.open_upvalues.len()
    }

    /// Read a global by name.
    pub fn global(&self, name: &str) -> Option<Value> {
        let key = self.heap.find_string(name)?;
        self.globals.get(&key).copied()
    }

    /// Register a host function as a global.
    pub fn define_native(&mut self, name: &str, arity: u8, function: NativeFn) {
        let name_ref = self.intern(name);
        self.push_root(Value::Obj(name_ref));
        let native = self.alloc(Object::Native(Native {
            name: name.to_string(),
            arity,
            function,
        }));
        self.pop_root();
        self.globals.insert(name_ref, Value::Obj(native));
    }

    // =========================================================================
    // Allocation & collection
    // =========================================================================

    /// Allocate an object, collecting first if the heap is over its threshold.
    pub fn alloc(&mut self, object: Object) -> GcRef {
        if self.heap.should_collect(object.size()) {
            self.collect_garbage();
        }
        self.heap.alloc(object)
    }

    /// Return the interned string for `chars`, allocating it if needed.
    pub fn intern(&mut self, chars: &str) -> GcRef {
        if let Some(r) = self.heap.find_string(chars) {
            return r;
        }
        let string = LoxString::new(chars);
        if self
            .heap
            .should_collect(std::mem::size_of::<Object>() + string.as_str().len())
        {
            self.collect_garbage();
        }
        self.heap.alloc_interned(string)
    }

    /// Protect a value that is not yet reachable from any root.
    pub fn push_root(&mut self, value: Value) {
        self.heap.push_root(value);
    }

    pub fn pop_root(&mut self) -> Option<Value> {
        self.heap.pop_root()
    }

    pub fn remove_root(&mut self, value: Value) -> bool {
        self.heap.remove_root(value)
    }

    /// Run `f` with `value` registered as a root. `f` must leave the root
    /// stack as it found it.
    pub fn with_root<T>(&mut self, value: Value, f: impl FnOnce(&mut Self) -> T) -> T {
        self.push_root(value);
        let depth = self.heap.temp_root_count();
        let result = f(self);
        debug_assert_eq!(self.heap.temp_root_count(), depth);
        self.pop_root();
        result
    }

    /// Append a constant to a heap-resident function's chunk. The value is
    /// rooted while the pool grows, which may trigger a collection.
    pub fn add_constant(&mut self, function: GcRef, value: Value) -> usize {
        self.with_root(value, |vm| {
            let chunk = &mut vm.heap.function_mut(function).chunk;
            let before = chunk.constants_capacity();
            let index = chunk.add_constant(value);
            let grown = chunk.constants_capacity() - before;
            if grown > 0 {
                vm.heap.grow(function, grown * std::mem::size_of::<Value>());
            }
            if vm.heap.should_collect(0) {
                vm.collect_garbage();
            }
            index
        })
    }

    /// Append a byte to a heap-resident function's chunk. The caller keeps
    /// `function` rooted, since growing the code may trigger a collection.
    pub fn emit(&mut self, function: GcRef, byte: u8, line: u32) {
        let growth = self.heap.function(function).chunk.write_growth();
        if growth > 0 && self.heap.should_collect(growth) {
            self.collect_garbage();
        }
        let chunk = &mut self.heap.function_mut(function).chunk;
        let before = chunk.capacity();
        chunk.write(byte, line);
        let grown = chunk.capacity() - before;
        if grown > 0 {
            self.heap.grow(function, grown);
        }
    }

    /// Run a full collection with every root the VM knows about.
    pub fn collect_garbage(&mut self) {
        let mut roots: Vec<Value> = self.stack.clone();
        roots.extend(self.frames.iter().map(|frame| Value::Obj(frame.closure)));
        roots.extend(self.open_upvalues.iter().map(|(_, r)| Value::Obj(*r)));
        for (name, value) in &self.globals {
            roots.push(Value::Obj(*name));
            roots.push(*value);
        }
        roots.push(Value::Obj(self.init_string));
        self.heap.collect(&roots);
    }

    // =========================================================================
    // Entry points
    // =========================================================================

    /// Compile `source` with `compiler` and run it.
    pub fn interpret_source<C: Compiler + ?Sized>(
        &mut self,
        compiler: &mut C,
        source: &str,
    ) -> Result<Value, InterpretError> {
        let function = compiler
            .compile(source, self)
            .map_err(InterpretError::Compile)?;
        self.interpret(function)
    }

    /// Run a compiled top-level function. Returns the value of its final
    /// `RETURN`.
    pub fn interpret(&mut self, function: GcRef) -> Result<Value, InterpretError> {
        let result = self.start(function).and_then(|_| self.run());
        result.map_err(|message| InterpretError::Runtime(self.runtime_error(message)))
    }

    fn start(&mut self, function: GcRef) -> Result<(), String> {
        self.push(Value::Obj(function))?;
        let upvalue_count = self.heap.function(function).upvalue_count;
        let closure = self.alloc(Object::Closure(Closure::new(function, upvalue_count)));
        self.pop();
        self.push(Value::Obj(closure))?;
        self.call(closure, 0)
    }

    /// Build the error trace, then discard all execution state.
    fn runtime_error(&mut self, message: String) -> RuntimeError {
        let trace = self
            .frames
            .iter()
            .rev()
            .map(|frame| {
                let function = self.heap.function(frame.function);
                TraceFrame {
                    line: function.chunk.line_for(frame.ip.saturating_sub(1)),
                    function: function
                        .name
                        .map(|name| self.heap.string(name).as_str().to_string()),
                }
            })
            .collect();
        tracing::debug!(%message, "runtime error");
        self.reset_stack();
        RuntimeError { message, trace }
    }

    fn reset_stack(&mut self) {
        self.stack.clear();
        self.frames.clear();
        self.open_upvalues.clear();
    }

    // =========================================================================
    // Dispatch loop
    // =========================================================================

    fn run(&mut self) -> Result<Value, String> {
        loop {
            if self.trace_execution {
                self.trace_instruction();
            }

            let byte = self.read_byte();
            let Some(op) = Op::from_u8(byte) else {
                panic!("invalid opcode {}", byte);
            };

            match op {
                Op::Constant => {
                    let value = self.read_constant();
                    self.push(value)?;
                }
                Op::Nil => self.push(Value::Nil)?,
                Op::True => self.push(Value::Bool(true))?,
                Op::False => self.push(Value::Bool(false))?,
                Op::Pop => {
                    self.pop();
                }
                Op::PopN => {
                    let count = self.read_byte() as usize;
                    let len = self.stack.len();
                    self.stack.truncate(len - count);
                }
                Op::GetLocal => {
                    let slot = self.read_byte() as usize;
                    let value = self.stack[self.slot_base() + slot];
                    self.push(value)?;
                }
                Op::SetLocal => {
                    let slot = self.read_byte() as usize;
                    let index = self.slot_base() + slot;
                    let value = self.peek(0);
                    self.stack[index] = value;
                }
                Op::GetGlobal => {
                    let name = self.read_string();
                    match self.globals.get(&name) {
                        Some(value) => {
                            let value = *value;
                            self.push(value)?;
                        }
                        None => return Err(self.undefined("variable", name)),
                    }
                }
                Op::DefineGlobal => {
                    let name = self.read_string();
                    let value = self.peek(0);
                    self.globals.insert(name, value);
                    self.pop();
                }
                Op::SetGlobal => {
                    let name = self.read_string();
                    if !self.globals.contains_key(&name) {
                        return Err(self.undefined("variable", name));
                    }
                    let value = self.peek(0);
                    self.globals.insert(name, value);
                }
                Op::GetUpvalue => {
                    let index = self.read_byte() as usize;
                    let upvalue = self.frame_upvalue(index);
                    let value = match *self.heap.upvalue(upvalue) {
                        Upvalue::Open(slot) => self.stack[slot],
                        Upvalue::Closed(value) => value,
                    };
                    self.push(value)?;
                }
                Op::SetUpvalue => {
                    let index = self.read_byte() as usize;
                    let upvalue = self.frame_upvalue(index);
                    let value = self.peek(0);
                    match *self.heap.upvalue(upvalue) {
                        Upvalue::Open(slot) => self.stack[slot] = value,
                        Upvalue::Closed(_) => {
                            *self.heap.upvalue_mut(upvalue) = Upvalue::Closed(value)
                        }
                    }
                }
                Op::GetProperty => {
                    let name = self.read_string();
                    let Some(instance) = self.as_instance(self.peek(0)) else {
                        return Err("Only instances have properties.".to_string());
                    };
                    let field = self.heap.instance(instance).fields.get(&name).copied();
                    match field {
                        Some(value) => {
                            self.pop();
                            self.push(value)?;
                        }
                        None => {
                            let class = self.heap.instance(instance).class;
                            self.bind_method(class, name)?;
                        }
                    }
                }
                Op::SetProperty => {
                    let name = self.read_string();
                    let Some(instance) = self.as_instance(self.peek(1)) else {
                        return Err("Only instances have fields.".to_string());
                    };
                    let value = self.peek(0);
                    self.heap.instance_mut(instance).fields.insert(name, value);
                    let value = self.pop();
                    self.pop();
                    self.push(value)?;
                }
                Op::GetSuper => {
                    let name = self.read_string();
                    let superclass = self.pop_class();
                    self.bind_method(superclass, name)?;
                }
                Op::Equal => {
                    let b = self.pop();
                    let a = self.pop();
                    self.push(Value::Bool(a == b))?;
                }
                Op::Greater => self.binary_number(|a, b| Value::Bool(a > b))?,
                Op::Less => self.binary_number(|a, b| Value::Bool(a < b))?,
                Op::Add => {
                    let (a, b) = (self.peek(1), self.peek(0));
                    if self.is_string(a) && self.is_string(b) {
                        self.concatenate()?;
                    } else if a.is_number() && b.is_number() {
                        self.binary_number(|a, b| Value::Number(a + b))?;
                    } else {
                        return Err("Operands must be two numbers or two strings.".to_string());
                    }
                }
                Op::Subtract => self.binary_number(|a, b| Value::Number(a - b))?,
                Op::Multiply => self.binary_number(|a, b| Value::Number(a * b))?,
                Op::Divide => self.binary_number(|a, b| Value::Number(a / b))?,
                Op::Not => {
                    let value = self.pop();
                    self.push(Value::Bool(value.is_falsey()))?;
                }
                Op::Negate => {
                    let Some(n) = self.peek(0).as_number() else {
                        return Err("Operand must be a number.".to_string());
                    };
                    self.pop();
                    self.push(Value::Number(-n))?;
                }
                Op::Print => {
                    let value = self.pop();
                    let text = self.heap.format_value(value);
                    writeln!(self.output, "{}", text)
                        .map_err(|e| format!("failed to write output: {}", e))?;
                }
                Op::Jump => {
                    let offset = self.read_u16() as usize;
                    self.frame_mut().ip += offset;
                }
                Op::JumpIfFalse => {
                    let offset = self.read_u16() as usize;
                    if self.peek(0).is_falsey() {
                        self.frame_mut().ip += offset;
                    }
                }
                Op::Loop => {
                    let offset = self.read_u16() as usize;
                    self.frame_mut().ip -= offset;
                }
                Op::Call => {
                    let argc = self.read_byte() as usize;
                    self.call_value(self.peek(argc), argc)?;
                }
                Op::Invoke => {
                    let name = self.read_string();
                    let argc = self.read_byte() as usize;
                    self.invoke(name, argc)?;
                }
                Op::SuperInvoke => {
                    let name = self.read_string();
                    let argc = self.read_byte() as usize;
                    let superclass = self.pop_class();
                    self.invoke_from_class(superclass, name, argc)?;
                }
                Op::Closure => self.make_closure()?,
                Op::CloseUpvalue => {
                    self.close_upvalues(self.stack.len() - 1);
                    self.pop();
                }
                Op::Return => {
                    let result = self.pop();
                    let Some(frame) = self.frames.pop() else {
                        unreachable!("return without a call frame");
                    };
                    self.close_upvalues(frame.slot_base);
                    self.stack.truncate(frame.slot_base);
                    if self.frames.is_empty() {
                        return Ok(result);
                    }
                    self.push(result)?;
                }
                Op::Class => {
                    let name = self.read_string();
                    let class = self.alloc(Object::Class(Class::new(name)));
                    self.push(Value::Obj(class))?;
                }
                Op::Inherit => {
                    let Some(superclass) = self.as_class(self.peek(1)) else {
                        return Err("Superclass must be a class.".to_string());
                    };
                    let subclass = self.pop_class();
                    self.heap.class_mut(subclass).superclass = Some(superclass);
                }
                Op::Method => {
                    let name = self.read_string();
                    let method = self.peek(0).as_obj();
                    let class = self.as_class(self.peek(1));
                    if let (Some(method), Some(class)) = (method, class) {
                        self.heap.class_mut(class).methods.insert(name, method);
                    }
                    self.pop();
                }
            }
        }
    }

    // =========================================================================
    // Frames & operand decoding
    // =========================================================================

    fn frame(&self) -> &CallFrame {
        let Some(frame) = self.frames.last() else {
            unreachable!("no active call frame");
        };
        frame
    }

    fn frame_mut(&mut self) -> &mut CallFrame {
        let Some(frame) = self.frames.last_mut() else {
            unreachable!("no active call frame");
        };
        frame
    }

    fn slot_base(&self) -> usize {
        self.frame().slot_base
    }

    fn read_byte(&mut self) -> u8 {
        let Some(frame) = self.frames.last_mut() else {
            unreachable!("no active call frame");
        };
        let byte = self.heap.function(frame.function).chunk.code()[frame.ip];
        frame.ip += 1;
        byte
    }

    fn read_u16(&mut self) -> u16 {
        let hi = self.read_byte();
        let lo = self.read_byte();
        u16::from_be_bytes([hi, lo])
    }

    fn read_constant(&mut self) -> Value {
        let index = self.read_byte() as usize;
        let function = self.frame().function;
        self.heap.function(function).chunk.constants()[index]
    }

    fn read_string(&mut self) -> GcRef {
        match self.read_constant() {
            Value::Obj(r) => r,
            other => panic!("expected a name constant, found {:?}", other),
        }
    }

    fn frame_upvalue(&self, index: usize) -> GcRef {
        self.heap.closure(self.frame().closure).upvalues[index]
    }

    // =========================================================================
    // Stack
    // =========================================================================

    fn push(&mut self, value: Value) -> Result<(), String> {
        if self.stack.len() >= self.stack_max {
            return Err("Stack overflow.".to_string());
        }
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self) -> Value {
        match self.stack.pop() {
            Some(value) => value,
            None => panic!("value stack underflow"),
        }
    }

    fn peek(&self, distance: usize) -> Value {
        self.stack[self.stack.len() - 1 - distance]
    }

    fn pop_class(&mut self) -> GcRef {
        let value = self.pop();
        match self.as_class(value) {
            Some(class) => class,
            None => panic!("expected a class on the stack, found {:?}", value),
        }
    }

    // =========================================================================
    // Operations
    // =========================================================================

    fn binary_number(&mut self, op: impl FnOnce(f64, f64) -> Value) -> Result<(), String> {
        let (Some(a), Some(b)) = (self.peek(1).as_number(), self.peek(0).as_number()) else {
            return Err("Operands must be numbers.".to_string());
        };
        self.pop();
        self.pop();
        self.push(op(a, b))
    }

    /// Both operands stay on the stack until the result is interned.
    fn concatenate(&mut self) -> Result<(), String> {
        let (Some(a), Some(b)) = (self.peek(1).as_obj(), self.peek(0).as_obj()) else {
            unreachable!("concatenate expects two strings");
        };
        let mut chars = String::with_capacity(
            self.heap.string(a).as_str().len() + self.heap.string(b).as_str().len(),
        );
        chars.push_str(self.heap.string(a).as_str());
        chars.push_str(self.heap.string(b).as_str());

        let result = self.intern(&chars);
        self.pop();
        self.pop();
        self.push(Value::Obj(result))
    }

    fn call_value(&mut self, callee: Value, argc: usize) -> Result<(), String> {
        if let Value::Obj(r) = callee {
            match self.heap.object_type(r) {
                ObjectType::Closure => return self.call(r, argc),
                ObjectType::BoundMethod => {
                    let bound = self.heap.bound_method(r);
                    let (receiver, method) = (bound.receiver, bound.method);
                    let slot = self.stack.len() - argc - 1;
                    self.stack[slot] = receiver;
                    return self.call(method, argc);
                }
                ObjectType::Class => {
                    let instance = self.alloc(Object::Instance(Instance::new(r)));
                    let slot = self.stack.len() - argc - 1;
                    self.stack[slot] = Value::Obj(instance);
                    return match self.find_method(r, self.init_string) {
                        Some(initializer) => self.call(initializer, argc),
                        None if argc != 0 => {
                            Err(format!("Expected 0 arguments but got {}.", argc))
                        }
                        None => Ok(()),
                    };
                }
                ObjectType::Native => return self.call_native(r, argc),
                _ => {}
            }
        }
        Err("Can only call functions and classes.".to_string())
    }

    fn call(&mut self, closure: GcRef, argc: usize) -> Result<(), String> {
        let function = self.heap.closure(closure).function;
        let arity = self.heap.function(function).arity as usize;
        if argc != arity {
            return Err(format!("Expected {} arguments but got {}.", arity, argc));
        }
        if self.frames.len() >= self.frames_max {
            return Err("Stack overflow.".to_string());
        }

        self.frames.push(CallFrame {
            closure,
            function,
            ip: 0,
            slot_base: self.stack.len() - argc - 1,
        });
        tracing::trace!(depth = self.frames.len(), argc, "call");
        Ok(())
    }

    fn call_native(&mut self, native: GcRef, argc: usize) -> Result<(), String> {
        let native = self.heap.native(native);
        if argc != native.arity as usize {
            return Err(format!(
                "Expected {} arguments but got {}.",
                native.arity, argc
            ));
        }
        let function = native.function;
        let args_start = self.stack.len() - argc;
        let result = function(&self.stack[args_start..])?;
        self.stack.truncate(args_start - 1);
        self.push(result)
    }

    fn invoke(&mut self, name: GcRef, argc: usize) -> Result<(), String> {
        let Some(instance) = self.as_instance(self.peek(argc)) else {
            return Err("Only instances have methods.".to_string());
        };

        let field = self.heap.instance(instance).fields.get(&name).copied();
        if let Some(value) = field {
            let slot = self.stack.len() - argc - 1;
            self.stack[slot] = value;
            return self.call_value(value, argc);
        }

        let class = self.heap.instance(instance).class;
        self.invoke_from_class(class, name, argc)
    }

    fn invoke_from_class(&mut self, class: GcRef, name: GcRef, argc: usize) -> Result<(), String> {
        match self.find_method(class, name) {
            Some(method) => self.call(method, argc),
            None => Err(self.undefined("method", name)),
        }
    }

    /// Walk the single-inheritance chain looking for `name`.
    fn find_method(&self, class: GcRef, name: GcRef) -> Option<GcRef> {
        let mut current = Some(class);
        while let Some(c) = current {
            let class = self.heap.class(c);
            if let Some(method) = class.methods.get(&name) {
                return Some(*method);
            }
            current = class.superclass;
        }
        None
    }

    /// Replace the receiver on top of the stack with `class.name` bound to it.
    fn bind_method(&mut self, class: GcRef, name: GcRef) -> Result<(), String> {
        let Some(method) = self.find_method(class, name) else {
            return Err(self.undefined("property", name));
        };
        let receiver = self.peek(0);
        let bound = self.alloc(Object::BoundMethod(BoundMethod { receiver, method }));
        self.pop();
        self.push(Value::Obj(bound))
    }

    fn make_closure(&mut self) -> Result<(), String> {
        let Value::Obj(function) = self.read_constant() else {
            panic!("closure operand is not a function");
        };
        let upvalue_count = self.heap.function(function).upvalue_count;
        let closure = self.alloc(Object::Closure(Closure::new(function, upvalue_count)));
        self.push(Value::Obj(closure))?;

        for _ in 0..upvalue_count {
            let is_local = self.read_byte() == 1;
            let index = self.read_byte() as usize;
            let upvalue = if is_local {
                self.capture_upvalue(self.slot_base() + index)
            } else {
                self.frame_upvalue(index)
            };
            self.heap.closure_mut(closure).upvalues.push(upvalue);
        }
        Ok(())
    }

    /// Reuse the open upvalue for `slot` or create one.
    fn capture_upvalue(&mut self, slot: usize) -> GcRef {
        match self
            .open_upvalues
            .binary_search_by_key(&slot, |(open_slot, _)| *open_slot)
        {
            Ok(position) => self.open_upvalues[position].1,
            Err(position) => {
                let upvalue = self.alloc(Object::Upvalue(Upvalue::Open(slot)));
                self.open_upvalues.insert(position, (slot, upvalue));
                upvalue
            }
        }
    }

    /// Close every open upvalue pointing at `last` or above.
    fn close_upvalues(&mut self, last: usize) {
        while let Some(&(slot, upvalue)) = self.open_upvalues.last() {
            if slot < last {
                break;
            }
            let value = self.stack[slot];
            *self.heap.upvalue_mut(upvalue) = Upvalue::Closed(value);
            self.open_upvalues.pop();
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn is_string(&self, value: Value) -> bool {
        matches!(value, Value::Obj(r) if self.heap.object_type(r) == ObjectType::String)
    }

    fn as_instance(&self, value: Value) -> Option<GcRef> {
        match value {
            Value::Obj(r) if self.heap.object_type(r) == ObjectType::Instance => Some(r),
            _ => None,
        }
    }

    fn as_class(&self, value: Value) -> Option<GcRef> {
        match value {
            Value::Obj(r) if self.heap.object_type(r) == ObjectType::Class => Some(r),
            _ => None,
        }
    }

    fn undefined(&self, what: &str, name: GcRef) -> String {
        format!("Undefined {} '{}'.", what, self.heap.string(name).as_str())
    }

    fn trace_instruction(&self) {
        let stack: String = self
            .stack
            .iter()
            .map(|value| format!("[ {} ]", self.heap.format_value(*value)))
            .collect();
        let frame = self.frame();
        let chunk = &self.heap.function(frame.function).chunk;
        let (instruction, _) = disassemble_instruction(chunk, &self.heap, frame.ip);
        tracing::trace!("          {}", stack);
        tracing::trace!("{}", instruction);
    }
}

impl Default for VM {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for VM {
    fn drop(&mut self) {
        if self.gc_stats {
            let stats = self.heap.stats();
            tracing::info!(
                "[GC] Collections: {}, Freed: {} objects / {} bytes, Total pause: {}us, Max pause: {}us",
                stats.cycles,
                stats.objects_freed,
                stats.bytes_freed,
                stats.total_pause_us,
                stats.max_pause_us
            );
        }
    }
}

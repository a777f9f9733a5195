//! Emission helpers for building heap-resident functions.
//!
//! A [`FunctionBuilder`] keeps its function registered as a GC root from
//! creation until [`FunctionBuilder::finish`], so collections triggered while
//! emitting code never free it.

use super::object::{Function, Object};
use super::{GcRef, Op, Value, VM};

pub struct FunctionBuilder {
    function: GcRef,
}

impl FunctionBuilder {
    /// Start a function named `name` (`None` for the top-level script).
    pub fn new(vm: &mut VM, name: Option<&str>, arity: u8) -> Self {
        let name = name.map(|name| vm.intern(name));
        let function = match name {
            Some(name) => vm.with_root(Value::Obj(name), |vm| {
                vm.alloc(Object::Function(Function::new(Some(name), arity)))
            }),
            None => vm.alloc(Object::Function(Function::new(None, arity))),
        };
        vm.push_root(Value::Obj(function));
        Self { function }
    }

    pub fn script(vm: &mut VM) -> Self {
        Self::new(vm, None, 0)
    }

    pub fn function(&self) -> GcRef {
        self.function
    }

    /// Current length of the chunk, i.e. the offset of the next byte.
    pub fn len(&self, vm: &VM) -> usize {
        vm.heap().function(self.function).chunk.len()
    }

    pub fn byte(&mut self, vm: &mut VM, byte: u8, line: u32) {
        vm.emit(self.function, byte, line);
    }

    pub fn op(&mut self, vm: &mut VM, op: Op, line: u32) {
        self.byte(vm, op.into(), line);
    }

    /// Emit an instruction with a single byte operand.
    pub fn op_byte(&mut self, vm: &mut VM, op: Op, operand: u8, line: u32) {
        self.op(vm, op, line);
        self.byte(vm, operand, line);
    }

    /// Add `value` to the constant pool, checking it fits a byte operand.
    pub fn make_constant(&mut self, vm: &mut VM, value: Value) -> Result<u8, String> {
        let count = vm.heap().function(self.function).chunk.constants().len();
        if count > usize::from(u8::MAX) {
            return Err("Too many constants in one chunk.".to_string());
        }
        let index = vm.add_constant(self.function, value);
        Ok(index as u8)
    }

    /// Emit `CONSTANT` loading `value`.
    pub fn constant(&mut self, vm: &mut VM, value: Value, line: u32) -> Result<(), String> {
        let index = self.make_constant(vm, value)?;
        self.op_byte(vm, Op::Constant, index, line);
        Ok(())
    }

    /// Emit `CONSTANT` loading the interned string `chars`.
    pub fn string(&mut self, vm: &mut VM, chars: &str, line: u32) -> Result<(), String> {
        let string = vm.intern(chars);
        self.constant(vm, Value::Obj(string), line)
    }

    /// Emit an instruction whose operand names a global, property, method or
    /// class.
    pub fn op_name(&mut self, vm: &mut VM, op: Op, name: &str, line: u32) -> Result<(), String> {
        let name = vm.intern(name);
        let index = self.make_constant(vm, Value::Obj(name))?;
        self.op_byte(vm, op, index, line);
        Ok(())
    }

    /// Emit `INVOKE` or `SUPER_INVOKE`.
    pub fn invoke(
        &mut self,
        vm: &mut VM,
        op: Op,
        name: &str,
        argc: u8,
        line: u32,
    ) -> Result<(), String> {
        self.op_name(vm, op, name, line)?;
        self.byte(vm, argc, line);
        Ok(())
    }

    /// Emit a forward jump with a placeholder operand. Returns the operand
    /// offset for [`FunctionBuilder::patch_jump`].
    pub fn jump(&mut self, vm: &mut VM, op: Op, line: u32) -> usize {
        self.op(vm, op, line);
        self.byte(vm, 0xff, line);
        self.byte(vm, 0xff, line);
        self.len(vm) - 2
    }

    /// Point the jump whose operand is at `offset` to the current end of code.
    pub fn patch_jump(&mut self, vm: &mut VM, offset: usize) -> Result<(), String> {
        let jump = self.len(vm) - offset - 2;
        let jump = u16::try_from(jump).map_err(|_| "Too much code to jump over.".to_string())?;
        vm.heap_mut()
            .function_mut(self.function)
            .chunk
            .patch_u16(offset, jump);
        Ok(())
    }

    /// Emit a backward jump to `loop_start`.
    pub fn emit_loop(&mut self, vm: &mut VM, loop_start: usize, line: u32) -> Result<(), String> {
        self.op(vm, Op::Loop, line);
        let offset = self.len(vm) - loop_start + 2;
        let offset = u16::try_from(offset).map_err(|_| "Loop body too large.".to_string())?;
        let [hi, lo] = offset.to_be_bytes();
        self.byte(vm, hi, line);
        self.byte(vm, lo, line);
        Ok(())
    }

    /// Emit `CLOSURE` for a finished inner function. Each capture is
    /// `(is_local, index)`.
    pub fn closure(
        &mut self,
        vm: &mut VM,
        inner: GcRef,
        captures: &[(bool, u8)],
        line: u32,
    ) -> Result<(), String> {
        vm.heap_mut().function_mut(inner).upvalue_count = captures.len();
        let index = self.make_constant(vm, Value::Obj(inner))?;
        self.op_byte(vm, Op::Closure, index, line);
        for (is_local, index) in captures {
            self.byte(vm, u8::from(*is_local), line);
            self.byte(vm, *index, line);
        }
        Ok(())
    }

    /// Release the function's root and hand it back.
    pub fn finish(self, vm: &mut VM) -> GcRef {
        vm.remove_root(Value::Obj(self.function));
        self.function
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use std::io;

    #[test]
    fn test_builder_survives_stress_gc() {
        let mut vm = VM::new_with_config(&RuntimeConfig::stress(), Box::new(io::sink()));
        let mut b = FunctionBuilder::new(&mut vm, Some("f"), 1);
        for i in 0..20 {
            b.string(&mut vm, &format!("s{}", i), 1).unwrap();
        }
        let function = b.function();
        assert!(vm.heap().is_live(function));

        let name = vm.heap().function(function).name.unwrap();
        assert_eq!(vm.heap().string(name).as_str(), "f");
        for value in vm.heap().function(function).chunk.constants() {
            assert!(vm.heap().is_live(value.as_obj().unwrap()));
        }

        let before = vm.heap().temp_root_count();
        let function = b.finish(&mut vm);
        assert_eq!(vm.heap().temp_root_count(), before - 1);
        vm.collect_garbage();
        assert!(!vm.heap().is_live(function));
    }

    #[test]
    fn test_too_many_constants() {
        let mut vm = VM::with_output(Box::new(io::sink()));
        let mut b = FunctionBuilder::script(&mut vm);
        for i in 0..256 {
            assert_eq!(b.make_constant(&mut vm, Value::Number(i as f64)), Ok(i as u8));
        }
        assert_eq!(
            b.make_constant(&mut vm, Value::Nil),
            Err("Too many constants in one chunk.".to_string())
        );
        let function = b.finish(&mut vm);
        assert_eq!(vm.heap().function(function).chunk.constants().len(), 256);
    }

    #[test]
    fn test_nan_constants_release_their_roots() {
        let mut vm = VM::with_output(Box::new(io::sink()));
        let before = vm.heap().temp_root_count();
        let mut b = FunctionBuilder::script(&mut vm);
        for _ in 0..5 {
            b.make_constant(&mut vm, Value::Number(f64::NAN)).unwrap();
        }
        assert_eq!(vm.heap().temp_root_count(), before + 1);
        b.finish(&mut vm);
        assert_eq!(vm.heap().temp_root_count(), before);
    }

    #[test]
    fn test_jump_patching() {
        let mut vm = VM::with_output(Box::new(io::sink()));
        let mut b = FunctionBuilder::script(&mut vm);
        let exit = b.jump(&mut vm, Op::Jump, 1);
        b.op(&mut vm, Op::Nil, 1);
        b.op(&mut vm, Op::Pop, 1);
        b.patch_jump(&mut vm, exit).unwrap();
        let function = b.finish(&mut vm);

        let chunk = &vm.heap().function(function).chunk;
        assert_eq!(chunk.read_u16(exit), 2);
    }

    #[test]
    fn test_closure_sets_upvalue_count() {
        let mut vm = VM::with_output(Box::new(io::sink()));
        let mut outer = FunctionBuilder::script(&mut vm);
        let inner = FunctionBuilder::new(&mut vm, Some("inner"), 0).finish(&mut vm);
        outer
            .closure(&mut vm, inner, &[(true, 1), (false, 0)], 1)
            .unwrap();
        let script = outer.finish(&mut vm);

        assert_eq!(vm.heap().function(inner).upvalue_count, 2);
        let code = vm.heap().function(script).chunk.code().to_vec();
        assert_eq!(code, vec![Op::Closure as u8, 0, 1, 1, 0, 0]);
    }
}

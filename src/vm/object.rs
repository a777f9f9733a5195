//! Heap object variants.

use std::collections::HashMap;
use std::mem::size_of;

use super::chunk::Chunk;
use super::heap::GcRef;
use super::Value;

/// Host function callable from scripts.
pub type NativeFn = fn(args: &[Value]) -> Result<Value, String>;

/// Discriminant of a heap object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    String,
    Function,
    Closure,
    Upvalue,
    Class,
    Instance,
    BoundMethod,
    Native,
}

/// An immutable, interned string with its hash cached at creation.
#[derive(Debug)]
pub struct LoxString {
    chars: Box<str>,
    hash: u32,
}

impl LoxString {
    pub fn new(chars: &str) -> Self {
        Self {
            chars: chars.into(),
            hash: hash_string(chars),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.chars
    }

    pub fn hash(&self) -> u32 {
        self.hash
    }
}

/// 32-bit FNV-1a.
pub fn hash_string(chars: &str) -> u32 {
    let mut hash: u32 = 2166136261;
    for byte in chars.bytes() {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(16777619);
    }
    hash
}

/// A compiled function body.
#[derive(Debug, Default)]
pub struct Function {
    pub arity: u8,
    pub upvalue_count: usize,
    pub chunk: Chunk,
    /// `None` for the top-level script.
    pub name: Option<GcRef>,
}

impl Function {
    pub fn new(name: Option<GcRef>, arity: u8) -> Self {
        Self {
            arity,
            upvalue_count: 0,
            chunk: Chunk::new(),
            name,
        }
    }
}

#[derive(Debug)]
pub struct Closure {
    pub function: GcRef,
    pub upvalues: Vec<GcRef>,
}

impl Closure {
    pub fn new(function: GcRef, upvalue_count: usize) -> Self {
        Self {
            function,
            upvalues: Vec::with_capacity(upvalue_count),
        }
    }
}

/// A captured variable. Open while the owning frame is live, closed once the
/// slot goes out of scope.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Upvalue {
    Open(usize),
    Closed(Value),
}

#[derive(Debug)]
pub struct Class {
    pub name: GcRef,
    pub methods: HashMap<GcRef, GcRef>,
    pub superclass: Option<GcRef>,
}

impl Class {
    pub fn new(name: GcRef) -> Self {
        Self {
            name,
            methods: HashMap::new(),
            superclass: None,
        }
    }
}

#[derive(Debug)]
pub struct Instance {
    pub class: GcRef,
    pub fields: HashMap<GcRef, Value>,
}

impl Instance {
    pub fn new(class: GcRef) -> Self {
        Self {
            class,
            fields: HashMap::new(),
        }
    }
}

#[derive(Debug)]
pub struct BoundMethod {
    pub receiver: Value,
    pub method: GcRef,
}

#[derive(Debug)]
pub struct Native {
    pub name: String,
    pub arity: u8,
    pub function: NativeFn,
}

/// A heap-allocated object.
#[derive(Debug)]
pub enum Object {
    String(LoxString),
    Function(Function),
    Closure(Closure),
    Upvalue(Upvalue),
    Class(Class),
    Instance(Instance),
    BoundMethod(BoundMethod),
    Native(Native),
}

impl Object {
    pub fn object_type(&self) -> ObjectType {
        match self {
            Object::String(_) => ObjectType::String,
            Object::Function(_) => ObjectType::Function,
            Object::Closure(_) => ObjectType::Closure,
            Object::Upvalue(_) => ObjectType::Upvalue,
            Object::Class(_) => ObjectType::Class,
            Object::Instance(_) => ObjectType::Instance,
            Object::BoundMethod(_) => ObjectType::BoundMethod,
            Object::Native(_) => ObjectType::Native,
        }
    }

    /// Push every object this one references onto `out`.
    pub fn trace(&self, out: &mut Vec<GcRef>) {
        fn value(out: &mut Vec<GcRef>, v: &Value) {
            if let Value::Obj(r) = v {
                out.push(*r);
            }
        }

        match self {
            Object::String(_) | Object::Native(_) => {}
            Object::Function(function) => {
                out.extend(function.name);
                for constant in function.chunk.constants() {
                    value(out, constant);
                }
            }
            Object::Closure(closure) => {
                out.push(closure.function);
                out.extend(closure.upvalues.iter().copied());
            }
            Object::Upvalue(Upvalue::Closed(v)) => value(out, v),
            Object::Upvalue(Upvalue::Open(_)) => {}
            Object::Class(class) => {
                out.push(class.name);
                out.extend(class.superclass);
                for (name, method) in &class.methods {
                    out.push(*name);
                    out.push(*method);
                }
            }
            Object::Instance(instance) => {
                out.push(instance.class);
                for (name, field) in &instance.fields {
                    out.push(*name);
                    value(out, field);
                }
            }
            Object::BoundMethod(bound) => {
                value(out, &bound.receiver);
                out.push(bound.method);
            }
        }
    }

    /// Approximate number of bytes owned by this object, used for GC pacing.
    pub fn size(&self) -> usize {
        let payload = match self {
            Object::String(s) => s.chars.len(),
            Object::Function(f) => {
                f.chunk.capacity() + f.chunk.constants_capacity() * size_of::<Value>()
            }
            Object::Closure(c) => c.upvalues.capacity() * size_of::<GcRef>(),
            Object::Upvalue(_) | Object::BoundMethod(_) => 0,
            Object::Class(c) => c.methods.capacity() * size_of::<(GcRef, GcRef)>(),
            Object::Instance(i) => i.fields.capacity() * size_of::<(GcRef, Value)>(),
            Object::Native(n) => n.name.len(),
        };
        size_of::<Object>() + payload
    }
}

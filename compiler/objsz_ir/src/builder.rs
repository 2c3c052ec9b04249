//! Incremental construction of [`Module`]s and [`Function`]s.
//!
//! Front ends and tests build IR through these builders rather than by
//! pushing into the raw vectors, so IDs always line up with indices.

use smallvec::SmallVec;

use crate::ir::{
    AccessPath, AllocContract, Builtin, Callee, CalleeId, Function, Instr, Module, Object,
    ObjectId, Operand, StringId, StringLit, ValueData, ValueId, ValueType,
};
use crate::types::{TypeId, TypeTable};

fn next_id(len: usize, what: &str) -> u32 {
    u32::try_from(len).unwrap_or_else(|_| panic!("{what} count exceeds u32::MAX"))
}

/// Builder for module-level entities.
#[derive(Debug, Default)]
pub struct ModuleBuilder {
    module: Module,
}

impl ModuleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutable access to the type table for declaring layouts.
    pub fn types(&mut self) -> &mut TypeTable {
        &mut self.module.types
    }

    /// Declare a variable of type `ty`.
    pub fn object(&mut self, name: &str, ty: TypeId) -> ObjectId {
        self.push_object(Object {
            name: name.to_owned(),
            ty,
            trailing_init_bytes: None,
        })
    }

    /// Declare a variable whose trailing flexible array member is
    /// initialized with `init_bytes` bytes.
    pub fn object_with_trailing_init(
        &mut self,
        name: &str,
        ty: TypeId,
        init_bytes: u64,
    ) -> ObjectId {
        self.push_object(Object {
            name: name.to_owned(),
            ty,
            trailing_init_bytes: Some(init_bytes),
        })
    }

    fn push_object(&mut self, object: Object) -> ObjectId {
        let id = ObjectId::new(next_id(self.module.objects.len(), "object"));
        self.module.objects.push(object);
        id
    }

    /// Intern a narrow string literal; `text` excludes the terminator.
    pub fn string(&mut self, text: &str) -> StringId {
        self.wide_string(text.len() as u64 + 1, 1)
    }

    /// Intern a literal of `len` code units (terminator included) of
    /// `width` bytes each.
    pub fn wide_string(&mut self, len: u64, width: u64) -> StringId {
        let unit = self.module.types.scalar(width);
        let ty = self.module.types.array(unit, Some(len));
        let id = StringId::new(next_id(self.module.strings.len(), "string"));
        self.module.strings.push(StringLit { len, width, ty });
        id
    }

    /// Declare a callee.
    pub fn callee(&mut self, callee: Callee) -> CalleeId {
        let id = CalleeId::new(next_id(self.module.callees.len(), "callee"));
        self.module.callees.push(callee);
        id
    }

    /// Declare an allocator such as `malloc` or `calloc`.
    pub fn allocator(&mut self, name: &str, contract: AllocContract) -> CalleeId {
        self.callee(Callee {
            alloc: Some(contract),
            ..Callee::plain(name)
        })
    }

    /// Declare a recognized builtin.
    pub fn builtin(&mut self, name: &str, builtin: Builtin) -> CalleeId {
        self.callee(Callee {
            builtin: Some(builtin),
            ..Callee::plain(name)
        })
    }

    pub fn finish(self) -> Module {
        self.module
    }
}

/// Builder for a function body.
///
/// Values are appended in definition order. Loops are built with
/// [`merge_placeholder`](Self::merge_placeholder) followed by
/// [`set_merge_incoming`](Self::set_merge_incoming) once the back-edge
/// value exists.
#[derive(Debug)]
pub struct FunctionBuilder {
    func: Function,
}

impl FunctionBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            func: Function {
                name: name.to_owned(),
                values: Vec::new(),
            },
        }
    }

    /// Append a value with an explicit type and definition.
    pub fn push(&mut self, ty: ValueType, def: Instr) -> ValueId {
        let id = ValueId::new(next_id(self.func.values.len(), "value"));
        self.func.values.push(ValueData { ty, def });
        id
    }

    pub fn address_of(&mut self, path: AccessPath) -> ValueId {
        self.push(ValueType::Pointer, Instr::AddressOf(path))
    }

    pub fn pointer_add(&mut self, base: ValueId, offset: i64) -> ValueId {
        self.push(ValueType::Pointer, Instr::PointerAdd { base, offset })
    }

    pub fn copy(&mut self, src: ValueId) -> ValueId {
        self.push(ValueType::Pointer, Instr::Copy { src })
    }

    pub fn merge(&mut self, incoming: &[ValueId]) -> ValueId {
        self.push(
            ValueType::Pointer,
            Instr::Merge {
                incoming: incoming.iter().copied().collect(),
            },
        )
    }

    /// A merge whose incoming list is filled in later.
    pub fn merge_placeholder(&mut self) -> ValueId {
        self.merge(&[])
    }

    /// Fill in the incoming list of a merge created earlier. Does nothing
    /// if `merge` is not a merge.
    pub fn set_merge_incoming(&mut self, merge: ValueId, incoming: &[ValueId]) {
        if let Some(ValueData {
            def: Instr::Merge { incoming: slot },
            ..
        }) = self.func.values.get_mut(merge.index())
        {
            *slot = incoming.iter().copied().collect();
        }
    }

    /// Pointer-valued call.
    pub fn call(&mut self, callee: CalleeId, args: Vec<Operand>) -> ValueId {
        self.push(
            ValueType::Pointer,
            Instr::Call {
                callee,
                args: SmallVec::from_vec(args),
            },
        )
    }

    /// Integer-valued call (e.g. a size query).
    pub fn int_call(&mut self, callee: CalleeId, args: Vec<Operand>) -> ValueId {
        self.push(
            ValueType::Integer,
            Instr::Call {
                callee,
                args: SmallVec::from_vec(args),
            },
        )
    }

    pub fn param(&mut self) -> ValueId {
        self.push(ValueType::Pointer, Instr::Parameter { access: None })
    }

    /// Parameter declared to reach at least `bytes` bytes.
    pub fn param_with_access(&mut self, bytes: u64) -> ValueId {
        self.push(
            ValueType::Pointer,
            Instr::Parameter {
                access: Some(bytes),
            },
        )
    }

    pub fn opaque(&mut self) -> ValueId {
        self.push(ValueType::Pointer, Instr::Opaque)
    }

    /// An integer value the analysis cannot see through (loop counters,
    /// dynamic indices).
    pub fn opaque_int(&mut self) -> ValueId {
        self.push(ValueType::Integer, Instr::Opaque)
    }

    pub fn finish(self) -> Function {
        self.func
    }
}

//! SSA IR consumed by the object-size analysis.
//!
//! The IR is deliberately small: it only models what the analysis reads.
//!
//! - **[`Module`]** — type layouts, declared objects, string literals and
//!   callee contracts shared by every function in a translation unit
//! - **[`Function`]** — SSA values in definition order
//! - **[`Instr`]** — the single defining instruction of each value
//! - **[`AccessPath`]** — an lvalue whose address is taken
//!
//! Every value is defined exactly once. Loops appear as [`Instr::Merge`]
//! values whose incoming list reaches back to a later definition, so the
//! def-use graph may be cyclic.

use smallvec::SmallVec;

use crate::types::{TypeId, TypeKind, TypeTable};

// ── ID newtypes ─────────────────────────────────────────────────────

macro_rules! id_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(transparent)]
        pub struct $name(u32);

        impl $name {
            /// Create a new ID from a raw index.
            #[inline]
            pub const fn new(raw: u32) -> Self {
                Self(raw)
            }

            /// Get the raw `u32` value.
            #[inline]
            pub fn raw(self) -> u32 {
                self.0
            }

            /// Get the index as `usize` (for indexing into `Vec`s).
            #[inline]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

id_newtype!(
    /// SSA value within one [`Function`]. Allocated sequentially from 0.
    ValueId
);
id_newtype!(
    /// Declared object (global, local or extern variable) in a [`Module`].
    ObjectId
);
id_newtype!(
    /// String literal in a [`Module`].
    StringId
);
id_newtype!(
    /// Callee declaration in a [`Module`].
    CalleeId
);

// ── Access paths ────────────────────────────────────────────────────

/// Half of a complex number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Part {
    Real,
    Imag,
}

/// Array index in an access path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Index {
    Const(i64),
    /// Not a compile-time constant.
    Dynamic(ValueId),
}

/// The object an access path starts from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Root {
    /// A declared variable.
    Object(ObjectId),
    /// A string or wide-string literal.
    String(StringId),
    /// `*(ty *)((char *)base + offset)`.
    Deref {
        base: ValueId,
        offset: i64,
        ty: TypeId,
    },
}

/// One component selection applied on top of the previous step's object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Step {
    /// Member `field` (index into the record/union's field list).
    FieldSelect { field: u32 },
    /// Element `index` of an array.
    ArrayIndex { index: Index },
    /// `__real__` / `__imag__` of a complex value.
    ComplexPart(Part),
}

/// An lvalue: a root plus component selections, applied from the root
/// outward.
///
/// `&s.a[3]` is `{ root: Object(s), steps: [FieldSelect(a), ArrayIndex(3)] }`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AccessPath {
    pub root: Root,
    pub steps: SmallVec<[Step; 4]>,
}

impl AccessPath {
    /// Path naming the root itself.
    pub fn root(root: Root) -> Self {
        Self {
            root,
            steps: SmallVec::new(),
        }
    }

    /// Append a member selection.
    #[must_use]
    pub fn field(mut self, field: u32) -> Self {
        self.steps.push(Step::FieldSelect { field });
        self
    }

    /// Append a constant array index.
    #[must_use]
    pub fn index(mut self, index: i64) -> Self {
        self.steps.push(Step::ArrayIndex {
            index: Index::Const(index),
        });
        self
    }

    /// Append a non-constant array index.
    #[must_use]
    pub fn dynamic_index(mut self, index: ValueId) -> Self {
        self.steps.push(Step::ArrayIndex {
            index: Index::Dynamic(index),
        });
        self
    }

    /// Append a complex-part selection.
    #[must_use]
    pub fn part(mut self, part: Part) -> Self {
        self.steps.push(Step::ComplexPart(part));
        self
    }

    /// `Some((base, offset))` when the path is a bare `Deref` root, i.e.
    /// `&MEM[base + offset]`, pointer arithmetic spelled as an address.
    pub fn as_pointer_plus(&self) -> Option<(ValueId, i64)> {
        match self.root {
            Root::Deref { base, offset, .. } if self.steps.is_empty() => Some((base, offset)),
            _ => None,
        }
    }

    /// Values read by this path (deref base and dynamic indices).
    pub fn used_values(&self) -> SmallVec<[ValueId; 2]> {
        let mut used = SmallVec::new();
        if let Root::Deref { base, .. } = self.root {
            used.push(base);
        }
        for step in &self.steps {
            if let Step::ArrayIndex {
                index: Index::Dynamic(v),
            } = step
            {
                used.push(*v);
            }
        }
        used
    }
}

// ── Operands ────────────────────────────────────────────────────────

/// A call argument.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Operand {
    Value(ValueId),
    /// Integer constant.
    Const(i64),
    /// Invariant address expression (`&x`, `"lit"`).
    Address(Box<AccessPath>),
}

impl Operand {
    /// The integer value, if this operand is a constant.
    pub fn as_const(&self) -> Option<i64> {
        match self {
            Operand::Const(c) => Some(*c),
            _ => None,
        }
    }
}

// ── Instructions ────────────────────────────────────────────────────

/// Defining instruction of an SSA value.
///
/// The set of kinds is closed; analyses dispatch on it exhaustively.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Instr {
    /// `&path`.
    AddressOf(AccessPath),
    /// `base p+ offset` with a constant byte offset.
    PointerAdd { base: ValueId, offset: i64 },
    /// `dst = src` (no-op conversion).
    Copy { src: ValueId },
    /// Phi / conditional select: one incoming value per predecessor.
    Merge { incoming: SmallVec<[ValueId; 2]> },
    /// Direct call.
    Call {
        callee: CalleeId,
        args: SmallVec<[Operand; 3]>,
    },
    /// Incoming function parameter. `access` is a declared lower bound on
    /// the bytes reachable through it (`T p[static N]`, access attributes).
    Parameter { access: Option<u64> },
    /// Inline-asm output, uninitialized value, or anything else the
    /// analysis cannot see through.
    Opaque,
}

impl Instr {
    /// Values read by this instruction, in operand order.
    pub fn used_values(&self) -> SmallVec<[ValueId; 4]> {
        match self {
            Instr::AddressOf(path) => path.used_values().into_iter().collect(),
            Instr::PointerAdd { base, .. } => smallvec::smallvec![*base],
            Instr::Copy { src } => smallvec::smallvec![*src],
            Instr::Merge { incoming } => incoming.iter().copied().collect(),
            Instr::Call { args, .. } => {
                let mut used = SmallVec::new();
                for arg in args {
                    match arg {
                        Operand::Value(v) => used.push(*v),
                        Operand::Address(path) => used.extend(path.used_values()),
                        Operand::Const(_) => {}
                    }
                }
                used
            }
            Instr::Parameter { .. } | Instr::Opaque => SmallVec::new(),
        }
    }
}

/// Whether a value holds an address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueType {
    Pointer,
    Integer,
}

/// An SSA value: its type and its unique definition.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ValueData {
    pub ty: ValueType,
    pub def: Instr,
}

// ── Module-level entities ───────────────────────────────────────────

/// A declared variable.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Object {
    pub name: String,
    pub ty: TypeId,
    /// Bytes occupied by the initializer of a trailing flexible array
    /// member, when the object has one and it is initialized.
    pub trailing_init_bytes: Option<u64>,
}

/// A string literal of `len` code units (terminator included), each
/// `width` bytes wide.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StringLit {
    pub len: u64,
    pub width: u64,
    /// `width[len]` array type, used when indexing into the literal.
    pub ty: TypeId,
}

impl StringLit {
    /// Size of the literal in bytes.
    pub fn size(&self) -> Option<u64> {
        self.len.checked_mul(self.width)
    }
}

/// Which arguments determine the size of a fresh allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AllocContract {
    /// `malloc(n)`: bytes = `args[arg]`.
    Single(u32),
    /// `calloc(n, m)`: bytes = `args[a] * args[b]`.
    Product(u32, u32),
}

/// Builtins the analysis and driver recognize by identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Builtin {
    Memcpy,
    Memmove,
    Memset,
    Strcpy,
    Strcat,
    /// Returns its first argument, but carries no return-argument
    /// contract of its own.
    AssumeAligned,
    /// `__builtin_object_size(ptr, kind)`.
    ObjectSize,
    /// `__builtin_dynamic_object_size(ptr, kind)`.
    DynamicObjectSize,
}

impl Builtin {
    /// Argument returned unchanged by the builtin's C contract.
    pub fn returns_arg(self) -> Option<u32> {
        match self {
            Builtin::Memcpy
            | Builtin::Memmove
            | Builtin::Memset
            | Builtin::Strcpy
            | Builtin::Strcat => Some(0),
            Builtin::AssumeAligned | Builtin::ObjectSize | Builtin::DynamicObjectSize => None,
        }
    }

    /// Whether this is one of the object-size query builtins.
    pub fn is_size_query(self) -> bool {
        matches!(self, Builtin::ObjectSize | Builtin::DynamicObjectSize)
    }
}

/// A callee declaration together with its contracts.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Callee {
    pub name: String,
    pub alloc: Option<AllocContract>,
    /// Explicit "returns argument N" contract.
    pub returns_arg: Option<u32>,
    pub builtin: Option<Builtin>,
}

impl Callee {
    /// A callee with no contracts.
    pub fn plain(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            alloc: None,
            returns_arg: None,
            builtin: None,
        }
    }
}

/// Everything shared by the functions of one translation unit.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Module {
    pub types: TypeTable,
    pub objects: Vec<Object>,
    pub strings: Vec<StringLit>,
    pub callees: Vec<Callee>,
}

impl Module {
    pub fn object(&self, id: ObjectId) -> Option<&Object> {
        self.objects.get(id.index())
    }

    pub fn string(&self, id: StringId) -> Option<&StringLit> {
        self.strings.get(id.index())
    }

    pub fn callee(&self, id: CalleeId) -> Option<&Callee> {
        self.callees.get(id.index())
    }

    /// Type of the root followed by the type of each step's result.
    ///
    /// `Err(i)` names the first position that does not resolve: `0` for
    /// the root, `k + 1` for `path.steps[k]`.
    pub fn path_types(&self, path: &AccessPath) -> Result<SmallVec<[TypeId; 5]>, usize> {
        let root_ty = match path.root {
            Root::Object(id) => self.object(id).map(|o| o.ty),
            Root::String(id) => self.string(id).map(|s| s.ty),
            Root::Deref { ty, .. } => Some(ty),
        };
        let mut cur = root_ty
            .filter(|ty| self.types.get(*ty).is_some())
            .ok_or(0usize)?;

        let mut tys = SmallVec::with_capacity(path.steps.len() + 1);
        tys.push(cur);
        for (i, step) in path.steps.iter().enumerate() {
            let next = match (step, self.types.get(cur)) {
                (Step::FieldSelect { field }, _) => self
                    .types
                    .fields(cur)
                    .and_then(|fs| fs.get(*field as usize))
                    .map(|f| f.ty),
                (Step::ArrayIndex { .. }, Some(TypeKind::Array { elem, .. }))
                | (Step::ComplexPart(_), Some(TypeKind::Complex { part: elem })) => Some(*elem),
                _ => None,
            };
            cur = next
                .filter(|ty| self.types.get(*ty).is_some())
                .ok_or(i + 1)?;
            tys.push(cur);
        }
        Ok(tys)
    }
}

/// A function body in SSA form.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Function {
    pub name: String,
    /// Values in definition order, indexed by [`ValueId::index`].
    pub values: Vec<ValueData>,
}

impl Function {
    /// Look up a value. Returns `None` for IDs outside this function.
    #[inline]
    pub fn value(&self, id: ValueId) -> Option<&ValueData> {
        self.values.get(id.index())
    }

    /// Defining instruction of `id`, if it exists.
    #[inline]
    pub fn def(&self, id: ValueId) -> Option<&Instr> {
        self.value(id).map(|v| &v.def)
    }

    pub fn is_pointer(&self, id: ValueId) -> bool {
        self.value(id).is_some_and(|v| v.ty == ValueType::Pointer)
    }

    /// Number of values defined in this function.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over `(id, data)` pairs in definition order.
    pub fn iter(&self) -> impl Iterator<Item = (ValueId, &ValueData)> {
        self.values.iter().enumerate().map(|(i, data)| {
            let raw =
                u32::try_from(i).unwrap_or_else(|_| panic!("value count exceeds u32::MAX"));
            (ValueId::new(raw), data)
        })
    }
}

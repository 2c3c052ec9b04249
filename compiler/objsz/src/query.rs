//! The query context.
//!
//! [`ObjectSizes`] owns the memo tables for one function. Tables are opened
//! with [`init`](ObjectSizes::init) before a batch of queries and dropped
//! with [`teardown`](ObjectSizes::teardown) afterwards; nothing is shared
//! between functions or threads.
//!
//! Queries on a closed context still answer, but only through a cheap
//! fallback: WholeObject queries peel `PointerAdd` chains down to an
//! address-of expression, and everything else is unknown.

use objsz_ir::{AccessPath, Function, Instr, Module, Operand, ValueId};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::collect::{QueryRun, SizeTables};
use crate::lattice::{self, offset_bits, size_for_offset, SizeResult};
use crate::resolve::{address_size, PointeeSizes};
use crate::{ObjectSize, QueryKind};

/// Object-size queries over one function.
pub struct ObjectSizes<'a> {
    module: &'a Module,
    func: &'a Function,
    tables: Option<Box<SizeTables>>,
    /// Address operands are not SSA values, so they are memoized here.
    addresses: FxHashMap<(AccessPath, QueryKind), ObjectSize>,
}

impl<'a> ObjectSizes<'a> {
    /// A context for `func`. Starts closed.
    pub fn new(module: &'a Module, func: &'a Function) -> Self {
        Self {
            module,
            func,
            tables: None,
            addresses: FxHashMap::default(),
        }
    }

    /// Open the memo tables. Does nothing if they are already open.
    pub fn init(&mut self) {
        if self.tables.is_none() {
            self.tables = Some(Box::new(SizeTables::new(self.func.len())));
        }
    }

    /// Drop the memo tables and everything learned through them.
    pub fn teardown(&mut self) {
        self.tables = None;
        self.addresses.clear();
    }

    pub fn is_open(&self) -> bool {
        self.tables.is_some()
    }

    /// Bytes from `ptr` to the end of the object it points into.
    ///
    /// Never fails: a value that is not a pointer, or whose size cannot be
    /// proven, yields [`ObjectSize::unknown`].
    pub fn compute_object_size(&mut self, ptr: ValueId, kind: QueryKind) -> ObjectSize {
        if !self.func.is_pointer(ptr) {
            return ObjectSize::unknown(kind);
        }
        let result = match self.tables.as_deref_mut() {
            Some(tables) => QueryRun::new(self.module, self.func, tables, kind).run(ptr),
            None => self.detached().closed_size(ptr, kind),
        };
        ObjectSize::from_bytes(kind, result.size)
    }

    /// Bytes from the address of `path` to the end of its (sub)object.
    pub fn compute_address_size(&mut self, path: &AccessPath, kind: QueryKind) -> ObjectSize {
        let open = self.is_open();
        if open {
            if let Some(&cached) = self.addresses.get(&(path.clone(), kind)) {
                return cached;
            }
        }

        let module = self.module;
        let result = address_size(module, path, kind, &mut self.detached());
        let size = ObjectSize::from_bytes(kind, result.size);
        if open {
            self.addresses.insert((path.clone(), kind), size);
        }
        size
    }

    /// Size for a call argument. Integer constants have none.
    pub fn compute_operand_size(&mut self, operand: &Operand, kind: QueryKind) -> ObjectSize {
        match operand {
            Operand::Value(ptr) => self.compute_object_size(*ptr, kind),
            Operand::Address(path) => self.compute_address_size(path, kind),
            Operand::Const(_) => ObjectSize::unknown(kind),
        }
    }

    fn detached(&mut self) -> Detached<'a, '_> {
        Detached {
            module: self.module,
            func: self.func,
            tables: self.tables.as_deref_mut(),
            budget: self.func.len(),
        }
    }
}

/// Pointee sizes for an access path resolved outside any traversal.
///
/// A dereferenced pointer is sized as a whole object by its own top-level
/// query, or by the closed-context fallback when no tables are open.
struct Detached<'a, 'b> {
    module: &'a Module,
    func: &'a Function,
    tables: Option<&'b mut SizeTables>,
    /// Definitions the fallback may still step through.
    budget: usize,
}

impl Detached<'_, '_> {
    /// Fallback for a closed context: `p + k1 + k2 ...` down to `&x`.
    fn closed_size(&mut self, ptr: ValueId, kind: QueryKind) -> SizeResult {
        let unknown = SizeResult::unknown(kind);
        if kind.is_subobject() {
            return unknown;
        }

        let (module, func) = (self.module, self.func);
        let mut offsets: SmallVec<[i64; 4]> = SmallVec::new();
        let mut cur = ptr;
        loop {
            if self.budget == 0 || !func.is_pointer(cur) {
                return unknown;
            }
            self.budget -= 1;

            match func.def(cur) {
                Some(Instr::PointerAdd { base, offset }) => {
                    offsets.push(*offset);
                    cur = *base;
                }
                Some(Instr::AddressOf(path)) => {
                    let mut size = address_size(module, path, kind, self).size;
                    for &offset in offsets.iter().rev() {
                        if lattice::is_unknown(kind, size) {
                            break;
                        }
                        size = size_for_offset(kind, size, offset_bits(offset), None);
                    }
                    return SizeResult::exact(size);
                }
                _ => return unknown,
            }
        }
    }
}

impl PointeeSizes for Detached<'_, '_> {
    fn pointee_size(&mut self, base: ValueId, kind: QueryKind) -> SizeResult {
        let whole = kind.whole();
        let result = match self.tables.as_deref_mut() {
            Some(tables) => QueryRun::new(self.module, self.func, tables, whole).run(base),
            None => self.closed_size(base, whole),
        };
        SizeResult::exact(result.size)
    }
}

#[cfg(test)]
mod tests;

//! Def-use dataflow engine.
//!
//! Sizes are collected by walking each value's definition back towards the
//! objects it was derived from. The walk is recursive, but every value
//! carries a [`VisitState`] so a value reached again through its own
//! definition chain (a merge inside a loop) is flagged for reexamination
//! instead of recursed into.
//!
//! # Passes
//!
//! 1. **Initial**: walk from the queried pointer, seeding each new value
//!    with the lattice's initial value. Values found in dependency loops end
//!    up flagged [`VisitState::NeedsReexamination`].
//! 2. **Loop check** (Minimum kinds only): pointers advanced by a positive
//!    constant on every trip around a loop are pinned to 0. See
//!    [`crate::loops`].
//! 3. **Reexamine**: redo every flagged value, reading its operands from the
//!    table without recursing, until a whole round changes nothing.
//!
//! Maximum estimates only grow and Minimum estimates only shrink, so the
//! reexamination rounds terminate. Whatever is still flagged afterwards is
//! final.

use objsz_ir::{Function, Instr, Module, Operand, ValueId};

use crate::classify::{alloc_size, pass_through};
use crate::lattice::{self, offset_bits, size_for_offset, SizeResult};
use crate::loops::zero_advancing_loops;
use crate::resolve::{address_size, PointeeSizes};
use crate::stack::ensure_sufficient_stack;
use crate::QueryKind;

/// Progress of one value through a query.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub(crate) enum VisitState {
    #[default]
    Unvisited,
    /// On the current recursion path.
    InProgress,
    /// Final for this kind.
    Resolved,
    /// Part of a dependency loop; holds a tentative estimate.
    NeedsReexamination,
}

/// Memo slot for one value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Entry {
    pub state: VisitState,
    pub result: SizeResult,
}

/// Memo table for one query kind, indexed by [`ValueId`].
#[derive(Clone, Debug)]
pub(crate) struct SizeTable {
    kind: QueryKind,
    entries: Vec<Entry>,
}

impl SizeTable {
    pub fn new(kind: QueryKind, len: usize) -> Self {
        let fresh = Entry {
            state: VisitState::Unvisited,
            result: SizeResult::initial(kind),
        };
        Self {
            kind,
            entries: vec![fresh; len],
        }
    }

    /// Entry for `v`. IDs outside the function read as resolved unknown.
    pub fn get(&self, v: ValueId) -> Entry {
        self.entries.get(v.index()).copied().unwrap_or(Entry {
            state: VisitState::Resolved,
            result: SizeResult::unknown(self.kind),
        })
    }

    #[inline]
    pub fn state(&self, v: ValueId) -> VisitState {
        self.get(v).state
    }

    #[inline]
    pub fn result(&self, v: ValueId) -> SizeResult {
        self.get(v).result
    }

    pub fn mark(&mut self, v: ValueId, state: VisitState) {
        if let Some(entry) = self.entries.get_mut(v.index()) {
            entry.state = state;
        }
    }

    /// Start visiting `v`: in progress, seeded with the initial value.
    fn begin(&mut self, v: ValueId) {
        if let Some(entry) = self.entries.get_mut(v.index()) {
            entry.state = VisitState::InProgress;
            entry.result = SizeResult::initial(self.kind);
        }
    }

    /// Merge `result` into `v`'s estimate. Returns whether it changed.
    pub fn set(&mut self, v: ValueId, result: SizeResult) -> bool {
        let kind = self.kind;
        let Some(entry) = self.entries.get_mut(v.index()) else {
            return false;
        };
        let merged = entry.result.merge(result, kind);
        let changed = merged != entry.result;
        entry.result = merged;
        changed
    }

    /// Values flagged for reexamination, in ascending ID order.
    pub fn flagged(&self) -> Vec<ValueId> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.state == VisitState::NeedsReexamination)
            .filter_map(|(i, _)| u32::try_from(i).ok().map(ValueId::new))
            .collect()
    }

    /// Accept every tentative estimate as final.
    fn finalize(&mut self) {
        for entry in &mut self.entries {
            if entry.state == VisitState::NeedsReexamination {
                entry.state = VisitState::Resolved;
            }
        }
    }
}

/// One memo table per query kind.
#[derive(Clone, Debug)]
pub(crate) struct SizeTables {
    tables: [SizeTable; 4],
}

impl SizeTables {
    pub fn new(len: usize) -> Self {
        Self {
            tables: QueryKind::ALL.map(|kind| SizeTable::new(kind, len)),
        }
    }

    #[inline]
    pub fn get(&self, kind: QueryKind) -> &SizeTable {
        &self.tables[kind.index()]
    }

    #[inline]
    pub fn get_mut(&mut self, kind: QueryKind) -> &mut SizeTable {
        &mut self.tables[kind.index()]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Pass {
    Initial,
    Reexamine,
}

/// A single top-level query for one kind.
pub(crate) struct QueryRun<'a> {
    module: &'a Module,
    func: &'a Function,
    tables: &'a mut SizeTables,
    kind: QueryKind,
    pass: Pass,
    changed: bool,
}

impl<'a> QueryRun<'a> {
    pub fn new(
        module: &'a Module,
        func: &'a Function,
        tables: &'a mut SizeTables,
        kind: QueryKind,
    ) -> Self {
        Self {
            module,
            func,
            tables,
            kind,
            pass: Pass::Initial,
            changed: false,
        }
    }

    /// Size of `ptr`, computing it and everything it depends on first if
    /// no earlier query has.
    pub fn run(mut self, ptr: ValueId) -> SizeResult {
        if self.func.value(ptr).is_none() {
            return SizeResult::unknown(self.kind);
        }
        if self.table().state(ptr) == VisitState::Resolved {
            return self.table().result(ptr);
        }

        tracing::debug!(
            function = %self.func.name,
            value = ptr.raw(),
            kind = self.kind.raw(),
            "computing object size",
        );

        self.initial_pass(ptr);

        if !self.table().flagged().is_empty() {
            if self.kind.is_minimum() {
                let kind = self.kind;
                zero_advancing_loops(self.module, self.func, self.tables.get_mut(kind));
            }
            self.reexamine();
        }
        self.tables.get_mut(self.kind).finalize();

        let result = self.table().result(ptr);
        tracing::debug!(
            function = %self.func.name,
            value = ptr.raw(),
            kind = self.kind.raw(),
            size = result.size,
            wholesize = result.wholesize,
            "object size computed",
        );
        result
    }

    /// Walk from `ptr`, seeding and flagging values as they are reached.
    fn initial_pass(&mut self, ptr: ValueId) {
        self.pass = Pass::Initial;
        self.collect(ptr);
    }

    /// Redo flagged values until a round changes nothing.
    fn reexamine(&mut self) {
        let mut round = 0u32;
        loop {
            round += 1;
            let changed = self.reexamine_round();
            tracing::debug!(
                function = %self.func.name,
                kind = self.kind.raw(),
                round,
                changed,
                "reexamination round",
            );
            if !changed {
                break;
            }
        }
    }

    /// Redo every flagged value once. Returns whether any estimate moved.
    fn reexamine_round(&mut self) -> bool {
        self.pass = Pass::Reexamine;
        self.changed = false;
        for v in self.table().flagged() {
            if self.table().state(v) == VisitState::NeedsReexamination {
                self.collect(v);
            }
        }
        self.changed
    }

    #[inline]
    fn table(&self) -> &SizeTable {
        self.tables.get(self.kind)
    }

    #[inline]
    fn table_mut(&mut self) -> &mut SizeTable {
        self.tables.get_mut(self.kind)
    }

    fn is_unknown(&self, v: ValueId) -> bool {
        self.table().result(v).is_unknown(self.kind)
    }

    fn set(&mut self, v: ValueId, result: SizeResult) {
        if self.table_mut().set(v, result) {
            self.changed = true;
        }
    }

    fn set_unknown(&mut self, v: ValueId) {
        let unknown = SizeResult::unknown(self.kind);
        self.set(v, unknown);
    }

    fn collect(&mut self, var: ValueId) {
        let func = self.func;
        let Some(data) = func.value(var) else {
            return;
        };

        match (self.pass, self.table().state(var)) {
            (_, VisitState::Resolved) => return,
            (Pass::Initial, VisitState::Unvisited) => self.table_mut().begin(var),
            (Pass::Initial, _) => {
                tracing::debug!(
                    function = %func.name,
                    value = var.raw(),
                    "found a dependency loop",
                );
                self.table_mut().mark(var, VisitState::NeedsReexamination);
                return;
            }
            (Pass::Reexamine, _) => {}
        }

        tracing::trace!(value = var.raw(), "visiting use-def links");

        let reexamine = if func.is_pointer(var) {
            ensure_sufficient_stack(|| self.visit(var, &data.def))
        } else {
            self.set_unknown(var);
            false
        };

        let state = if !reexamine || self.is_unknown(var) {
            VisitState::Resolved
        } else {
            tracing::trace!(value = var.raw(), "needs reexamination");
            VisitState::NeedsReexamination
        };
        self.table_mut().mark(var, state);
    }

    /// Compute `var` from its definition. Returns whether the result rests
    /// on a value still awaiting reexamination.
    fn visit(&mut self, var: ValueId, def: &'a Instr) -> bool {
        match def {
            Instr::AddressOf(path) => {
                if let Some((base, offset)) = path.as_pointer_plus() {
                    return self.plus(var, base, offset);
                }
                let result = address_size(self.module, path, self.kind, self);
                self.set(var, result);
                false
            }
            Instr::PointerAdd { base, offset } => self.plus(var, *base, *offset),
            Instr::Copy { src } => self.merge_from(var, *src),
            Instr::Merge { incoming } => {
                if incoming.is_empty() {
                    self.set_unknown(var);
                    return false;
                }
                let mut reexamine = false;
                for &rhs in incoming {
                    if self.is_unknown(var) {
                        break;
                    }
                    reexamine |= self.merge_from(var, rhs);
                }
                reexamine
            }
            Instr::Call { callee, args } => {
                let Some(callee) = self.module.callee(*callee) else {
                    self.set_unknown(var);
                    return false;
                };
                match pass_through(callee, args) {
                    Some(Operand::Value(arg)) => self.merge_from(var, *arg),
                    Some(Operand::Address(path)) => {
                        let result = address_size(self.module, path, self.kind, self);
                        self.set(var, result);
                        false
                    }
                    Some(Operand::Const(_)) => {
                        self.set_unknown(var);
                        false
                    }
                    None => {
                        let bytes =
                            alloc_size(callee, args).unwrap_or(lattice::unknown(self.kind));
                        self.set(var, SizeResult::exact(bytes));
                        false
                    }
                }
            }
            Instr::Parameter { access } => {
                let result = match access {
                    Some(bytes) if self.kind.is_minimum() => SizeResult::exact(*bytes),
                    _ => SizeResult::unknown(self.kind),
                };
                self.set(var, result);
                false
            }
            Instr::Opaque => {
                self.set_unknown(var);
                false
            }
        }
    }

    /// `dest = orig`: fold `orig`'s estimate into `dest`.
    fn merge_from(&mut self, dest: ValueId, orig: ValueId) -> bool {
        if self.is_unknown(dest) {
            return false;
        }
        if self.pass == Pass::Initial {
            self.collect(orig);
        }
        let entry = self.table().get(orig);
        self.set(dest, entry.result);
        entry.state == VisitState::NeedsReexamination
    }

    /// `var = base + offset`.
    fn plus(&mut self, var: ValueId, base: ValueId, offset: i64) -> bool {
        if self.is_unknown(var) {
            return false;
        }
        if self.pass == Pass::Initial {
            self.collect(base);
        }
        let entry = self.table().get(base);
        let mut result = entry.result;
        // In the first pass an all-ones base is either unknown or a seed from
        // an unfinished loop; leave it for the later passes.
        if self.pass != Pass::Initial || result.size != u64::MAX {
            result.size = size_for_offset(
                self.kind,
                result.size,
                offset_bits(offset),
                Some(result.wholesize),
            );
        }
        self.set(var, result);
        entry.state == VisitState::NeedsReexamination
    }
}

impl PointeeSizes for QueryRun<'_> {
    fn pointee_size(&mut self, base: ValueId, kind: QueryKind) -> SizeResult {
        if kind.is_subobject() {
            // The pointee as a whole, via an independent query.
            let tables = &mut *self.tables;
            let whole = QueryRun::new(self.module, self.func, tables, kind.whole()).run(base);
            return SizeResult::exact(whole.size);
        }

        if self.pass == Pass::Initial {
            self.collect(base);
        }
        let entry = self.table().get(base);
        if entry.state == VisitState::Resolved {
            entry.result
        } else {
            SizeResult::unknown(kind)
        }
    }
}

//! Compile-time object-size analysis.
//!
//! Given a pointer-valued SSA value, computes a safe bound on the number
//! of bytes between the pointer and the end of the object it points
//! into. This backs `__builtin_object_size` / `__builtin_dynamic_object_size`
//! folding for fortified library calls and bounds checks.
//!
//! This crate provides:
//!
//! - **Size lattice** ([`SizeResult`], [`size_for_offset`]) — sentinels,
//!   merges and offset arithmetic per [`QueryKind`].
//! - **Query context** ([`ObjectSizes`]) — per-function memo tables with
//!   an explicit `init`/`teardown` lifecycle, and
//!   [`compute_object_size`](ObjectSizes::compute_object_size).
//! - **Folding driver** ([`fold_object_sizes`]) — finds size-query calls
//!   in a function and decides what each one folds to.
//!
//! # Design
//!
//! The def-use graph is cyclic (merges inside loops), so values are
//! resolved with a four-state visitation scheme plus a reexamination
//! worklist rather than plain recursion. Maximum estimates only grow and
//! Minimum estimates only shrink across rounds, which bounds the number
//! of rounds. Pointers advanced by a positive constant on every loop
//! iteration are detected up front for Minimum queries and pinned to 0.
//!
//! # Crate Dependencies
//!
//! `objsz` depends on `objsz_ir` for the IR it reads. It never mutates
//! the IR; rewriting query calls is left to the caller.

mod classify;
mod collect;
pub mod fold;
pub mod lattice;
mod loops;
pub mod query;
mod resolve;
mod stack;

#[cfg(test)]
mod test_helpers;

pub use fold::{
    fold_object_sizes, ClampOp, DynamicExprId, DynamicSizer, FoldAction, FoldMode,
    NoDynamicSizes, SizeFold,
};
pub use lattice::{offset_bits, size_for_offset, SizeResult, OFFSET_LIMIT};
pub use query::ObjectSizes;

/// Which end of the estimate a query wants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Bound {
    /// An upper bound: never smaller than the true remaining size.
    Maximum,
    /// A lower bound: never larger than the true remaining size.
    Minimum,
}

/// What counts as "the object".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Extent {
    /// The outermost declared or allocated object.
    WholeObject,
    /// The innermost field or array whose address was taken.
    Subobject,
}

/// One of the four object-size query flavors.
///
/// The raw encoding matches the builtin's second argument: bit 0 selects
/// [`Extent::Subobject`], bit 1 selects [`Bound::Minimum`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct QueryKind {
    pub bound: Bound,
    pub extent: Extent,
}

impl QueryKind {
    /// Raw kind 0.
    pub const MAX_WHOLE: Self = Self::new(Bound::Maximum, Extent::WholeObject);
    /// Raw kind 1.
    pub const MAX_SUB: Self = Self::new(Bound::Maximum, Extent::Subobject);
    /// Raw kind 2.
    pub const MIN_WHOLE: Self = Self::new(Bound::Minimum, Extent::WholeObject);
    /// Raw kind 3.
    pub const MIN_SUB: Self = Self::new(Bound::Minimum, Extent::Subobject);

    /// All kinds, in raw order.
    pub const ALL: [Self; 4] = [
        Self::MAX_WHOLE,
        Self::MAX_SUB,
        Self::MIN_WHOLE,
        Self::MIN_SUB,
    ];

    pub const fn new(bound: Bound, extent: Extent) -> Self {
        Self { bound, extent }
    }

    /// Decode the builtin's kind argument. `None` outside `0..=3`.
    pub fn from_raw(raw: i64) -> Option<Self> {
        usize::try_from(raw)
            .ok()
            .and_then(|i| Self::ALL.get(i))
            .copied()
    }

    /// The builtin's encoding of this kind.
    pub fn raw(self) -> u8 {
        let sub = u8::from(self.is_subobject());
        let min = u8::from(self.is_minimum());
        sub | (min << 1)
    }

    /// Dense index for per-kind tables.
    #[inline]
    pub fn index(self) -> usize {
        usize::from(self.raw())
    }

    #[inline]
    pub fn is_minimum(self) -> bool {
        self.bound == Bound::Minimum
    }

    #[inline]
    pub fn is_subobject(self) -> bool {
        self.extent == Extent::Subobject
    }

    /// The same bound over the whole object.
    #[must_use]
    pub fn whole(self) -> Self {
        Self::new(self.bound, Extent::WholeObject)
    }
}

/// Outcome of one object-size query.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObjectSize {
    /// `false` when nothing could be proven; `bytes` is then the kind's
    /// unknown sentinel.
    pub known: bool,
    pub bytes: u64,
}

impl ObjectSize {
    pub fn unknown(kind: QueryKind) -> Self {
        Self {
            known: false,
            bytes: lattice::unknown(kind),
        }
    }

    /// Wrap a raw lattice value, classifying the sentinel as unknown.
    pub fn from_bytes(kind: QueryKind, bytes: u64) -> Self {
        Self {
            known: !lattice::is_unknown(kind, bytes),
            bytes,
        }
    }

    /// The byte count, if known.
    pub fn get(self) -> Option<u64> {
        self.known.then_some(self.bytes)
    }
}

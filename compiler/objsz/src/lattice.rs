//! The size lattice and offset arithmetic.
//!
//! Sizes are `u64` byte counts. Each query kind has an **unknown**
//! sentinel chosen so that merging with it is absorbing in the safe
//! direction: `u64::MAX` for Maximum kinds (`max(x, MAX) = MAX`) and `0`
//! for Minimum kinds (`min(x, 0) = 0`). The **initial** seed is the
//! opposite extreme, the identity of the merge, so the first real
//! contribution overwrites it.

use crate::{Bound, QueryKind};

/// Offsets above this are treated as pointer subtraction in disguise and
/// never as forward arithmetic. Half the address space.
pub const OFFSET_LIMIT: u64 = u64::MAX / 2;

/// Estimated bytes from a pointer to the end of its object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SizeResult {
    /// Bytes remaining from the pointer to the end of the (sub)object.
    pub size: u64,
    /// Size of the whole (sub)object the pointer lies in. Used to turn a
    /// negative offset back into a valid net position.
    pub wholesize: u64,
}

impl SizeResult {
    #[inline]
    pub fn new(size: u64, wholesize: u64) -> Self {
        Self { size, wholesize }
    }

    /// A fresh object of `bytes` bytes, pointed to at its start.
    #[inline]
    pub fn exact(bytes: u64) -> Self {
        Self::new(bytes, bytes)
    }

    #[inline]
    pub fn unknown(kind: QueryKind) -> Self {
        Self::exact(unknown(kind))
    }

    #[inline]
    pub fn initial(kind: QueryKind) -> Self {
        Self::exact(initial(kind))
    }

    /// Component-wise [`merge`].
    #[must_use]
    pub fn merge(self, other: Self, kind: QueryKind) -> Self {
        Self::new(
            merge(kind, self.size, other.size),
            merge(kind, self.wholesize, other.wholesize),
        )
    }

    pub fn is_unknown(self, kind: QueryKind) -> bool {
        is_unknown(kind, self.size)
    }
}

/// The "no information" value for `kind`.
#[inline]
pub fn unknown(kind: QueryKind) -> u64 {
    match kind.bound {
        Bound::Maximum => u64::MAX,
        Bound::Minimum => 0,
    }
}

/// Seed for a value whose size has not been computed yet.
#[inline]
pub fn initial(kind: QueryKind) -> u64 {
    match kind.bound {
        Bound::Maximum => 0,
        Bound::Minimum => u64::MAX,
    }
}

#[inline]
pub fn is_unknown(kind: QueryKind, size: u64) -> bool {
    size == unknown(kind)
}

/// Join two estimates: `max` for Maximum kinds, `min` for Minimum kinds.
#[inline]
pub fn merge(kind: QueryKind, a: u64, b: u64) -> u64 {
    match kind.bound {
        Bound::Maximum => a.max(b),
        Bound::Minimum => a.min(b),
    }
}

/// Two's-complement view of a signed byte offset, the form
/// [`size_for_offset`] expects.
#[inline]
#[expect(clippy::cast_sign_loss, reason = "negative offsets are meant to wrap")]
pub fn offset_bits(offset: i64) -> u64 {
    offset as u64
}

/// Bytes left after advancing a pointer with `size` bytes remaining by
/// `offset` (two's complement, so negative offsets arrive as huge values).
///
/// When `wholesize` differs from `size` the pointer already sits inside
/// its object, and the offset is re-expressed relative to the object's
/// start: `net = max(size, wholesize) + offset - size`. A backwards step
/// that stays inside the object then has a small positive net offset.
///
/// A net offset above [`OFFSET_LIMIT`] yields `unknown(kind)`; one past
/// the end yields 0.
pub fn size_for_offset(kind: QueryKind, size: u64, offset: u64, wholesize: Option<u64>) -> u64 {
    if offset == 0 {
        return size;
    }

    let (base, offset) = match wholesize {
        Some(whole) if whole != size => {
            let base = size.max(whole);
            (base, base.wrapping_add(offset).wrapping_sub(size))
        }
        _ => (size, offset),
    };

    if offset == 0 {
        return base;
    }
    if offset > OFFSET_LIMIT {
        return unknown(kind);
    }
    base.max(offset) - offset
}

//! Base-object resolution for address-of expressions.
//!
//! An [`AccessPath`] names an lvalue such as `s.a[3]` or `p->c[9]`. The
//! resolver finds the object the path starts from, sizes it, and then
//! subtracts the constant byte offset of the full lvalue from that start.
//!
//! For Subobject queries the innermost field or array whose address was
//! taken becomes the anchor instead of the root, so `&s.a[3]` is bounded
//! by `s.a` rather than by `s`. Through a pointer, a trailing array member
//! is not trusted as a bound: `struct { int n; char buf[1]; }` is the
//! classic pre-C99 spelling of a flexible array member.

use objsz_ir::{
    AccessPath, Index, Module, Part, Root, Step, StringLit, TypeId, TypeKind, TypeTable, ValueId,
};

use crate::lattice::{self, offset_bits, size_for_offset, SizeResult, OFFSET_LIMIT};
use crate::QueryKind;

/// Source of sizes for pointers dereferenced by an access path root.
///
/// Inside a traversal this reads the memo tables; outside one it runs a
/// fresh query or the closed-context fallback.
pub(crate) trait PointeeSizes {
    fn pointee_size(&mut self, base: ValueId, kind: QueryKind) -> SizeResult;
}

/// Extent of the object an access path starts from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Base {
    Sized(SizeResult),
    /// A dereferenced pointer of unknown extent. A selected subobject can
    /// still bound the result.
    Unsized,
    /// Nothing can be said about the path.
    Unknown,
}

/// Bytes from the address of `path` to the end of its (sub)object.
pub(crate) fn address_size(
    module: &Module,
    path: &AccessPath,
    kind: QueryKind,
    pointees: &mut dyn PointeeSizes,
) -> SizeResult {
    let unknown = SizeResult::unknown(kind);
    let Ok(tys) = module.path_types(path) else {
        tracing::trace!("access path does not resolve against the type table");
        return unknown;
    };

    let root = match root_size(module, path.root, kind, pointees) {
        Base::Unknown => return unknown,
        Base::Sized(root) if root.size >= OFFSET_LIMIT => return unknown,
        Base::Sized(root) => Some(root),
        Base::Unsized => None,
    };

    if path.steps.is_empty() {
        return root.unwrap_or(unknown);
    }

    let anchor = if kind.is_subobject() {
        select_subobject(module, path, &tys, root.map(|r| r.size))
    } else {
        0
    };

    let anchor_size = if anchor == 0 {
        root.map(|r| r.size)
    } else {
        module.types.size_of(tys[anchor])
    };
    let Some(anchor_size) = anchor_size else {
        return unknown;
    };
    let Some(offset) = offset_within(&module.types, &tys, &path.steps, anchor) else {
        return unknown;
    };
    let mut bytes = remaining(anchor_size, offset);

    // Never claim more than the pointee itself has left.
    if anchor != 0 && matches!(path.root, Root::Deref { .. }) {
        if let (Some(root), Some(from_root)) = (
            root,
            offset_within(&module.types, &tys, &path.steps, 0),
        ) {
            bytes = bytes.min(remaining(root.size, from_root));
        }
    }

    let wholesize = match (kind.is_subobject(), root) {
        (true, _) => anchor_size,
        (false, Some(root)) => root.wholesize,
        (false, None) => return unknown,
    };
    SizeResult::new(bytes, wholesize)
}

fn root_size(
    module: &Module,
    root: Root,
    kind: QueryKind,
    pointees: &mut dyn PointeeSizes,
) -> Base {
    match root {
        Root::Object(id) => {
            let Some(object) = module.object(id) else {
                return Base::Unknown;
            };
            match declared_size(&module.types, object.ty, object.trailing_init_bytes) {
                Some(size) => Base::Sized(SizeResult::exact(size)),
                None => Base::Unknown,
            }
        }
        Root::String(id) => match module.string(id).and_then(StringLit::size) {
            Some(size) => Base::Sized(SizeResult::exact(size)),
            None => Base::Unknown,
        },
        Root::Deref { base, offset, .. } => {
            let pointee = pointees.pointee_size(base, kind);
            if pointee.is_unknown(kind) {
                return Base::Unsized;
            }
            let size = size_for_offset(
                kind,
                pointee.size,
                offset_bits(offset),
                Some(pointee.wholesize),
            );
            if lattice::is_unknown(kind, size) || size >= OFFSET_LIMIT {
                Base::Unsized
            } else {
                Base::Sized(SizeResult::new(size, pointee.wholesize))
            }
        }
    }
}

/// Size of a declared object of type `ty`.
///
/// A record ending in a flexible array member extends to the end of that
/// member's initializer when one is recorded; otherwise the nominal
/// record size applies.
fn declared_size(types: &TypeTable, ty: TypeId, trailing_init: Option<u64>) -> Option<u64> {
    let nominal = types.size_of(ty)?;
    match (types.trailing_flexible_array(ty), trailing_init) {
        (Some(flex), Some(init)) => flex.offset.checked_add(init),
        _ => Some(nominal),
    }
}

/// Index into the path's type list of the subobject that bounds a
/// Subobject query. `0` means the root.
fn select_subobject(
    module: &Module,
    path: &AccessPath,
    tys: &[TypeId],
    root_size: Option<u64>,
) -> usize {
    let types = &module.types;
    let mut anchor = path.steps.len();
    // `&a[i]` is bounded by the array `a`, not by element `i`.
    if matches!(path.steps.last(), Some(Step::ArrayIndex { .. })) {
        anchor -= 1;
    }
    if anchor == 0 {
        return 0;
    }

    let Some(anchor_size) = types.size_of(tys[anchor]) else {
        return 0;
    };
    if root_size.is_some_and(|root| root < anchor_size) {
        return 0;
    }
    if matches!(path.root, Root::Deref { .. }) && is_open_ended(types, path, tys, anchor) {
        tracing::trace!(anchor, "trailing array through pointer, using pointee extent");
        return 0;
    }
    anchor
}

/// Whether the subobject at `from` may legitimately extend past its
/// declared type, so that only the enclosing pointee bounds it.
///
/// True when the walk from `from` back to the root only crosses the last
/// member of each record (looking through unions) and array indices at or
/// beyond the last declared element.
fn is_open_ended(types: &TypeTable, path: &AccessPath, tys: &[TypeId], from: usize) -> bool {
    let mut at = from;
    while at > 0 {
        match path.steps[at - 1] {
            Step::ArrayIndex { index } => {
                if let (Index::Const(k), Some(TypeKind::Array { len: Some(len), .. })) =
                    (index, types.get(tys[at - 1]))
                {
                    if i128::from(k) < i128::from(*len) - 1 {
                        return false;
                    }
                }
                at -= 1;
            }
            Step::ComplexPart(_) => return false,
            Step::FieldSelect { .. } => {
                if !types.is_array(tys[at]) {
                    return false;
                }
                at = skip_union_members(types, path, tys, at);
                let parent = at.checked_sub(1).map(|i| path.steps[i]);
                if let Some(Step::FieldSelect { field }) = parent {
                    let record = tys[at - 1];
                    if types.is_record(record) {
                        let is_last = types
                            .fields(record)
                            .is_some_and(|fields| field as usize + 1 == fields.len());
                        if !is_last {
                            return false;
                        }
                        at -= 1;
                    }
                }
                at = skip_union_members(types, path, tys, at);
                return at == 0;
            }
        }
    }
    true
}

/// Climb out of union member selections ending at `at`.
fn skip_union_members(
    types: &TypeTable,
    path: &AccessPath,
    tys: &[TypeId],
    mut at: usize,
) -> usize {
    while at > 0
        && matches!(path.steps[at - 1], Step::FieldSelect { .. })
        && types.is_union(tys[at - 1])
    {
        at -= 1;
    }
    at
}

/// Constant byte offset of the full lvalue from the object at `from`.
/// `None` if any step in between is not a compile-time constant.
fn offset_within(
    types: &TypeTable,
    tys: &[TypeId],
    steps: &[Step],
    from: usize,
) -> Option<i128> {
    let mut offset = 0i128;
    for (i, step) in steps.iter().enumerate().skip(from) {
        let delta = match *step {
            Step::FieldSelect { field } => {
                i128::from(types.fields(tys[i])?.get(field as usize)?.offset)
            }
            Step::ArrayIndex {
                index: Index::Const(k),
            } => i128::from(k).checked_mul(i128::from(types.size_of(tys[i + 1])?))?,
            Step::ArrayIndex {
                index: Index::Dynamic(_),
            } => return None,
            Step::ComplexPart(Part::Real) => 0,
            Step::ComplexPart(Part::Imag) => i128::from(types.size_of(tys[i + 1])?),
        };
        offset = offset.checked_add(delta)?;
    }
    Some(offset)
}

/// `size - offset`, or 0 when the offset is negative or past the end.
fn remaining(size: u64, offset: i128) -> u64 {
    u64::try_from(offset).map_or(0, |offset| size.saturating_sub(offset))
}

#[cfg(test)]
mod tests;

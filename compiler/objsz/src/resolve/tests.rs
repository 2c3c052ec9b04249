use objsz_ir::{ModuleBuilder, Part, Root, ValueId};
use pretty_assertions::assert_eq;
use rustc_hash::FxHashMap;

use super::*;
use crate::test_helpers::{deref, fixture, obj, OFFSETOF_B, OFFSETOF_C, SIZEOF_A};

/// Pointee sizes fixed up front, the same for every kind.
#[derive(Default)]
struct FixedPointees(FxHashMap<ValueId, SizeResult>);

impl FixedPointees {
    fn with(base: ValueId, size: SizeResult) -> Self {
        let mut map = FxHashMap::default();
        map.insert(base, size);
        Self(map)
    }
}

impl PointeeSizes for FixedPointees {
    fn pointee_size(&mut self, base: ValueId, kind: QueryKind) -> SizeResult {
        self.0
            .get(&base)
            .copied()
            .unwrap_or(SizeResult::unknown(kind))
    }
}

fn size_of(module: &Module, path: &AccessPath, kind: QueryKind) -> u64 {
    address_size(module, path, kind, &mut FixedPointees::default()).size
}

const P: ValueId = ValueId::new(0);

// ── Declared roots ──────────────────────────────────────────────

#[test]
fn whole_object_from_member() {
    let fx = fixture();
    let got = address_size(
        &fx.module,
        &obj(fx.s).field(1),
        QueryKind::MAX_WHOLE,
        &mut FixedPointees::default(),
    );
    assert_eq!(got, SizeResult::new(SIZEOF_A - OFFSETOF_B, SIZEOF_A));
}

#[test]
fn subobject_bounds_by_enclosing_array() {
    let fx = fixture();
    let got = address_size(
        &fx.module,
        &obj(fx.s).field(0).index(3),
        QueryKind::MAX_SUB,
        &mut FixedPointees::default(),
    );
    assert_eq!(got, SizeResult::new(7, 10));
}

#[test]
fn declared_trailing_array_is_its_own_subobject() {
    let fx = fixture();
    assert_eq!(
        size_of(&fx.module, &obj(fx.s).field(2).index(9), QueryKind::MAX_SUB),
        1
    );
    assert_eq!(
        size_of(&fx.module, &obj(fx.s).field(2).index(9), QueryKind::MAX_WHOLE),
        SIZEOF_A - OFFSETOF_C - 9
    );
}

#[test]
fn bare_array_element_uses_whole_array() {
    let fx = fixture();
    assert_eq!(
        size_of(&fx.module, &obj(fx.buf).index(8), QueryKind::MAX_SUB),
        56
    );
}

#[test]
fn negative_or_past_end_index_leaves_nothing() {
    let fx = fixture();
    assert_eq!(
        size_of(&fx.module, &obj(fx.s).field(0).index(-1), QueryKind::MAX_WHOLE),
        0
    );
    assert_eq!(
        size_of(&fx.module, &obj(fx.s).field(0).index(12), QueryKind::MAX_SUB),
        0
    );
}

#[test]
fn dynamic_index_below_anchor_is_unknown() {
    let fx = fixture();
    let path = obj(fx.s).field(0).dynamic_index(ValueId::new(7));
    assert_eq!(size_of(&fx.module, &path, QueryKind::MAX_SUB), u64::MAX);
    assert_eq!(size_of(&fx.module, &path, QueryKind::MIN_WHOLE), 0);
}

#[test]
fn complex_imaginary_half() {
    let mut mb = ModuleBuilder::new();
    let double = mb.types().scalar(8);
    let cplx = mb.types().complex(double);
    let z = mb.object("z", cplx);
    let module = mb.finish();

    let imag = obj(z).part(Part::Imag);
    assert_eq!(size_of(&module, &imag, QueryKind::MAX_WHOLE), 8);
    assert_eq!(size_of(&module, &imag, QueryKind::MAX_SUB), 8);
    let real = obj(z).part(Part::Real);
    assert_eq!(size_of(&module, &real, QueryKind::MAX_WHOLE), 16);
}

#[test]
fn flexible_member_uses_initializer_extent() {
    // struct F { int n; char data[]; }
    let mut mb = ModuleBuilder::new();
    let int_ty = mb.types().scalar(4);
    let char_ty = mb.types().scalar(1);
    let flex = mb.types().array(char_ty, None);
    let f_ty = mb.types().record(&[("n", int_ty), ("data", flex)]);
    let plain = mb.object("plain", f_ty);
    let init = mb.object_with_trailing_init("init", f_ty, 6);
    let module = mb.finish();

    assert_eq!(size_of(&module, &obj(plain), QueryKind::MAX_WHOLE), 4);
    assert_eq!(size_of(&module, &obj(init), QueryKind::MAX_WHOLE), 10);
    assert_eq!(size_of(&module, &obj(init), QueryKind::MIN_WHOLE), 10);
}

#[test]
fn unsized_declaration_is_unknown() {
    // extern char ext[];
    let mut mb = ModuleBuilder::new();
    let char_ty = mb.types().scalar(1);
    let open = mb.types().array(char_ty, None);
    let ext = mb.object("ext", open);
    let module = mb.finish();

    assert_eq!(size_of(&module, &obj(ext).index(2), QueryKind::MAX_WHOLE), u64::MAX);
}

#[test]
fn objects_at_the_offset_limit_are_rejected() {
    let mut mb = ModuleBuilder::new();
    let char_ty = mb.types().scalar(1);
    let huge = mb.types().array(char_ty, Some(OFFSET_LIMIT));
    let h = mb.object("h", huge);
    let module = mb.finish();

    assert_eq!(size_of(&module, &obj(h), QueryKind::MAX_WHOLE), u64::MAX);
}

#[test]
fn unresolvable_path_is_unknown() {
    let fx = fixture();
    // `b` is an int; indexing it does not type-check.
    let path = obj(fx.s).field(1).index(0);
    assert_eq!(size_of(&fx.module, &path, QueryKind::MAX_WHOLE), u64::MAX);
}

// ── String literals ─────────────────────────────────────────────

#[test]
fn string_literal_counts_terminator() {
    let mut mb = ModuleBuilder::new();
    let hello = mb.string("hello");
    let wide = mb.wide_string(3, 4);
    let module = mb.finish();

    let lit = AccessPath::root(Root::String(hello));
    assert_eq!(size_of(&module, &lit, QueryKind::MAX_WHOLE), 6);
    assert_eq!(size_of(&module, &lit.clone().index(2), QueryKind::MIN_SUB), 4);
    let wlit = AccessPath::root(Root::String(wide)).index(1);
    assert_eq!(size_of(&module, &wlit, QueryKind::MAX_WHOLE), 8);
}

// ── Pointer roots ───────────────────────────────────────────────

#[test]
fn trailing_array_through_pointer_uses_pointee() {
    let fx = fixture();
    let mut pointees = FixedPointees::with(P, SizeResult::exact(SIZEOF_A));
    let got = address_size(
        &fx.module,
        &deref(P, 0, fx.struct_a).field(2).index(9),
        QueryKind::MAX_SUB,
        &mut pointees,
    );
    assert_eq!(got.size, SIZEOF_A - OFFSETOF_C - 9);
}

#[test]
fn trailing_array_through_pointer_may_overhang() {
    // The allocation is larger than the struct; the last member grows with it.
    let fx = fixture();
    let mut pointees = FixedPointees::with(P, SizeResult::exact(100));
    let got = address_size(
        &fx.module,
        &deref(P, 0, fx.struct_a).field(2).index(9),
        QueryKind::MAX_SUB,
        &mut pointees,
    );
    assert_eq!(got.size, 100 - OFFSETOF_C - 9);
}

#[test]
fn inner_member_through_pointer_stays_bounded() {
    let fx = fixture();
    let mut pointees = FixedPointees::with(P, SizeResult::exact(SIZEOF_A));
    let got = address_size(
        &fx.module,
        &deref(P, 0, fx.struct_a).field(0).index(9),
        QueryKind::MAX_SUB,
        &mut pointees,
    );
    assert_eq!(got, SizeResult::new(1, 10));
}

#[test]
fn subobject_is_capped_by_pointee_remainder() {
    // Only 14 bytes allocated: `b` starts at 12 and keeps 2 of its 4 bytes.
    let fx = fixture();
    let mut pointees = FixedPointees::with(P, SizeResult::exact(14));
    let got = address_size(
        &fx.module,
        &deref(P, 0, fx.struct_a).field(1),
        QueryKind::MAX_SUB,
        &mut pointees,
    );
    assert_eq!(got, SizeResult::new(2, 4));
}

#[test]
fn pointee_smaller_than_member_bounds_by_pointee() {
    let fx = fixture();
    // 6 bytes remain past `p + 4`, fewer than `a` declares.
    let mut pointees = FixedPointees::with(P, SizeResult::exact(10));
    let got = address_size(
        &fx.module,
        &deref(P, 4, fx.struct_a).field(0).index(2),
        QueryKind::MAX_SUB,
        &mut pointees,
    );
    assert_eq!(got, SizeResult::new(4, 6));
}

#[test]
fn member_address_through_pointer_whole_object() {
    let fx = fixture();
    let mut pointees = FixedPointees::with(P, SizeResult::exact(SIZEOF_A));
    let got = address_size(
        &fx.module,
        &deref(P, 0, fx.struct_a).field(1),
        QueryKind::MAX_WHOLE,
        &mut pointees,
    );
    assert_eq!(got, SizeResult::new(SIZEOF_A - OFFSETOF_B, SIZEOF_A));
}

#[test]
fn unknown_pointee_still_bounds_inner_member() {
    let fx = fixture();
    let path = deref(P, 0, fx.struct_a).field(0).index(2);
    assert_eq!(
        address_size(&fx.module, &path, QueryKind::MAX_SUB, &mut FixedPointees::default()),
        SizeResult::new(8, 10)
    );
    assert_eq!(size_of(&fx.module, &path, QueryKind::MAX_WHOLE), u64::MAX);
}

#[test]
fn last_row_of_two_dimensional_array_is_open_ended() {
    // char m[3][4] reached through a 40-byte allocation.
    let mut mb = ModuleBuilder::new();
    let char_ty = mb.types().scalar(1);
    let row = mb.types().array(char_ty, Some(4));
    let m = mb.types().array(row, Some(3));
    let module = mb.finish();
    let mut pointees = FixedPointees::with(P, SizeResult::exact(40));

    let last_row = deref(P, 0, m).index(2).index(1);
    assert_eq!(
        address_size(&module, &last_row, QueryKind::MAX_SUB, &mut pointees).size,
        31
    );
    let inner_row = deref(P, 0, m).index(1).index(1);
    assert_eq!(
        address_size(&module, &inner_row, QueryKind::MAX_SUB, &mut pointees).size,
        3
    );
}

#[test]
fn union_members_are_looked_through() {
    // struct U { int tag; union { char small[4]; char big[16]; } u; }
    let mut mb = ModuleBuilder::new();
    let int_ty = mb.types().scalar(4);
    let char_ty = mb.types().scalar(1);
    let small = mb.types().array(char_ty, Some(4));
    let big = mb.types().array(char_ty, Some(16));
    let un = mb.types().union(&[("small", small), ("big", big)]);
    let u_ty = mb.types().record(&[("tag", int_ty), ("u", un)]);
    let module = mb.finish();
    let mut pointees = FixedPointees::with(P, SizeResult::exact(20));

    let path = deref(P, 0, u_ty).field(1).field(0).index(1);
    assert_eq!(
        address_size(&module, &path, QueryKind::MAX_SUB, &mut pointees).size,
        15
    );
}

#[test]
fn deref_offset_is_applied_with_wholesize() {
    let fx = fixture();
    // Pointer 6 bytes into a 10-byte object, then `p[-2]`.
    let mut pointees = FixedPointees::with(P, SizeResult::new(4, 10));
    let got = address_size(
        &fx.module,
        &deref(P, -2, fx.char_ty),
        QueryKind::MAX_WHOLE,
        &mut pointees,
    );
    assert_eq!(got, SizeResult::new(6, 10));
}

#[test]
fn pointee_at_the_offset_limit_is_unknown() {
    let fx = fixture();
    let mut pointees = FixedPointees::with(P, SizeResult::exact(OFFSET_LIMIT));
    let got = address_size(
        &fx.module,
        &deref(P, 0, fx.char_ty),
        QueryKind::MAX_WHOLE,
        &mut pointees,
    );
    assert!(got.is_unknown(QueryKind::MAX_WHOLE));
}

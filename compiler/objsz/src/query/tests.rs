use objsz_ir::{FunctionBuilder, Instr, Operand, ValueType};
use pretty_assertions::assert_eq;

use super::*;
use crate::test_helpers::{deref, fixture, obj, BUF_SIZE};

#[test]
fn lifecycle() {
    let fx = fixture();
    let func = FunctionBuilder::new("empty").finish();
    let mut sizes = ObjectSizes::new(&fx.module, &func);
    assert!(!sizes.is_open());

    sizes.init();
    sizes.init();
    assert!(sizes.is_open());

    sizes.teardown();
    assert!(!sizes.is_open());
}

#[test]
fn open_context_follows_merges() {
    let fx = fixture();
    let mut fb = FunctionBuilder::new("f");
    let a = fb.address_of(obj(fx.buf).index(8));
    let b = fb.address_of(obj(fx.buf).index(40));
    let m = fb.merge(&[a, b]);
    let func = fb.finish();

    let mut sizes = ObjectSizes::new(&fx.module, &func);
    sizes.init();
    assert_eq!(
        sizes.compute_object_size(m, QueryKind::MAX_WHOLE),
        ObjectSize::from_bytes(QueryKind::MAX_WHOLE, 56)
    );
    assert_eq!(
        sizes.compute_object_size(m, QueryKind::MIN_WHOLE).get(),
        Some(BUF_SIZE - 40)
    );
}

#[test]
fn closed_context_peels_pointer_adds() {
    let fx = fixture();
    let mut fb = FunctionBuilder::new("f");
    let p = fb.address_of(obj(fx.buf).index(8));
    let q = fb.pointer_add(p, 4);
    let r = fb.pointer_add(q, 2);
    let func = fb.finish();

    let mut sizes = ObjectSizes::new(&fx.module, &func);
    assert_eq!(sizes.compute_object_size(r, QueryKind::MAX_WHOLE).get(), Some(50));
    assert_eq!(sizes.compute_object_size(r, QueryKind::MIN_WHOLE).get(), Some(50));
    assert!(!sizes.is_open());
}

#[test]
fn closed_context_cannot_step_back() {
    let fx = fixture();
    let mut fb = FunctionBuilder::new("f");
    let p = fb.address_of(obj(fx.buf).index(8));
    let q = fb.pointer_add(p, -2);
    let func = fb.finish();

    // The fallback does not track where inside the object `p` points.
    let mut sizes = ObjectSizes::new(&fx.module, &func);
    assert!(!sizes.compute_object_size(q, QueryKind::MAX_WHOLE).known);

    sizes.init();
    assert_eq!(sizes.compute_object_size(q, QueryKind::MAX_WHOLE).get(), Some(58));
}

#[test]
fn closed_context_gives_up_on_subobjects_and_merges() {
    let fx = fixture();
    let mut fb = FunctionBuilder::new("f");
    let p = fb.address_of(obj(fx.s).field(0).index(3));
    let m = fb.merge(&[p]);
    let func = fb.finish();

    let mut sizes = ObjectSizes::new(&fx.module, &func);
    assert!(!sizes.compute_object_size(p, QueryKind::MAX_SUB).known);
    assert!(!sizes.compute_object_size(m, QueryKind::MAX_WHOLE).known);

    sizes.init();
    assert_eq!(sizes.compute_object_size(p, QueryKind::MAX_SUB).get(), Some(7));
    assert_eq!(sizes.compute_object_size(m, QueryKind::MAX_WHOLE).get(), Some(25));
}

#[test]
fn closed_context_is_bounded_on_malformed_chains() {
    let fx = fixture();
    let mut fb = FunctionBuilder::new("broken");
    let a = fb.push(
        ValueType::Pointer,
        Instr::PointerAdd {
            base: ValueId::new(1),
            offset: 4,
        },
    );
    let _b = fb.pointer_add(a, 4);
    let func = fb.finish();

    let mut sizes = ObjectSizes::new(&fx.module, &func);
    assert_eq!(
        sizes.compute_object_size(a, QueryKind::MAX_WHOLE),
        ObjectSize::unknown(QueryKind::MAX_WHOLE)
    );
}

#[test]
fn address_through_a_pointer() {
    let fx = fixture();
    let mut fb = FunctionBuilder::new("f");
    let p = fb.address_of(obj(fx.buf).index(8));
    let func = fb.finish();
    let path = deref(p, 4, fx.char_ty);

    let mut closed = ObjectSizes::new(&fx.module, &func);
    assert_eq!(closed.compute_address_size(&path, QueryKind::MAX_WHOLE).get(), Some(52));

    let mut open = ObjectSizes::new(&fx.module, &func);
    open.init();
    assert_eq!(open.compute_address_size(&path, QueryKind::MAX_SUB).get(), Some(52));
    assert_eq!(open.compute_address_size(&path, QueryKind::MAX_SUB).get(), Some(52));
}

#[test]
fn operands() {
    let fx = fixture();
    let mut fb = FunctionBuilder::new("f");
    let p = fb.call(fx.malloc, vec![Operand::Const(24)]);
    let n = fb.opaque_int();
    let func = fb.finish();

    let mut sizes = ObjectSizes::new(&fx.module, &func);
    sizes.init();
    let kind = QueryKind::MIN_SUB;
    assert_eq!(sizes.compute_operand_size(&Operand::Value(p), kind).get(), Some(24));
    assert_eq!(
        sizes
            .compute_operand_size(&Operand::Address(Box::new(obj(fx.buf))), kind)
            .get(),
        Some(BUF_SIZE)
    );
    assert_eq!(
        sizes.compute_operand_size(&Operand::Const(0), kind),
        ObjectSize::unknown(kind)
    );
    assert_eq!(
        sizes.compute_object_size(n, kind),
        ObjectSize::unknown(kind)
    );
}

#[test]
fn teardown_forgets_results() {
    let fx = fixture();
    let mut fb = FunctionBuilder::new("f");
    let p = fb.copy(ValueId::new(1));
    let _src = fb.call(fx.malloc, vec![Operand::Const(8)]);
    let func = fb.finish();

    let mut sizes = ObjectSizes::new(&fx.module, &func);
    sizes.init();
    assert_eq!(sizes.compute_object_size(p, QueryKind::MAX_WHOLE).get(), Some(8));
    sizes.teardown();
    // Without tables a copy is opaque again.
    assert!(!sizes.compute_object_size(p, QueryKind::MAX_WHOLE).known);
}

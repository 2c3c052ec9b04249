//! Shared IR factories for tests.

use objsz_ir::{
    AccessPath, AllocContract, Builtin, Callee, CalleeId, Module, ModuleBuilder, ObjectId, Root,
    TypeId, ValueId,
};

/// `sizeof(struct A)` for `struct A { char a[10]; int b; char c[10]; }`.
pub(crate) const SIZEOF_A: u64 = 28;
pub(crate) const OFFSETOF_B: u64 = 12;
pub(crate) const OFFSETOF_C: u64 = 16;

/// `sizeof(buf)` for the fixture's `char buf[64]`.
pub(crate) const BUF_SIZE: u64 = 64;

/// A module with the declarations most tests need.
pub(crate) struct Fixture {
    pub module: Module,
    pub char_ty: TypeId,
    /// `struct A { char a[10]; int b; char c[10]; }`
    pub struct_a: TypeId,
    /// `struct A s;`
    pub s: ObjectId,
    /// `char buf[64];`
    pub buf: ObjectId,
    pub malloc: CalleeId,
    pub calloc: CalleeId,
    pub memcpy: CalleeId,
    pub assume_aligned: CalleeId,
    pub object_size: CalleeId,
    pub dynamic_object_size: CalleeId,
    /// A call with no contracts.
    pub unknown_fn: CalleeId,
}

pub(crate) fn fixture() -> Fixture {
    fixture_with(|_| ()).0
}

/// Like [`fixture`], letting the caller declare extra entities after the
/// shared ones. Returns whatever `extra` returns alongside the fixture.
pub(crate) fn fixture_with<T>(extra: impl FnOnce(&mut ModuleBuilder) -> T) -> (Fixture, T) {
    let mut mb = ModuleBuilder::new();
    let char_ty = mb.types().scalar(1);
    let int_ty = mb.types().scalar(4);
    let char10 = mb.types().array(char_ty, Some(10));
    let struct_a = mb
        .types()
        .record(&[("a", char10), ("b", int_ty), ("c", char10)]);
    let buf_ty = mb.types().array(char_ty, Some(BUF_SIZE));

    let s = mb.object("s", struct_a);
    let buf = mb.object("buf", buf_ty);
    let malloc = mb.allocator("malloc", AllocContract::Single(0));
    let calloc = mb.allocator("calloc", AllocContract::Product(0, 1));
    let memcpy = mb.builtin("memcpy", Builtin::Memcpy);
    let assume_aligned = mb.builtin("__builtin_assume_aligned", Builtin::AssumeAligned);
    let object_size = mb.builtin("__builtin_object_size", Builtin::ObjectSize);
    let dynamic_object_size =
        mb.builtin("__builtin_dynamic_object_size", Builtin::DynamicObjectSize);
    let unknown_fn = mb.callee(Callee::plain("get_ptr"));
    let declared = extra(&mut mb);

    let fx = Fixture {
        module: mb.finish(),
        char_ty,
        struct_a,
        s,
        buf,
        malloc,
        calloc,
        memcpy,
        assume_aligned,
        object_size,
        dynamic_object_size,
        unknown_fn,
    };
    (fx, declared)
}

/// `&obj`.
pub(crate) fn obj(id: ObjectId) -> AccessPath {
    AccessPath::root(Root::Object(id))
}

/// `*(ty *)((char *)base + offset)`.
pub(crate) fn deref(base: ValueId, offset: i64, ty: TypeId) -> AccessPath {
    AccessPath::root(Root::Deref { base, offset, ty })
}

//! Call classification: allocators and pass-through calls.

use objsz_ir::{AllocContract, Builtin, Callee, Operand};

/// Byte count of the fresh allocation returned by a call to `callee`.
///
/// `None` unless `callee` carries an allocator contract and every argument
/// the contract names is a non-negative integer constant whose product
/// fits in `u64`.
pub(crate) fn alloc_size(callee: &Callee, args: &[Operand]) -> Option<u64> {
    let const_arg = |pos: u32| -> Option<u64> {
        let value = args.get(pos as usize)?.as_const()?;
        u64::try_from(value).ok()
    };

    match callee.alloc? {
        AllocContract::Single(n) => const_arg(n),
        AllocContract::Product(a, b) => const_arg(a)?.checked_mul(const_arg(b)?),
    }
}

/// The argument a call to `callee` returns unchanged, if any.
///
/// An explicit return-argument contract wins; otherwise the builtin's own
/// C contract applies. `__builtin_assume_aligned` returns its first
/// argument without declaring it.
pub(crate) fn pass_through<'a>(callee: &Callee, args: &'a [Operand]) -> Option<&'a Operand> {
    let returned = callee
        .returns_arg
        .or_else(|| callee.builtin.and_then(Builtin::returns_arg));
    if let Some(pos) = returned {
        return args.get(pos as usize);
    }
    match callee.builtin {
        Some(Builtin::AssumeAligned) => args.first(),
        _ => None,
    }
}

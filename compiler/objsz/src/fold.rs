//! Folding driver for size-query builtins.
//!
//! Scans a function for `__builtin_object_size` and
//! `__builtin_dynamic_object_size` calls and decides what each one should
//! be replaced with. The IR is not modified; the caller applies the
//! returned [`SizeFold`]s.

use objsz_ir::{Builtin, Function, Instr, Module, Operand, ValueId};

use crate::query::ObjectSizes;
use crate::QueryKind;

/// When the driver runs relative to the rest of the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FoldMode {
    /// Later passes may still sharpen the answer. Only Subobject queries
    /// are touched, and only by clamping the call's own result, so a more
    /// precise recomputation after inlining stays valid.
    Early,
    /// Final answer: every query folds to a constant or a runtime
    /// expression.
    Late,
}

/// Handle to a runtime size expression built by a [`DynamicSizer`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DynamicExprId(u32);

impl DynamicExprId {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }
}

/// Builds closed-form runtime size expressions for dynamic queries.
///
/// The analysis only proves constant bounds. An embedder that can express
/// `n * 4` for `malloc(n * 4)` in its own IR plugs that in here.
pub trait DynamicSizer {
    /// A runtime expression for the size of `ptr`, or `None` to fall back
    /// to the constant bound.
    fn size_expr(&mut self, func: &Function, ptr: &Operand, kind: QueryKind)
        -> Option<DynamicExprId>;
}

/// A [`DynamicSizer`] that never builds anything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoDynamicSizes;

impl DynamicSizer for NoDynamicSizes {
    fn size_expr(&mut self, _: &Function, _: &Operand, _: QueryKind) -> Option<DynamicExprId> {
        None
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ClampOp {
    Min,
    Max,
}

/// Replacement for one query call's result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FoldAction {
    /// Replace the result with this constant.
    Constant(u64),
    /// Keep the call, and use `op(call_result, bound)` in its place.
    Clamp { op: ClampOp, bound: u64 },
    /// Replace the result with a runtime expression.
    Dynamic(DynamicExprId),
}

/// Decision for one query call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SizeFold {
    /// The call instruction's value.
    pub call: ValueId,
    pub kind: QueryKind,
    pub action: FoldAction,
}

/// Decide a replacement for every size query in `func`.
///
/// Queries whose kind argument is not a constant in `0..=3` are left
/// alone. In [`FoldMode::Early`] queries that cannot be bounded are left
/// alone too; in [`FoldMode::Late`] they fold to the kind's unknown
/// sentinel.
pub fn fold_object_sizes(
    module: &Module,
    func: &Function,
    mode: FoldMode,
    dynamic: &mut dyn DynamicSizer,
) -> Vec<SizeFold> {
    let mut sizes = ObjectSizes::new(module, func);
    let mut folds = Vec::new();

    for (call, data) in func.iter() {
        let Instr::Call { callee, args } = &data.def else {
            continue;
        };
        let Some(builtin) = module.callee(*callee).and_then(|c| c.builtin) else {
            continue;
        };
        if !builtin.is_size_query() {
            continue;
        }
        let (Some(ptr), Some(kind)) = (
            args.first(),
            args.get(1)
                .and_then(Operand::as_const)
                .and_then(QueryKind::from_raw),
        ) else {
            tracing::trace!(call = call.raw(), "size query without a constant kind");
            continue;
        };

        sizes.init();
        let action = match mode {
            FoldMode::Early => early_action(&mut sizes, ptr, kind),
            FoldMode::Late => {
                let built = if builtin == Builtin::DynamicObjectSize {
                    dynamic.size_expr(func, ptr, kind)
                } else {
                    None
                };
                Some(built.map_or_else(
                    || late_constant(&mut sizes, ptr, kind),
                    FoldAction::Dynamic,
                ))
            }
        };

        if let Some(action) = action {
            tracing::debug!(
                function = %func.name,
                call = call.raw(),
                kind = kind.raw(),
                ?action,
                "folding object size query",
            );
            folds.push(SizeFold { call, kind, action });
        }
    }

    sizes.teardown();
    folds
}

/// Clamp a Subobject query's result by the proven bound.
fn early_action(sizes: &mut ObjectSizes<'_>, ptr: &Operand, kind: QueryKind) -> Option<FoldAction> {
    if !kind.is_subobject() {
        return None;
    }
    let bound = sizes.compute_operand_size(ptr, kind).get()?;
    let op = if kind.is_minimum() {
        ClampOp::Max
    } else {
        ClampOp::Min
    };
    Some(FoldAction::Clamp { op, bound })
}

fn late_constant(sizes: &mut ObjectSizes<'_>, ptr: &Operand, kind: QueryKind) -> FoldAction {
    // An unknown size carries the kind's sentinel in `bytes`.
    FoldAction::Constant(sizes.compute_operand_size(ptr, kind).bytes)
}

//! Detection of pointers advanced on every loop iteration.
//!
//! `p = &buf[0]; while (cond) p = p + 4;` leaves `p` in a dependency loop.
//! Reexamination would shrink its Minimum estimate by 4 per round until it
//! reaches 0, which takes as many rounds as the object has bytes. This
//! walk finds such loops directly and pins every value on them to 0.
//!
//! The walk tags values with a depth that grows by one across each
//! positive constant offset. Reaching a value already on the walk stack at
//! a different depth means the pointer gains bytes on each trip around.

use objsz_ir::{Function, Instr, Module, Operand, ValueId};

use crate::classify::pass_through;
use crate::collect::{SizeTable, VisitState};
use crate::lattice::SizeResult;
use crate::stack::ensure_sufficient_stack;

/// Pin the Minimum size of every value on an advancing loop to 0 and mark
/// it resolved. Only values still flagged for reexamination take part.
pub(crate) fn zero_advancing_loops(module: &Module, func: &Function, table: &mut SizeTable) {
    let mut walk = LoopWalk {
        module,
        func,
        table,
        depths: vec![0; func.len()],
        stack: Vec::new(),
    };
    for var in walk.table.flagged() {
        if walk.table.state(var) == VisitState::NeedsReexamination {
            walk.check(var);
        }
    }
}

struct LoopWalk<'a> {
    module: &'a Module,
    func: &'a Function,
    table: &'a mut SizeTable,
    /// Depth at which each value sits on the stack; 0 when not on it.
    depths: Vec<u32>,
    stack: Vec<ValueId>,
}

impl LoopWalk<'_> {
    fn check(&mut self, var: ValueId) {
        let Some((base, offset)) = advance(self.func, var) else {
            return;
        };
        if offset <= 0 || base.index() >= self.depths.len() {
            return;
        }

        self.depths[base.index()] = 1;
        self.stack.push(base);
        self.visit(var, 2);
        self.depths[base.index()] = 0;
        self.stack.pop();
    }

    fn visit(&mut self, var: ValueId, depth: u32) {
        let Some(&seen) = self.depths.get(var.index()) else {
            return;
        };
        if seen != 0 {
            if seen != depth {
                self.zero_stack_down_to(var);
            }
            return;
        }
        if self.table.state(var) != VisitState::NeedsReexamination {
            return;
        }

        self.depths[var.index()] = depth;
        self.stack.push(var);
        ensure_sufficient_stack(|| self.visit_operands(var, depth));
        self.depths[var.index()] = 0;
        self.stack.pop();
    }

    fn visit_operands(&mut self, var: ValueId, depth: u32) {
        if let Some((base, offset)) = advance(self.func, var) {
            self.visit(base, depth + u32::from(offset > 0));
            return;
        }
        let (module, func) = (self.module, self.func);
        match func.def(var) {
            Some(Instr::Copy { src }) => self.visit(*src, depth),
            Some(Instr::Merge { incoming }) => {
                for &rhs in incoming {
                    self.visit(rhs, depth);
                }
            }
            Some(Instr::Call { callee, args }) => {
                let arg = module
                    .callee(*callee)
                    .and_then(|callee| pass_through(callee, args));
                if let Some(Operand::Value(arg)) = arg {
                    self.visit(*arg, depth);
                }
            }
            _ => {}
        }
    }

    fn zero_stack_down_to(&mut self, var: ValueId) {
        tracing::debug!(
            function = %self.func.name,
            value = var.raw(),
            "pointer advances inside a loop, minimum size is 0",
        );
        for &v in self.stack.iter().rev() {
            let wholesize = self.table.result(v).wholesize;
            self.table.set(v, SizeResult::new(0, wholesize));
            self.table.mark(v, VisitState::Resolved);
            if v == var {
                break;
            }
        }
    }
}

/// `(base, offset)` if `var` is a constant pointer advance, written either
/// as `base p+ offset` or as `&MEM[base + offset]`.
fn advance(func: &Function, var: ValueId) -> Option<(ValueId, i64)> {
    match func.def(var)? {
        Instr::PointerAdd { base, offset } => Some((*base, *offset)),
        Instr::AddressOf(path) => path.as_pointer_plus(),
        _ => None,
    }
}

// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Expression building and evaluation.

use crate::context::EvalContext;
use crate::op::{signature, Kind, Op};
use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};

/// Kind of result an expression produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprKind {
    Arith,
    Bool,
}

/// A compiled arithmetic/boolean expression.
///
/// Ops are appended in postfix order, then [`Expression::build`] runs one
/// linear pass that checks operand kinds and assigns every op a destination
/// register (its stack slot). Evaluating an unbuilt expression is a contract
/// violation.
#[derive(Debug, Clone, Default)]
pub struct Expression {
    ops: Vec<Op>,
    consts: Vec<BigInt>,
    dest: Vec<usize>,
    nregs: usize,
    kind: Option<ExprKind>,
}

impl Expression {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an op.
    pub fn push(&mut self, op: Op) {
        debug_assert!(self.kind.is_none(), "expression modified after build()");
        self.ops.push(op);
    }

    /// Appends a constant load, interning the value.
    pub fn push_const(&mut self, v: impl Into<BigInt>) {
        let idx = self.consts.len();
        self.consts.push(v.into());
        self.push(Op::LoadConst(idx));
    }

    #[must_use]
    pub fn is_built(&self) -> bool {
        self.kind.is_some()
    }

    #[must_use]
    pub fn num_ops(&self) -> usize {
        self.ops.len()
    }

    /// Result kind; available after build.
    ///
    /// # Panics
    ///
    /// Panics if the expression is not built.
    #[must_use]
    pub fn kind(&self) -> ExprKind {
        self.kind.unwrap_or_else(|| unreachable!("expression used before build()"))
    }

    /// Assigns destination registers in one linear pass.
    ///
    /// # Panics
    ///
    /// Panics on a malformed op list (operand underflow, kind mismatch, or a
    /// result count other than one): the compiled program is corrupted.
    pub fn build(&mut self) {
        assert!(self.kind.is_none(), "expression built twice");
        let mut stack: Vec<Kind> = Vec::new();
        let mut nregs = 0usize;
        self.dest = Vec::with_capacity(self.ops.len());
        for op in &self.ops {
            let (pops, operand_kind, result_kind) = signature(op);
            assert!(stack.len() >= pops, "expression operand underflow");
            for _ in 0..pops {
                let k = stack.pop().unwrap_or(Kind::Arith);
                assert!(k == operand_kind, "expression operand kind mismatch");
            }
            self.dest.push(stack.len());
            stack.push(result_kind);
            nregs = nregs.max(stack.len());
        }
        assert!(stack.len() == 1, "expression does not reduce to one value");
        self.nregs = nregs;
        self.kind = Some(match stack[0] {
            Kind::Arith => ExprKind::Arith,
            Kind::Bool => ExprKind::Bool,
        });
    }

    /// Evaluates to an arithmetic value.
    ///
    /// # Panics
    ///
    /// Panics if the expression is unbuilt or boolean-valued.
    #[must_use]
    pub fn eval_arith(&self, ctx: &impl EvalContext) -> BigInt {
        assert!(self.kind() == ExprKind::Arith, "expression is not arithmetic");
        let (regs, _) = self.eval(ctx);
        regs.into_iter().next().unwrap_or_default()
    }

    /// Evaluates to a boolean.
    ///
    /// # Panics
    ///
    /// Panics if the expression is unbuilt or arithmetic-valued.
    #[must_use]
    pub fn eval_bool(&self, ctx: &impl EvalContext) -> bool {
        assert!(self.kind() == ExprKind::Bool, "expression is not boolean");
        let (_, bregs) = self.eval(ctx);
        bregs.first().copied().unwrap_or(false)
    }

    /// Replays the op list, writing intermediates into the register banks and
    /// leaving the result in register 0.
    fn eval(&self, ctx: &impl EvalContext) -> (Vec<BigInt>, Vec<bool>) {
        assert!(self.is_built(), "expression evaluated before build()");
        let mut regs = vec![BigInt::zero(); self.nregs];
        let mut bregs = vec![false; self.nregs];
        for (op, &d) in self.ops.iter().zip(&self.dest) {
            match op {
                Op::LoadField(r) => regs[d] = ctx.field_value(*r),
                Op::LoadFieldSigned(r) => regs[d] = ctx.field_value_signed(*r),
                Op::LoadConst(i) => regs[d] = self.consts[*i].clone(),
                Op::LoadLocal(i) => regs[d] = ctx.local(*i),
                Op::LoadBool(b) => bregs[d] = *b,
                Op::IsValid(h) => bregs[d] = ctx.header_valid(*h),

                Op::Neg => regs[d] = -regs[d].clone(),
                Op::BitNeg => regs[d] = !regs[d].clone(),
                Op::Not => bregs[d] = !bregs[d],

                Op::Add => {
                    let r = &regs[d] + &regs[d + 1];
                    regs[d] = r;
                }
                Op::Sub => {
                    let r = &regs[d] - &regs[d + 1];
                    regs[d] = r;
                }
                Op::Mul => {
                    let r = &regs[d] * &regs[d + 1];
                    regs[d] = r;
                }
                Op::Div => {
                    assert!(!regs[d + 1].is_zero(), "expression divides by zero");
                    let r = &regs[d] / &regs[d + 1];
                    regs[d] = r;
                }
                Op::Mod => {
                    assert!(!regs[d + 1].is_zero(), "expression divides by zero");
                    let r = &regs[d] % &regs[d + 1];
                    regs[d] = r;
                }
                Op::BitAnd => {
                    let r = &regs[d] & &regs[d + 1];
                    regs[d] = r;
                }
                Op::BitOr => {
                    let r = &regs[d] | &regs[d + 1];
                    regs[d] = r;
                }
                Op::BitXor => {
                    let r = &regs[d] ^ &regs[d + 1];
                    regs[d] = r;
                }
                Op::Shl => {
                    let r = &regs[d] << shift_amount(&regs[d + 1]);
                    regs[d] = r;
                }
                Op::Shr => {
                    let r = &regs[d] >> shift_amount(&regs[d + 1]);
                    regs[d] = r;
                }

                Op::Eq => bregs[d] = regs[d] == regs[d + 1],
                Op::Ne => bregs[d] = regs[d] != regs[d + 1],
                Op::Gt => bregs[d] = regs[d] > regs[d + 1],
                Op::Ge => bregs[d] = regs[d] >= regs[d + 1],
                Op::Lt => bregs[d] = regs[d] < regs[d + 1],
                Op::Le => bregs[d] = regs[d] <= regs[d + 1],

                Op::And => bregs[d] = bregs[d] && bregs[d + 1],
                Op::Or => bregs[d] = bregs[d] || bregs[d + 1],
            }
        }
        (regs, bregs)
    }
}

fn shift_amount(v: &BigInt) -> usize {
    v.to_usize()
        .unwrap_or_else(|| unreachable!("shift amount out of range"))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::context::WithLocals;
    use phv::{FieldRef, FieldSpec, HeaderType, KeySpec, PhvFactory, PhvSpec, ResetPolicy};

    fn two_field_phv() -> (phv::PhvLease, phv::HeaderId) {
        let ty = HeaderType::new(
            "h_t",
            vec![FieldSpec::new("a", 16), FieldSpec::new("b", 16)],
        );
        let mut spec = PhvSpec::new();
        let hid = spec.add_header("h", ty, false);
        let factory = PhvFactory::new(spec, ResetPolicy::Invalidate);
        (factory.get(), hid)
    }

    #[test]
    fn arith_and_comparison() {
        let (mut phv, hid) = two_field_phv();
        phv.header_mut(hid).field_mut(0).set_from_uint(10);
        phv.header_mut(hid).field_mut(1).set_from_uint(4);

        // (a - b) * 3 > 17
        let mut e = Expression::new();
        e.push(Op::LoadField(FieldRef::new(hid, 0)));
        e.push(Op::LoadField(FieldRef::new(hid, 1)));
        e.push(Op::Sub);
        e.push_const(3);
        e.push(Op::Mul);
        e.push_const(17);
        e.push(Op::Gt);
        e.build();

        assert_eq!(e.kind(), ExprKind::Bool);
        assert!(e.eval_bool(&*phv));
        phv.header_mut(hid).field_mut(1).set_from_uint(5);
        assert!(!e.eval_bool(&*phv));
    }

    #[test]
    fn validity_predicate() {
        let (mut phv, hid) = two_field_phv();
        let mut e = Expression::new();
        e.push(Op::IsValid(hid));
        e.push(Op::Not);
        e.build();
        assert!(e.eval_bool(&*phv));
        phv.header_mut(hid).mark_valid();
        assert!(!e.eval_bool(&*phv));
    }

    #[test]
    fn signed_load_compares_negative() {
        let (mut phv, hid) = two_field_phv();
        phv.header_mut(hid).field_mut(0).set_from_uint(0xffff); // -1 signed

        let mut e = Expression::new();
        e.push(Op::LoadFieldSigned(FieldRef::new(hid, 0)));
        e.push_const(0);
        e.push(Op::Lt);
        e.build();
        assert!(e.eval_bool(&*phv));

        let mut u = Expression::new();
        u.push(Op::LoadField(FieldRef::new(hid, 0)));
        u.push_const(0);
        u.push(Op::Lt);
        u.build();
        assert!(!u.eval_bool(&*phv));
    }

    #[test]
    fn locals_feed_variable_length_computation() {
        let (phv, _) = two_field_phv();
        // (local0 << 2) - 20, the shape of an ihl-style length expression
        let mut e = Expression::new();
        e.push(Op::LoadLocal(0));
        e.push_const(2);
        e.push(Op::Shl);
        e.push_const(20);
        e.push(Op::Sub);
        e.build();

        let locals = [BigInt::from(15)];
        let ctx = WithLocals::new(&*phv, &locals);
        assert_eq!(e.eval_arith(&ctx), BigInt::from(40));
    }

    #[test]
    fn register_assignment_handles_nesting() {
        // ((1 + 2) * (3 + 4)) % 5 == 1
        let mut e = Expression::new();
        e.push_const(1);
        e.push_const(2);
        e.push(Op::Add);
        e.push_const(3);
        e.push_const(4);
        e.push(Op::Add);
        e.push(Op::Mul);
        e.push_const(5);
        e.push(Op::Mod);
        e.push_const(1);
        e.push(Op::Eq);
        e.build();
        let (phv, _) = two_field_phv();
        assert!(e.eval_bool(&*phv));
    }

    #[test]
    fn matches_bigint_model() {
        bolero::check!()
            .with_type()
            .cloned()
            .for_each(|(a, b): (u32, u32)| {
                let (mut phv, hid) = two_field_phv();
                phv.header_mut(hid).field_mut(0).set_from_uint(u64::from(a) & 0xffff);
                phv.header_mut(hid).field_mut(1).set_from_uint(u64::from(b) & 0xffff);
                let av = BigInt::from(u64::from(a) & 0xffff);
                let bv = BigInt::from(u64::from(b) & 0xffff);

                let mut e = Expression::new();
                e.push(Op::LoadField(FieldRef::new(hid, 0)));
                e.push(Op::LoadField(FieldRef::new(hid, 1)));
                e.push(Op::BitXor);
                e.push(Op::LoadField(FieldRef::new(hid, 1)));
                e.push(Op::Add);
                e.build();
                assert_eq!(e.eval_arith(&*phv), (&av ^ &bv) + &bv);
            });
    }

    #[test]
    #[should_panic(expected = "before build()")]
    fn unbuilt_expression_is_fatal() {
        let (phv, hid) = two_field_phv();
        let mut e = Expression::new();
        e.push(Op::LoadField(FieldRef::new(hid, 0)));
        let _ = e.eval_arith(&*phv);
    }

    #[test]
    fn key_spec_and_expression_share_field_refs() {
        // sanity: the same FieldRef addresses the same storage both ways
        let (mut phv, hid) = two_field_phv();
        phv.header_mut(hid).field_mut(0).set_from_uint(0x0102);
        let key = KeySpec::new(vec![KeySpec::field(hid, 0)]);
        assert_eq!(key.key_bytes(&phv), vec![0x01, 0x02]);
        let mut e = Expression::new();
        e.push(Op::LoadField(FieldRef::new(hid, 0)));
        e.build();
        assert_eq!(e.eval_arith(&*phv), BigInt::from(0x0102));
    }
}

// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The standard primitive set.
//!
//! These mirror the core library of the source language's reference targets:
//! field assignment and arithmetic, header and stack manipulation, resource
//! access, digest generation, drop and exit. Targets may register additional
//! primitives through the same [`ActionPrimitive`] trait.

use crate::action::{ActionContext, ActionParam, ActionPrimitive};
use num_bigint::{BigInt, Sign};
use num_traits::{One, ToPrimitive};

/// `assign(dst_field, value)`
pub struct Assign;

impl ActionPrimitive for Assign {
    fn name(&self) -> &'static str {
        "assign"
    }

    fn num_params(&self) -> usize {
        2
    }

    fn execute(&self, ctx: &mut ActionContext<'_>, args: &[ActionParam]) {
        let value = args[1].data(ctx);
        let dst = args[0].field_ref();
        ctx.packet.phv_mut().field_mut(dst).set_from_int(&value);
    }
}

macro_rules! arith_primitive {
    ($name:ident, $label:literal, $op:tt) => {
        #[doc = concat!("`", $label, "(dst_field, a, b)`")]
        pub struct $name;

        impl ActionPrimitive for $name {
            fn name(&self) -> &'static str {
                $label
            }

            fn num_params(&self) -> usize {
                3
            }

            fn execute(&self, ctx: &mut ActionContext<'_>, args: &[ActionParam]) {
                let a = args[1].data(ctx);
                let b = args[2].data(ctx);
                let dst = args[0].field_ref();
                ctx.packet.phv_mut().field_mut(dst).set_from_int(&(a $op b));
            }
        }
    };
}

arith_primitive!(Add, "add", +);
arith_primitive!(Sub, "subtract", -);
arith_primitive!(BitAnd, "bit_and", &);
arith_primitive!(BitOr, "bit_or", |);
arith_primitive!(BitXor, "bit_xor", ^);

/// `add_header(header)` — marks the header valid.
pub struct Validate;

impl ActionPrimitive for Validate {
    fn name(&self) -> &'static str {
        "add_header"
    }

    fn num_params(&self) -> usize {
        1
    }

    fn execute(&self, ctx: &mut ActionContext<'_>, args: &[ActionParam]) {
        ctx.packet.phv_mut().header_mut(args[0].header()).mark_valid();
    }
}

/// `remove_header(header)` — marks the header invalid.
pub struct Invalidate;

impl ActionPrimitive for Invalidate {
    fn name(&self) -> &'static str {
        "remove_header"
    }

    fn num_params(&self) -> usize {
        1
    }

    fn execute(&self, ctx: &mut ActionContext<'_>, args: &[ActionParam]) {
        ctx.packet.phv_mut().header_mut(args[0].header()).mark_invalid();
    }
}

/// `push(stack)`
pub struct Push;

impl ActionPrimitive for Push {
    fn name(&self) -> &'static str {
        "push"
    }

    fn num_params(&self) -> usize {
        1
    }

    fn execute(&self, ctx: &mut ActionContext<'_>, args: &[ActionParam]) {
        ctx.packet.phv_mut().stack_push_front(args[0].stack());
    }
}

/// `pop(stack)`
pub struct Pop;

impl ActionPrimitive for Pop {
    fn name(&self) -> &'static str {
        "pop"
    }

    fn num_params(&self) -> usize {
        1
    }

    fn execute(&self, ctx: &mut ActionContext<'_>, args: &[ActionParam]) {
        ctx.packet.phv_mut().stack_pop_front(args[0].stack());
    }
}

fn index_of(value: &num_bigint::BigInt) -> usize {
    value
        .to_usize()
        .unwrap_or_else(|| panic!("resource index out of range"))
}

/// `count(counter_array, index)` — one packet, wire-length bytes.
pub struct Count;

impl ActionPrimitive for Count {
    fn name(&self) -> &'static str {
        "count"
    }

    fn num_params(&self) -> usize {
        2
    }

    fn execute(&self, ctx: &mut ActionContext<'_>, args: &[ActionParam]) {
        let index = index_of(&args[1].data(ctx));
        let counters = ctx.env.counters(args[0].counter());
        if let Err(e) = counters.add(index, ctx.packet.ingress().length) {
            panic!("count: {e}");
        }
    }
}

/// `execute_meter(meter_array, index, dst_field)` — writes the color.
pub struct ExecuteMeter;

impl ActionPrimitive for ExecuteMeter {
    fn name(&self) -> &'static str {
        "execute_meter"
    }

    fn num_params(&self) -> usize {
        3
    }

    fn execute(&self, ctx: &mut ActionContext<'_>, args: &[ActionParam]) {
        let index = index_of(&args[1].data(ctx));
        let meters = ctx.env.meters(args[0].meter());
        let ingress = *ctx.packet.ingress();
        let color = match meters.execute(index, ingress.arrival_us, ingress.length) {
            Ok(color) => color,
            Err(e) => panic!("execute_meter: {e}"),
        };
        let dst = args[2].field_ref();
        ctx.packet.phv_mut().field_mut(dst).set_from_uint(u64::from(color));
    }
}

/// `register_read(dst_field, register_array, index)`
pub struct RegisterRead;

impl ActionPrimitive for RegisterRead {
    fn name(&self) -> &'static str {
        "register_read"
    }

    fn num_params(&self) -> usize {
        3
    }

    fn execute(&self, ctx: &mut ActionContext<'_>, args: &[ActionParam]) {
        let index = index_of(&args[2].data(ctx));
        let registers = ctx.env.registers(args[1].register());
        let value = match registers.read(index) {
            Ok(v) => v,
            Err(e) => panic!("register_read: {e}"),
        };
        let dst = args[0].field_ref();
        ctx.packet.phv_mut().field_mut(dst).set_from_big(&value);
    }
}

/// `register_write(register_array, index, value)`
pub struct RegisterWrite;

impl ActionPrimitive for RegisterWrite {
    fn name(&self) -> &'static str {
        "register_write"
    }

    fn num_params(&self) -> usize {
        3
    }

    fn execute(&self, ctx: &mut ActionContext<'_>, args: &[ActionParam]) {
        let registers = ctx.env.registers(args[0].register());
        let index = index_of(&args[1].data(ctx));
        let value = args[2].data(ctx);
        // negative values wrap at the cell width
        let modulus = BigInt::one() << registers.nbits();
        let mut wrapped = value % &modulus;
        if wrapped.sign() == Sign::Minus {
            wrapped += &modulus;
        }
        let unsigned = wrapped.to_biguint().unwrap_or_default();
        if let Err(e) = registers.write(index, &unsigned) {
            panic!("register_write: {e}");
        }
    }
}

/// `generate_digest(list_id)` — samples the PHV into the digest list.
pub struct GenerateDigest;

impl ActionPrimitive for GenerateDigest {
    fn name(&self) -> &'static str {
        "generate_digest"
    }

    fn num_params(&self) -> usize {
        1
    }

    fn execute(&self, ctx: &mut ActionContext<'_>, args: &[ActionParam]) {
        let list_id = u32::try_from(index_of(&args[0].data(ctx))).unwrap_or(u32::MAX);
        let engine = ctx
            .env
            .learn()
            .unwrap_or_else(|| panic!("generate_digest with no learn engine configured"));
        if let Err(e) = engine.learn(list_id, ctx.packet.phv()) {
            panic!("generate_digest: {e}");
        }
    }
}

/// `mark_to_drop()` — the packet is discarded at egress; processing continues.
pub struct MarkToDrop;

impl ActionPrimitive for MarkToDrop {
    fn name(&self) -> &'static str {
        "mark_to_drop"
    }

    fn num_params(&self) -> usize {
        0
    }

    fn execute(&self, ctx: &mut ActionContext<'_>, _args: &[ActionParam]) {
        ctx.packet.mark_dropped();
    }
}

/// `exit()` — ends pipeline traversal after the current action.
pub struct Exit;

impl ActionPrimitive for Exit {
    fn name(&self) -> &'static str {
        "exit"
    }

    fn num_params(&self) -> usize {
        0
    }

    fn execute(&self, ctx: &mut ActionContext<'_>, _args: &[ActionParam]) {
        ctx.packet.request_exit();
    }
}

//! Binary arithmetic between two signals
//!
//! Combines `source` with `operand` using the `op` option: `add`, `sub`,
//! `mul` or `div`. Division by zero yields 0. The loop is specialized on the
//! rates of both inputs.

use crate::error::Error;
use crate::rate::Rate;
use crate::registry::{Registry, UGenDefaults};
use crate::ugen::{GenContext, InputView, UGenOutput, UnitGen};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl MathOp {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "add" => Some(MathOp::Add),
            "sub" => Some(MathOp::Sub),
            "mul" => Some(MathOp::Mul),
            "div" => Some(MathOp::Div),
            _ => None,
        }
    }

    #[inline]
    fn apply(self, a: f32, b: f32) -> f32 {
        match self {
            MathOp::Add => a + b,
            MathOp::Sub => a - b,
            MathOp::Mul => a * b,
            MathOp::Div => {
                if b == 0.0 {
                    0.0
                } else {
                    a / b
                }
            }
        }
    }
}

type GenFn = fn(MathOp, &InputView<'_>, &mut [f32]);

pub struct MathNode {
    /// Operator applied to `a` and `b`
    op: MathOp,
    /// Loop picked for the current `a`/`b` rates
    gen_fn: GenFn,
}

impl MathNode {
    pub fn new(op: MathOp) -> Self {
        Self {
            op,
            gen_fn: run::<false, false>,
        }
    }
}

fn run<const SOURCE_AR: bool, const OPERAND_AR: bool>(
    op: MathOp,
    inputs: &InputView<'_>,
    out: &mut [f32],
) {
    let source = inputs.buffer("source");
    let operand = inputs.buffer("operand");
    let (mut i, mut j) = (0, 0);
    for s in out.iter_mut() {
        *s = op.apply(source[i], operand[j]);
        if SOURCE_AR {
            i += 1;
        }
        if OPERAND_AR {
            j += 1;
        }
    }
}

impl UnitGen for MathNode {
    fn gen(&mut self, ctx: &mut GenContext<'_>, out: &mut UGenOutput, num_samps: usize) {
        (self.gen_fn)(self.op, &ctx.inputs, &mut out.first_mut()[..num_samps]);
        out.capture_value(num_samps);
    }

    fn on_input_changed(&mut self, inputs: &InputView<'_>, _name: Option<&str>) {
        self.gen_fn = match (inputs.stride("source") == 1, inputs.stride("operand") == 1) {
            (false, false) => run::<false, false>,
            (true, false) => run::<true, false>,
            (false, true) => run::<false, true>,
            (true, true) => run::<true, true>,
        };
    }
}

pub fn register(registry: &mut Registry) {
    registry.register(
        "math",
        UGenDefaults::new(Rate::Audio)
            .input("source", 0.0)
            .input("operand", 0.0)
            .option("op", "add"),
        |build| {
            let name = build.option_str("op").unwrap_or("add");
            let op = MathOp::parse(name)
                .ok_or_else(|| Error::InvalidDef(format!("unknown math op: {}", name)))?;
            Ok(Box::new(MathNode::new(op)))
        },
    );
}

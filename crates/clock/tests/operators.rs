mod common;

use clock::ClockConfig;
use common::{field, line, start};
use compute::kernel::{BinaryOp, BorderPolicy, Expr, Stmt};
use graph::{Graph, KernelBodies, KernelTemplate, OutputRule, OutputSpec};

#[test]
fn winner_take_all_picks_the_first_maximum() {
    let mut g = Graph::new();
    let x = g.declare_constant(field(&[3.0, 3.0, 1.0])).unwrap();
    let w = g.winner_take_all(x).unwrap();
    g.probe(w, "winner").unwrap();
    let mut clock = start(&mut g, ClockConfig::default());

    clock.reset().unwrap();
    assert_eq!(clock.read_probe(w).unwrap().values(), &[1.0, 0.0, 0.0]);
}

#[test]
fn expand_then_trim_restores_the_interior() {
    let mut g = Graph::new();
    let x = g.declare_constant(field(&[1.0, 2.0, 3.0])).unwrap();
    let wide = g.expand(x, &[5], BorderPolicy::Zero).unwrap();
    let back = g.trim(wide, &[3]).unwrap();
    g.probe(wide, "wide").unwrap();
    g.probe(back, "back").unwrap();
    let mut clock = start(&mut g, ClockConfig::default());

    clock.reset().unwrap();
    assert_eq!(clock.read_probe(wide).unwrap().values(), &[1.0, 2.0, 3.0, 0.0, 0.0]);
    assert_eq!(clock.read_probe(back).unwrap().values(), &[1.0, 2.0, 3.0]);
}

#[test]
fn custom_kernel_runs_every_step() {
    let template = KernelTemplate::new(
        "double",
        vec![OutputSpec::new("out", OutputRule::LikeInput(0))],
        KernelBodies::Uniform(vec![Stmt::WriteTensor {
            output: 0,
            value: Expr::binary(BinaryOp::Mul, Expr::read(0), Expr::constant(2.0)),
        }]),
    );
    let mut g = Graph::new();
    let id = g.register_kernel(template).unwrap();
    let x = g.declare_constant(field(&[1.0, 2.0])).unwrap();
    let doubled = g.declare_custom_kernel(id, &[x]).unwrap()[0];
    g.bind_recurrence(x, doubled).unwrap();
    g.probe(x, "x").unwrap();
    let mut clock = start(&mut g, ClockConfig::default());

    clock.reset().unwrap();
    clock.step().unwrap();
    clock.step().unwrap();
    assert_eq!(clock.read_probe(x).unwrap().values(), &[4.0, 8.0]);
    assert_eq!(line(2), *clock.read_probe(x).unwrap().field_type());
}

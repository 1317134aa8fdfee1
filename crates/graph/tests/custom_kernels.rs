mod common;

use std::sync::Arc;

use common::{constant, freeze, kernel_index, line, vectors};
use compute::kernel::{
    BinaryOp, CodeStrategy, ElementIndex, Expr, Stmt, ThreadAddressing, UnaryOp,
};
use compute::{FieldType, Shape};
use graph::{
    CompileError, CompilerConfig, Graph, GraphError, KernelBodies, KernelTemplate, OutputRule,
    OutputSpec,
};

fn doubled() -> KernelTemplate {
    KernelTemplate::new(
        "double",
        vec![OutputSpec::new("out", OutputRule::LikeInput(0))],
        KernelBodies::Uniform(vec![Stmt::WriteTensor {
            output: 0,
            value: Expr::binary(BinaryOp::Mul, Expr::read(0), Expr::constant(2.0)),
        }]),
    )
}

#[test]
fn specializations_are_shared_between_call_sites() {
    let mut g = Graph::new();
    let id = g.register_kernel(doubled()).unwrap();
    let a = constant(&mut g, line(4), 1.0);
    let b = constant(&mut g, line(4), 2.0);
    let c = constant(&mut g, line(8), 3.0);
    let outs: Vec<_> = [a, b, c]
        .iter()
        .map(|&x| g.declare_custom_kernel(id, &[x]).unwrap()[0])
        .collect();
    for (i, &out) in outs.iter().enumerate() {
        g.probe(out, format!("out{i}")).unwrap();
    }

    let compiled = freeze(&mut g);
    assert_eq!(compiled.kernels.len(), 3);
    assert_eq!(compiled.specializations, 2);
    let first = compiled.kernel_of(outs[0]).unwrap();
    let second = compiled.kernel_of(outs[1]).unwrap();
    let third = compiled.kernel_of(outs[2]).unwrap();
    assert!(Arc::ptr_eq(&first.program, &second.program));
    assert!(!Arc::ptr_eq(&first.program, &third.program));
    assert_eq!(first.template, Some(id));
}

#[test]
fn dual_bodies_follow_the_tensor_size() {
    let small = vec![Stmt::WriteTensor {
        output: 0,
        value: Expr::unary(UnaryOp::Neg, Expr::read(0)),
    }];
    let big = vec![Stmt::ForEachElement {
        extent: 6,
        body: vec![Stmt::WriteElement {
            output: 0,
            element: ElementIndex::Loop,
            value: Expr::unary(UnaryOp::Neg, Expr::read(0)),
        }],
    }];
    let template = KernelTemplate::new(
        "negate",
        vec![OutputSpec::new("out", OutputRule::LikeInput(0))],
        KernelBodies::Dual {
            small: small.clone(),
            big: big.clone(),
        },
    );

    let mut g = Graph::new();
    let id = g.register_kernel(template).unwrap();
    let pair = constant(&mut g, vectors(3, 2), 1.0);
    let wide = constant(&mut g, vectors(3, 6), 1.0);
    let p = g.declare_custom_kernel(id, &[pair]).unwrap()[0];
    let w = g.declare_custom_kernel(id, &[wide]).unwrap()[0];
    g.probe(p, "p").unwrap();
    g.probe(w, "w").unwrap();

    let compiled = freeze(&mut g);
    let pk = compiled.kernel_of(p).unwrap();
    let wk = compiled.kernel_of(w).unwrap();
    assert_eq!(pk.program.strategy, CodeStrategy::SmallTensor);
    assert_eq!(pk.program.body, small);
    assert_eq!(wk.program.strategy, CodeStrategy::BigTensor);
    assert_eq!(wk.program.body, big);
}

#[test]
fn multi_output_kernels_stay_separate() {
    let template = KernelTemplate::new(
        "split",
        vec![
            OutputSpec::new("sum", OutputRule::LikeInput(0)),
            OutputSpec::new("difference", OutputRule::LikeInput(0)),
        ],
        KernelBodies::Uniform(vec![
            Stmt::WriteTensor {
                output: 0,
                value: Expr::binary(BinaryOp::Add, Expr::read(0), Expr::read(1)),
            },
            Stmt::WriteTensor {
                output: 1,
                value: Expr::binary(BinaryOp::Sub, Expr::read(0), Expr::read(1)),
            },
        ]),
    );

    let mut g = Graph::new();
    let id = g.register_kernel(template).unwrap();
    let a = constant(&mut g, line(4), 3.0);
    let b = constant(&mut g, line(4), 1.0);
    let pre = g.offset(a, 1.0).unwrap();
    let outs = g.declare_custom_kernel(id, &[pre, b]).unwrap();
    assert_eq!(outs.len(), 2);
    let after = g.offset(outs[1], 1.0).unwrap();
    g.probe(after, "after").unwrap();

    let compiled = freeze(&mut g);
    assert_eq!(compiled.kernels.len(), 3);
    let custom = compiled.kernel_of(outs[0]).unwrap();
    assert_eq!(custom.outputs, outs);
    assert_eq!(custom.inputs, vec![pre, b]);
    assert_ne!(kernel_index(&compiled, pre), custom.id);
    assert_ne!(kernel_index(&compiled, after), custom.id);
}

#[test]
fn statements_after_a_tensor_write_are_rejected() {
    let template = KernelTemplate::new(
        "late",
        vec![OutputSpec::new("out", OutputRule::LikeInput(0))],
        KernelBodies::Uniform(vec![
            Stmt::WriteTensor {
                output: 0,
                value: Expr::read(0),
            },
            Stmt::Let {
                temp: 0,
                value: Expr::read(0),
            },
        ]),
    )
    .with_temps(1);

    let mut g = Graph::new();
    let id = g.register_kernel(template).unwrap();
    let x = constant(&mut g, line(4), 1.0);
    let out = g.declare_custom_kernel(id, &[x]).unwrap()[0];
    g.probe(out, "out").unwrap();

    let err = g.freeze(&CompilerConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        CompileError::IllegalTrailingStatement { index: 1, .. }
    ));
}

#[test]
fn element_index_requires_per_element_addressing() {
    let body = vec![Stmt::WriteElement {
        output: 0,
        element: ElementIndex::Fixed(0),
        value: Expr::ThreadElement,
    }];
    let template = KernelTemplate::new(
        "index",
        vec![OutputSpec::new("out", OutputRule::LikeInput(0))],
        KernelBodies::Uniform(body),
    );

    let mut g = Graph::new();
    let id = g.register_kernel(template).unwrap();
    let x = constant(&mut g, vectors(4, 3), 1.0);
    let out = g.declare_custom_kernel(id, &[x]).unwrap()[0];
    g.probe(out, "out").unwrap();

    assert!(matches!(
        g.freeze(&CompilerConfig::default()),
        Err(CompileError::IllegalAddressing { .. })
    ));
}

#[test]
fn per_element_addressing_adds_a_thread_axis() {
    let body = vec![Stmt::WriteElement {
        output: 0,
        element: ElementIndex::Loop,
        value: Expr::ThreadElement,
    }];
    let template = KernelTemplate::new(
        "index",
        vec![OutputSpec::new("out", OutputRule::LikeInput(0))],
        KernelBodies::Uniform(body),
    )
    .with_addressing(ThreadAddressing::PerInputElement(0))
    .with_local_size(vec![2, 3]);

    let mut g = Graph::new();
    let id = g.register_kernel(template.clone()).unwrap();
    let x = constant(&mut g, vectors(4, 3), 1.0);
    let out = g.declare_custom_kernel(id, &[x]).unwrap()[0];
    g.probe(out, "out").unwrap();
    let compiled = freeze(&mut g);
    let layout = compiled.kernel_of(out).unwrap().program.layout;
    assert_eq!(layout.local, [2, 3, 1]);
    assert_eq!(layout.global, [4, 3, 1]);

    // A 3-D field leaves no room for the element axis.
    let mut g = Graph::new();
    let id = g
        .register_kernel(template.with_local_size(vec![1, 1, 1, 1]))
        .unwrap();
    let cube = FieldType::vector(Shape::new(&[2, 2, 2]).unwrap(), 3).unwrap();
    let x = constant(&mut g, cube, 1.0);
    let out = g.declare_custom_kernel(id, &[x]).unwrap()[0];
    g.probe(out, "out").unwrap();
    assert!(matches!(
        g.freeze(&CompilerConfig::default()),
        Err(CompileError::IllegalAddressing { .. })
    ));
}

#[test]
fn templates_are_validated_on_registration() {
    let mut g = Graph::new();
    let outputs = (0..11)
        .map(|i| OutputSpec::new(format!("o{i}"), OutputRule::LikeInput(0)))
        .collect();
    let template = KernelTemplate::new("wide", outputs, KernelBodies::Uniform(Vec::new()));
    assert!(matches!(
        g.register_kernel(template),
        Err(GraphError::TooManyOutputs { count: 11, .. })
    ));

    let id = g.register_kernel(doubled()).unwrap();
    let rgb = FieldType::new(
        Shape::new(&[2]).unwrap(),
        Shape::scalar(),
        compute::ElementKind::Color { alpha: false },
    );
    let image = g
        .declare_constant(compute::FieldData::zeros(rgb))
        .unwrap();
    assert!(matches!(
        g.declare_custom_kernel(id, &[image]),
        Err(GraphError::UnsupportedElementKind { .. })
    ));
}

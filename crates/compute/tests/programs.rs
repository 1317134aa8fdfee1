use compute::kernel::{
    Access, BinaryOp, BorderPolicy, CodeStrategy, ElementIndex, Expr, KernelProgram, Stmt,
    ThreadAddressing,
};
use compute::kernels::decode_outputs;
use compute::{
    ComputeBackend, CpuBackend, FieldData, FieldType, LocalSizeDefaults, Shape, WorkGroupLayout,
};

fn shape(dims: &[usize]) -> Shape {
    Shape::new(dims).unwrap()
}

fn program(
    inputs: Vec<FieldType>,
    outputs: Vec<FieldType>,
    addressing: ThreadAddressing,
    strategy: CodeStrategy,
    temps: usize,
    body: Vec<Stmt>,
) -> KernelProgram {
    let mut p = KernelProgram {
        name: "test".into(),
        inputs,
        outputs,
        strategy,
        addressing,
        layout: WorkGroupLayout {
            local: [1; 3],
            global: [1; 3],
        },
        temps,
        body,
    };
    let addressed = p.addressing_field().unwrap().clone();
    let mut space = addressed.field_shape.dims().to_vec();
    if matches!(addressing, ThreadAddressing::PerInputElement(_)) {
        space.push(addressed.logical_tensor_len());
    }
    p.layout = WorkGroupLayout::allocate(&space, None, &LocalSizeDefaults::default()).unwrap();
    p
}

fn run(program: &KernelProgram, inputs: &[FieldData]) -> Vec<FieldData> {
    let mut binds: Vec<_> = inputs.iter().map(FieldData::to_buffer_view).collect();
    binds.extend(
        program
            .outputs
            .iter()
            .map(|ty| FieldData::zeros(ty.clone()).to_buffer_view()),
    );
    let bytes = CpuBackend::new()
        .dispatch(program, &binds, program.layout.workgroups())
        .unwrap();
    decode_outputs(program, &bytes).unwrap()
}

#[test]
fn big_tensor_loop_broadcasts_scalars() {
    let vector = FieldType::vector(shape(&[2]), 6).unwrap();
    let scalar = FieldType::scalar(shape(&[2]));
    let x = FieldData::from_fn(vector.clone(), |c, e| ((c[0] * 10 + e) as f32).into()).unwrap();
    let bias = FieldData::from_slice(&[100.0, 200.0]).unwrap();
    let body = vec![Stmt::ForEachElement {
        extent: 6,
        body: vec![
            Stmt::Let {
                temp: 0,
                value: Expr::binary(BinaryOp::Mul, Expr::read(0), Expr::constant(2.0)),
            },
            Stmt::WriteElement {
                output: 0,
                element: ElementIndex::Loop,
                value: Expr::binary(BinaryOp::Add, Expr::Temp(0), Expr::read(1)),
            },
        ],
    }];
    let p = program(
        vec![vector.clone(), scalar],
        vec![vector],
        ThreadAddressing::PerOutputTensor,
        CodeStrategy::BigTensor,
        1,
        body,
    );
    let out = run(&p, &[x, bias]);
    assert_eq!(
        out[0].values(),
        &[100.0, 102.0, 104.0, 106.0, 108.0, 110.0, 220.0, 222.0, 224.0, 226.0, 228.0, 230.0]
    );
}

#[test]
fn per_element_addressing_exposes_the_element_index() {
    let vector = FieldType::vector(shape(&[2]), 3).unwrap();
    let x = FieldData::filled(vector.clone(), 2.0f32.into()).unwrap();
    let body = vec![Stmt::WriteElement {
        output: 0,
        element: ElementIndex::Loop,
        value: Expr::binary(BinaryOp::Mul, Expr::read(0), Expr::ThreadElement),
    }];
    let p = program(
        vec![vector.clone()],
        vec![vector],
        ThreadAddressing::PerInputElement(0),
        CodeStrategy::SmallTensor,
        0,
        body,
    );
    let out = run(&p, &[x]);
    assert_eq!(out[0].values(), &[0.0, 2.0, 4.0, 0.0, 2.0, 4.0]);
}

#[test]
fn conditional_trailing_writes() {
    let ty = FieldType::scalar(shape(&[4]));
    let x = FieldData::from_slice(&[-2.0, 0.0, 3.0, 5.0]).unwrap();
    let body = vec![Stmt::If {
        cond: Expr::binary(BinaryOp::Greater, Expr::read(0), Expr::constant(0.0)),
        then_branch: vec![Stmt::WriteTensor {
            output: 0,
            value: Expr::constant(1.0),
        }],
        else_branch: vec![Stmt::WriteTensor {
            output: 0,
            value: Expr::constant(-1.0),
        }],
    }];
    let p = program(
        vec![ty.clone()],
        vec![ty],
        ThreadAddressing::PerOutputTensor,
        CodeStrategy::SmallTensor,
        0,
        body,
    );
    let out = run(&p, &[x]);
    assert_eq!(out[0].values(), &[-1.0, -1.0, 1.0, 1.0]);
}

#[test]
fn winner_take_all_marks_first_maximum() {
    let ty = FieldType::scalar(shape(&[3]));
    let body = vec![Stmt::WriteTensor {
        output: 0,
        value: Expr::WinnerTakeAll { input: 0 },
    }];
    let p = program(
        vec![ty.clone()],
        vec![ty],
        ThreadAddressing::PerOutputTensor,
        CodeStrategy::SmallTensor,
        0,
        body,
    );
    let out = run(&p, &[FieldData::from_slice(&[3.0, 3.0, 1.0]).unwrap()]);
    assert_eq!(out[0].values(), &[1.0, 0.0, 0.0]);
}

#[test]
fn expanded_reads_fill_the_border() {
    let small = FieldType::scalar(shape(&[2, 2]));
    let big = FieldType::scalar(shape(&[3, 4]));
    let x = FieldData::from_values(small.clone(), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
    let expand = |border| {
        program(
            vec![small.clone()],
            vec![big.clone()],
            ThreadAddressing::PerOutputTensor,
            CodeStrategy::SmallTensor,
            0,
            vec![Stmt::WriteTensor {
                output: 0,
                value: Expr::Read {
                    input: 0,
                    access: Access::Expanded { border },
                },
            }],
        )
    };

    let zero = run(&expand(BorderPolicy::Zero), &[x.clone()]);
    assert_eq!(
        zero[0].values(),
        &[1.0, 2.0, 0.0, 0.0, 3.0, 4.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]
    );
    let cyclic = run(&expand(BorderPolicy::Cyclic), &[x]);
    assert_eq!(
        cyclic[0].values(),
        &[1.0, 2.0, 1.0, 2.0, 3.0, 4.0, 3.0, 4.0, 1.0, 2.0, 1.0, 2.0]
    );
}

#[test]
fn multi_output_kernel_writes_every_output() {
    let ty = FieldType::scalar(shape(&[3]));
    let x = FieldData::from_slice(&[1.0, 2.0, 3.0]).unwrap();
    let body = vec![
        Stmt::Let {
            temp: 0,
            value: Expr::binary(BinaryOp::Mul, Expr::read(0), Expr::read(0)),
        },
        Stmt::WriteTensor {
            output: 0,
            value: Expr::Temp(0),
        },
        Stmt::WriteTensor {
            output: 1,
            value: Expr::binary(BinaryOp::Sub, Expr::Temp(0), Expr::read(0)),
        },
    ];
    let p = program(
        vec![ty.clone()],
        vec![ty.clone(), ty],
        ThreadAddressing::PerOutputTensor,
        CodeStrategy::SmallTensor,
        1,
        body,
    );
    let out = run(&p, &[x]);
    assert_eq!(out[0].values(), &[1.0, 4.0, 9.0]);
    assert_eq!(out[1].values(), &[0.0, 2.0, 6.0]);
}

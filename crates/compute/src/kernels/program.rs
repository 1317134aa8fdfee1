use super::eval::{Interpreter, Thread};
use crate::field::FieldData;
use crate::kernel::{KernelProgram, ThreadAddressing};
use crate::{BufferView, ComputeError};

/// Runs `program` over its whole thread space.
///
/// `binds` holds one buffer per kernel input followed by one per output; the
/// output buffers give the initial output contents.
pub fn handle_program(
    program: &KernelProgram,
    binds: &[BufferView],
    workgroups: [u32; 3],
) -> Result<Vec<Vec<u8>>, ComputeError> {
    if binds.len() != program.inputs.len() + program.outputs.len() {
        return Err(ComputeError::ShapeMismatch(
            "kernel expects one buffer per input and output",
        ));
    }
    let signature = program.inputs.iter().chain(&program.outputs);
    if binds.iter().zip(signature).any(|(bind, ty)| &bind.field_type != ty) {
        return Err(ComputeError::ShapeMismatch(
            "buffer field type differs from kernel signature",
        ));
    }

    let (input_binds, output_binds) = binds.split_at(program.inputs.len());
    let inputs = input_binds
        .iter()
        .map(BufferView::to_field_data)
        .collect::<Result<Vec<_>, _>>()?;
    let mut outputs = output_binds
        .iter()
        .map(BufferView::to_field_data)
        .collect::<Result<Vec<_>, _>>()?;

    let addressed = program
        .addressing_field()
        .ok_or(ComputeError::ShapeMismatch("kernel has no field to address"))?
        .clone();
    let per_element = matches!(program.addressing, ThreadAddressing::PerInputElement(_));
    let lanes = if per_element {
        addressed.logical_tensor_len()
    } else {
        1
    };
    let mut space = addressed.field_shape.dims().to_vec();
    if per_element {
        space.push(lanes);
    }
    if !program.layout.covers(workgroups, &space) {
        return Err(ComputeError::ShapeMismatch(
            "work groups do not cover the thread space",
        ));
    }

    let interpreter = Interpreter::new(program, inputs)?;
    for point in 0..addressed.points() {
        let coords = addressed.field_shape.coords_of(point);
        for lane in 0..lanes {
            let mut thread = Thread::new(coords.clone(), per_element.then_some(lane), program.temps);
            interpreter.exec(&program.body, &mut thread, None, &mut outputs)?;
        }
    }

    Ok(outputs
        .iter()
        .map(|out| bytemuck::cast_slice(out.values()).to_vec())
        .collect())
}

/// Decodes the buffers returned by a dispatch.
pub fn decode_outputs(
    program: &KernelProgram,
    buffers: &[Vec<u8>],
) -> Result<Vec<FieldData>, ComputeError> {
    if buffers.len() != program.outputs.len() {
        return Err(ComputeError::ShapeMismatch(
            "backend returned an unexpected number of buffers",
        ));
    }
    program
        .outputs
        .iter()
        .zip(buffers)
        .map(|(ty, bytes)| Ok(FieldData::from_bytes(ty.clone(), bytes)?))
        .collect()
}

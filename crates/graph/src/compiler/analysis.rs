//! Static checks on custom kernel bodies.

use compute::kernel::{walk_block, ElementIndex, Expr, Stmt, ThreadAddressing};

use crate::error::CompileError;

fn contains_tensor_write(stmt: &Stmt) -> bool {
    stmt.is_tensor_write() || stmt.blocks().into_iter().any(|b| b.iter().any(contains_tensor_write))
}

/// True when `block` is well formed: once a whole-tensor write happens on a
/// path, only whole-tensor writes follow it.
fn trailing_writes_ok(block: &[Stmt]) -> bool {
    let mut written = false;
    for stmt in block {
        if written && !stmt.is_tensor_write() {
            return false;
        }
        match stmt {
            Stmt::If {
                then_branch,
                else_branch,
                ..
            } => {
                if !trailing_writes_ok(then_branch) || !trailing_writes_ok(else_branch) {
                    return false;
                }
            }
            Stmt::ForEachElement { body, .. } => {
                if body.iter().any(contains_tensor_write) {
                    return false;
                }
            }
            _ => {}
        }
        written |= contains_tensor_write(stmt);
    }
    true
}

/// Rejects bodies where a whole-tensor write is followed by anything other
/// than further whole-tensor writes. Reports the offending top-level index.
pub fn check_trailing_writes(kernel: &str, body: &[Stmt]) -> Result<(), CompileError> {
    for end in 1..=body.len() {
        if !trailing_writes_ok(&body[..end]) {
            return Err(CompileError::IllegalTrailingStatement {
                kernel: kernel.to_owned(),
                index: end - 1,
            });
        }
    }
    Ok(())
}

fn loop_writes_outside_loops(block: &[Stmt]) -> bool {
    block.iter().any(|stmt| match stmt {
        Stmt::WriteElement {
            element: ElementIndex::Loop,
            ..
        } => true,
        Stmt::ForEachElement { .. } => false,
        other => other.blocks().into_iter().any(loop_writes_outside_loops),
    })
}

fn reads_thread_element(block: &[Stmt]) -> bool {
    block.iter().any(|stmt| {
        stmt.exprs().into_iter().any(Expr::uses_thread_element)
            || stmt.blocks().into_iter().any(reads_thread_element)
    })
}

/// Element-indexed statements need one thread per tensor element.
pub fn check_addressing(kernel: &str, addressing: ThreadAddressing, body: &[Stmt]) -> Result<(), CompileError> {
    if matches!(addressing, ThreadAddressing::PerInputElement(_)) {
        return Ok(());
    }
    if reads_thread_element(body) {
        return Err(CompileError::IllegalAddressing {
            kernel: kernel.to_owned(),
            reason: "reads the thread's tensor element without per-element addressing",
        });
    }
    if loop_writes_outside_loops(body) {
        return Err(CompileError::IllegalAddressing {
            kernel: kernel.to_owned(),
            reason: "writes the loop element outside an element loop",
        });
    }
    Ok(())
}

/// Every buffer slot the body touches must exist in the signature.
pub fn check_slots(kernel: &str, body: &[Stmt], inputs: usize, outputs: usize) -> Result<(), CompileError> {
    let mut bad_input = None;
    walk_block(body, &mut |e| {
        let slots: Vec<usize> = match e {
            Expr::Read { input, .. }
            | Expr::ReadAt { input, .. }
            | Expr::FieldReduce { input, .. }
            | Expr::WinnerTakeAll { input } => vec![*input],
            Expr::Convolve { input, filter, .. } => vec![*input, *filter],
            Expr::StackFields(slots) => slots.clone(),
            _ => Vec::new(),
        };
        if let Some(&s) = slots.iter().find(|&&s| s >= inputs) {
            bad_input.get_or_insert(s);
        }
    });
    if let Some(slot) = bad_input {
        return Err(CompileError::ShapeMismatch {
            kernel: kernel.to_owned(),
            detail: format!("reads input {slot} of {inputs}"),
        });
    }
    if let Some(slot) = max_output(body).filter(|&s| s >= outputs) {
        return Err(CompileError::ShapeMismatch {
            kernel: kernel.to_owned(),
            detail: format!("writes output {slot} of {outputs}"),
        });
    }
    Ok(())
}

fn max_output(block: &[Stmt]) -> Option<usize> {
    block
        .iter()
        .filter_map(|stmt| match stmt {
            Stmt::WriteTensor { output, .. }
            | Stmt::WriteTensorAt { output, .. }
            | Stmt::WriteElement { output, .. } => Some(*output),
            other => other.blocks().into_iter().filter_map(max_output).max(),
        })
        .max()
}

//! Type/Shape Policies
//!
//! Each node carries a [`TypePolicy`] that maps the descriptors of its bound
//! inputs to the descriptors of its outputs during the type pass of closure.
//!
//! # Standard policies
//!
//! - `IdenticalShape`: every input must match the first exactly.
//! - `Broadcast`: shapes combine under numpy broadcasting rules, element
//!   types are promoted.
//! - `ReduceToScalar`: one scalar output regardless of input shapes.
//! - `PassThrough`: every output copies the first input's descriptor.
//! - `Pairwise`: output `i` copies input `i`.
//! - `Fixed`: outputs have a descriptor known at construction (sources).
//! - `Custom`: anything else, as a function.

use std::fmt;
use std::sync::Arc;

use super::descriptor::{DataDescriptor, Shape};
use crate::error::GraphError;

/// Custom type function: input descriptors in, output descriptors out.
pub type TypeFn =
    Arc<dyn Fn(&TypeContext<'_>) -> Result<Vec<DataDescriptor>, GraphError> + Send + Sync>;

/// Element-count derivation for an output's buffer.
pub type SizeFn = Arc<dyn Fn(&DataDescriptor) -> usize + Send + Sync>;

/// What a type policy sees of the node being checked.
pub struct TypeContext<'a> {
    pub node: &'a str,
    /// Bound inputs in declaration order, with their parents' descriptors.
    pub inputs: Vec<(&'a str, &'a DataDescriptor)>,
    pub outputs: Vec<&'a str>,
}

impl<'a> TypeContext<'a> {
    pub fn mismatch(
        &self,
        port: &str,
        expected: impl fmt::Display,
        actual: impl fmt::Display,
    ) -> GraphError {
        GraphError::TypeCheck {
            node: self.node.to_string(),
            port: port.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// The first input, or a type error if the node has none.
    pub fn first_input(&self) -> Result<(&'a str, &'a DataDescriptor), GraphError> {
        self.inputs
            .first()
            .copied()
            .ok_or_else(|| self.mismatch("<inputs>", "at least one input", "0 inputs"))
    }

    fn replicate(&self, dd: &DataDescriptor) -> Vec<DataDescriptor> {
        vec![dd.clone(); self.outputs.len()]
    }
}

#[derive(Clone)]
pub enum TypePolicy {
    IdenticalShape,
    Broadcast,
    ReduceToScalar,
    PassThrough,
    Pairwise,
    Fixed(DataDescriptor),
    Custom(TypeFn),
}

impl TypePolicy {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&TypeContext<'_>) -> Result<Vec<DataDescriptor>, GraphError> + Send + Sync + 'static,
    {
        TypePolicy::Custom(Arc::new(f))
    }

    /// Derives output descriptors, one per output in declaration order.
    pub fn derive(&self, ctx: &TypeContext<'_>) -> Result<Vec<DataDescriptor>, GraphError> {
        match self {
            TypePolicy::IdenticalShape => {
                let (_, reference) = ctx.first_input()?;
                for &(port, dd) in &ctx.inputs[1..] {
                    if dd != reference {
                        return Err(ctx.mismatch(port, reference, dd));
                    }
                }
                Ok(ctx.replicate(reference))
            }
            TypePolicy::Broadcast => {
                let (_, first) = ctx.first_input()?;
                let mut shape = first.shape.clone();
                let mut dtype = first.dtype;
                for &(port, dd) in &ctx.inputs[1..] {
                    shape = broadcast_shapes(&shape, &dd.shape).ok_or_else(|| {
                        ctx.mismatch(
                            port,
                            format!("shape broadcastable with {:?}", shape.as_slice()),
                            dd,
                        )
                    })?;
                    dtype = dtype.promote(dd.dtype);
                }
                Ok(ctx.replicate(&DataDescriptor { dtype, shape }))
            }
            TypePolicy::ReduceToScalar => {
                let (_, first) = ctx.first_input()?;
                let dtype = ctx.inputs[1..]
                    .iter()
                    .fold(first.dtype, |acc, (_, dd)| acc.promote(dd.dtype));
                Ok(ctx.replicate(&DataDescriptor::scalar(dtype)))
            }
            TypePolicy::PassThrough => {
                let (_, first) = ctx.first_input()?;
                Ok(ctx.replicate(first))
            }
            TypePolicy::Pairwise => {
                if ctx.inputs.len() != ctx.outputs.len() {
                    return Err(ctx.mismatch(
                        "<outputs>",
                        format!("{} inputs", ctx.outputs.len()),
                        format!("{} inputs", ctx.inputs.len()),
                    ));
                }
                Ok(ctx.inputs.iter().map(|(_, dd)| (*dd).clone()).collect())
            }
            TypePolicy::Fixed(dd) => Ok(ctx.replicate(dd)),
            TypePolicy::Custom(f) => f(ctx),
        }
    }

    /// Number of elements to allocate for an output with this descriptor.
    pub fn element_count(&self, dd: &DataDescriptor) -> usize {
        match self {
            TypePolicy::ReduceToScalar => 1,
            _ => dd.size(),
        }
    }
}

impl fmt::Debug for TypePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypePolicy::IdenticalShape => write!(f, "IdenticalShape"),
            TypePolicy::Broadcast => write!(f, "Broadcast"),
            TypePolicy::ReduceToScalar => write!(f, "ReduceToScalar"),
            TypePolicy::PassThrough => write!(f, "PassThrough"),
            TypePolicy::Pairwise => write!(f, "Pairwise"),
            TypePolicy::Fixed(dd) => write!(f, "Fixed({})", dd),
            TypePolicy::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// Numpy broadcasting: align from the trailing dimension, dims must be equal
/// or one of them 1.
pub fn broadcast_shapes(a: &[usize], b: &[usize]) -> Option<Shape> {
    let rank = a.len().max(b.len());
    let mut out: Shape = Shape::with_capacity(rank);
    for i in 0..rank {
        let da = if i < rank - a.len() { 1 } else { a[i - (rank - a.len())] };
        let db = if i < rank - b.len() { 1 } else { b[i - (rank - b.len())] };
        let dim = match (da, db) {
            (x, y) if x == y => x,
            (1, y) => y,
            (x, 1) => x,
            _ => return None,
        };
        out.push(dim);
    }
    Some(out)
}

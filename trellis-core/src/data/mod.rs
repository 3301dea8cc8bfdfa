//! Data Model
//!
//! Descriptors, type/shape policies and the buffer types transforms operate
//! on. Values are stored as `f64` regardless of the descriptor's element
//! type; the element type participates in type checking only.

mod buffer;
mod descriptor;
mod policy;

pub use buffer::{Args, BufferId, Results, StorageKind};
pub(crate) use buffer::Buffer;
pub use descriptor::{DType, DataDescriptor, Shape};
pub use policy::{broadcast_shapes, SizeFn, TypeContext, TypeFn, TypePolicy};

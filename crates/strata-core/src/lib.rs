//! # strata-core
//!
//! Shape system for shaped device buffers.
//!
//! Provides:
//! - `DType` element types with fixed byte widths
//! - `Shape`: arrays and (nested) tuples, with a parseable text form
//! - `ShapeIndex`: path to any node of a shape
//! - `ShapeTree<T>`: one value per node, resolved through a flat arena
//! - `Platform` / `DeviceId` device identity

pub mod dtype;
pub mod device;
pub mod error;
pub mod shape;
pub mod shape_index;
pub mod shape_tree;
pub mod prelude;

pub use device::{DeviceId, Platform};
pub use dtype::DType;
pub use error::StrataError;
pub use shape::{ArrayShape, Shape, DEFAULT_POINTER_SIZE};
pub use shape_index::ShapeIndex;
pub use shape_tree::ShapeTree;

pub type Result<T> = std::result::Result<T, StrataError>;

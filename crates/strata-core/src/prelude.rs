//! Convenience re-exports for common strata-core types.
//!
//! ```rust
//! use strata_core::prelude::*;
//! ```

pub use crate::DType;
pub use crate::Platform;
pub use crate::Shape;
pub use crate::ShapeIndex;
pub use crate::ShapeTree;
pub use crate::StrataError;
pub use crate::Result;

//! Drawing layers for the reconciliation engine
//!
//! Views are [`LayerRenderer`](vz_core::LayerRenderer) implementations. They
//! only ever look at the change set they are handed and the nodes it names.

pub mod marks;

pub use marks::{MarkConfig, MarkRenderer};

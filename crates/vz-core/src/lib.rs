//! Core functionality for the layer/node reconciliation engine
//!
//! This crate provides the layer tree, the render nodes that persist across
//! redraws, node-set selections and the reconciliation pass that turns data
//! declarations into minimal added/changed/removed deltas.

pub mod change;
pub mod config;
pub mod data;
pub mod error;
pub mod event;
pub mod layer;
pub mod list;
pub mod logging;
pub mod mapping;
pub mod node;
pub mod node_set;
pub mod scene;
pub mod stacking;

mod reconcile;

// Re-export commonly used types
pub use change::ChangeSet;
pub use config::{Appender, LogConfig, LogLevel, VizConfig};
pub use data::{DataSource, Datum, Hints, IdFn, IdSpec};
pub use error::{Result, VizError};
pub use event::{Event, Handler};
pub use layer::{Layer, LayerId, LayerKind, LayerRenderer, RenderContext};
pub use list::NodeList;
pub use logging::LogContext;
pub use mapping::Mapping;
pub use node::{NodeId, NodeStore, RenderNode, UserData};
pub use node_set::{Filter, NodeSet, Test};
pub use scene::{RenderReport, Scene};
pub use stacking::StackOrder;

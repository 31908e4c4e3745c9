use std::sync::Arc;
use vz_render::NativeEvent;

use crate::data::Datum;
use crate::node::NodeId;

/// Event delivered to layer handlers
#[derive(Debug, Clone)]
pub struct Event {
    pub data: Datum,
    pub node: NodeId,
    pub index: usize,
    pub event_type: String,
    pub source: NativeEvent,
    pub dx: Option<f64>,
    pub dy: Option<f64>,
}

/// Layer event handler; returning `true` consumes the event
pub type Handler = Arc<dyn Fn(&Event) -> bool + Send + Sync>;

use thiserror::Error;

use crate::layer::LayerId;

/// Errors raised by the data-source mutation surface and tree construction
///
/// These are contract violations by the caller; the reconciliation pass itself
/// never fails.
#[derive(Error, Debug)]
pub enum VizError {
    #[error("layer {0} derives its data from its parent and cannot be edited in place")]
    DerivedDataSource(LayerId),

    #[error("layer {0} does not own an array data source")]
    NotLocalArray(LayerId),

    #[error("invalid mapping declaration for '{property}': {reason}")]
    InvalidMapping { property: String, reason: String },

    #[error("unknown layer {0}")]
    UnknownLayer(LayerId),

    #[error("layer {0} is not a plot layer and cannot hold children")]
    NotAPlotLayer(LayerId),

    #[error("configuration error: {0}")]
    Config(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, VizError>;

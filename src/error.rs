use crate::grid::Knowledge;
use crate::types::{Cell, Orientation};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("referee rejected {action} at {position} facing {orientation:?}: {status}")]
    InvalidMove {
        action: &'static str,
        position: Cell,
        orientation: Orientation,
        status: String,
    },

    #[error("cannot run SAT solver {path}: {source}")]
    OracleUnavailable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unexpected SAT solver output: {0}")]
    MalformedOracleOutput(String),

    #[error("SAT backend failed: {0}")]
    Oracle(String),

    #[error("cell {cell} is known as {known:?}, refusing to overwrite with {new:?}")]
    KnowledgeConflict {
        cell: Cell,
        known: Knowledge,
        new: Knowledge,
    },

    #[error("cell {0} is out of the grid")]
    OutOfBounds(Cell),

    #[error("path goes through untraversable cell {0}")]
    UntraversablePath(Cell),

    #[error("invalid world: {0}")]
    InvalidWorld(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

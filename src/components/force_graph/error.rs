use thiserror::Error;

use super::types::EdgeKey;

/// Result type for graph engine operations.
pub type Result<T> = std::result::Result<T, GraphError>;

/// Errors surfaced by snapshot loading and event normalization.
///
/// Geometry problems and FX overload never show up here; they are recovered
/// inside the engine.
#[derive(Debug, Error)]
pub enum GraphError {
	#[error("snapshot contains node `{0}` more than once")]
	DuplicateNode(String),

	#[error("snapshot contains edge {0} more than once")]
	DuplicateEdge(EdgeKey),

	#[error("edge {key} references unknown node `{node}`")]
	DanglingEdge { key: EdgeKey, node: String },

	#[error("event #{event}: edge #{position} ({key}) is not in the current snapshot")]
	UnknownEdge {
		event: usize,
		position: usize,
		key: EdgeKey,
	},

	#[error("event #{event}: node `{id}` is not in the current snapshot")]
	UnknownNode { event: usize, id: String },

	#[error("event #{event}: unsupported event type `{kind}`")]
	UnknownEventType { event: usize, kind: String },

	#[error("event #{event}: {reason}")]
	MalformedEvent { event: usize, reason: String },

	#[error("parse error: {0}")]
	Parse(#[from] serde_json::Error),
}

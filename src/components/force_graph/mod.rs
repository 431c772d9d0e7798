//! Force-directed layout and FX overlay for a mutual-credit network.

mod component;
mod config;
mod error;
mod events;
mod fx;
mod layout;
mod physics;
mod picking;
mod playback;
mod render;
mod scheduler;
mod state;
mod types;

pub use component::ForceGraphCanvas;
pub use config::{GraphConfig, Quality};
pub use error::{GraphError, Result};
pub use events::{
	DonePayload, EdgeRef, EventBody, EventInput, EventKind, EventSource, EventTiming, LiveEvent,
	NormalizedEvent, Normalizer, PlanPayload, PlanStep, PlanStepPayload, Playlist, ScriptedStep,
	TxPayload,
};
pub use fx::{FxEngine, FxEntity, FxKind, FxLimits, FxTarget, FxTiming};
pub use layout::{LayoutCoordinator, LayoutEdge, LayoutNode, SnapshotDiff, Viewport};
pub use physics::{PhysicsConfig, PhysicsEngine};
pub use picking::{Pick, Selection, SelectionEvent};
pub use playback::{Playback, PlaybackState};
pub use scheduler::{Clock, FrameClock, FrameStats, FrameTarget, Scheduler, VirtualClock, WallClock};
pub use state::{GraphState, ViewTransform};
pub use types::{EdgeKey, GraphLink, GraphNode, NetSign, NodePosition, Snapshot};

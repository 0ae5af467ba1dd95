//! Scheduling of the downloads of a run.

mod orchestrator;
mod request;
mod slot;
mod state;
mod watcher;

pub use orchestrator::{Orchestrator, PipelineOptions};
pub use request::Selection;
pub use state::PipelineState;
pub use watcher::CancellationWatcher;

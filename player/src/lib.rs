//! Client side of the interaction engine: keeps overlays in step with playback.

pub mod api;
pub mod interaction;
pub mod sync;
pub mod ticker;

pub use api::{ApiClient, ApiError};
pub use interaction::{AnswerOption, InteractionKind, InteractionPoint};
pub use sync::{Decision, DecisionCallback, PlaybackSync, Progress, SyncEvent, SyncSession};
pub use ticker::FrameTicker;

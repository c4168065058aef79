//! Client side of the announcement hub. Every role runs on one event loop.

pub mod api;
pub mod audio;
pub mod connection;
pub mod history;
pub mod publisher;
pub mod render;
pub mod runtime;
pub mod session;
pub mod subscriber;
pub mod timer;

pub use api::HttpHistoryApi;
pub use audio::{AudioCoordinator, AudioSink, CommandSink, NullSink, PlayOutcome};
#[cfg(any(test, feature = "testing"))]
pub use audio::{RecordingSink, SinkCall};
pub use connection::{spawn_connection, ConnectionConfig, InboundEvent};
pub use history::{HistoryApi, HistoryBrowser};
pub use publisher::{
    Banner, BannerKind, DraftStatus, DraftStore, MemoryDraftStore, SubmissionController,
    SubmitOutcome, CHAR_WARNING_LIMIT,
};
pub use render::Rendering;
pub use runtime::{ClientEvent, ClientRuntime, Command, Notice, RuntimeConfig, UiUpdate};
pub use session::{Connectivity, RecentSummary, SessionContext};
pub use subscriber::{Delivery, SubscriberState, SubscriberStateMachine};
pub use timer::TimerSlot;

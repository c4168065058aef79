//! Reference hub: accepts broadcasts over WebSocket, fans them out to every
//! connected client and serves the announcement log over HTTP.

pub mod client;
pub mod composer;
pub mod hub;
pub mod log;
pub mod server;

pub use client::{ClientId, ClientRegistry};
pub use composer::{IdentityComposer, VariantComposer};
pub use hub::Hub;
pub use log::{AnnouncementLog, DEFAULT_HISTORY_LIMIT};
pub use server::{build_router, start, start_with_composer, ServerConfig, ServerHandle};

pub mod announcement;
pub mod errors;
pub mod history;
pub mod ids;
pub mod languages;
pub mod wire;

pub use announcement::{Announcement, LanguageCode, Priority, Variant};
pub use errors::{PlaybackError, ProtocolError, QueryError, TransportError, ValidationError};
pub use history::{ClearHistoryResponse, HistoryEntry};
pub use ids::AnnouncementId;
pub use wire::{ClientRequest, HubEvent};

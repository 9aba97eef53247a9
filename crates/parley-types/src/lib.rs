pub mod api;
pub mod events;
pub mod ids;

pub use ids::ConversationId;

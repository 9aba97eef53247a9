pub mod connection;
pub mod fanout;
pub mod rooms;

pub use fanout::Fanout;
pub use rooms::RoomRegistry;

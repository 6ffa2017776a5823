pub mod message_type;

pub use message_type::MessageType;

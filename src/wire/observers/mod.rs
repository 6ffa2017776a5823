mod error;
pub(crate) mod special_packet;

pub mod bind;
pub mod cancel_request;
pub mod gssenc_request;
pub mod parse;
pub mod password_message;
pub mod query;
pub mod ssl_request;
pub mod startup;
pub mod target;

pub use error::ObserveError;

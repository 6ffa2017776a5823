mod frame;
mod frame_builder;
mod peek_backend;
mod peek_frontend;
mod read_cstr;

pub use frame::{
    TaggedFrame, TaggedFrameError, be_i16, be_i32, parse_tagged_frame, peek_any_tagged_frame,
    peek_tagged_frame,
};
pub use frame_builder::{put_cstr, tagged_frame, untagged_frame};
pub use peek_backend::{BackendFrame, peek_backend};
pub use peek_frontend::{PeekResult, peek_frontend};
pub use read_cstr::{ReadCStrError, read_cstr, read_cstr_take};

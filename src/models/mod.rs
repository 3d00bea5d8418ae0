pub mod event;

pub use event::{Event, EventStatus, ModerationVerdict, NewEvent};

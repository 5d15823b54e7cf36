//! Core data model.
//!
//! Tasks move through a maker → checker1 → checker2 review chain. Users carry
//! one primary role that decides which tasks they can see.

pub mod task;
pub mod user;

pub use task::{
    Action, Attachment, Comment, Frequency, NewTask, ObservationStatus, Priority, Status, Task,
    TaskId,
};
pub use user::{Role, User, UserId};

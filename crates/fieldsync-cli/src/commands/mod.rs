pub mod capture;
pub mod common;
pub mod enqueue;
pub mod queue;
pub mod sync;

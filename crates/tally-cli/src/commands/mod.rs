pub mod common;
pub mod delete;
pub mod pull;
pub mod push;
pub mod put;
pub mod queue;
pub mod records;
pub mod session;
pub mod status;
pub mod watch;

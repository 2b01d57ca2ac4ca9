//! Host System Facilities
//!
//! Account lookup and subprocess execution used by bdev preparation.

pub mod command;
pub mod user;

pub use command::*;
pub use user::*;

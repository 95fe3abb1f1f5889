//! Database models, one file per table.

pub mod email_log;
pub mod event;
pub mod registration;

pub use self::email_log::*;
pub use self::event::*;
pub use self::registration::*;

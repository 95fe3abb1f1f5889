pub mod automation;
pub mod clock;
pub mod email;
pub mod init;
pub mod schedule;
pub mod store;
pub mod templates;

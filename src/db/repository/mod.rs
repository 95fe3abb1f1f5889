pub mod email_log_repository;
pub mod event_repository;
pub mod registration_repository;

pub use email_log_repository::EmailLogRepository;
pub use event_repository::EventRepository;
pub use registration_repository::RegistrationRepository;

pub mod auth;
pub mod cron;
pub mod emails;
pub mod health;

pub mod auth;
pub mod chat;
pub mod liveness;
pub mod onboarding;
pub mod readiness;
pub mod reminders;

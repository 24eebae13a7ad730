pub mod conversation;
pub mod feed;
pub mod likes;
pub mod notifications;
pub mod onboarding;
pub mod relations;
pub mod session;
pub mod ui_state;

pub mod health;
pub mod poll;
pub mod session;
pub mod validation;
pub mod ws;

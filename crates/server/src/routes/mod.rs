pub mod classify;
pub mod health;
pub mod index;
pub mod metrics;

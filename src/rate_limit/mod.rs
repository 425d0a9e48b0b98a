//! Fixed-window admission control

pub mod limiter;
pub mod store;

pub use limiter::{Decision, FixedWindowLimiter, Scope, GLOBAL_KEY, UNKNOWN_CLIENT};
pub use store::WindowStore;

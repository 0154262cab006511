//! API middleware stack.
//!
//! Execution order (outermost → innermost):
//! 1. Rate limiter: reject early, save resources
//! 2. Auth validator: JWT access token → `Actor` (protected routes only)
//! 3. Audit logger: logs after auth, has the actor id

pub mod audit;
pub mod auth;
pub mod rate;

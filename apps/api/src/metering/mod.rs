// Usage metering: who may run an analysis, and what it costs them.
// Everything here is process-local and starts empty on restart.

pub mod anonymous;
pub mod cache;
pub mod credits;
pub mod gate;
pub mod handlers;
pub mod identity;
pub mod reconcile;
pub mod window;

//! Application Layer
//!
//! Ports to the outside world, the services that drive the order pipeline
//! and background sync, and the caller-facing use cases.

pub mod ports;
pub mod services;
pub mod use_cases;

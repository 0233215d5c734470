//! Credential evaluation intake: the application submission pipeline from the guided
//! client wizard through email verification, document collection, payment, and the
//! server-side finalization that hands a paid application to staff.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;

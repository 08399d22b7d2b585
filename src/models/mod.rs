//! Data models for the Nomina application.
//!
//! Field names serialize in camelCase so stored documents and API payloads share one shape.

mod capture;
mod invoice;
mod payment;
mod revision;
mod settings;
mod worker;

pub use capture::*;
pub use invoice::*;
pub use payment::*;
pub use revision::*;
pub use settings::*;
pub use worker::*;

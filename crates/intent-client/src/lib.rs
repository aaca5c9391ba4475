//! `intent-client` — HTTP client for the external intent interpretation
//! service.
//!
//! The service turns a natural-language command plus the platforms available
//! to the caller into a structured action plan. This crate implements the
//! pipeline's `IntentInterpreter` seam over that HTTP API; interpretation
//! failures surface as plan rejection, before any execution log exists.
//!
//! ```rust,ignore
//! use intent_client::IntentClient;
//! use autopilot_core::interpreter::IntentInterpreter;
//!
//! let client = IntentClient::new("https://intent.internal");
//! let plan = client
//!     .interpret("reprice all winter jackets to 20% off", &["shopfront".into()])
//!     .await?;
//! ```

mod client;
mod types;

pub use client::IntentClient;
pub use types::{InterpretRequest, InterpretResponse};

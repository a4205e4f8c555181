//! A REST client for the device gateway of the IoT services.
//!
//! Each call is a single authenticated POST request, awaited until the gateway responds
//! or the request times out. No request is retried.
//!
//! A successful HTTP transaction doesn't mean that all the measures have been accepted:
//! a `207 Multi-Status` response, telling that some measures of a batch have been rejected,
//! is reported as a [RestGatewayError::GatewayBatchError].
#![forbid(unsafe_code)]

mod client;
mod config;
mod errors;
mod response;

pub use client::*;
pub use config::*;
pub use errors::*;
pub use response::*;

pub use reqwest::StatusCode;

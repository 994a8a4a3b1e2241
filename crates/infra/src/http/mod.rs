//! HTTP transport for the remote API

pub mod client;

pub use client::{HttpTransport, HttpTransportBuilder};

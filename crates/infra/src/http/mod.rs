//! HTTP client plumbing shared by the X API adapters

pub mod client;

pub use client::{HttpClient, HttpClientBuilder};

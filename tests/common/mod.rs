//! Integration test common infrastructure.
//!
//! Provides utilities for spawning in-process test servers, creating line
//! protocol clients, and asserting on what they receive.

pub mod client;
pub mod server;

#[allow(unused_imports)]
pub use client::TestClient;
#[allow(unused_imports)]
pub use server::TestServer;

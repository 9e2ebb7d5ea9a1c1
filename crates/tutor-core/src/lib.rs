//! Core types, trait definitions and pure logic for the attempt conversation
//! engine.
//!
//! This crate is deliberately free of HTTP and database dependencies. Every
//! decision that can be made without I/O (turn counting, reply validation,
//! similarity ranking, grading) lives here so it can be tested in isolation.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod assessment;
pub mod attempt;
pub mod error;
pub mod grading;
pub mod language;
pub mod prompt;
pub mod reply;
pub mod retrieval;
pub mod service;
pub mod store;
pub mod turn;

pub use error::{Error, Result};

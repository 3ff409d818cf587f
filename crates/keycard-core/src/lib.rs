//! Core types, storage trait, and issuance services for Keycard.
//!
//! This crate is deliberately free of HTTP, database, and cryptography
//! dependencies. The storage backend (`keycard-store-sqlite`), the pass
//! format (`keycard-pass`) and the HTTP surface (`keycard-api`) all depend on
//! it.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod audit;
pub mod enrollment;
pub mod error;
pub mod holder;
pub mod percent;
pub mod promotion;
pub mod resolver;
pub mod scan;
pub mod serial;
pub mod store;

pub use error::{Error, ErrorClass, Result};
pub use percent::Percent;

//! Storefront Session Core - Shared types library.
//!
//! This crate provides the data model used across the storefront session
//! components:
//! - `session` - Token lifecycle, resilient requests and the session facade
//! - `cli` - Command-line front end for the session client
//!
//! # Architecture
//!
//! The core crate contains only types and pure predicates - no I/O, no
//! storage access, no HTTP clients. This keeps it lightweight and allows it to
//! be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs and emails, plus the token and
//!   profile models

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;

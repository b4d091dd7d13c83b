//! Integration test suite for the SRAT updater
//!
//! End-to-end checks of the update pipeline through the public library API
//! and of the `srat-updater` binary.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **pipeline**: resolve, download, verify and install against in-memory
//!   release and asset servers
//! - **cli**: argument handling and exit codes of the binary
//!
//! Tests never touch the network: the CLI tests pin the `none` channel.

mod common;

mod cli;
mod pipeline;

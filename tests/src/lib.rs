//! # better-messenger Test Suite
//!
//! End-to-end scenarios wiring a real [`Client`](better_messenger::Client)
//! to a real [`Server`](better_messenger::Server) over in-memory windows.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── mod.rs          # Shared fixtures
//!     ├── round_trip.rs   # Request/response correlation
//!     ├── handshake.rs    # Connection and retry behavior
//!     ├── lifecycle.rs    # open/close on both ends
//!     └── dispatch.rs     # Handler chains and error handling
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p messenger-tests
//!
//! # By category
//! cargo test -p messenger-tests integration::handshake::
//! ```

#![allow(dead_code)]

pub mod integration;

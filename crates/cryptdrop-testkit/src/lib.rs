//! # cryptdrop testkit
//!
//! Testing utilities for cryptdrop.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: deterministic users with key pairs sharing one store
//! - **Generators**: Proptest strategies for property-based testing
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use cryptdrop_testkit::generators::{encrypt_from_params, ObjectParams};
//!
//! proptest! {
//!     #[test]
//!     fn every_recipient_reads(params: ObjectParams) {
//!         let (obj, parties) = encrypt_from_params(&params);
//!         for party in &parties {
//!             prop_assert_eq!(party.decrypt(&obj).unwrap().content, params.content.clone());
//!         }
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use cryptdrop_testkit::fixtures::multi_party_fixtures;
//!
//! let parties = multi_party_fixtures(2);
//! let obj = parties[0].encrypt(b"hello", "note.txt", &[&parties[1]]);
//! assert_eq!(parties[1].decrypt(&obj).unwrap().content, b"hello");
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{multi_party_fixtures, TestFixture};
pub use generators::{encrypt_from_params, ObjectParams};

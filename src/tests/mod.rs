//! Test support and cross-module tests
//!
//! - `mock_engine`: a recording engine with a trivially decodable container
//! - `encode_lifecycle`: end-to-end lifecycle properties of an encode

pub mod mock_engine;

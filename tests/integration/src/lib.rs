//! Integration tests for the integrity transport
//!
//! This test suite validates:
//! - Two transports linked over a lossy wire
//! - Isolation of corrupted records on `filtered`
//! - Labeled error routing and the halt policy through configuration
//! - Integrity status reporting

pub mod test_utils;

#[cfg(test)]
mod end_to_end_tests;

#[cfg(test)]
mod segment_error_tests;

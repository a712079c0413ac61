//! Inbound Integrity Tracking
//!
//! Counts how inbound wire records were classified and derives a
//! verification status: STATUS_UNVERIFIED before any record arrived,
//! COMPROMISED once any record was filtered or malformed, VERIFIED otherwise.

use conduit_checksum::{ChecksumFunction, CodecError};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Verification status for fail-visible design
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationStatus {
    /// No inbound record has been checked yet
    StatusUnverified,
    /// Every inbound record verified
    Verified,
    /// At least one inbound record failed verification or parsing
    Compromised,
}

impl Default for VerificationStatus {
    fn default() -> Self {
        Self::StatusUnverified
    }
}

/// Point-in-time integrity report for one transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityStatus {
    /// Function the transport is committed to
    pub function: ChecksumFunction,
    /// Current verification status
    pub verification_status: VerificationStatus,
    /// Inbound records classified
    pub total_records: u64,
    /// Records that passed verification
    pub verified_records: u64,
    /// Records routed to `filtered`
    pub filtered_records: u64,
    /// Records that could not be parsed
    pub malformed_records: u64,
    /// Last classification timestamp (nanoseconds)
    pub last_check_ns: u64,
}

impl IntegrityStatus {
    /// Check if any inbound record failed
    pub fn has_violations(&self) -> bool {
        self.filtered_records > 0 || self.malformed_records > 0
    }
}

/// Lock-free counters updated by the verification filter.
#[derive(Debug, Default)]
pub struct IntegrityCounters {
    verified: AtomicU64,
    filtered: AtomicU64,
    malformed: AtomicU64,
    last_check_ns: AtomicU64,
}

impl IntegrityCounters {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a record as verified
    pub fn record_verified(&self) {
        let verified = self.verified.fetch_add(1, Ordering::Relaxed) + 1;
        self.touch();
        tracing::debug!(verified, "Inbound record verified");
    }

    /// Mark a record as filtered (integrity violation)
    pub fn record_filtered(&self, reason: &str) {
        let filtered = self.filtered.fetch_add(1, Ordering::Relaxed) + 1;
        self.touch();
        tracing::error!(reason, filtered, "Inbound record failed verification");
    }

    /// Mark a record as unparseable
    pub fn record_malformed(&self, error: &CodecError) {
        let malformed = self.malformed.fetch_add(1, Ordering::Relaxed) + 1;
        self.touch();
        tracing::error!(error = %error, malformed, "Inbound record malformed");
    }

    fn touch(&self) {
        self.last_check_ns.store(current_time_ns(), Ordering::Relaxed);
    }

    /// Reset all counters (after re-audit)
    pub fn reset(&self) {
        self.verified.store(0, Ordering::Relaxed);
        self.filtered.store(0, Ordering::Relaxed);
        self.malformed.store(0, Ordering::Relaxed);
        self.last_check_ns.store(0, Ordering::Relaxed);
    }

    /// Snapshot the counters
    pub fn snapshot(&self, function: ChecksumFunction) -> IntegrityStatus {
        let verified_records = self.verified.load(Ordering::Relaxed);
        let filtered_records = self.filtered.load(Ordering::Relaxed);
        let malformed_records = self.malformed.load(Ordering::Relaxed);
        let total_records = verified_records + filtered_records + malformed_records;

        let verification_status = if total_records == 0 {
            VerificationStatus::StatusUnverified
        } else if filtered_records > 0 || malformed_records > 0 {
            VerificationStatus::Compromised
        } else {
            VerificationStatus::Verified
        };

        IntegrityStatus {
            function,
            verification_status,
            total_records,
            verified_records,
            filtered_records,
            malformed_records,
            last_check_ns: self.last_check_ns.load(Ordering::Relaxed),
        }
    }
}

/// Get current time in nanoseconds since UNIX epoch
fn current_time_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as u64)
        .unwrap_or_default()
}

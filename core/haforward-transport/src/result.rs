//! Per-attempt delivery outcomes.

use serde::{Deserialize, Serialize};

/// Status reported for one request to one recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ForwardStatus {
    Success,
    Failure,
    /// The recipient could not apply now but may later.
    Retry,
}

/// Outcome of one delivery attempt to one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryResult {
    pub request_id: String,
    /// Peer address, group member or topic.
    pub recipient: String,
    pub status: ForwardStatus,
}

impl DeliveryResult {
    pub fn new(request_id: impl Into<String>, recipient: impl Into<String>, status: ForwardStatus) -> Self {
        Self {
            request_id: request_id.into(),
            recipient: recipient.into(),
            status,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ForwardStatus::Success
    }
}

/// All results collected for one attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryResults {
    results: Vec<DeliveryResult>,
}

impl DeliveryResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// A single-recipient result set.
    pub fn single(result: DeliveryResult) -> Self {
        Self {
            results: vec![result],
        }
    }

    pub fn push(&mut self, result: DeliveryResult) {
        self.results.push(result);
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeliveryResult> {
        self.results.iter()
    }

    /// Number of results with the given status.
    pub fn count(&self, status: ForwardStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    /// True when at least one recipient answered and every answer is a
    /// success.
    pub fn all_succeeded(&self) -> bool {
        !self.results.is_empty() && self.results.iter().all(DeliveryResult::is_success)
    }
}

impl FromIterator<DeliveryResult> for DeliveryResults {
    fn from_iter<I: IntoIterator<Item = DeliveryResult>>(iter: I) -> Self {
        Self {
            results: iter.into_iter().collect(),
        }
    }
}

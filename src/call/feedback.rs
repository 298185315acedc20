// Post-call feedback
//
// Rating + comment dialog state and the in-memory store used when no
// backend is wired in.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::error::{CallError, CallResult};
use super::types::{Role, Route, SessionId};
use super::FeedbackStore;

/// Star rating, 1 to 5 inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Rating(u8);

impl Rating {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(value: u8) -> CallResult<Self> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(CallError::InvalidRating(value))
        }
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Rating {
    type Error = CallError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Rating::new(value)
    }
}

impl From<Rating> for u8 {
    fn from(rating: Rating) -> Self {
        rating.0
    }
}

/// Submitted feedback for one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub session_id: SessionId,
    pub role: Role,
    pub rating: Rating,
    pub comment: String,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedbackOutcome {
    Submitted(FeedbackRecord),
    Skipped,
}

/// State of the feedback dialog. Records at most one outcome.
#[derive(Debug, Clone)]
pub struct FeedbackCapture {
    session_id: SessionId,
    role: Role,
    outcome: Option<FeedbackOutcome>,
}

impl FeedbackCapture {
    pub fn new(session_id: impl Into<SessionId>, role: Role) -> Self {
        Self {
            session_id: session_id.into(),
            role,
            outcome: None,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Where to go once the dialog is closed
    pub fn destination(&self) -> Route {
        self.role.dashboard()
    }

    pub fn outcome(&self) -> Option<&FeedbackOutcome> {
        self.outcome.as_ref()
    }

    pub fn is_decided(&self) -> bool {
        self.outcome.is_some()
    }

    /// Validate and record a submission. An out-of-range rating leaves the
    /// dialog open.
    pub fn submit(&mut self, rating: u8, comment: impl Into<String>) -> CallResult<FeedbackRecord> {
        if self.is_decided() {
            return Err(CallError::FeedbackAlreadyRecorded);
        }
        let record = FeedbackRecord {
            session_id: self.session_id.clone(),
            role: self.role,
            rating: Rating::new(rating)?,
            comment: comment.into().trim().to_string(),
            submitted_at: Utc::now(),
        };
        self.outcome = Some(FeedbackOutcome::Submitted(record.clone()));
        Ok(record)
    }

    pub fn skip(&mut self) -> CallResult<()> {
        if self.is_decided() {
            return Err(CallError::FeedbackAlreadyRecorded);
        }
        self.outcome = Some(FeedbackOutcome::Skipped);
        Ok(())
    }
}

/// Keeps submitted feedback in memory
#[derive(Debug, Default)]
pub struct MemoryFeedbackStore {
    records: Mutex<Vec<FeedbackRecord>>,
}

impl MemoryFeedbackStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<FeedbackRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl FeedbackStore for MemoryFeedbackStore {
    async fn save(&self, record: &FeedbackRecord) -> CallResult<()> {
        self.records.lock().await.push(record.clone());
        Ok(())
    }
}

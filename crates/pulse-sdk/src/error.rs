// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SDK-specific error types.

use std::time::Duration;

use pulse_protocol::ClientError;
use thiserror::Error;

/// Errors raised by the SDK plumbing: backends and the registry.
#[derive(Debug, Error)]
pub enum SdkError {
    /// Connection to the orchestrator failed
    #[error("connection error: {0}")]
    Connection(#[from] ClientError),

    /// Registration with the orchestrator failed
    #[error("registration failed: {0}")]
    Registration(String),

    /// A workflow or activity type was registered twice
    #[error("{kind} type '{name}' is already registered")]
    DuplicateRegistration { kind: &'static str, name: String },

    /// A workflow with this id already has a live run
    #[error("workflow '{0}' is already running")]
    AlreadyStarted(String),

    /// The backend does not know this run
    #[error("unknown run: {0}")]
    UnknownRun(String),

    /// The backend does not know this workflow
    #[error("unknown workflow: {0}")]
    UnknownWorkflow(String),

    /// Server returned an error response
    #[error("server error: {code} - {message}")]
    Server {
        /// Error code from the server
        code: String,
        /// Error message from the server
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Unexpected response from server
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl From<serde_json::Error> for SdkError {
    fn from(err: serde_json::Error) -> Self {
        SdkError::Serialization(err.to_string())
    }
}

/// Result type for SDK operations.
pub type Result<T> = std::result::Result<T, SdkError>;

/// Why an activity invocation did not produce a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityErrorKind {
    /// The activity returned an error.
    Failed,
    /// The invocation exceeded its start-to-close timeout.
    TimedOut,
    /// The owning run was cancelled while the activity was in flight.
    Cancelled,
    /// No activity with this name is registered on the worker.
    NotRegistered,
}

/// Error produced by a single activity invocation.
///
/// Displays as its message alone so the text reaches the run outcome verbatim.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ActivityError {
    pub activity_type: String,
    pub kind: ActivityErrorKind,
    pub message: String,
}

impl ActivityError {
    pub fn failed(activity_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            activity_type: activity_type.into(),
            kind: ActivityErrorKind::Failed,
            message: message.into(),
        }
    }

    pub fn timed_out(activity_type: impl Into<String>, after: Duration) -> Self {
        let activity_type = activity_type.into();
        let message = format!(
            "activity {} timed out after {}ms",
            activity_type,
            after.as_millis()
        );
        Self {
            activity_type,
            kind: ActivityErrorKind::TimedOut,
            message,
        }
    }

    pub fn cancelled(activity_type: impl Into<String>) -> Self {
        let activity_type = activity_type.into();
        let message = format!("activity {activity_type} cancelled");
        Self {
            activity_type,
            kind: ActivityErrorKind::Cancelled,
            message,
        }
    }

    pub fn not_registered(activity_type: impl Into<String>) -> Self {
        let activity_type = activity_type.into();
        let message = format!("activity type '{activity_type}' is not registered");
        Self {
            activity_type,
            kind: ActivityErrorKind::NotRegistered,
            message,
        }
    }

    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            ActivityErrorKind::Failed | ActivityErrorKind::TimedOut
        )
    }
}

/// Error ending a workflow run.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// An activity failed or timed out after its last attempt.
    #[error(transparent)]
    Activity(#[from] ActivityError),

    /// The run observed a cancellation request.
    #[error("workflow run cancelled")]
    Cancelled,

    /// The workflow could not decode its input or an activity output.
    #[error("invalid payload: {0}")]
    Payload(String),

    /// Application-level failure raised by the workflow body.
    #[error("{0}")]
    Application(String),

    /// The orchestrator could not be reached while recording history.
    #[error(transparent)]
    Backend(#[from] SdkError),
}

impl From<serde_json::Error> for WorkflowError {
    fn from(err: serde_json::Error) -> Self {
        WorkflowError::Payload(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activity_failure_message_is_verbatim() {
        let err: WorkflowError = ActivityError::failed("GetRegion", "REGION lookup failed").into();
        assert_eq!(err.to_string(), "REGION lookup failed");
    }

    #[test]
    fn test_timeout_message_names_activity_and_budget() {
        let err = ActivityError::timed_out("GetRegion", Duration::from_secs(2));
        assert_eq!(err.kind, ActivityErrorKind::TimedOut);
        assert_eq!(err.to_string(), "activity GetRegion timed out after 2000ms");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_cancelled_and_unregistered_are_not_retryable() {
        assert!(!ActivityError::cancelled("GetRegion").is_retryable());
        assert!(!ActivityError::not_registered("GetRegion").is_retryable());
    }

    #[test]
    fn test_sdk_error_display() {
        let err = SdkError::DuplicateRegistration {
            kind: "activity",
            name: "GetRegion".to_string(),
        };
        assert_eq!(err.to_string(), "activity type 'GetRegion' is already registered");
    }
}

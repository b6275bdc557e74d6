// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Worker protocol messages (`pulse.worker` package).
//!
//! Used by worker processes to talk to the orchestration service:
//! - Registration of the (task queue, workflow types, activity types) triple
//! - Long-polling for scheduled workflow runs
//! - Recording history events and receiving continue-as-new / cancel hints
//! - Heartbeats while a run is waiting on a slow activity
//! - Reporting the terminal (or continued) outcome of a run
//!
//! History event and payload bodies are JSON documents carried as bytes; the
//! orchestrator treats them as opaque apart from their size.

/// Envelope for every request sent by a worker.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RpcRequest {
    #[prost(oneof = "rpc_request::Request", tags = "1, 2, 3, 4, 5")]
    pub request: ::core::option::Option<rpc_request::Request>,
}

/// Nested message and enum types in `RpcRequest`.
pub mod rpc_request {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Request {
        #[prost(message, tag = "1")]
        RegisterWorker(super::RegisterWorkerRequest),
        #[prost(message, tag = "2")]
        PollWorkflowTask(super::PollWorkflowTaskRequest),
        #[prost(message, tag = "3")]
        RecordEvent(super::RecordEventRequest),
        #[prost(message, tag = "4")]
        Heartbeat(super::HeartbeatRequest),
        #[prost(message, tag = "5")]
        CompleteRun(super::CompleteRunRequest),
    }
}

/// Envelope for every response returned by the orchestrator.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RpcResponse {
    #[prost(oneof = "rpc_response::Response", tags = "1, 2, 3, 4, 5, 15")]
    pub response: ::core::option::Option<rpc_response::Response>,
}

/// Nested message and enum types in `RpcResponse`.
pub mod rpc_response {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Response {
        #[prost(message, tag = "1")]
        RegisterWorker(super::RegisterWorkerResponse),
        #[prost(message, tag = "2")]
        PollWorkflowTask(super::PollWorkflowTaskResponse),
        #[prost(message, tag = "3")]
        RecordEvent(super::RecordEventResponse),
        #[prost(message, tag = "4")]
        Heartbeat(super::HeartbeatResponse),
        #[prost(message, tag = "5")]
        CompleteRun(super::CompleteRunResponse),
        #[prost(message, tag = "15")]
        Error(super::RpcError),
    }
}

/// Error returned by the orchestrator in place of a typed response.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RpcError {
    #[prost(string, tag = "1")]
    pub code: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub message: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RegisterWorkerRequest {
    #[prost(string, tag = "1")]
    pub namespace: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub task_queue: ::prost::alloc::string::String,
    #[prost(string, repeated, tag = "3")]
    pub workflow_types: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    #[prost(string, repeated, tag = "4")]
    pub activity_types: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    /// Free-form worker identity (hostname and pid).
    #[prost(string, tag = "5")]
    pub identity: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RegisterWorkerResponse {
    #[prost(string, tag = "1")]
    pub worker_id: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PollWorkflowTaskRequest {
    #[prost(string, tag = "1")]
    pub worker_id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub task_queue: ::prost::alloc::string::String,
    /// Long-poll budget; the orchestrator answers with an empty task when it expires.
    #[prost(uint64, tag = "3")]
    pub wait_ms: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PollWorkflowTaskResponse {
    #[prost(message, optional, tag = "1")]
    pub task: ::core::option::Option<WorkflowTask>,
}

/// A workflow run scheduled onto this worker.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WorkflowTask {
    #[prost(string, tag = "1")]
    pub workflow_id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub run_id: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub workflow_type: ::prost::alloc::string::String,
    /// JSON-encoded workflow input.
    #[prost(bytes = "vec", tag = "4")]
    pub input: ::prost::alloc::vec::Vec<u8>,
    #[prost(uint64, tag = "5")]
    pub max_history_events: u64,
    #[prost(uint64, tag = "6")]
    pub max_history_bytes: u64,
    #[prost(string, optional, tag = "7")]
    pub continued_from_run_id: ::core::option::Option<::prost::alloc::string::String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RecordEventRequest {
    #[prost(string, tag = "1")]
    pub run_id: ::prost::alloc::string::String,
    /// JSON-encoded history event.
    #[prost(bytes = "vec", tag = "2")]
    pub event: ::prost::alloc::vec::Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RecordEventResponse {
    #[prost(bool, tag = "1")]
    pub continue_as_new_suggested: bool,
    #[prost(bool, tag = "2")]
    pub cancel_requested: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HeartbeatRequest {
    #[prost(string, tag = "1")]
    pub run_id: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HeartbeatResponse {
    #[prost(bool, tag = "1")]
    pub cancel_requested: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CompleteRunRequest {
    #[prost(string, tag = "1")]
    pub run_id: ::prost::alloc::string::String,
    #[prost(oneof = "complete_run_request::Outcome", tags = "2, 3, 4, 5")]
    pub outcome: ::core::option::Option<complete_run_request::Outcome>,
}

/// Nested message and enum types in `CompleteRunRequest`.
pub mod complete_run_request {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Outcome {
        /// JSON-encoded workflow result.
        #[prost(bytes, tag = "2")]
        Completed(::prost::alloc::vec::Vec<u8>),
        /// Error message, preserved verbatim.
        #[prost(string, tag = "3")]
        Failed(::prost::alloc::string::String),
        /// JSON-encoded input for the next run of the same workflow.
        #[prost(bytes, tag = "4")]
        ContinuedAsNew(::prost::alloc::vec::Vec<u8>),
        #[prost(bool, tag = "5")]
        Cancelled(bool),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CompleteRunResponse {
    /// Set when the outcome was `ContinuedAsNew`.
    #[prost(string, optional, tag = "1")]
    pub next_run_id: ::core::option::Option<::prost::alloc::string::String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_complete_run_outcome_survives_encoding() {
        let request = RpcRequest {
            request: Some(rpc_request::Request::CompleteRun(CompleteRunRequest {
                run_id: "run-1".to_string(),
                outcome: Some(complete_run_request::Outcome::Failed(
                    "REGION lookup failed: boom".to_string(),
                )),
            })),
        };

        let decoded = RpcRequest::decode(request.encode_to_vec().as_slice()).unwrap();
        match decoded.request {
            Some(rpc_request::Request::CompleteRun(req)) => {
                assert_eq!(req.run_id, "run-1");
                assert_eq!(
                    req.outcome,
                    Some(complete_run_request::Outcome::Failed(
                        "REGION lookup failed: boom".to_string()
                    ))
                );
            }
            other => panic!("unexpected request: {:?}", other),
        }
    }

    #[test]
    fn test_empty_poll_response_has_no_task() {
        let decoded = PollWorkflowTaskResponse::decode(&[][..]).unwrap();
        assert!(decoded.task.is_none());
    }
}

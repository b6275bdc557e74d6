// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! QUIC backend for a remote orchestration service.

use std::time::Duration;

use async_trait::async_trait;
use pulse_protocol::PulseClient;
use pulse_protocol::worker_proto::{
    CompleteRunRequest, HeartbeatRequest, PollWorkflowTaskRequest, RecordEventRequest,
    RegisterWorkerRequest, RpcRequest, RpcResponse, WorkflowTask as ProtoWorkflowTask,
    complete_run_request, rpc_request, rpc_response,
};
use tracing::{debug, info, instrument};

use super::OrchestratorBackend;
use crate::error::{Result, SdkError};
use crate::history::HistoryEvent;
use crate::types::{
    EventAck, HistoryLimits, RunId, RunOutcome, TaskQueue, WorkerRegistration, WorkflowId,
    WorkflowTask,
};

/// Backend talking to the orchestrator over QUIC.
pub struct QuicBackend {
    client: PulseClient,
}

impl QuicBackend {
    pub fn new(client: PulseClient) -> Self {
        Self { client }
    }

    /// Get a reference to the underlying QUIC client.
    pub fn client(&self) -> &PulseClient {
        &self.client
    }

    async fn call(&self, request: rpc_request::Request) -> Result<rpc_response::Response> {
        let rpc_request = RpcRequest {
            request: Some(request),
        };
        let rpc_response: RpcResponse = self.client.request(&rpc_request).await?;

        match rpc_response.response {
            Some(rpc_response::Response::Error(e)) => Err(SdkError::Server {
                code: e.code,
                message: e.message,
            }),
            Some(response) => Ok(response),
            None => Err(SdkError::UnexpectedResponse("empty response".to_string())),
        }
    }
}

fn from_proto_task(task: ProtoWorkflowTask) -> Result<WorkflowTask> {
    let input = if task.input.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&task.input)?
    };
    let defaults = HistoryLimits::default();

    Ok(WorkflowTask {
        workflow_id: WorkflowId::new(task.workflow_id),
        run_id: RunId::new(task.run_id),
        workflow_type: task.workflow_type,
        input,
        limits: HistoryLimits {
            max_events: if task.max_history_events == 0 {
                defaults.max_events
            } else {
                task.max_history_events
            },
            max_bytes: if task.max_history_bytes == 0 {
                defaults.max_bytes
            } else {
                task.max_history_bytes
            },
        },
        continued_from: task.continued_from_run_id.map(RunId::new),
    })
}

fn to_proto_outcome(outcome: &RunOutcome) -> Result<complete_run_request::Outcome> {
    Ok(match outcome {
        RunOutcome::Completed(value) => {
            complete_run_request::Outcome::Completed(serde_json::to_vec(value)?)
        }
        RunOutcome::Failed(message) => complete_run_request::Outcome::Failed(message.clone()),
        RunOutcome::ContinuedAsNew(input) => {
            complete_run_request::Outcome::ContinuedAsNew(serde_json::to_vec(input)?)
        }
        RunOutcome::Cancelled => complete_run_request::Outcome::Cancelled(true),
    })
}

#[async_trait]
impl OrchestratorBackend for QuicBackend {
    #[instrument(skip(self), fields(host = %self.client.config().host))]
    async fn connect(&self) -> Result<()> {
        info!("Connecting to orchestrator");
        self.client.connect().await?;
        info!("Connected to orchestrator");
        Ok(())
    }

    async fn close(&self) {
        self.client.close().await;
    }

    #[instrument(
        skip(self, registration),
        fields(namespace = %registration.namespace, task_queue = %registration.task_queue)
    )]
    async fn register_worker(&self, registration: &WorkerRegistration) -> Result<String> {
        let request = RegisterWorkerRequest {
            namespace: registration.namespace.clone(),
            task_queue: registration.task_queue.to_string(),
            workflow_types: registration.workflow_types.clone(),
            activity_types: registration.activity_types.clone(),
            identity: registration.identity.clone(),
        };

        match self
            .call(rpc_request::Request::RegisterWorker(request))
            .await?
        {
            rpc_response::Response::RegisterWorker(resp) => {
                if resp.worker_id.is_empty() {
                    return Err(SdkError::Registration(
                        "orchestrator returned an empty worker id".to_string(),
                    ));
                }
                info!(worker_id = %resp.worker_id, "Worker registered with orchestrator");
                Ok(resp.worker_id)
            }
            _ => Err(SdkError::UnexpectedResponse(
                "expected RegisterWorkerResponse".to_string(),
            )),
        }
    }

    #[instrument(skip(self), fields(task_queue = %task_queue))]
    async fn poll_workflow_task(
        &self,
        worker_id: &str,
        task_queue: &TaskQueue,
        wait: Duration,
    ) -> Result<Option<WorkflowTask>> {
        let request = PollWorkflowTaskRequest {
            worker_id: worker_id.to_string(),
            task_queue: task_queue.to_string(),
            wait_ms: wait.as_millis() as u64,
        };

        match self
            .call(rpc_request::Request::PollWorkflowTask(request))
            .await?
        {
            rpc_response::Response::PollWorkflowTask(resp) => {
                resp.task.map(from_proto_task).transpose()
            }
            _ => Err(SdkError::UnexpectedResponse(
                "expected PollWorkflowTaskResponse".to_string(),
            )),
        }
    }

    #[instrument(skip(self, event), fields(run_id = %run_id))]
    async fn record_event(&self, run_id: &RunId, event: &HistoryEvent) -> Result<EventAck> {
        let event = event.encode()?;
        debug!(event_size = event.len(), "Recording history event");

        let request = RecordEventRequest {
            run_id: run_id.to_string(),
            event,
        };

        match self.call(rpc_request::Request::RecordEvent(request)).await? {
            rpc_response::Response::RecordEvent(resp) => Ok(EventAck {
                continue_as_new_suggested: resp.continue_as_new_suggested,
                cancel_requested: resp.cancel_requested,
            }),
            _ => Err(SdkError::UnexpectedResponse(
                "expected RecordEventResponse".to_string(),
            )),
        }
    }

    #[instrument(skip(self), fields(run_id = %run_id))]
    async fn heartbeat(&self, run_id: &RunId) -> Result<bool> {
        let request = HeartbeatRequest {
            run_id: run_id.to_string(),
        };

        match self.call(rpc_request::Request::Heartbeat(request)).await? {
            rpc_response::Response::Heartbeat(resp) => Ok(resp.cancel_requested),
            _ => Err(SdkError::UnexpectedResponse(
                "expected HeartbeatResponse".to_string(),
            )),
        }
    }

    #[instrument(skip(self, outcome), fields(run_id = %run_id, status = %outcome.status()))]
    async fn complete_run(&self, run_id: &RunId, outcome: &RunOutcome) -> Result<Option<RunId>> {
        let request = CompleteRunRequest {
            run_id: run_id.to_string(),
            outcome: Some(to_proto_outcome(outcome)?),
        };

        match self.call(rpc_request::Request::CompleteRun(request)).await? {
            rpc_response::Response::CompleteRun(resp) => {
                let next = resp.next_run_id.map(RunId::new);
                info!(next_run_id = ?next, "Run outcome reported");
                Ok(next)
            }
            _ => Err(SdkError::UnexpectedResponse(
                "expected CompleteRunResponse".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_conversion_fills_default_limits() {
        let task = ProtoWorkflowTask {
            workflow_id: "wf".to_string(),
            run_id: "run".to_string(),
            workflow_type: "RegionWorkflow".to_string(),
            input: Vec::new(),
            max_history_events: 0,
            max_history_bytes: 4_096,
            continued_from_run_id: Some("prev".to_string()),
        };

        let task = from_proto_task(task).unwrap();
        assert_eq!(task.input, serde_json::Value::Null);
        assert_eq!(task.limits.max_events, HistoryLimits::default().max_events);
        assert_eq!(task.limits.max_bytes, 4_096);
        assert_eq!(task.continued_from, Some(RunId::new("prev")));
    }

    #[test]
    fn test_invalid_task_input_is_a_serialization_error() {
        let task = ProtoWorkflowTask {
            input: b"{not json".to_vec(),
            ..Default::default()
        };
        assert!(matches!(
            from_proto_task(task),
            Err(SdkError::Serialization(_))
        ));
    }

    #[test]
    fn test_outcome_conversion() {
        let outcome = to_proto_outcome(&RunOutcome::Completed(json!({"iterations": 3}))).unwrap();
        match outcome {
            complete_run_request::Outcome::Completed(bytes) => {
                let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
                assert_eq!(value["iterations"], 3);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        assert_eq!(
            to_proto_outcome(&RunOutcome::Failed("boom".to_string())).unwrap(),
            complete_run_request::Outcome::Failed("boom".to_string())
        );
    }
}

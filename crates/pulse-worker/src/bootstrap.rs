// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Process bootstrap: registry wiring, connection setup and serving.
//!
//! Certificate material is loaded and validated before anything is
//! registered, so a broken setup fails without ever reaching the
//! orchestrator.

use std::future::Future;
use std::sync::Arc;

use pulse_protocol::{PulseClient, tls};
use pulse_sdk::{
    EmbeddedOrchestrator, OrchestratorBackend, Payload, QuicBackend, Registry, SdkError, Worker,
    WorkflowId,
};
use tracing::{info, instrument};

use crate::config::{ConnectionConfig, WorkerConfig};
use crate::controller::{REGION_WORKFLOW, RegionWorkflow};
use crate::error::StartupError;
use crate::sampler::{REGION_ACTIVITY, RegionSampler, SettingSource};

/// Workflow id used for the loop started in embedded mode.
pub const EMBEDDED_WORKFLOW_ID: &str = "region-loop";

/// Registry holding the region workflow and its sampler.
pub fn build_registry(
    config: &WorkerConfig,
    source: impl SettingSource,
) -> Result<Registry, SdkError> {
    let sampler = RegionSampler::new(source).with_latency(config.sampler_latency);

    let mut registry = Registry::new();
    registry
        .register_activity(REGION_ACTIVITY, sampler)?
        .register_workflow(REGION_WORKFLOW, RegionWorkflow::new(config.loop_config.clone()))?;
    Ok(registry)
}

/// Load certificate material and open the QUIC connection.
#[instrument(skip_all, fields(target = %connection.target()))]
pub async fn connect(connection: &ConnectionConfig) -> Result<QuicBackend, StartupError> {
    let identity = tls::load_client_identity(&connection.tls_cert, &connection.tls_key)?;
    let extra_roots = match &connection.tls_ca {
        Some(path) => tls::load_trust_anchors(path)?,
        None => Vec::new(),
    };
    let tls_config = tls::build_client_tls(identity, extra_roots)?;
    info!(cert = %connection.tls_cert.display(), "Client certificate loaded");

    let client =
        PulseClient::new(connection.client_config(), tls_config).map_err(SdkError::from)?;
    let backend = QuicBackend::new(client);
    backend.connect().await?;
    Ok(backend)
}

/// Connect to the orchestrator named by `connection` and serve until `shutdown`.
pub async fn run<F>(
    connection: &ConnectionConfig,
    config: WorkerConfig,
    source: impl SettingSource,
    shutdown: F,
) -> Result<(), StartupError>
where
    F: Future<Output = ()> + Send,
{
    let backend = connect(connection).await?;
    let registry = build_registry(&config, source)?;

    Worker::new(Arc::new(backend), registry, config.task_queue)
        .with_namespace(connection.namespace.clone())
        .run(shutdown)
        .await?;
    Ok(())
}

/// Serve against an in-process orchestrator and start one region loop on it.
pub async fn run_embedded<F>(
    config: WorkerConfig,
    source: impl SettingSource,
    shutdown: F,
) -> Result<(), StartupError>
where
    F: Future<Output = ()> + Send,
{
    let orchestrator = Arc::new(EmbeddedOrchestrator::default());
    let registry = build_registry(&config, source)?;
    let workflow_id = WorkflowId::new(EMBEDDED_WORKFLOW_ID);

    let run_id = orchestrator
        .start_workflow(&config.task_queue, REGION_WORKFLOW, workflow_id.clone(), Payload::Null)
        .await?;
    info!(
        workflow_id = %workflow_id,
        run_id = %run_id,
        "Started region loop on embedded orchestrator"
    );

    let backend: Arc<dyn OrchestratorBackend> = orchestrator;
    Worker::new(backend, registry, config.task_queue)
        .with_namespace("embedded")
        .run(shutdown)
        .await?;
    Ok(())
}

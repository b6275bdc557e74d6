// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Workflow and activity registry.
//!
//! A worker advertises exactly the types registered here. The registry is
//! built once at startup and then shared read-only by every run.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::activity::Activity;
use crate::error::{Result, SdkError};
use crate::workflow::Workflow;

/// Named workflow and activity implementations served by one worker.
#[derive(Default, Clone)]
pub struct Registry {
    workflows: BTreeMap<String, Arc<dyn Workflow>>,
    activities: BTreeMap<String, Arc<dyn Activity>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a workflow type. Fails if the name is taken.
    pub fn register_workflow(
        &mut self,
        name: impl Into<String>,
        workflow: impl Workflow,
    ) -> Result<&mut Self> {
        let name = name.into();
        if self.workflows.contains_key(&name) {
            return Err(SdkError::DuplicateRegistration {
                kind: "workflow",
                name,
            });
        }
        debug!(workflow_type = %name, "Registered workflow");
        self.workflows.insert(name, Arc::new(workflow));
        Ok(self)
    }

    /// Register an activity type. Fails if the name is taken.
    pub fn register_activity(
        &mut self,
        name: impl Into<String>,
        activity: impl Activity,
    ) -> Result<&mut Self> {
        let name = name.into();
        if self.activities.contains_key(&name) {
            return Err(SdkError::DuplicateRegistration {
                kind: "activity",
                name,
            });
        }
        debug!(activity_type = %name, "Registered activity");
        self.activities.insert(name, Arc::new(activity));
        Ok(self)
    }

    pub fn workflow(&self, name: &str) -> Option<Arc<dyn Workflow>> {
        self.workflows.get(name).cloned()
    }

    pub fn activity(&self, name: &str) -> Option<Arc<dyn Activity>> {
        self.activities.get(name).cloned()
    }

    pub fn workflow_types(&self) -> Vec<String> {
        self.workflows.keys().cloned().collect()
    }

    pub fn activity_types(&self) -> Vec<String> {
        self.activities.keys().cloned().collect()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("workflows", &self.workflow_types())
            .field("activities", &self.activity_types())
            .finish()
    }
}

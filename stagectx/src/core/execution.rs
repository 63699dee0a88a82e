//! Executions and the stages they own.

use super::{ContextMap, ExecutionType, StageStatus};
use crate::context::{SharedContext, StageContext};
use crate::evaluation::EvaluatorVersion;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::{Arc, Weak};
use uuid::Uuid;

/// A pipeline run: the owner of one or more stages.
pub struct Execution {
    id: String,
    execution_type: ExecutionType,
    application: String,
    name: Option<String>,
    status: RwLock<StageStatus>,
    trigger: Value,
    evaluator_version: Option<EvaluatorVersion>,
    build_time: DateTime<Utc>,
    stages: RwLock<Vec<Arc<StageExecution>>>,
}

impl Execution {
    /// Creates a new pipeline execution for an application.
    #[must_use]
    pub fn new(application: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            execution_type: ExecutionType::Pipeline,
            application: application.into(),
            name: None,
            status: RwLock::new(StageStatus::NotStarted),
            trigger: json!({}),
            evaluator_version: None,
            build_time: Utc::now(),
            stages: RwLock::new(Vec::new()),
        }
    }

    /// Sets the execution type.
    #[must_use]
    pub fn with_type(mut self, execution_type: ExecutionType) -> Self {
        self.execution_type = execution_type;
        self
    }

    /// Sets the pipeline name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the trigger payload.
    #[must_use]
    pub fn with_trigger(mut self, trigger: Value) -> Self {
        self.trigger = trigger;
        self
    }

    /// Requests a specific expression-evaluator version.
    #[must_use]
    pub fn with_evaluator_version(mut self, version: EvaluatorVersion) -> Self {
        self.evaluator_version = Some(version);
        self
    }

    /// Wraps the execution for sharing with its stages.
    #[must_use]
    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Appends a stage built from `definition` and returns it.
    pub fn add_stage(self: &Arc<Self>, definition: StageDefinition) -> Arc<StageExecution> {
        let stage = Arc::new(StageExecution {
            id: Uuid::new_v4().to_string(),
            ref_id: definition.ref_id,
            name: definition.name,
            stage_type: definition.stage_type,
            requisite_stage_ref_ids: definition.requisite_stage_ref_ids,
            status: RwLock::new(definition.status),
            outputs: RwLock::new(definition.outputs),
            context: RwLock::new(StageContext::Raw(SharedContext::from_map(
                definition.context,
            ))),
            execution: Arc::downgrade(self),
        });
        self.stages.write().push(stage.clone());
        stage
    }

    /// Returns the execution id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the execution type.
    #[must_use]
    pub fn execution_type(&self) -> ExecutionType {
        self.execution_type
    }

    /// Returns the application name.
    #[must_use]
    pub fn application(&self) -> &str {
        &self.application
    }

    /// Returns the pipeline name, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns the trigger payload.
    #[must_use]
    pub fn trigger(&self) -> &Value {
        &self.trigger
    }

    /// Returns the requested evaluator version, if one was set.
    #[must_use]
    pub fn evaluator_version(&self) -> Option<EvaluatorVersion> {
        self.evaluator_version
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> StageStatus {
        *self.status.read()
    }

    /// Updates the status.
    pub fn set_status(&self, status: StageStatus) {
        *self.status.write() = status;
    }

    /// Returns all stages in creation order.
    #[must_use]
    pub fn stages(&self) -> Vec<Arc<StageExecution>> {
        self.stages.read().clone()
    }

    /// Finds a stage by ref id.
    #[must_use]
    pub fn stage_by_ref_id(&self, ref_id: &str) -> Option<Arc<StageExecution>> {
        self.stages.read().iter().find(|s| s.ref_id == ref_id).cloned()
    }

    /// Renders the JSON view exposed under the reserved `execution` key.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let stages: Vec<Value> = self.stages().iter().map(|s| s.to_value()).collect();
        json!({
            "id": self.id,
            "type": self.execution_type,
            "application": self.application,
            "name": self.name,
            "status": self.status(),
            "buildTime": self.build_time.to_rfc3339(),
            "trigger": self.trigger,
            "stages": stages,
        })
    }
}

impl fmt::Debug for Execution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Execution")
            .field("id", &self.id)
            .field("type", &self.execution_type)
            .field("application", &self.application)
            .field("stages", &self.stages.read().len())
            .finish()
    }
}

/// Parameters for a new stage.
#[derive(Debug, Clone, Default)]
pub struct StageDefinition {
    ref_id: String,
    name: String,
    stage_type: String,
    requisite_stage_ref_ids: Vec<String>,
    status: StageStatus,
    context: ContextMap,
    outputs: ContextMap,
}

impl StageDefinition {
    /// Creates a definition; the name defaults to the ref id.
    #[must_use]
    pub fn new(ref_id: impl Into<String>, stage_type: impl Into<String>) -> Self {
        let ref_id = ref_id.into();
        Self {
            name: ref_id.clone(),
            ref_id,
            stage_type: stage_type.into(),
            ..Default::default()
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Declares upstream stages by ref id.
    #[must_use]
    pub fn with_requisites(mut self, ref_ids: &[&str]) -> Self {
        self.requisite_stage_ref_ids = ref_ids.iter().map(|s| (*s).to_string()).collect();
        self
    }

    /// Sets the initial status.
    #[must_use]
    pub fn with_status(mut self, status: StageStatus) -> Self {
        self.status = status;
        self
    }

    /// Sets the initial context.
    #[must_use]
    pub fn with_context(mut self, context: ContextMap) -> Self {
        self.context = context;
        self
    }

    /// Sets the initial outputs.
    #[must_use]
    pub fn with_outputs(mut self, outputs: ContextMap) -> Self {
        self.outputs = outputs;
        self
    }
}

/// One stage of an execution, carrying its own mutable context.
pub struct StageExecution {
    id: String,
    ref_id: String,
    name: String,
    stage_type: String,
    requisite_stage_ref_ids: Vec<String>,
    status: RwLock<StageStatus>,
    outputs: RwLock<ContextMap>,
    context: RwLock<StageContext>,
    execution: Weak<Execution>,
}

impl StageExecution {
    /// Returns the stage id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the ref id used by requisite edges.
    #[must_use]
    pub fn ref_id(&self) -> &str {
        &self.ref_id
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the stage type tag.
    #[must_use]
    pub fn stage_type(&self) -> &str {
        &self.stage_type
    }

    /// Returns the ref ids of direct upstream stages.
    #[must_use]
    pub fn requisite_stage_ref_ids(&self) -> &[String] {
        &self.requisite_stage_ref_ids
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> StageStatus {
        *self.status.read()
    }

    /// Updates the status.
    pub fn set_status(&self, status: StageStatus) {
        *self.status.write() = status;
    }

    /// Returns a copy of the outputs.
    #[must_use]
    pub fn outputs(&self) -> ContextMap {
        self.outputs.read().clone()
    }

    /// Records an output value.
    pub fn set_output(&self, key: impl Into<String>, value: Value) {
        self.outputs.write().insert(key.into(), value);
    }

    /// Returns a handle to the stage context.
    ///
    /// The handle shares storage with the stage; writes through it persist.
    #[must_use]
    pub fn context(&self) -> StageContext {
        self.context.read().clone()
    }

    /// Replaces the stage context.
    pub fn set_context(&self, context: StageContext) {
        *self.context.write() = context;
    }

    /// Returns the owning execution, if it is still alive.
    #[must_use]
    pub fn execution(&self) -> Option<Arc<Execution>> {
        self.execution.upgrade()
    }

    /// Returns every transitive upstream stage, nearest first.
    #[must_use]
    pub fn ancestors(&self) -> Vec<Arc<StageExecution>> {
        let Some(execution) = self.execution() else {
            return Vec::new();
        };

        let mut seen: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<String> = self.requisite_stage_ref_ids.iter().cloned().collect();
        let mut ancestors = Vec::new();

        while let Some(ref_id) = queue.pop_front() {
            if ref_id == self.ref_id || !seen.insert(ref_id.clone()) {
                continue;
            }
            if let Some(stage) = execution.stage_by_ref_id(&ref_id) {
                queue.extend(stage.requisite_stage_ref_ids.iter().cloned());
                ancestors.push(stage);
            }
        }

        ancestors
    }

    /// Renders the stage as JSON, with its stored (unevaluated) context.
    #[must_use]
    pub fn to_value(&self) -> Value {
        json!({
            "id": self.id,
            "refId": self.ref_id,
            "name": self.name,
            "type": self.stage_type,
            "status": self.status(),
            "requisiteStageRefIds": self.requisite_stage_ref_ids,
            "context": self.context().to_map(),
            "outputs": self.outputs(),
        })
    }
}

impl fmt::Debug for StageExecution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageExecution")
            .field("id", &self.id)
            .field("ref_id", &self.ref_id)
            .field("type", &self.stage_type)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

//! Operation definitions and registry for the JSON interface.
//!
//! Each engine operation is exposed as an [`Operation`] taking a JSON
//! parameter object. The [`OperationRegistry`] dispatches requests of the
//! form `{"operation": "<name>", ...params}` and always answers with an
//! [`OperationResponse`] envelope.

pub mod operations;

pub use operations::*;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::engine::FinetuneEngine;
use crate::error::{EngineError, ErrorKind};
use crate::workflow::Step;

/// Uniform reply for every operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Result fields, merged into the top level of the envelope.
    #[serde(flatten)]
    pub result: Map<String, Value>,
}

impl OperationResponse {
    /// Wrap a result; non-object values are placed under `result`.
    pub fn success(value: Value) -> Self {
        let result = match value {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("result".to_string(), other);
                map
            }
        };
        Self {
            success: true,
            error: None,
            error_kind: None,
            result,
        }
    }

    pub fn failure(error: &EngineError) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            error_kind: Some(error.kind()),
            result: Map::new(),
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|e| {
            serde_json::json!({"success": false, "error": e.to_string(), "error_kind": "internal"})
        })
    }
}

/// An engine operation callable with JSON parameters.
#[async_trait]
pub trait Operation: Send + Sync {
    /// Returns the unique name of the operation.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Steps in which the operation may run; empty for ungated operations.
    fn allowed_steps(&self) -> &'static [Step];

    /// Returns the JSON schema for the operation's parameters.
    fn parameters_schema(&self) -> Value;

    async fn execute(&self, engine: &FinetuneEngine, args: Value) -> Result<Value, EngineError>;
}

/// Registry of operations by name.
pub struct OperationRegistry {
    operations: HashMap<String, Arc<dyn Operation>>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self {
            operations: HashMap::new(),
        }
    }

    /// A registry holding every engine operation.
    pub fn with_default_operations() -> Self {
        let mut registry = Self::new();
        for operation in operations::all() {
            registry.register(operation);
        }
        registry
    }

    pub fn register(&mut self, operation: Arc<dyn Operation>) {
        self.operations
            .insert(operation.name().to_string(), operation);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Operation>> {
        self.operations.get(name).cloned()
    }

    /// Registered operation names, sorted.
    pub fn list_operations(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.operations.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Function-calling definitions of all operations, sorted by name.
    pub fn to_json_schema(&self) -> Value {
        let operations: Vec<Value> = self
            .list_operations()
            .into_iter()
            .filter_map(|name| self.operations.get(name))
            .map(|operation| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": operation.name(),
                        "description": operation.description(),
                        "parameters": operation.parameters_schema(),
                        "allowed_steps": operation.allowed_steps(),
                    }
                })
            })
            .collect();
        Value::Array(operations)
    }

    /// Run a named operation and wrap the outcome in an envelope.
    pub async fn invoke(&self, engine: &FinetuneEngine, name: &str, args: Value) -> OperationResponse {
        let Some(operation) = self.get(name) else {
            return OperationResponse::failure(&EngineError::validation(format!(
                "Unknown operation '{}'",
                name
            )));
        };

        let started = Instant::now();
        let outcome = operation.execute(engine, args).await;
        let elapsed = started.elapsed();

        match outcome {
            Ok(value) => {
                engine.metrics().record_operation(name, "ok", elapsed);
                OperationResponse::success(value)
            }
            Err(err) => {
                let kind = err.kind();
                engine
                    .metrics()
                    .record_operation(name, kind_label(kind), elapsed);
                tracing::warn!(operation = name, error_kind = kind_label(kind), error = %err, "Operation failed");
                OperationResponse::failure(&err)
            }
        }
    }

    /// Run a request of the form `{"operation": "<name>", ...params}`.
    pub async fn dispatch(&self, engine: &FinetuneEngine, request: Value) -> OperationResponse {
        let Value::Object(mut params) = request else {
            return OperationResponse::failure(&EngineError::validation(
                "Request must be a JSON object",
            ));
        };
        let name = match params.remove("operation") {
            Some(Value::String(name)) => name,
            _ => {
                return OperationResponse::failure(&EngineError::validation(
                    "operation is required",
                ))
            }
        };
        self.invoke(engine, &name, Value::Object(params)).await
    }
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn kind_label(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Validation => "validation",
        ErrorKind::State => "state",
        ErrorKind::Domain => "domain",
        ErrorKind::External => "external",
        ErrorKind::Internal => "internal",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_envelope_flattens_result() {
        let response = OperationResponse::success(serde_json::json!({"workflow_id": "wf-1"}));
        let json = response.to_json();
        assert_eq!(json["success"], true);
        assert_eq!(json["workflow_id"], "wf-1");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_failure_envelope_carries_kind() {
        let err = EngineError::StepMismatch {
            current: Step::Categorize,
            allowed: vec![Step::DryRun],
        };
        let json = OperationResponse::failure(&err).to_json();
        assert_eq!(json["success"], false);
        assert_eq!(json["error_kind"], "state");
        assert!(json["error"].as_str().expect("error text").contains("categorize"));
    }

    #[test]
    fn test_non_object_result_is_nested() {
        let response = OperationResponse::success(serde_json::json!([1, 2]));
        assert_eq!(response.to_json()["result"], serde_json::json!([1, 2]));
    }

    #[test]
    fn test_default_registry_lists_every_operation() {
        let registry = OperationRegistry::with_default_operations();
        assert_eq!(registry.len(), 18);
        assert!(registry.get("generate_synthetic_data").is_some());
        assert!(registry.get("update_record").is_some());
        assert!(registry.get("deploy_model").is_some());

        let schema = registry.to_json_schema();
        let defs = schema.as_array().expect("schema should be an array");
        assert_eq!(defs.len(), 18);
        assert_eq!(defs[0]["function"]["name"], "advance_to_step");
    }

    #[test]
    fn test_gated_operations_declare_steps() {
        let registry = OperationRegistry::with_default_operations();
        let steps = registry
            .get("check_training_status")
            .expect("registered")
            .allowed_steps();
        assert_eq!(steps, &[Step::Training, Step::Deployment, Step::Completed]);
        assert!(registry
            .get("get_dataset_stats")
            .expect("registered")
            .allowed_steps()
            .is_empty());
    }
}

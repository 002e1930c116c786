//! Tool-Invocation Unit
//!
//! Binds one registered tool to the blackboard: declared parameters are pulled
//! from the caller's namespace by name, the tool runs, and its output is
//! written back under a declared key in the same namespace.
//!
//! A required parameter that cannot be resolved fails the invocation with
//! [`AppError::MissingInput`]; nothing is substituted. Blackboard keys are read
//! from the unit namespace only. Request parameters are read from the global
//! namespace, and only where an invocation declares one. Invocations never retry.

use crate::blackboard::{NamespaceHandle, StateRead};
use crate::tools::registry::ToolRegistry;
use crate::types::{AppError, Result};
use serde_json::{Map, Value};
use std::time::Instant;

/// Where one tool argument comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamSource {
    /// A unit blackboard key, optionally a dotted path into it
    Key(String),
    /// A request parameter, with the value used when the request omits it
    Request { key: String, default: Value },
    /// A fixed value known when the invocation is built
    Literal(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    pub source: ParamSource,
}

/// One named tool call wired to blackboard inputs and an output key.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    tool: String,
    params: Vec<ParamSpec>,
    output_key: String,
}

impl ToolInvocation {
    pub fn new(tool: impl Into<String>, output_key: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            params: Vec::new(),
            output_key: output_key.into(),
        }
    }

    /// Require a parameter read from the blackboard key of the same name.
    pub fn require(self, name: &str) -> Self {
        self.require_from(name, name)
    }

    /// Require a parameter read from `path` (a key or dotted path).
    pub fn require_from(mut self, name: &str, path: &str) -> Self {
        self.params.push(ParamSpec {
            name: name.to_string(),
            source: ParamSource::Key(path.to_string()),
        });
        self
    }

    /// Pass the request parameter `name`, or `default` when the request has none.
    pub fn request_param_or(mut self, name: &str, default: Value) -> Self {
        self.params.push(ParamSpec {
            name: name.to_string(),
            source: ParamSource::Request {
                key: name.to_string(),
                default,
            },
        });
        self
    }

    pub fn with_arg(mut self, name: &str, value: Value) -> Self {
        self.params.push(ParamSpec {
            name: name.to_string(),
            source: ParamSource::Literal(value),
        });
        self
    }

    pub fn tool(&self) -> &str {
        &self.tool
    }

    pub fn output_key(&self) -> &str {
        &self.output_key
    }

    /// Build the argument object from `reads`.
    pub fn resolve_args(&self, reads: &dyn StateRead) -> Result<Value> {
        let mut args = Map::new();
        for param in &self.params {
            let value = match &param.source {
                ParamSource::Literal(value) => Some(value.clone()),
                ParamSource::Key(path) => reads.resolve_path(path).filter(|v| !v.is_null()),
                ParamSource::Request { key, default } => Some(
                    reads
                        .resolve_global(key)
                        .filter(|v| !v.is_null())
                        .unwrap_or_else(|| default.clone()),
                ),
            };
            match value {
                Some(value) => {
                    args.insert(param.name.clone(), value);
                }
                None => {
                    return Err(AppError::MissingInput {
                        namespace: reads.namespace(),
                        parameter: param.name.clone(),
                    });
                }
            }
        }
        Ok(Value::Object(args))
    }

    /// Resolve inputs from `reads`, run the tool, and store its output in `writes`.
    pub async fn invoke(
        &self,
        registry: &ToolRegistry,
        reads: &dyn StateRead,
        writes: &NamespaceHandle,
    ) -> Result<Value> {
        let args = self.resolve_args(reads)?;
        let started = Instant::now();

        let output = registry
            .execute(&self.tool, args)
            .await
            .map_err(|e| match e {
                AppError::ToolError { .. } | AppError::ToolNotFound(_) => e,
                other => AppError::tool(&self.tool, other.to_string()),
            })?;

        if let Some(reason) = in_band_error(&output) {
            return Err(AppError::tool(&self.tool, reason));
        }

        tracing::debug!(
            unit = %writes.unit(),
            tool = %self.tool,
            key = %self.output_key,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Tool invocation completed"
        );
        writes.set(self.output_key.clone(), output.clone())?;
        Ok(output)
    }

    /// Sequential form: read from and write to the same namespace.
    pub async fn run(&self, registry: &ToolRegistry, namespace: &NamespaceHandle) -> Result<Value> {
        self.invoke(registry, namespace, namespace).await
    }
}

/// Backends may report failure in-band as `{"error": ...}` or `{"status": "error", ...}`.
fn in_band_error(output: &Value) -> Option<String> {
    let object = output.as_object()?;
    if let Some(error) = object.get("error") {
        return Some(match error {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        });
    }
    if object.get("status").and_then(Value::as_str) == Some("error") {
        return Some(
            object
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("backend reported an error")
                .to_string(),
        );
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blackboard::{Blackboard, UnitId};
    use crate::tools::registry::Tool;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Echo {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Returns its arguments"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object", "properties": {}})
        }
        async fn execute(&self, args: Value) -> Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!({ "echo": args }))
        }
    }

    struct Broken;

    #[async_trait]
    impl Tool for Broken {
        fn name(&self) -> &str {
            "broken"
        }
        fn description(&self) -> &str {
            "Always reports an in-band error"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object", "properties": {}})
        }
        async fn execute(&self, _args: Value) -> Result<Value> {
            Ok(json!({"status": "error", "message": "upstream unavailable"}))
        }
    }

    fn registry(calls: Arc<AtomicUsize>) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Echo { calls }));
        registry.register(Arc::new(Broken));
        registry
    }

    #[tokio::test]
    async fn test_inputs_resolved_and_output_written() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = registry(calls.clone());
        let board = Blackboard::new();
        let ns = board.allocate(&UnitId::new("TSX")).unwrap();
        ns.set("exchange_details", json!({"market_proxy": "XIU.TO"}))
            .unwrap();

        let invocation = ToolInvocation::new("echo", "adx_data")
            .require_from("market_proxy", "exchange_details.market_proxy")
            .with_arg("period", json!(14));

        let output = invocation.run(&registry, &ns).await.unwrap();

        assert_eq!(output["echo"]["market_proxy"], "XIU.TO");
        assert_eq!(output["echo"]["period"], 14);
        assert_eq!(ns.get("adx_data"), Some(output));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_required_input_never_calls_tool() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = registry(calls.clone());
        let board = Blackboard::new();
        let ns = board.allocate(&UnitId::new("NASDAQ")).unwrap();

        let invocation = ToolInvocation::new("echo", "out").require("exchange");
        let err = invocation.run(&registry, &ns).await.unwrap_err();

        match err {
            AppError::MissingInput {
                namespace,
                parameter,
            } => {
                assert_eq!(namespace, "NASDAQ");
                assert_eq!(parameter, "exchange");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!ns.contains("out"));
    }

    #[tokio::test]
    async fn test_in_band_error_is_tool_error() {
        let registry = registry(Arc::new(AtomicUsize::new(0)));
        let board = Blackboard::new();
        let ns = board.allocate(&UnitId::new("NASDAQ")).unwrap();

        let err = ToolInvocation::new("broken", "out")
            .run(&registry, &ns)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::ToolError { ref tool, .. } if tool == "broken"));
        assert!(!ns.contains("out"));
    }

    #[tokio::test]
    async fn test_request_parameter_read_only_when_declared() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = registry(calls.clone());
        let board = Blackboard::new();
        board.set_global("min_gap_percent", json!(4.0)).unwrap();
        board.seal();
        let ns = board.allocate(&UnitId::new("NASDAQ")).unwrap();

        let output = ToolInvocation::new("echo", "out")
            .request_param_or("min_gap_percent", json!(1.0))
            .request_param_or("min_volume", json!(100_000))
            .run(&registry, &ns)
            .await
            .unwrap();
        assert_eq!(output["echo"]["min_gap_percent"], 4.0);
        assert_eq!(output["echo"]["min_volume"], 100_000);

        let err = ToolInvocation::new("echo", "out")
            .require("min_gap_percent")
            .run(&registry, &ns)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::MissingInput { ref parameter, .. } if parameter == "min_gap_percent"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

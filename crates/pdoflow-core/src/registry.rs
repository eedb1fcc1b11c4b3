use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;

use crate::error::PdoflowError;

/// A registered job function: takes the deserialized positional
/// argument array and optional keyword-argument object, returns the
/// function's result (discarded by the dispatcher, per `spec.md` §8
/// scenario 1) or a [`PdoflowError::JobExecution`].
pub type JobFn = Arc<dyn Fn(&Value, Option<&Value>) -> Result<Value, PdoflowError> + Send + Sync>;

/// Process-wide registry mapping `entry_point` strings to callables.
///
/// `spec.md` §9 notes that a statically-linked target language's natural
/// substitute for the original's dotted-import-path resolution is a
/// process-wide registry of function pointers compiled into the worker
/// binary; this is that registry. Both the submission helper (refusing
/// postings whose entry point is unregistered, if it happens to run in
/// the same process as the workers) and the execution loop consult it.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    inner: Arc<RwLock<HashMap<String, JobFn>>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` as the entry point resolving to `func`. A later
    /// registration under the same name overwrites the earlier one —
    /// callers that want strict "already defined" semantics like the
    /// original's `JobRegistry.add_job` should check
    /// [`FunctionRegistry::contains`] first.
    pub fn register(&self, name: impl Into<String>, func: JobFn) {
        self.inner
            .write()
            .expect("function registry lock poisoned")
            .insert(name.into(), func);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner
            .read()
            .expect("function registry lock poisoned")
            .contains_key(name)
    }

    /// Resolve `entry_point` to a callable, invoking it immediately
    /// with the supplied arguments. A missing entry point and a
    /// failure inside the callable are both surfaced the same way the
    /// execution loop treats them: as a user-code failure
    /// (`spec.md` §4.2 step 3 / §7 "Missing entry-point").
    pub fn resolve_and_invoke(
        &self,
        entry_point: &str,
        positional_arguments: &Value,
        keyword_arguments: Option<&Value>,
    ) -> Result<Value, PdoflowError> {
        let func = {
            let guard = self.inner.read().expect("function registry lock poisoned");
            guard.get(entry_point).cloned()
        };

        match func {
            Some(func) => func(positional_arguments, keyword_arguments),
            None => Err(PdoflowError::UnknownEntryPoint(entry_point.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn double(args: &Value, _kwargs: Option<&Value>) -> Result<Value, PdoflowError> {
        let n = args[0].as_f64().unwrap_or(0.0);
        Ok(json!(n * 2.0))
    }

    #[test]
    fn resolves_and_invokes_registered_function() {
        let registry = FunctionRegistry::new();
        registry.register("double", Arc::new(double));

        let result = registry
            .resolve_and_invoke("double", &json!([21.0]), None)
            .unwrap();
        assert_eq!(result, json!(42.0));
    }

    #[test]
    fn unknown_entry_point_is_reported() {
        let registry = FunctionRegistry::new();
        let err = registry
            .resolve_and_invoke("missing.fn", &json!([]), None)
            .unwrap_err();
        assert!(matches!(err, PdoflowError::UnknownEntryPoint(name) if name == "missing.fn"));
    }

    #[test]
    fn later_registration_overwrites_earlier() {
        let registry = FunctionRegistry::new();
        registry.register("f", Arc::new(|_, _| Ok(json!(1))));
        registry.register("f", Arc::new(|_, _| Ok(json!(2))));
        assert_eq!(
            registry.resolve_and_invoke("f", &json!([]), None).unwrap(),
            json!(2)
        );
    }
}

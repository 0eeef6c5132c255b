//! Function registry: modules expose schedulable functions the same way
//! they expose database tables (`bootstrap::DatabaseModelRegistrator`) or
//! settings schemas (`settings::SettingsSchemaRegistrator`) — a static
//! `inventory` declaration collected once at startup.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

pub type HandlerResult = Result<Value, String>;
pub type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;
pub type HandlerFn = fn(Value) -> HandlerFuture;

#[derive(Clone, Copy)]
pub struct FunctionDecl {
    pub module_id: &'static str,
    pub function_name: &'static str,
    pub handler: HandlerFn,
}

pub struct FunctionRegistrator(pub FunctionDecl);
inventory::collect!(FunctionRegistrator);

/// Look up a registered handler by `(module_id, function_name)`.
pub fn find(module_id: &str, function_name: &str) -> Option<HandlerFn> {
    inventory::iter::<FunctionRegistrator>
        .into_iter()
        .find(|r| r.0.module_id == module_id && r.0.function_name == function_name)
        .map(|r| r.0.handler)
}

pub fn exists(module_id: &str, function_name: &str) -> bool {
    find(module_id, function_name).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_params: Value) -> HandlerFuture {
        Box::pin(async move { Ok(Value::Null) })
    }

    inventory::submit! {
        FunctionRegistrator(FunctionDecl {
            module_id: "scheduler_tests",
            function_name: "noop",
            handler: noop,
        })
    }

    #[test]
    fn finds_registered_function() {
        assert!(exists("scheduler_tests", "noop"));
        assert!(!exists("scheduler_tests", "missing"));
    }
}

use std::collections::HashMap;

use serde_json::Value;

use super::{Tool, ToolError, ToolResult};

/// Name-to-tool dispatch table owned by one relay session
///
/// Built once before the session starts and never mutated afterwards. Schemas are
/// listed in registration order so the model sees a stable tool list.
#[derive(Debug, Clone, Default)]
pub struct ToolTable {
    tools: Vec<Tool>,
    index: HashMap<String, usize>,
}

impl ToolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any earlier tool with the same name
    pub fn with_tool(mut self, tool: Tool) -> Self {
        match self.index.get(tool.name()) {
            Some(&slot) => self.tools[slot] = tool,
            None => {
                self.index.insert(tool.name().to_string(), self.tools.len());
                self.tools.push(tool);
            }
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.index.get(name).map(|&slot| &self.tools[slot])
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(Tool::name).collect()
    }

    /// Schemas advertised to the model in `session.update`
    pub fn schemas(&self) -> Vec<Value> {
        self.tools.iter().map(|t| t.schema().clone()).collect()
    }

    /// Invoke a tool by name
    pub async fn dispatch(&self, name: &str, args: Value) -> Result<ToolResult, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        tool.invoke(args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tools::ToolTarget;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;

    struct Echo;

    #[async_trait]
    impl ToolTarget for Echo {
        async fn invoke(&self, args: Value) -> Result<ToolResult, ToolError> {
            Ok(ToolResult::to_server(args))
        }
    }

    fn schema(name: &str) -> Value {
        json!({"type": "function", "name": name, "parameters": {"type": "object"}})
    }

    #[tokio::test]
    async fn test_dispatch_by_name() {
        let table = ToolTable::new().with_tool(Tool::new(schema("echo"), Arc::new(Echo)));

        let result = table.dispatch("echo", json!({"x": 1})).await.unwrap();
        assert_eq!(result.payload(), &json!({"x": 1}));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_an_error() {
        let table = ToolTable::new();
        let err = table.dispatch("missing", json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::UnknownTool(name) if name == "missing"));
    }

    #[test]
    fn test_schemas_keep_registration_order_and_replace_duplicates() {
        let table = ToolTable::new()
            .with_tool(Tool::new(schema("b"), Arc::new(Echo)))
            .with_tool(Tool::new(schema("a"), Arc::new(Echo)))
            .with_tool(Tool::new(schema("b"), Arc::new(Echo)));

        assert_eq!(table.len(), 2);
        assert_eq!(table.names(), vec!["b", "a"]);
        assert_eq!(table.schemas()[1]["name"], "a");
    }
}

pub mod bash;
pub mod edit;
pub mod find;
pub mod grep;
pub mod ls;
pub mod read;
pub mod write;

use std::sync::Arc;

use crate::registry::ToolRegistry;

/// Create a ToolRegistry with all built-in tools.
pub fn create_default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    // File operations
    registry.register(Arc::new(read::ReadTool));
    registry.register(Arc::new(write::WriteTool));
    registry.register(Arc::new(edit::EditTool));

    // Search
    registry.register(Arc::new(grep::GrepTool));
    registry.register(Arc::new(find::FindTool));
    registry.register(Arc::new(ls::LsTool));

    // Shell
    registry.register(Arc::new(bash::BashTool::new()));

    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_has_all_builtins() {
        let registry = create_default_registry();
        assert_eq!(
            registry.names(),
            vec!["bash", "edit", "find", "grep", "ls", "read", "write"]
        );
    }
}

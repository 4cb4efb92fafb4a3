//! Action handlers available to workflows run from the command line

use chatflow::workflow::{ActionHandlerRegistry, VariableUpdates};
use colored::*;

/// Builtin handlers plus `SendMessage`, which prints `text` and records it
/// as `lastMessage`
pub fn cli_registry() -> ActionHandlerRegistry {
    let registry = ActionHandlerRegistry::with_builtin_handlers();
    registry.register_fn("SendMessage", |_context, params, _cancel| async move {
        let text = params.get("text").cloned().unwrap_or_default();
        println!("{} {}", "»".cyan(), text);

        let mut updates = VariableUpdates::new();
        updates.insert("lastMessage".to_string(), text);
        Ok(Some(updates))
    });
    registry
}

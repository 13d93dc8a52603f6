//! Keyboard shortcut registry.

use crate::input::{Key, KeyEvent};
use crate::tools::ToolKind;

/// What a shortcut does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortcutAction {
    Copy,
    Paste,
    Duplicate,
    Delete,
    /// End the current gesture.
    Cancel,
    Tool(ToolKind),
}

/// A keyboard shortcut definition.
#[derive(Debug, Clone)]
pub struct Shortcut {
    pub key: Key,
    pub command: bool,
    pub action: ShortcutAction,
    pub description: &'static str,
}

impl Shortcut {
    pub const fn new(key: Key, command: bool, action: ShortcutAction, description: &'static str) -> Self {
        Self { key, command, action, description }
    }

    /// Format the shortcut for display (e.g., "Ctrl+C").
    pub fn format(&self) -> String {
        let key = match self.key {
            Key::Delete => "Delete".to_string(),
            Key::Backspace => "Backspace".to_string(),
            Key::Escape => "Escape".to_string(),
            Key::Enter => "Enter".to_string(),
            Key::Char(c) => c.to_ascii_uppercase().to_string(),
        };
        if self.command { format!("Ctrl+{key}") } else { key }
    }

    fn matches(&self, event: &KeyEvent) -> bool {
        self.key == event.key && self.command == event.modifiers.command()
    }
}

/// Registry of all keyboard shortcuts.
pub struct ShortcutRegistry;

impl ShortcutRegistry {
    /// Get all registered shortcuts.
    pub fn all() -> Vec<Shortcut> {
        let mut shortcuts = vec![
            Shortcut::new(Key::Char('c'), true, ShortcutAction::Copy, "Copy selection"),
            Shortcut::new(Key::Char('v'), true, ShortcutAction::Paste, "Paste"),
            Shortcut::new(Key::Char('d'), true, ShortcutAction::Duplicate, "Duplicate selection"),
            Shortcut::new(Key::Delete, false, ShortcutAction::Delete, "Delete selection"),
            Shortcut::new(Key::Backspace, false, ShortcutAction::Delete, "Delete selection"),
            Shortcut::new(Key::Escape, false, ShortcutAction::Cancel, "Cancel current action"),
        ];
        for tool in ToolKind::ALL {
            shortcuts.push(Shortcut::new(Key::Char(tool.shortcut()), false, ShortcutAction::Tool(tool), "Select tool"));
        }
        shortcuts
    }

    /// Find the action bound to a key press.
    pub fn resolve(event: &KeyEvent) -> Option<ShortcutAction> {
        Self::all().into_iter().find(|s| s.matches(event)).map(|s| s.action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::Modifiers;

    #[test]
    fn test_resolve_command_shortcuts() {
        let copy = KeyEvent::new(Key::Char('c'), Modifiers::ctrl());
        assert_eq!(ShortcutRegistry::resolve(&copy), Some(ShortcutAction::Copy));

        let meta = Modifiers { meta: true, ..Modifiers::default() };
        let paste = KeyEvent::new(Key::Char('v'), meta);
        assert_eq!(ShortcutRegistry::resolve(&paste), Some(ShortcutAction::Paste));

        // Plain 'c' is not copy
        assert_eq!(ShortcutRegistry::resolve(&KeyEvent::plain(Key::Char('c'))), None);
    }

    #[test]
    fn test_resolve_tool_digits() {
        assert_eq!(
            ShortcutRegistry::resolve(&KeyEvent::plain(Key::Char('2'))),
            Some(ShortcutAction::Tool(ToolKind::Rectangle))
        );
        // Ctrl+digit is left to the host
        assert_eq!(ShortcutRegistry::resolve(&KeyEvent::new(Key::Char('2'), Modifiers::ctrl())), None);
    }

    #[test]
    fn test_delete_keys() {
        assert_eq!(ShortcutRegistry::resolve(&KeyEvent::plain(Key::Delete)), Some(ShortcutAction::Delete));
        assert_eq!(ShortcutRegistry::resolve(&KeyEvent::plain(Key::Backspace)), Some(ShortcutAction::Delete));
    }

    #[test]
    fn test_format() {
        let all = ShortcutRegistry::all();
        assert_eq!(all[0].format(), "Ctrl+C");
        assert!(all.iter().any(|s| s.format() == "Escape"));
    }
}

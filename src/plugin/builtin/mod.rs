//! Built-in Code Actions
//!
//! Actions compiled into the process register themselves with the
//! `code_action!` macro and are collected at link time.

pub mod browser;

use crate::plugin::error::RegistryResult;
use crate::plugin::traits::{ActionAttribute, CodeActionProvider};

/// Static registration of one code action
pub struct CodeActionEntry {
    pub name: &'static str,
    pub description: &'static str,
    pub aliases: &'static [&'static str],
}

impl CodeActionEntry {
    pub fn to_attribute(&self) -> ActionAttribute {
        ActionAttribute::new(self.name, self.description)
            .with_aliases(self.aliases.iter().map(|alias| alias.to_string()).collect())
    }
}

inventory::collect!(CodeActionEntry);

/// Register a code action
#[macro_export]
macro_rules! code_action {
    ($name:expr, $description:expr) => {
        $crate::code_action!($name, $description, aliases = []);
    };
    ($name:expr, $description:expr, aliases = [$($alias:expr),* $(,)?]) => {
        inventory::submit!($crate::plugin::builtin::CodeActionEntry {
            name: $name,
            description: $description,
            aliases: &[$($alias),*],
        });
    };
}

/// Every registered code action, ordered by name
pub fn registered_actions() -> Vec<ActionAttribute> {
    let mut actions: Vec<ActionAttribute> = inventory::iter::<CodeActionEntry>
        .into_iter()
        .map(CodeActionEntry::to_attribute)
        .collect();
    actions.sort_by(|a, b| a.name.cmp(&b.name));
    actions
}

/// Provider over the link-time registrations
#[derive(Debug, Default, Clone, Copy)]
pub struct InventoryActionProvider;

impl CodeActionProvider for InventoryActionProvider {
    fn list_actions(&self) -> RegistryResult<Vec<ActionAttribute>> {
        Ok(registered_actions())
    }
}

/// Provider over a fixed list
#[derive(Debug, Default, Clone)]
pub struct StaticActionProvider {
    actions: Vec<ActionAttribute>,
}

impl StaticActionProvider {
    pub fn new(actions: Vec<ActionAttribute>) -> Self {
        Self { actions }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

impl CodeActionProvider for StaticActionProvider {
    fn list_actions(&self) -> RegistryResult<Vec<ActionAttribute>> {
        Ok(self.actions.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_actions_are_registered() {
        let actions = InventoryActionProvider.list_actions().unwrap();
        let names: Vec<&str> = actions.iter().map(|a| a.name.as_str()).collect();
        for expected in ["OpenBrowser", "CloseBrowser", "Click", "SendKeys", "GoToUrl", "Wait"] {
            assert!(names.contains(&expected), "missing {}", expected);
        }
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[test]
    fn test_aliases_are_carried() {
        let actions = registered_actions();
        let go_to = actions.iter().find(|a| a.name == "GoToUrl").unwrap();
        assert!(go_to.aliases.contains(&"Navigate".to_string()));
    }

    #[test]
    fn test_static_provider() {
        let provider = StaticActionProvider::new(vec![ActionAttribute::new("Click", "")]);
        assert_eq!(provider.list_actions().unwrap().len(), 1);
        assert!(StaticActionProvider::empty().list_actions().unwrap().is_empty());
    }
}

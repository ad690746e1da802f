use std::cell::Cell;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Look for similarly named records whenever a new record is instantiated.
    pub upon_create_search_names: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            upon_create_search_names: true,
        }
    }
}

/// Settings owned by a registry. Overrides are scoped: the returned guard puts the
/// previous value back when dropped, including during unwinding or early returns.
#[derive(Debug, Default)]
pub struct SettingsCell {
    current: Cell<Settings>,
}

impl SettingsCell {
    pub fn new(settings: Settings) -> Self {
        Self {
            current: Cell::new(settings),
        }
    }

    pub fn get(&self) -> Settings {
        self.current.get()
    }

    pub fn set(&self, settings: Settings) {
        self.current.set(settings);
    }

    #[must_use = "the override ends when the guard is dropped"]
    pub fn override_search_names(&self, value: bool) -> SettingsGuard<'_> {
        let previous = self.current.get();
        self.current.set(Settings {
            upon_create_search_names: value,
        });
        SettingsGuard {
            cell: self,
            previous,
        }
    }
}

pub struct SettingsGuard<'a> {
    cell: &'a SettingsCell,
    previous: Settings,
}

impl Drop for SettingsGuard<'_> {
    fn drop(&mut self) {
        self.cell.current.set(self.previous);
    }
}

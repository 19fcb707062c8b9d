//! Variable store.
//!
//! Variables behave like shell variables.
//! A read falls through to the environment of the kft process when the variable has
//!     not been assigned, and assignments are only visible to subprocesses when the
//!     variable is exported.
//! Variables inherited from the environment count as exported.
//!
//! The process environment itself is never modified.
//! Instead, each spawned subprocess receives the changes returned by [Variables::child_env].

use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Variable {
    /// [None] means the variable has been unset, hiding any inherited value.
    value: Option<String>,
    exported: bool,
}

/// The variable store of one kft run.
#[derive(Debug, Default)]
pub struct Variables {
    shadow: BTreeMap<String, Variable>,
    export_all: bool,
}

impl Variables {
    pub fn new() -> Variables {
        Default::default()
    }

    /// When set, every subsequent assignment exports the variable.
    pub fn set_export_all(&mut self, export_all: bool) {
        self.export_all = export_all;
    }

    /// Get the value of a variable.
    pub fn get(&self, name: &str) -> Option<String> {
        match self.shadow.get(name) {
            Some(variable) => variable.value.clone(),
            None => inherited(name),
        }
    }

    pub fn set<N: Into<String>, V: Into<String>>(&mut self, name: N, value: V) {
        let export_all = self.export_all;
        let variable = self.shadow.entry(name.into()).or_default();
        variable.value = Some(value.into());
        variable.exported |= export_all;
    }

    /// Unset a variable.
    ///
    /// The inherited value of the variable, if any, is hidden too.
    pub fn unset(&mut self, name: &str) {
        self.shadow.entry(name.into()).or_default().value = None;
    }

    /// Mark a variable as exported.
    pub fn export(&mut self, name: &str) {
        self.shadow.entry(name.into()).or_default().exported = true;
    }

    pub fn is_exported(&self, name: &str) -> bool {
        let exported = self.shadow.get(name).map(|v| v.exported).unwrap_or(false);
        exported || inherited(name).is_some()
    }

    /// Changes to apply to the environment of a subprocess.
    ///
    /// Each entry is either a variable to set or, when the value is [None], a variable
    ///     to remove.
    /// Subprocesses inherit the kft process environment, so only variables with a shadow
    ///     entry appear here.
    pub fn child_env(&self) -> Vec<(&str, Option<&str>)> {
        self.shadow
            .iter()
            .filter(|(name, variable)| variable.exported || inherited(name).is_some())
            .map(|(name, variable)| (name.as_str(), variable.value.as_deref()))
            .collect()
    }
}

fn inherited(name: &str) -> Option<String> {
    if name.is_empty() || name.contains('=') || name.contains('\0') {
        return None;
    }
    std::env::var_os(name).map(|value| value.to_string_lossy().into_owned())
}

//! Confirmation outcomes and the session's auto-approval memory.

use std::collections::BTreeSet;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// The user's answer to a confirmation prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConfirmationOutcome {
    ProceedOnce,
    /// Proceed, and auto-approve this risk class for the rest of the session.
    ProceedAlways,
    Cancel,
}

impl ConfirmationOutcome {
    pub fn allows_execution(self) -> bool {
        matches!(self, Self::ProceedOnce | Self::ProceedAlways)
    }
}

/// Risk classes the user approved with "proceed always".
#[derive(Debug, Clone, Default)]
pub struct ApprovalMemory {
    classes: Arc<RwLock<BTreeSet<String>>>,
}

impl ApprovalMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remember(&self, class: impl Into<String>) {
        let class = class.into();
        tracing::debug!(class = %class, "Auto-approving risk class");
        self.classes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(class);
    }

    pub fn is_auto_approved(&self, class: &str) -> bool {
        self.classes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(class)
    }

    pub fn classes(&self) -> Vec<String> {
        self.classes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.classes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

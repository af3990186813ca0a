//! Operation classification and routing.

use std::collections::HashMap;
use std::fmt;

use parking_lot::RwLock;
use serde::Serialize;

use crate::error::SessionError;

/// Serialization rule that wraps an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    /// Runs through the session's FIFO queue, one at a time.
    PrimarySurface,
    /// Runs under the lock of one conversation.
    SubSurface,
    /// No extra serialization; may not touch the driver directly.
    Utility,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::PrimarySurface => write!(f, "primary-surface"),
            OperationKind::SubSurface => write!(f, "sub-surface"),
            OperationKind::Utility => write!(f, "utility"),
        }
    }
}

/// Static declaration of an operation and its kind.
///
/// ```
/// use chatpilot_core::OperationDescriptor;
///
/// const SEND_TEXT: OperationDescriptor = OperationDescriptor::primary("send_text");
/// const READ_REPLY: OperationDescriptor = OperationDescriptor::sub_surface("read_reply");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationDescriptor {
    pub name: &'static str,
    pub kind: OperationKind,
}

impl OperationDescriptor {
    pub const fn new(name: &'static str, kind: OperationKind) -> Self {
        Self { name, kind }
    }

    pub const fn primary(name: &'static str) -> Self {
        Self::new(name, OperationKind::PrimarySurface)
    }

    pub const fn sub_surface(name: &'static str) -> Self {
        Self::new(name, OperationKind::SubSurface)
    }

    pub const fn utility(name: &'static str) -> Self {
        Self::new(name, OperationKind::Utility)
    }

    /// Resolve where a call with the given sub-surface id must run.
    pub fn route<'a>(&self, sub_id: Option<&'a str>) -> Result<Route<'a>, SessionError> {
        match (self.kind, sub_id) {
            (OperationKind::PrimarySurface, None) => Ok(Route::Primary),
            (OperationKind::Utility, None) => Ok(Route::Utility),
            (OperationKind::SubSurface, Some(id)) if !id.is_empty() => Ok(Route::SubSurface(id)),
            (OperationKind::SubSurface, _) => Err(self.invalid("a non-empty sub-surface id is required")),
            (_, Some(_)) => Err(self.invalid("only sub-surface operations take a sub-surface id")),
        }
    }

    fn invalid(&self, reason: &str) -> SessionError {
        SessionError::InvalidRoute {
            operation: self.name.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Resolved target of a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<'a> {
    Primary,
    SubSurface(&'a str),
    Utility,
}

/// First-seen kind of every operation name dispatched on a session.
#[derive(Default)]
pub struct OperationCatalog {
    kinds: RwLock<HashMap<&'static str, OperationKind>>,
}

impl OperationCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `descriptor`, failing if its name was seen with another kind.
    pub fn check(&self, descriptor: &OperationDescriptor) -> Result<(), SessionError> {
        if let Some(kind) = self.kinds.read().get(descriptor.name) {
            return Self::compare(descriptor, *kind);
        }
        let mut kinds = self.kinds.write();
        let kind = *kinds.entry(descriptor.name).or_insert(descriptor.kind);
        Self::compare(descriptor, kind)
    }

    fn compare(descriptor: &OperationDescriptor, registered: OperationKind) -> Result<(), SessionError> {
        if registered == descriptor.kind {
            Ok(())
        } else {
            Err(SessionError::ClassificationConflict {
                operation: descriptor.name.to_string(),
                registered: registered.to_string(),
                requested: descriptor.kind.to_string(),
            })
        }
    }

    pub fn kind_of(&self, name: &str) -> Option<OperationKind> {
        self.kinds.read().get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.kinds.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

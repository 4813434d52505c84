//! Per-role input listener bookkeeping.

use tracing::debug;

use crate::dom::{FieldHandle, InputListener};
use crate::error::Result;
use crate::locator::FieldRole;

/// Remembers which field instance each role's listener is bound to.
///
/// Keyed by node identity: a replacement node for the same role is a new
/// instance and gets its own listener.
#[derive(Debug)]
pub struct AttachmentTracker<F> {
    username: Option<F>,
    password: Option<F>,
}

impl<F> Default for AttachmentTracker<F> {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
        }
    }
}

impl<F: FieldHandle> AttachmentTracker<F> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `on_input` to `field` unless this exact instance already has
    /// a listener. Returns whether a listener was attached.
    ///
    /// The listener is built lazily so nothing is allocated for fields that
    /// are already bound.
    pub fn ensure_attached(
        &mut self,
        role: FieldRole,
        field: &F,
        on_input: impl FnOnce() -> InputListener,
    ) -> Result<bool> {
        let slot = self.slot(role);
        if slot.as_ref().is_some_and(|bound| bound.is_same_node(field)) {
            return Ok(false);
        }

        field.add_input_listener(on_input())?;
        debug!(%role, replaced = slot.is_some(), "Attached input listener");
        *slot = Some(field.clone());
        Ok(true)
    }

    pub fn is_attached(&self, role: FieldRole, field: &F) -> bool {
        let bound = match role {
            FieldRole::Username => &self.username,
            FieldRole::Password => &self.password,
        };
        bound.as_ref().is_some_and(|bound| bound.is_same_node(field))
    }

    fn slot(&mut self, role: FieldRole) -> &mut Option<F> {
        match role {
            FieldRole::Username => &mut self.username,
            FieldRole::Password => &mut self.password,
        }
    }
}

//! Seams between the page agent and the host page.
//!
//! The browser implementations live in `web`; tests use in-memory fakes.

use crate::error::Result;

/// Called with the field's current value on every `input` event
pub type InputListener = Box<dyn Fn(String)>;

/// A live reference to a login input element.
///
/// Handles are only valid until the page removes or replaces the element.
/// Two handles are the same field instance only if `is_same_node` holds.
pub trait FieldHandle: Clone + 'static {
    /// Node identity, not structural equality
    fn is_same_node(&self, other: &Self) -> bool;

    fn set_value(&self, value: &str) -> Result<()>;

    /// Register a listener for the lifetime of the element
    fn add_input_listener(&self, listener: InputListener) -> Result<()>;
}

/// The document the agent runs in.
pub trait Page: 'static {
    type Field: FieldHandle;

    /// Full URL of the current page
    fn location(&self) -> Result<String>;

    /// First input matching `selector` in document order
    fn query_field(&self, selector: &str) -> Result<Option<Self::Field>>;
}

/// Structural mutations of the page body (child list and subtree only).
pub trait MutationSource {
    fn observe(&self, on_mutation: Box<dyn Fn()>) -> Result<()>;

    /// Stop delivering mutations. Safe to call more than once.
    fn disconnect(&self);
}

/// Page-level form submission, regardless of which form was submitted.
pub trait SubmitSource {
    fn on_submit(&self, handler: Box<dyn Fn()>) -> Result<()>;
}

//! In-memory page, observer and transport doubles for native tests.

use latch_messages::{PortRequest, PortRequestPayload, PortResponse};
use latch_vault::{CredentialService, InMemoryStore};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use crate::channel::Transport;
use crate::dom::{FieldHandle, InputListener, MutationSource, Page, SubmitSource};
use crate::error::{AgentError, Result};

// ============================================================================
// Page
// ============================================================================

struct FieldNode {
    attrs: Vec<(String, String)>,
    value: RefCell<String>,
    listeners: RefCell<Vec<Rc<dyn Fn(String)>>>,
    fail_listeners: Cell<bool>,
}

/// An `<input>` element with node identity.
#[derive(Clone)]
pub struct FakeField(Rc<FieldNode>);

impl FakeField {
    fn new(attrs: &[(&str, &str)]) -> Self {
        FakeField(Rc::new(FieldNode {
            attrs: attrs
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
            value: RefCell::new(String::new()),
            listeners: RefCell::new(Vec::new()),
            fail_listeners: Cell::new(false),
        }))
    }

    pub fn is_same(&self, other: &FakeField) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn value(&self) -> String {
        self.0.value.borrow().clone()
    }

    /// Set the value as a user would and fire `input`
    pub fn type_text(&self, value: &str) {
        *self.0.value.borrow_mut() = value.to_string();
        let listeners: Vec<_> = self.0.listeners.borrow().clone();
        for listener in listeners {
            listener(value.to_string());
        }
    }

    pub fn listener_count(&self) -> usize {
        self.0.listeners.borrow().len()
    }

    pub fn fail_listeners(&self, fail: bool) {
        self.0.fail_listeners.set(fail);
    }

    fn matches(&self, clauses: &[(String, String)]) -> bool {
        clauses.iter().any(|clause| self.0.attrs.contains(clause))
    }
}

impl FieldHandle for FakeField {
    fn is_same_node(&self, other: &Self) -> bool {
        self.is_same(other)
    }

    fn set_value(&self, value: &str) -> Result<()> {
        *self.0.value.borrow_mut() = value.to_string();
        Ok(())
    }

    fn add_input_listener(&self, listener: InputListener) -> Result<()> {
        if self.0.fail_listeners.get() {
            return Err(AgentError::Dom("addEventListener failed".to_string()));
        }
        self.0.listeners.borrow_mut().push(Rc::from(listener));
        Ok(())
    }
}

struct PageState {
    url: String,
    inputs: Vec<FakeField>,
    fail_queries: bool,
    fail_location: bool,
}

/// A document holding a flat list of inputs in document order.
///
/// Understands selector unions of the form `input[attr="value"], ...`.
#[derive(Clone)]
pub struct FakePage(Rc<RefCell<PageState>>);

impl FakePage {
    pub fn new(url: &str) -> Self {
        FakePage(Rc::new(RefCell::new(PageState {
            url: url.to_string(),
            inputs: Vec::new(),
            fail_queries: false,
            fail_location: false,
        })))
    }

    pub fn insert_input(&self, attrs: &[(&str, &str)]) -> FakeField {
        let field = FakeField::new(attrs);
        self.0.borrow_mut().inputs.push(field.clone());
        field
    }

    /// Swap `old` for a new node at the same position
    pub fn replace_input(&self, old: &FakeField, attrs: &[(&str, &str)]) -> FakeField {
        let field = FakeField::new(attrs);
        let mut state = self.0.borrow_mut();
        match state.inputs.iter().position(|input| input.is_same(old)) {
            Some(index) => state.inputs[index] = field.clone(),
            None => state.inputs.push(field.clone()),
        }
        field
    }

    pub fn fail_queries(&self, fail: bool) {
        self.0.borrow_mut().fail_queries = fail;
    }

    pub fn fail_location(&self, fail: bool) {
        self.0.borrow_mut().fail_location = fail;
    }
}

impl Page for FakePage {
    type Field = FakeField;

    fn location(&self) -> Result<String> {
        let state = self.0.borrow();
        if state.fail_location {
            return Err(AgentError::Dom("location unavailable".to_string()));
        }
        Ok(state.url.clone())
    }

    fn query_field(&self, selector: &str) -> Result<Option<FakeField>> {
        let state = self.0.borrow();
        if state.fail_queries {
            return Err(AgentError::Dom("querySelector failed".to_string()));
        }

        let clauses = parse_selector(selector)?;
        Ok(state
            .inputs
            .iter()
            .find(|input| input.matches(&clauses))
            .cloned())
    }
}

fn parse_selector(selector: &str) -> Result<Vec<(String, String)>> {
    selector
        .split(',')
        .map(|clause| {
            let inner = clause
                .trim()
                .strip_prefix("input[")
                .and_then(|rest| rest.strip_suffix(']'))
                .ok_or_else(|| AgentError::Dom(format!("unsupported selector: {clause}")))?;
            let (name, value) = inner
                .split_once('=')
                .ok_or_else(|| AgentError::Dom(format!("unsupported selector: {clause}")))?;
            Ok((name.to_string(), value.trim_matches('"').to_string()))
        })
        .collect()
}

// ============================================================================
// Observer Sources
// ============================================================================

struct MutationState {
    callback: RefCell<Option<Rc<dyn Fn()>>>,
    connected: Cell<bool>,
    failing: bool,
    disconnects: Cell<usize>,
}

#[derive(Clone)]
pub struct FakeMutations(Rc<MutationState>);

impl FakeMutations {
    pub fn new() -> Self {
        Self::with_failure(false)
    }

    /// A source whose `observe` always fails
    pub fn failing() -> Self {
        Self::with_failure(true)
    }

    fn with_failure(failing: bool) -> Self {
        FakeMutations(Rc::new(MutationState {
            callback: RefCell::new(None),
            connected: Cell::new(false),
            failing,
            disconnects: Cell::new(0),
        }))
    }

    /// Deliver one batch of child-list mutations
    pub fn mutate(&self) {
        if !self.0.connected.get() {
            return;
        }
        let callback = self.0.callback.borrow().clone();
        if let Some(callback) = callback {
            callback();
        }
    }

    pub fn is_connected(&self) -> bool {
        self.0.connected.get()
    }

    pub fn disconnect_count(&self) -> usize {
        self.0.disconnects.get()
    }
}

impl MutationSource for FakeMutations {
    fn observe(&self, on_mutation: Box<dyn Fn()>) -> Result<()> {
        if self.0.failing {
            return Err(AgentError::ObserverUnavailable("document has no body".to_string()));
        }
        *self.0.callback.borrow_mut() = Some(Rc::from(on_mutation));
        self.0.connected.set(true);
        Ok(())
    }

    fn disconnect(&self) {
        self.0.connected.set(false);
        self.0.disconnects.set(self.0.disconnects.get() + 1);
    }
}

#[derive(Clone, Default)]
pub struct FakeSubmits {
    handlers: Rc<RefCell<Vec<Rc<dyn Fn()>>>>,
    failing: bool,
}

impl FakeSubmits {
    pub fn new() -> Self {
        Self::default()
    }

    /// A source that refuses to register submit handlers
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    /// Submit any form on the page
    pub fn submit(&self) {
        let handlers: Vec<_> = self.handlers.borrow().clone();
        for handler in handlers {
            handler();
        }
    }
}

impl SubmitSource for FakeSubmits {
    fn on_submit(&self, handler: Box<dyn Fn()>) -> Result<()> {
        if self.failing {
            return Err(AgentError::Dom("addEventListener failed".to_string()));
        }
        self.handlers.borrow_mut().push(Rc::from(handler));
        Ok(())
    }
}

// ============================================================================
// Transports
// ============================================================================

/// Records every posted envelope.
pub struct RecordingTransport {
    sent: RefCell<Vec<PortRequest>>,
    connected: Cell<bool>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            sent: RefCell::new(Vec::new()),
            connected: Cell::new(true),
        }
    }

    pub fn sent(&self) -> Vec<PortRequestPayload> {
        self.sent
            .borrow()
            .iter()
            .map(|request| request.payload.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.sent.borrow_mut().clear();
    }

    pub fn disconnect(&self) {
        self.connected.set(false);
    }

    pub fn reconnect(&self) {
        self.connected.set(true);
    }
}

impl Transport for RecordingTransport {
    fn post(&self, request: &PortRequest) -> Result<()> {
        if !self.connected.get() {
            return Err(AgentError::ChannelDisconnected);
        }
        self.sent.borrow_mut().push(request.clone());
        Ok(())
    }
}

/// Hands requests to an in-process `CredentialService` and queues the
/// responses until `take_responses` hands them over for delivery, like a
/// real port would.
#[derive(Clone)]
pub struct ServiceTransport {
    service: Rc<RefCell<CredentialService<InMemoryStore>>>,
    outbox: Rc<RefCell<VecDeque<PortResponse>>>,
}

impl ServiceTransport {
    pub fn new(service: Rc<RefCell<CredentialService<InMemoryStore>>>) -> Self {
        Self {
            service,
            outbox: Rc::new(RefCell::new(VecDeque::new())),
        }
    }

    /// Responses posted by the service and not yet delivered
    pub fn pending(&self) -> usize {
        self.outbox.borrow().len()
    }

    pub fn take_responses(&self) -> Vec<PortResponse> {
        self.outbox.borrow_mut().drain(..).collect()
    }
}

impl Transport for ServiceTransport {
    fn post(&self, request: &PortRequest) -> Result<()> {
        // Round-trip through JSON like the browser port does.
        let json = latch_messages::to_json(request)?;
        let request: PortRequest = latch_messages::from_json(&json)?;
        let response = self.service.borrow_mut().handle(request);
        self.outbox.borrow_mut().push_back(response);
        Ok(())
    }
}

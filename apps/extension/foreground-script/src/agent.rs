//! Credential sync state machine.
//!
//! Each discovery pass locates the login fields, binds input listeners to
//! new field instances and asks the background service for the stored
//! credential. Typed values are staged per keystroke and committed when
//! the page submits a form.

use latch_messages::{PortRequestPayload, PortResponse, PortResponsePayload};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use tracing::{debug, info, warn};

use crate::channel::{ChannelClient, Transport};
use crate::config::AgentConfig;
use crate::dom::{FieldHandle, InputListener, MutationSource, Page, SubmitSource};
use crate::error::{AgentError, Result};
use crate::locator::{locate_fields, FieldRole, LocatedFields};
use crate::observer::FormObserver;
use crate::site::SiteKey;
use crate::tracker::AttachmentTracker;

/// Where the agent is in the page's login flow.
///
/// A page that unloads without submitting is abandoned; that never shows up
/// here because nothing runs after unload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Observing,
    AwaitingCredential,
    Autofilled,
    NoCredential,
    Staging,
    Committed,
}

/// The page agent. Cheap to clone; clones share state.
pub struct CredentialAgent<P: Page, T: Transport> {
    inner: Rc<AgentInner<P, T>>,
}

impl<P: Page, T: Transport> Clone for CredentialAgent<P, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

struct AgentInner<P: Page, T: Transport> {
    page: P,
    config: AgentConfig,
    site: SiteKey,
    channel: ChannelClient<T>,
    state: Cell<SyncState>,
    fields: RefCell<LocatedFields<P::Field>>,
    tracker: RefCell<AttachmentTracker<P::Field>>,
    lookup_pending: Cell<bool>,
    in_pass: Cell<bool>,
}

impl<P: Page, T: Transport + 'static> CredentialAgent<P, T> {
    /// Create an agent for the current page. The site key is fixed here
    /// for the rest of the page load.
    pub fn new(page: P, transport: T, config: AgentConfig) -> Result<Self> {
        let site = SiteKey::from_url(&page.location()?);
        info!(site = %site, "Created credential agent");

        Ok(Self {
            inner: Rc::new(AgentInner {
                page,
                config,
                site,
                channel: ChannelClient::new(transport),
                state: Cell::new(SyncState::Idle),
                fields: RefCell::new(LocatedFields::default()),
                tracker: RefCell::new(AttachmentTracker::new()),
                lookup_pending: Cell::new(false),
                in_pass: Cell::new(false),
            }),
        })
    }

    pub fn site(&self) -> &SiteKey {
        &self.inner.site
    }

    pub fn state(&self) -> SyncState {
        self.inner.state.get()
    }

    pub fn channel(&self) -> &ChannelClient<T> {
        &self.inner.channel
    }

    /// Fields found by the most recent discovery pass
    pub fn fields(&self) -> LocatedFields<P::Field> {
        self.inner.fields.borrow().clone()
    }

    /// Register the response handler and start the observer, which runs
    /// the first discovery pass. Only the first call has any effect.
    pub fn start<M, S>(&self, observer: &FormObserver<M, S>) -> Result<()>
    where
        M: MutationSource + 'static,
        S: SubmitSource,
    {
        if self.state() != SyncState::Idle {
            warn!("Credential agent already started");
            return Ok(());
        }

        let weak = self.downgrade();
        self.inner.channel.on_message(move |response| {
            if let Some(agent) = upgrade(&weak) {
                agent.handle_response(response);
            }
        });

        self.inner.state.set(SyncState::Observing);

        let on_change = {
            let weak = self.downgrade();
            move || {
                if let Some(agent) = upgrade(&weak) {
                    agent.discovery_pass();
                }
            }
        };
        let on_submit = {
            let weak = self.downgrade();
            move || {
                if let Some(agent) = upgrade(&weak) {
                    agent.commit();
                }
            }
        };

        observer.start(on_change, on_submit)
    }

    /// Locate fields, bind listeners to new instances and request the
    /// stored credential. Pages without login fields cause no traffic.
    pub fn discovery_pass(&self) {
        if self.inner.in_pass.replace(true) {
            debug!("Skipping re-entrant discovery pass");
            return;
        }

        let located = locate_fields(&self.inner.page, &self.inner.config);
        *self.inner.fields.borrow_mut() = located.clone();

        if located.is_empty() {
            self.inner.in_pass.set(false);
            return;
        }

        debug!(
            username = located.username.is_some(),
            password = located.password.is_some(),
            "Found login fields"
        );

        let mut attached_new = false;
        for role in [FieldRole::Username, FieldRole::Password] {
            if let Some(field) = located.get(role) {
                attached_new |= self.attach(role, field);
            }
        }

        // One lookup in flight is enough unless the form itself changed.
        if attached_new || !self.inner.lookup_pending.get() {
            self.request_credential();
        }

        self.inner.in_pass.set(false);
    }

    /// Apply an inbound message. Responses carry no request id, so any
    /// `Credential` answers the latest lookup, even after a commit.
    pub fn handle_response(&self, response: &PortResponse) {
        match &response.payload {
            PortResponsePayload::Credential { username, password } => {
                self.inner.lookup_pending.set(false);
                self.autofill(username, password);
                if self.state() != SyncState::Committed {
                    self.inner.state.set(SyncState::Autofilled);
                }
            }
            _ if self.inner.lookup_pending.get() => self.credential_missing(),
            PortResponsePayload::Error(message) => {
                warn!(site = %self.inner.site, error = %message, "Background service error");
            }
            PortResponsePayload::Ok => {}
        }
    }

    /// Any reply to a pending lookup other than `Credential`, including one
    /// that fails to decode, means there is nothing to fill.
    fn credential_missing(&self) {
        if !self.inner.lookup_pending.replace(false) {
            return;
        }
        debug!(site = %self.inner.site, "No stored credential");
        if self.state() == SyncState::AwaitingCredential {
            self.inner.state.set(SyncState::NoCredential);
        }
    }

    /// Ask the background service to persist the staged pair for this site.
    pub fn commit(&self) {
        info!(site = %self.inner.site, "Form submitted, storing staged credential");
        self.send(PortRequestPayload::StoreTmpCredential {
            site: self.inner.site.to_string(),
        });
        self.inner.state.set(SyncState::Committed);
    }

    /// Stage one typed value. Sent immediately, one message per input event.
    pub fn stage(&self, role: FieldRole, value: String) {
        let site = self.inner.site.to_string();
        let payload = match role {
            FieldRole::Username => PortRequestPayload::SetTmpCredentialUsername {
                site,
                username: value,
            },
            FieldRole::Password => PortRequestPayload::SetTmpCredentialPassword {
                site,
                password: value,
            },
        };

        if self.send(payload) {
            self.inner.state.set(SyncState::Staging);
        }
    }

    /// Feed a message from the port into the channel client.
    pub fn receive(&self, message: Result<PortResponse>) {
        if message.is_err() {
            self.credential_missing();
        }
        self.inner.channel.receive(message);
    }

    fn attach(&self, role: FieldRole, field: &P::Field) -> bool {
        let result = self
            .inner
            .tracker
            .borrow_mut()
            .ensure_attached(role, field, || self.input_listener(role));

        match result {
            Ok(attached) => attached,
            Err(err) => {
                warn!(%role, error = %err, "Failed to attach input listener");
                false
            }
        }
    }

    fn input_listener(&self, role: FieldRole) -> InputListener {
        let weak = self.downgrade();
        Box::new(move |value| {
            if let Some(agent) = upgrade(&weak) {
                agent.stage(role, value);
            }
        })
    }

    fn request_credential(&self) {
        let sent = self.send(PortRequestPayload::GetCredential {
            site: self.inner.site.to_string(),
        });

        if sent {
            self.inner.lookup_pending.set(true);
            if self.state() != SyncState::Committed {
                self.inner.state.set(SyncState::AwaitingCredential);
            }
        }
    }

    fn autofill(&self, username: &str, password: &str) {
        let fields = self.fields();

        if let Some(field) = &fields.username {
            if let Err(err) = field.set_value(username) {
                warn!(error = %err, "Failed to fill username");
            }
        }
        if let Some(field) = &fields.password {
            if let Err(err) = field.set_value(password) {
                warn!(error = %err, "Failed to fill password");
            }
        }
        debug!(site = %self.inner.site, "Autofilled login fields");
    }

    fn send(&self, payload: PortRequestPayload) -> bool {
        match self.inner.channel.send(payload) {
            Ok(()) => true,
            Err(AgentError::ChannelDisconnected) => false,
            Err(err) => {
                warn!(error = %err, "Failed to post port message");
                false
            }
        }
    }

    fn downgrade(&self) -> Weak<AgentInner<P, T>> {
        Rc::downgrade(&self.inner)
    }
}

fn upgrade<P: Page, T: Transport>(weak: &Weak<AgentInner<P, T>>) -> Option<CredentialAgent<P, T>> {
    weak.upgrade().map(|inner| CredentialAgent { inner })
}

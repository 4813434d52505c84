//! Client end of the persistent port to the background service.

use latch_messages::{PortRequest, PortRequestPayload, PortResponse};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tracing::{debug, error, warn};

use crate::error::{AgentError, Result};

/// Raw outbound side of a port.
pub trait Transport {
    /// Post one envelope. Delivery order follows call order.
    fn post(&self, request: &PortRequest) -> Result<()>;
}

type ResponseHandler = Rc<dyn Fn(&PortResponse)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Open,
    Disconnected,
}

/// Wraps one port for the lifetime of the page.
///
/// Sends are fire-and-forget. There is no reconnection: once the port is
/// reported disconnected, every later send fails fast.
pub struct ChannelClient<T: Transport> {
    transport: T,
    state: Cell<ChannelState>,
    handlers: RefCell<Vec<ResponseHandler>>,
}

impl<T: Transport> ChannelClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            state: Cell::new(ChannelState::Open),
            handlers: RefCell::new(Vec::new()),
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state.get()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Wrap `payload` in an envelope and post it.
    pub fn send(&self, payload: PortRequestPayload) -> Result<()> {
        if self.state.get() == ChannelState::Disconnected {
            return Err(AgentError::ChannelDisconnected);
        }

        debug!(kind = payload.kind(), site = payload.site(), "Posting port message");
        let request = PortRequest::new(payload);
        match self.transport.post(&request) {
            Err(err @ AgentError::ChannelDisconnected) => {
                self.mark_disconnected();
                Err(err)
            }
            other => other,
        }
    }

    /// Register a handler for every inbound envelope. All registered
    /// handlers run, in registration order.
    pub fn on_message(&self, handler: impl Fn(&PortResponse) + 'static) {
        self.handlers.borrow_mut().push(Rc::new(handler));
    }

    /// Feed one inbound message from the transport.
    ///
    /// Undecodable messages are logged and dropped.
    pub fn receive(&self, message: Result<PortResponse>) {
        let response = match message {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "Dropping malformed port message");
                return;
            }
        };

        debug!(kind = response.payload.kind(), "Received port message");
        // Handlers may register more handlers; iterate a snapshot.
        let handlers: Vec<ResponseHandler> = self.handlers.borrow().clone();
        for handler in handlers {
            handler(&response);
        }
    }

    pub fn mark_disconnected(&self) {
        if self.state.replace(ChannelState::Disconnected) == ChannelState::Open {
            error!("Port to background service disconnected; credential sync stopped for this page");
        }
    }
}

//! Browser bindings and the wasm entry points.

use latch_messages::{PortRequest, PortResponse};
use serde::Serialize;
use std::cell::RefCell;
use std::sync::Once;
use tracing::{error, info, warn, Level};
use tracing_wasm::WASMLayerConfigBuilder;
use wasm_bindgen::{prelude::*, JsCast};
use web_sys::{
    Document, Event, HtmlInputElement, MutationObserver, MutationObserverInit, Node, Window,
};

use crate::agent::CredentialAgent;
use crate::channel::Transport;
use crate::config::AgentConfig;
use crate::dom::{FieldHandle, InputListener, MutationSource, Page, SubmitSource};
use crate::error::{AgentError, Result};
use crate::observer::FormObserver;

// ============================================================================
// Extension Runtime Bindings
// ============================================================================

#[wasm_bindgen]
extern "C" {
    /// `chrome.runtime.Port`
    #[derive(Debug, Clone)]
    pub type RuntimePort;

    #[wasm_bindgen(method, catch, js_name = postMessage)]
    fn post_message(this: &RuntimePort, message: &JsValue) -> std::result::Result<(), JsValue>;

    #[wasm_bindgen(method, getter, js_name = onMessage)]
    fn on_message(this: &RuntimePort) -> PortEvent;

    #[wasm_bindgen(method, getter, js_name = onDisconnect)]
    fn on_disconnect(this: &RuntimePort) -> PortEvent;

    type PortEvent;

    #[wasm_bindgen(method, js_name = addListener)]
    fn add_listener(this: &PortEvent, callback: &js_sys::Function);

    #[wasm_bindgen(catch, js_namespace = ["chrome", "runtime"], js_name = connect)]
    fn runtime_connect() -> std::result::Result<RuntimePort, JsValue>;
}

/// Posts envelopes as plain JS objects on a runtime port.
pub struct PortTransport {
    port: RuntimePort,
}

impl Transport for PortTransport {
    fn post(&self, request: &PortRequest) -> Result<()> {
        let serializer = serde_wasm_bindgen::Serializer::json_compatible();
        let message = request
            .serialize(&serializer)
            .map_err(|e| AgentError::Encode(e.to_string()))?;

        // postMessage only throws once the port is gone.
        self.port.post_message(&message).map_err(|e| {
            warn!(error = ?e, "postMessage failed");
            AgentError::ChannelDisconnected
        })
    }
}

// ============================================================================
// DOM Bindings
// ============================================================================

#[derive(Clone)]
pub struct WebField(HtmlInputElement);

impl FieldHandle for WebField {
    fn is_same_node(&self, other: &Self) -> bool {
        let other: &Node = other.0.as_ref();
        self.0.is_same_node(Some(other))
    }

    fn set_value(&self, value: &str) -> Result<()> {
        self.0.set_value(value);
        Ok(())
    }

    fn add_input_listener(&self, listener: InputListener) -> Result<()> {
        let input = self.0.clone();
        let closure = Closure::<dyn Fn(Event)>::new(move |_event: Event| listener(input.value()));

        self.0
            .add_event_listener_with_callback("input", closure.as_ref().unchecked_ref())
            .map_err(|e| AgentError::Dom(format!("{e:?}")))?;
        // Lives as long as the element.
        closure.forget();
        Ok(())
    }
}

pub struct WebPage {
    window: Window,
    document: Document,
}

impl Page for WebPage {
    type Field = WebField;

    fn location(&self) -> Result<String> {
        self.window
            .location()
            .href()
            .map_err(|e| AgentError::Dom(format!("{e:?}")))
    }

    fn query_field(&self, selector: &str) -> Result<Option<WebField>> {
        let element = self
            .document
            .query_selector(selector)
            .map_err(|e| AgentError::Dom(format!("{e:?}")))?;

        Ok(element
            .and_then(|element| element.dyn_into::<HtmlInputElement>().ok())
            .map(WebField))
    }
}

/// `MutationObserver` on `document.body`, child list and subtree only.
pub struct WebMutations {
    document: Document,
    observer: RefCell<Option<MutationObserver>>,
}

impl MutationSource for WebMutations {
    fn observe(&self, on_mutation: Box<dyn Fn()>) -> Result<()> {
        let body = self
            .document
            .body()
            .ok_or_else(|| AgentError::ObserverUnavailable("document has no body".to_string()))?;

        let closure = Closure::<dyn Fn()>::new(move || on_mutation());
        let observer = MutationObserver::new(closure.as_ref().unchecked_ref())
            .map_err(|e| AgentError::ObserverUnavailable(format!("{e:?}")))?;

        let options = MutationObserverInit::new();
        options.set_child_list(true);
        options.set_subtree(true);
        observer
            .observe_with_options(&body, &options)
            .map_err(|e| AgentError::ObserverUnavailable(format!("{e:?}")))?;

        closure.forget();
        *self.observer.borrow_mut() = Some(observer);
        Ok(())
    }

    fn disconnect(&self) {
        if let Some(observer) = self.observer.borrow_mut().take() {
            observer.disconnect();
        }
    }
}

/// Capture-phase `submit` listener on the window.
pub struct WebSubmits {
    window: Window,
}

impl SubmitSource for WebSubmits {
    fn on_submit(&self, handler: Box<dyn Fn()>) -> Result<()> {
        let closure = Closure::<dyn Fn(Event)>::new(move |_event: Event| handler());
        self.window
            .add_event_listener_with_callback_and_bool(
                "submit",
                closure.as_ref().unchecked_ref(),
                true,
            )
            .map_err(|e| AgentError::Dom(format!("{e:?}")))?;
        closure.forget();
        Ok(())
    }
}

// ============================================================================
// Entry Points
// ============================================================================

type WebAgent = CredentialAgent<WebPage, PortTransport>;

thread_local! {
    static AGENT: RefCell<Option<WebAgent>> = const { RefCell::new(None) };
}

static LOGGING: Once = Once::new();

/// Start the page agent with the default configuration.
#[wasm_bindgen]
pub fn start() {
    start_with(AgentConfig::default());
}

/// Start the page agent with a partial `AgentConfig` object.
#[wasm_bindgen(js_name = startWithConfig)]
pub fn start_with_config(config: JsValue) {
    let parsed = serde_wasm_bindgen::from_value::<AgentConfig>(config)
        .map_err(|e| AgentError::Config(e.to_string()))
        .and_then(|config| config.validate().map(|()| config));

    match parsed {
        Ok(config) => start_with(config),
        Err(err) => {
            init_logging(Level::INFO);
            warn!(error = %err, "Ignoring invalid config, using defaults");
            start_with(AgentConfig::default());
        }
    }
}

fn start_with(config: AgentConfig) {
    init_logging(config.level().unwrap_or(Level::INFO));

    if AGENT.with(|agent| agent.borrow().is_some()) {
        warn!("Page agent already running");
        return;
    }

    match launch(config) {
        Ok(agent) => {
            info!(site = %agent.site(), "Page agent running");
            AGENT.with(|slot| *slot.borrow_mut() = Some(agent));
        }
        Err(err) => error!(error = %err, "Page agent failed to start"),
    }
}

fn init_logging(level: Level) {
    LOGGING.call_once(|| {
        tracing_wasm::set_as_global_default_with_config(
            WASMLayerConfigBuilder::new().set_max_level(level).build(),
        );
    });
}

fn launch(config: AgentConfig) -> Result<WebAgent> {
    let window = web_sys::window().ok_or_else(|| AgentError::Dom("no window".to_string()))?;
    let document = window
        .document()
        .ok_or_else(|| AgentError::Dom("no document".to_string()))?;
    let port = runtime_connect().map_err(|e| AgentError::ChannelUnavailable(format!("{e:?}")))?;

    let page = WebPage {
        window: window.clone(),
        document: document.clone(),
    };
    let agent = CredentialAgent::new(page, PortTransport { port: port.clone() }, config)?;
    bind_port(&agent, &port);

    let observer = FormObserver::new(
        WebMutations {
            document,
            observer: RefCell::new(None),
        },
        WebSubmits { window },
    );
    // The initial pass has already run; keep autofilling without commits.
    if let Err(err) = agent.start(&observer) {
        warn!(error = %err, "Page agent running without submit hook");
    }
    Ok(agent)
}

fn bind_port(agent: &WebAgent, port: &RuntimePort) {
    let on_message = {
        let agent = agent.clone();
        Closure::<dyn Fn(JsValue)>::new(move |message: JsValue| {
            let decoded = serde_wasm_bindgen::from_value::<PortResponse>(message)
                .map_err(|e| AgentError::Decode(e.to_string()));
            agent.receive(decoded);
        })
    };
    port.on_message()
        .add_listener(on_message.as_ref().unchecked_ref());
    on_message.forget();

    let on_disconnect = {
        let agent = agent.clone();
        Closure::<dyn Fn()>::new(move || agent.channel().mark_disconnected())
    };
    port.on_disconnect()
        .add_listener(on_disconnect.as_ref().unchecked_ref());
    on_disconnect.forget();
}

/*!
 * Latch Foreground - the page agent of the Latch extension
 *
 * Detects login forms as the page mutates, autofills the stored credential
 * for the current site, stages typed values with the background service
 * and commits them when the page submits a form.
 *
 * Browser bindings are only compiled for `wasm32`; everything else runs
 * natively against the traits in `dom` and `channel`.
 */

pub mod agent;
pub mod channel;
pub mod config;
pub mod dom;
pub mod error;
pub mod locator;
pub mod observer;
pub mod site;
pub mod tracker;

#[cfg(target_arch = "wasm32")]
pub mod web;

#[cfg(test)]
mod testing;

pub use agent::{CredentialAgent, SyncState};
pub use channel::{ChannelClient, ChannelState, Transport};
pub use config::AgentConfig;
pub use error::{AgentError, Result};
pub use locator::{locate_fields, FieldRole, LocatedFields};
pub use observer::FormObserver;
pub use site::{site_key, SiteKey};
pub use tracker::AttachmentTracker;

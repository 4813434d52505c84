use latch_messages::{
    next_request_id, PortRequest, PortRequestPayload, PortResponse, PortResponsePayload,
    Request, RequestId, Response, INITIAL_REQUEST_ID,
};
use tracing::{debug, warn};

use crate::{CredentialStore, Result, StagingArea, StoredCredential, VaultError};

/// Answers port requests from page agents.
///
/// Lookups return the stored credential or an `Error` payload. Staging
/// requests accumulate typed values per site and commits promote them
/// into the backing store.
pub struct CredentialService<S: CredentialStore> {
    store: S,
    staging: StagingArea,
    last_request_id: RequestId,
}

impl<S: CredentialStore> CredentialService<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            staging: StagingArea::new(),
            last_request_id: INITIAL_REQUEST_ID,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn staging(&self) -> &StagingArea {
        &self.staging
    }

    /// Handle one request. Every request gets exactly one response.
    pub fn handle(&mut self, request: PortRequest) -> PortResponse {
        self.last_request_id = next_request_id(self.last_request_id);
        let request_id = self.last_request_id;

        let Request { header, payload } = request;
        debug!(request_id, kind = payload.kind(), site = payload.site(), "Handling port request");

        let payload = match payload {
            PortRequestPayload::GetCredential { site } => match self.lookup(&site) {
                Ok((username, password)) => PortResponsePayload::Credential { username, password },
                Err(err) => {
                    debug!(site = %site, error = %err, "No credential to offer");
                    PortResponsePayload::Error(err.to_string())
                }
            },
            PortRequestPayload::SetTmpCredentialUsername { site, username } => {
                self.staging.set_username(&site, username);
                PortResponsePayload::Ok
            }
            PortRequestPayload::SetTmpCredentialPassword { site, password } => {
                self.staging.set_password(&site, password);
                PortResponsePayload::Ok
            }
            PortRequestPayload::StoreTmpCredential { site } => match self.commit(&site) {
                Ok(()) => PortResponsePayload::Ok,
                Err(err) => {
                    warn!(site = %site, error = %err, "Failed to store tmp credential");
                    PortResponsePayload::Error(err.to_string())
                }
            },
        };

        Response {
            header: header.into_response(request_id),
            payload,
        }
    }

    fn lookup(&mut self, site: &str) -> Result<(String, String)> {
        let mut credential = self
            .store
            .get(site)?
            .ok_or_else(|| VaultError::NotFound(site.to_string()))?;

        credential.mark_used();
        let pair = (credential.username.clone(), credential.password.clone());
        self.store.set(site.to_string(), credential)?;
        Ok(pair)
    }

    fn commit(&mut self, site: &str) -> Result<()> {
        let staged = self.staging.take(site)?;
        let Some(password) = staged.password else {
            return Err(VaultError::IncompleteCredential(site.to_string()));
        };

        // A password-only commit keeps the username already on file.
        let credential = match self.store.get(site)? {
            Some(mut existing) => {
                let username = staged
                    .username
                    .unwrap_or_else(|| existing.username.clone());
                existing.update(username, password);
                existing
            }
            None => StoredCredential::new(site, staged.username.unwrap_or_default(), password),
        };

        self.store.set(site.to_string(), credential)
    }
}

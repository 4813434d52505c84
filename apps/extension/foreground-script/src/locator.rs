//! Best-guess username and password field lookup.

use std::fmt;
use tracing::warn;

use crate::config::AgentConfig;
use crate::dom::Page;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldRole {
    Username,
    Password,
}

impl fmt::Display for FieldRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldRole::Username => f.write_str("username"),
            FieldRole::Password => f.write_str("password"),
        }
    }
}

/// Result of one discovery pass. Either field may be absent.
#[derive(Debug, Clone)]
pub struct LocatedFields<F> {
    pub username: Option<F>,
    pub password: Option<F>,
}

impl<F> Default for LocatedFields<F> {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
        }
    }
}

impl<F> LocatedFields<F> {
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.password.is_none()
    }

    pub fn get(&self, role: FieldRole) -> Option<&F> {
        match role {
            FieldRole::Username => self.username.as_ref(),
            FieldRole::Password => self.password.as_ref(),
        }
    }
}

/// Locate the login fields in the current document.
///
/// A failed query counts as a miss for that role; nothing here is an error.
pub fn locate_fields<P: Page>(page: &P, config: &AgentConfig) -> LocatedFields<P::Field> {
    LocatedFields {
        username: query(page, FieldRole::Username, &config.username_selector),
        password: query(page, FieldRole::Password, &config.password_selector),
    }
}

fn query<P: Page>(page: &P, role: FieldRole, selector: &str) -> Option<P::Field> {
    match page.query_field(selector) {
        Ok(field) => field,
        Err(err) => {
            warn!(%role, error = %err, "Field query failed");
            None
        }
    }
}

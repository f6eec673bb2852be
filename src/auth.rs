//! Login validation
//!
//! The remote store URL is the only account source. Without a user name in
//! the URL every login is accepted; otherwise the name and password must
//! match it exactly.

use url::Url;

use crate::error::AuthError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    user: Option<(String, Option<String>)>,
}

impl Credentials {
    pub fn from_url(url: &Url) -> Self {
        if url.username().is_empty() {
            return Self::default();
        }
        Self {
            user: Some((
                decode(url.username()),
                url.password().map(decode),
            )),
        }
    }

    /// User name and password, decoded
    pub fn account(&self) -> Option<(&str, Option<&str>)> {
        self.user
            .as_ref()
            .map(|(user, password)| (user.as_str(), password.as_deref()))
    }

    /// No account configured, anyone may log in
    pub fn is_open(&self) -> bool {
        self.user.is_none()
    }

    pub fn validate_user(&self, username: &str) -> Result<(), AuthError> {
        match &self.user {
            None => Ok(()),
            Some((expected, _)) if expected == username => Ok(()),
            Some(_) => Err(AuthError::UnknownUser(username.to_string())),
        }
    }

    pub fn validate(&self, username: &str, password: &str) -> Result<(), AuthError> {
        self.validate_user(username)?;
        match &self.user {
            None => Ok(()),
            Some((_, Some(expected))) if expected == password => Ok(()),
            Some(_) => Err(AuthError::InvalidPassword(username.to_string())),
        }
    }
}

/// URL user info is percent-encoded.
fn decode(part: &str) -> String {
    url::form_urlencoded::parse(format!("v={}", part.replace('+', "%2B")).as_bytes())
        .next()
        .map(|(_, value)| value.into_owned())
        .unwrap_or_else(|| part.to_string())
}

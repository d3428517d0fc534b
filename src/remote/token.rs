use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use zeroize::Zeroizing;

use super::types::TokenResponse;
use super::RemoteUnavailable;

const DEFAULT_EXPIRES_IN: u64 = 3600;
/// Tokens are treated as expired this long before the issuer says so.
const EXPIRY_MARGIN: Duration = Duration::from_secs(10);

/// Anything able to hand out a currently valid bearer token.
pub trait TokenSource: Send + Sync {
    fn bearer_token(&self) -> Result<String>;
}

/// Fixed token, for tests and pre-issued credentials.
#[derive(Clone)]
pub struct StaticToken(pub String);

impl TokenSource for StaticToken {
    fn bearer_token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

#[derive(Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: Zeroizing<String>,
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

struct CachedToken {
    value: Zeroizing<String>,
    expires_at: Instant,
}

/// OAuth2 client-credentials token provider with an internal cache.
///
/// Callers serialise on the cache lock, so at most one token request is in flight.
pub struct TokenProvider {
    agent: ureq::Agent,
    token_url: String,
    credentials: ClientCredentials,
    cache: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    pub fn new(token_url: impl Into<String>, credentials: ClientCredentials, timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            token_url: token_url.into(),
            credentials,
            cache: Mutex::new(None),
        }
    }

    fn request_token(&self) -> Result<CachedToken> {
        let basic = BASE64.encode(format!(
            "{}:{}",
            self.credentials.client_id,
            self.credentials.client_secret.as_str()
        ));
        let requested_at = Instant::now();
        let response = self
            .agent
            .post(&self.token_url)
            .set("Authorization", &format!("Basic {}", basic))
            .send_form(&[("grant_type", "client_credentials"), ("scope", "system")]);
        let response = match response {
            Ok(response) => response,
            Err(ureq::Error::Status(code, response)) => {
                let body = response.into_string().unwrap_or_default();
                return Err(RemoteUnavailable::new(
                    &self.token_url,
                    format!("token request rejected: {} {}", code, body),
                )
                .into());
            }
            Err(err) => return Err(RemoteUnavailable::new(&self.token_url, err.to_string()).into()),
        };
        let body = response.into_string().context("read token response")?;
        let token: TokenResponse =
            serde_json::from_str(&body).context("parse token response")?;
        if token.access_token.is_empty() {
            return Err(anyhow!("token endpoint returned an empty access token"));
        }
        let lifetime = Duration::from_secs(token.expires_in.unwrap_or(DEFAULT_EXPIRES_IN));
        log::debug!("obtained access token valid for {:?}", lifetime);
        Ok(CachedToken {
            value: Zeroizing::new(token.access_token),
            expires_at: requested_at + lifetime.saturating_sub(EXPIRY_MARGIN),
        })
    }
}

impl TokenSource for TokenProvider {
    fn bearer_token(&self) -> Result<String> {
        let mut cache = self
            .cache
            .lock()
            .map_err(|_| anyhow!("token cache lock poisoned"))?;
        if let Some(cached) = cache.as_ref() {
            if Instant::now() < cached.expires_at {
                return Ok(cached.value.to_string());
            }
        }
        let fresh = self.request_token()?;
        let value = fresh.value.to_string();
        *cache = Some(fresh);
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_debug_hides_secret() {
        let creds = ClientCredentials {
            client_id: "client".into(),
            client_secret: Zeroizing::new("hunter2".into()),
        };
        let shown = format!("{:?}", creds);
        assert!(shown.contains("client"));
        assert!(!shown.contains("hunter2"));
    }
}

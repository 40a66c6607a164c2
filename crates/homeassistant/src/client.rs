use std::time::Duration;

use {
    reqwest::{Client, RequestBuilder, Response, StatusCode},
    secrecy::{ExposeSecret, Secret},
    serde::Deserialize,
    serde_json::Value,
    tracing::debug,
};

use crate::{Error, Result, error::Context};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest response body kept in an error message.
const ERROR_BODY_LIMIT: usize = 256;

/// One entity as returned by `GET /api/states/<entity_id>`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EntityState {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: Value,
}

/// Thin REST client for a Home Assistant instance (or the Supervisor proxy).
#[derive(Clone)]
pub struct HaClient {
    http: Client,
    base_url: String,
    token: Secret<String>,
}

impl std::fmt::Debug for HaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HaClient")
            .field("base_url", &self.base_url)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl HaClient {
    pub fn new(base_url: impl Into<String>, token: Secret<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("twitchbridge/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(http, base_url, token))
    }

    #[must_use]
    pub fn with_client(http: Client, base_url: impl Into<String>, token: Secret<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self {
            http,
            base_url,
            token,
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        let token = self.token.expose_secret();
        if token.is_empty() {
            req
        } else {
            req.bearer_auth(token)
        }
    }

    /// Current state of `entity_id`, or `None` when the entity does not exist.
    pub async fn get_state(&self, entity_id: &str) -> Result<Option<EntityState>> {
        let url = self.url(&format!("states/{entity_id}"));
        let resp = self.authorized(self.http.get(&url)).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            debug!(entity_id, "entity not found");
            return Ok(None);
        }
        let resp = check("GET", &url, resp).await?;
        let state = resp
            .json::<EntityState>()
            .await
            .with_context(|| format!("decoding state of {entity_id}"))?;
        Ok(Some(state))
    }

    /// Create or overwrite an entity's state and attributes.
    pub async fn set_state(&self, entity_id: &str, state: &str, attributes: Value) -> Result<()> {
        let url = self.url(&format!("states/{entity_id}"));
        let body = serde_json::json!({ "state": state, "attributes": attributes });
        let resp = self
            .authorized(self.http.post(&url))
            .json(&body)
            .send()
            .await?;
        check("POST", &url, resp).await?;
        Ok(())
    }

    /// Invoke `domain.service` with the given service data.
    pub async fn call_service(&self, domain: &str, service: &str, data: Value) -> Result<()> {
        let url = self.url(&format!("services/{domain}/{service}"));
        let resp = self
            .authorized(self.http.post(&url))
            .json(&data)
            .send()
            .await?;
        check("POST", &url, resp).await?;
        Ok(())
    }
}

async fn check(method: &'static str, url: &str, resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let mut body = resp.text().await.unwrap_or_default();
    if let Some((idx, _)) = body.char_indices().nth(ERROR_BODY_LIMIT) {
        body.truncate(idx);
    }
    Err(Error::Status {
        method,
        url: url.to_owned(),
        status: status.as_u16(),
        body,
    })
}

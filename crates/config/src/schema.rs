use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

use crate::error::{Error, Result};

/// Configuration for the gateway process.
///
/// Loaded from the environment; the binary layers CLI overrides on top for
/// `bind` and `port`.
#[derive(Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Credential for the external NLU engine.
    #[serde(serialize_with = "serialize_secret")]
    pub nlu_token: Secret<String>,

    /// Base URL of the NLU engine's decision API.
    pub nlu_url: String,

    /// Base URL of the platform send API.
    pub graph_url: String,

    /// Identity of the platform page/app that events must be addressed to.
    pub page_id: String,

    /// Access token for the platform send API.
    #[serde(serialize_with = "serialize_secret")]
    pub page_token: Secret<String>,

    /// Shared secret for the webhook verification handshake.
    pub verify_token: String,

    /// App secret for `X-Hub-Signature-256` checks. Signature enforcement
    /// is skipped when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_secret: Option<String>,

    /// Address to bind to.
    pub bind: String,

    /// Port to listen on.
    pub port: u16,

    /// Dispatch turn cap. `None` leaves the loop unbounded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_turns: Option<usize>,

    /// Per-turn timeout in milliseconds. `None` disables the timeout.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_timeout_ms: Option<u64>,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("nlu_token", &"[REDACTED]")
            .field("page_id", &self.page_id)
            .field("page_token", &"[REDACTED]")
            .field("bind", &self.bind)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

fn required(name: &'static str) -> Result<String> {
    std::env::var(name).map_err(|_| Error::MissingVar { name })
}

fn optional_parsed<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::InvalidVar {
                name,
                message: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}

impl GatewayConfig {
    /// Load configuration from `PALAVER_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            nlu_token: Secret::new(required("PALAVER_NLU_TOKEN")?),
            nlu_url: std::env::var("PALAVER_NLU_URL")
                .unwrap_or_else(|_| "https://api.wit.ai".into()),
            graph_url: std::env::var("PALAVER_GRAPH_URL")
                .unwrap_or_else(|_| "https://graph.facebook.com/v2.6".into()),
            page_id: required("PALAVER_PAGE_ID")?,
            page_token: Secret::new(required("PALAVER_PAGE_TOKEN")?),
            verify_token: required("PALAVER_VERIFY_TOKEN")?,
            app_secret: std::env::var("PALAVER_APP_SECRET").ok(),
            bind: std::env::var("PALAVER_BIND").unwrap_or_else(|_| "0.0.0.0".into()),
            port: optional_parsed("PALAVER_PORT")?.unwrap_or(8443),
            max_turns: optional_parsed("PALAVER_MAX_TURNS")?,
            turn_timeout_ms: optional_parsed("PALAVER_TURN_TIMEOUT_MS")?,
        })
    }
}

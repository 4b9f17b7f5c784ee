use {
    async_trait::async_trait,
    palaver_common::Context,
    palaver_dispatch::{Decision, NluEngine, NluError},
    secrecy::{ExposeSecret, Secret},
    tracing::debug,
};

/// Client adapter for the external NLU engine's converse-style API.
///
/// The engine is an opaque collaborator; this only translates its wire
/// decisions (`merge` / `action` / `msg` / `stop`) into [`Decision`]s. A
/// bare `msg` decision is routed through the `say` action so all outbound
/// sends share one path.
pub struct HttpNluEngine {
    http: reqwest::Client,
    base_url: String,
    token: Secret<String>,
}

impl HttpNluEngine {
    #[must_use]
    pub fn new(base_url: impl Into<String>, token: Secret<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            token,
        }
    }

    fn decision_from_body(body: &serde_json::Value) -> Result<Decision, NluError> {
        let kind = body
            .get("type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| NluError::new("decision missing 'type'"))?;

        match kind {
            "stop" => Ok(Decision::Stop),
            "merge" => Ok(Decision::Merge {
                entities: body.get("entities").cloned().unwrap_or_default(),
                message: body
                    .get("msg")
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
            }),
            "action" => {
                let name = body
                    .get("action")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| NluError::new("action decision missing 'action'"))?;
                Ok(Decision::Action {
                    name: name.to_string(),
                    payload: body.get("entities").cloned().unwrap_or_default(),
                })
            },
            "msg" => {
                let msg = body
                    .get("msg")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| NluError::new("msg decision missing 'msg'"))?;
                Ok(Decision::Action {
                    name: "say".into(),
                    payload: serde_json::json!({"text": msg}),
                })
            },
            other => Err(NluError::new(format!("unknown decision type: {other}"))),
        }
    }
}

#[async_trait]
impl NluEngine for HttpNluEngine {
    async fn decide(
        &self,
        session_id: &str,
        utterance: Option<&str>,
        context: &Context,
    ) -> Result<Decision, NluError> {
        let url = format!("{}/converse", self.base_url.trim_end_matches('/'));
        let mut query = vec![("session_id", session_id.to_string())];
        if let Some(q) = utterance {
            query.push(("q", q.to_string()));
        }

        let resp = self
            .http
            .post(url)
            .bearer_auth(self.token.expose_secret())
            .query(&query)
            .json(&serde_json::Value::Object(context.clone()))
            .send()
            .await
            .map_err(|e| NluError::new(format!("nlu request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            return Err(NluError::new(format!("nlu engine returned {status}")));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| NluError::new(format!("unparseable nlu response: {e}")))?;
        debug!(session_id, decision = ?body.get("type"), "nlu decision received");

        Self::decision_from_body(&body)
    }
}

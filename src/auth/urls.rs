//! Usage: Identity-provider authorize URLs for the implicit id_token / access_token flows.

use crate::infra::config::AuthConfig;
use crate::shared::error::AppResult;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use url::Url;

const ID_TOKEN_SCOPES: &str = "openid profile";

#[derive(Debug, Clone)]
pub struct IdentityUrls {
    authorize_endpoint: Url,
    client_id: String,
    redirect_uri: Url,
}

/// Random opaque value for `state` / `nonce`.
pub(crate) fn random_nonce() -> String {
    let mut random = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut random);
    URL_SAFE_NO_PAD.encode(random)
}

impl IdentityUrls {
    pub fn from_config(config: &AuthConfig) -> AppResult<Self> {
        let authority = config.authority.trim().trim_end_matches('/');
        let tenant = config.tenant.trim();
        let authorize_endpoint = Url::parse(&format!(
            "{authority}/{tenant}/oauth2/v2.0/authorize"
        ))
        .map_err(|e| format!("SEC_INVALID_INPUT: invalid auth.authority: {e}"))?;
        let redirect_uri = Url::parse(config.redirect_uri.trim())
            .map_err(|e| format!("SEC_INVALID_INPUT: invalid auth.redirect_uri: {e}"))?;
        let client_id = config.client_id.trim();
        if client_id.is_empty() {
            return Err("SEC_INVALID_INPUT: auth.client_id is required".into());
        }

        Ok(Self {
            authorize_endpoint,
            client_id: client_id.to_string(),
            redirect_uri,
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    /// `silent` adds `prompt=none` so the provider answers without UI (hidden frame refresh).
    pub fn id_token_url(&self, silent: bool) -> Url {
        let mut url = self.authorize_endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &self.client_id)
                .append_pair("response_type", "id_token")
                .append_pair("redirect_uri", self.redirect_uri.as_str())
                .append_pair("response_mode", "query")
                .append_pair("scope", ID_TOKEN_SCOPES)
                .append_pair("state", &random_nonce())
                .append_pair("nonce", &random_nonce());
            if silent {
                query.append_pair("prompt", "none");
            }
        }
        url
    }

    pub fn access_token_url(&self, scopes: &[String], login_hint: Option<&str>) -> Url {
        let mut url = self.authorize_endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &self.client_id)
                .append_pair("response_type", "token")
                .append_pair("redirect_uri", self.redirect_uri.as_str())
                .append_pair("response_mode", "query")
                .append_pair("scope", &scopes.join(" "))
                .append_pair("state", &random_nonce())
                .append_pair("nonce", &random_nonce())
                .append_pair("prompt", "none");
            if let Some(hint) = login_hint.map(str::trim).filter(|v| !v.is_empty()) {
                query.append_pair("login_hint", hint);
            }
        }
        url
    }
}

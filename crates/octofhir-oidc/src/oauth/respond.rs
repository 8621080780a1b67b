//! Authorization response delivery.
//!
//! Parameters reach the client through a response mode: `query` and
//! `fragment` append them to the redirect URI, `form_post` asks the user
//! agent to POST them. Further modes can be registered by name.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use rand::RngCore;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use url::{Url, form_urlencoded};

use crate::AuthResult;
use crate::error::AuthError;

/// Built-in response modes.
pub const BUILTIN_RESPONSE_MODES: &[&str] = &["query", "fragment", "form_post"];

/// The default mode for a response type: `query` when nothing is issued
/// in the front channel except a code, `fragment` otherwise.
#[must_use]
pub fn default_response_mode(response_type: &str) -> &'static str {
    match response_type {
        "code" | "none" => "query",
        _ => "fragment",
    }
}

/// What the embedding transport should send to the user agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationResponse {
    /// 302 to `location`.
    Redirect(Url),

    /// An auto-submitting form posting `fields` to `action`.
    FormPost {
        action: String,
        fields: BTreeMap<String, String>,
    },

    /// 302 to the interaction UI for a suspended request.
    Interaction { uid: String, location: String },

    /// A body rendered by a custom response mode.
    Rendered { content_type: String, body: String },
}

/// Delivers `parameters` to `redirect_uri` in a custom way.
pub type ResponseModeHandler =
    Arc<dyn Fn(&str, &BTreeMap<String, String>) -> AuthResult<AuthorizationResponse> + Send + Sync>;

/// A resolved response mode.
#[derive(Clone)]
pub enum ResponseMode {
    Query,
    Fragment,
    FormPost,
    Custom(ResponseModeHandler),
}

impl ResponseMode {
    /// Delivers `parameters` to `redirect_uri`.
    ///
    /// # Errors
    ///
    /// Returns an error if `redirect_uri` is not a URL or the custom handler
    /// fails.
    pub fn deliver(
        &self,
        redirect_uri: &str,
        parameters: &BTreeMap<String, String>,
    ) -> AuthResult<AuthorizationResponse> {
        match self {
            Self::Query => {
                let mut url = parse(redirect_uri)?;
                url.query_pairs_mut().extend_pairs(parameters.iter());
                Ok(AuthorizationResponse::Redirect(url))
            }
            Self::Fragment => {
                let mut url = parse(redirect_uri)?;
                let encoded = form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(parameters.iter())
                    .finish();
                url.set_fragment(Some(&encoded));
                Ok(AuthorizationResponse::Redirect(url))
            }
            Self::FormPost => Ok(AuthorizationResponse::FormPost {
                action: redirect_uri.to_string(),
                fields: parameters.clone(),
            }),
            Self::Custom(handler) => handler(redirect_uri, parameters),
        }
    }
}

impl fmt::Debug for ResponseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Query => f.write_str("Query"),
            Self::Fragment => f.write_str("Fragment"),
            Self::FormPost => f.write_str("FormPost"),
            Self::Custom(_) => f.write_str("Custom"),
        }
    }
}

fn parse(redirect_uri: &str) -> AuthResult<Url> {
    Url::parse(redirect_uri)
        .map_err(|e| AuthError::internal(format!("unparseable redirect_uri: {e}")))
}

/// Registry of response modes.
#[derive(Clone, Default)]
pub struct ResponseModes {
    custom: BTreeMap<String, ResponseModeHandler>,
}

impl ResponseModes {
    /// Registers a custom mode.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if `name` is empty, contains whitespace,
    /// shadows a built-in mode or is already registered.
    pub fn register(&mut self, name: impl Into<String>, handler: ResponseModeHandler) -> AuthResult<()> {
        let name = name.into();
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(AuthError::configuration(format!(
                "invalid response mode name {name:?}"
            )));
        }
        if BUILTIN_RESPONSE_MODES.contains(&name.as_str()) || self.custom.contains_key(&name) {
            return Err(AuthError::configuration(format!(
                "response mode {name} is already registered"
            )));
        }
        self.custom.insert(name, handler);
        Ok(())
    }

    /// Looks up a mode by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<ResponseMode> {
        match name {
            "query" => Some(ResponseMode::Query),
            "fragment" => Some(ResponseMode::Fragment),
            "form_post" => Some(ResponseMode::FormPost),
            _ => self.custom.get(name).cloned().map(ResponseMode::Custom),
        }
    }

    /// Names of every supported mode, built-in first.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        BUILTIN_RESPONSE_MODES
            .iter()
            .map(|m| (*m).to_string())
            .chain(self.custom.keys().cloned())
            .collect()
    }
}

impl fmt::Debug for ResponseModes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseModes")
            .field("custom", &self.custom.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Flattens response members into wire parameters. Strings are sent
/// as-is, other JSON values in their JSON form, `null` is skipped.
#[must_use]
pub fn to_parameters(members: &Map<String, Value>) -> BTreeMap<String, String> {
    members
        .iter()
        .filter_map(|(name, value)| {
            let value = match value {
                Value::Null => return None,
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            Some((name.clone(), value))
        })
        .collect()
}

/// OpenID Connect Session Management `session_state`:
/// `SHA256(client_id ␠ origin ␠ auth_time ␠ salt) "." salt`.
///
/// # Errors
///
/// Returns an error if `redirect_uri` is not a URL.
pub fn session_state(client_id: &str, redirect_uri: &str, auth_time: Option<i64>) -> AuthResult<String> {
    let origin = parse(redirect_uri)?.origin().ascii_serialization();
    let mut salt = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut salt);
    let salt = hex::encode(salt);
    let auth_time = auth_time.map(|t| t.to_string()).unwrap_or_default();

    let digest = Sha256::digest(format!("{client_id} {origin} {auth_time} {salt}").as_bytes());
    Ok(format!("{}.{salt}", hex::encode(digest)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parameters() -> BTreeMap<String, String> {
        [("code", "abc"), ("state", "a b")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_default_mode() {
        assert_eq!(default_response_mode("code"), "query");
        assert_eq!(default_response_mode("none"), "query");
        assert_eq!(default_response_mode("code id_token"), "fragment");
        assert_eq!(default_response_mode("id_token"), "fragment");
    }

    #[test]
    fn test_query_and_fragment() {
        let modes = ResponseModes::default();
        let query = modes
            .get("query")
            .unwrap()
            .deliver("https://rp.example.com/cb?keep=1", &parameters())
            .unwrap();
        let AuthorizationResponse::Redirect(url) = query else {
            panic!("expected redirect");
        };
        assert_eq!(url.query(), Some("keep=1&code=abc&state=a+b"));

        let fragment = modes
            .get("fragment")
            .unwrap()
            .deliver("https://rp.example.com/cb", &parameters())
            .unwrap();
        let AuthorizationResponse::Redirect(url) = fragment else {
            panic!("expected redirect");
        };
        assert_eq!(url.fragment(), Some("code=abc&state=a+b"));
        assert!(url.query().is_none());
    }

    #[test]
    fn test_form_post() {
        let response = ResponseModes::default()
            .get("form_post")
            .unwrap()
            .deliver("https://rp.example.com/cb", &parameters())
            .unwrap();
        assert_eq!(
            response,
            AuthorizationResponse::FormPost {
                action: "https://rp.example.com/cb".to_string(),
                fields: parameters(),
            }
        );
    }

    #[test]
    fn test_custom_registration() {
        let mut modes = ResponseModes::default();
        let handler: ResponseModeHandler = Arc::new(|uri, params| {
            Ok(AuthorizationResponse::Rendered {
                content_type: "application/json".to_string(),
                body: serde_json::json!({"uri": uri, "params": params}).to_string(),
            })
        });

        modes.register("web_message", handler.clone()).unwrap();
        assert!(modes.register("web_message", handler.clone()).is_err());
        assert!(modes.register("query", handler.clone()).is_err());
        assert!(modes.register("bad name", handler).is_err());

        let response = modes
            .get("web_message")
            .unwrap()
            .deliver("https://rp.example.com/cb", &parameters())
            .unwrap();
        assert!(matches!(response, AuthorizationResponse::Rendered { .. }));
        assert_eq!(modes.names(), vec!["query", "fragment", "form_post", "web_message"]);
    }

    #[test]
    fn test_to_parameters() {
        let members = serde_json::json!({"code": "c", "expires_in": 3600, "skip": null});
        let params = to_parameters(members.as_object().unwrap());
        assert_eq!(params.get("expires_in").map(String::as_str), Some("3600"));
        assert!(!params.contains_key("skip"));
    }

    #[test]
    fn test_session_state_shape() {
        let value = session_state("rp", "https://rp.example.com/cb", Some(1)).unwrap();
        let (digest, salt) = value.split_once('.').unwrap();
        assert_eq!(digest.len(), 64);
        assert_eq!(salt.len(), 16);

        let expected = hex::encode(Sha256::digest(
            format!("rp https://rp.example.com 1 {salt}").as_bytes(),
        ));
        assert_eq!(digest, expected);
    }
}

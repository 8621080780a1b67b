//! Interaction necessity checks.
//!
//! [`CHECKS`] runs in a fixed order and the first check that yields an
//! outcome decides. Later checks rely on earlier ones having passed: every
//! check after the first may assume the session has an account.

use serde::{Deserialize, Serialize};

use super::resume::InteractionResult;
use crate::AuthResult;
use crate::error::AuthError;
use crate::oauth::authorize::AuthorizationRequest;
use crate::token::{JwtService, subject_for, validate_hint};
use crate::types::{Client, Session};

/// Why End-User interaction is needed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionOutcome {
    /// Error code sent to the client if interaction is not possible.
    pub error: String,
    pub error_description: String,
    /// Machine-readable reason, e.g. `no_session` or `consent_prompt`.
    pub reason: String,
    /// Text the interaction UI may show the End-User.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_description: Option<String>,
}

impl Default for InteractionOutcome {
    fn default() -> Self {
        Self {
            error: "interaction_required".to_string(),
            error_description: "interaction is required from the end-user".to_string(),
            reason: "interaction_required".to_string(),
            reason_description: None,
        }
    }
}

impl InteractionOutcome {
    fn new(
        error: &str,
        error_description: impl Into<String>,
        reason: impl Into<String>,
        reason_description: Option<String>,
    ) -> Self {
        Self {
            error: error.to_string(),
            error_description: error_description.into(),
            reason: reason.into(),
            reason_description,
        }
    }

    /// The error delivered to the client instead of interacting.
    #[must_use]
    pub fn to_error(&self) -> AuthError {
        AuthError::from_interaction(&self.error, self.error_description.clone())
    }
}

/// Everything a check may look at.
#[derive(Debug, Clone, Copy)]
pub struct CheckContext<'a> {
    pub session: &'a Session,
    pub client: &'a Client,
    pub request: &'a AuthorizationRequest,
    /// What the interaction resolved, empty outside of a resume.
    pub resolved: &'a InteractionResult,
    pub jwt: &'a JwtService,
    pub pairwise_salt: &'a str,
}

impl CheckContext<'_> {
    /// A prompt is outstanding when it was requested and this round of
    /// interaction did not resolve it.
    fn prompted(&self, prompt: &str) -> bool {
        self.request.prompted(prompt) && !self.resolved.resolves(prompt)
    }

    fn subject(&self) -> Option<String> {
        self.session
            .account_id()
            .map(|account| subject_for(account, self.client, self.pairwise_salt))
    }

    fn client_name(&self) -> &str {
        self.client.display_name()
    }
}

/// A single check.
pub type Check = fn(&CheckContext<'_>) -> AuthResult<Option<InteractionOutcome>>;

/// The checks in evaluation order.
pub const CHECKS: [Check; 9] = [
    no_session,
    login_prompt,
    max_age,
    claims_sub_value,
    essential_acrs,
    essential_acr,
    outstanding_prompt,
    client_not_authorized,
    id_token_hint,
];

/// Runs [`CHECKS`] and returns the first outcome.
///
/// # Errors
///
/// Returns `InvalidRequest` if an `id_token_hint` cannot be validated.
pub fn decide(ctx: &CheckContext<'_>) -> AuthResult<Option<InteractionOutcome>> {
    for check in CHECKS {
        if let Some(outcome) = check(ctx)? {
            return Ok(Some(outcome));
        }
    }
    Ok(None)
}

fn no_session(ctx: &CheckContext<'_>) -> AuthResult<Option<InteractionOutcome>> {
    if ctx.session.account_id().is_some() {
        return Ok(None);
    }
    Ok(Some(InteractionOutcome::new(
        "login_required",
        "End-User authentication is required",
        "no_session",
        Some("Please Sign-in to continue.".to_string()),
    )))
}

fn login_prompt(ctx: &CheckContext<'_>) -> AuthResult<Option<InteractionOutcome>> {
    if !ctx.prompted("login") {
        return Ok(None);
    }
    Ok(Some(InteractionOutcome::new(
        "login_required",
        "End-User authentication could not be obtained",
        "login_prompt",
        Some(format!("{} asks you to Sign-in again.", ctx.client_name())),
    )))
}

fn max_age(ctx: &CheckContext<'_>) -> AuthResult<Option<InteractionOutcome>> {
    if !ctx.session.past(ctx.request.max_age) {
        return Ok(None);
    }
    Ok(Some(InteractionOutcome::new(
        "login_required",
        "End-User re-authentication could not be obtained",
        "max_age",
        Some(format!("{} asks you to Sign-in again.", ctx.client_name())),
    )))
}

fn claims_sub_value(ctx: &CheckContext<'_>) -> AuthResult<Option<InteractionOutcome>> {
    let Some(requested) = ctx.request.claims.as_ref().and_then(|c| c.requested_sub()) else {
        return Ok(None);
    };
    if ctx.subject().is_some_and(|sub| requested.as_str() == Some(sub.as_str())) {
        return Ok(None);
    }
    Ok(Some(InteractionOutcome::new(
        "login_required",
        "requested subject could not be obtained",
        "claims_id_token_sub_value",
        Some(format!(
            "{} asks that you Sign-in with a specific account.",
            ctx.client_name()
        )),
    )))
}

fn session_acr_in(ctx: &CheckContext<'_>, values: &[serde_json::Value]) -> bool {
    ctx.session
        .acr
        .as_deref()
        .is_some_and(|acr| values.iter().any(|v| v.as_str() == Some(acr)))
}

fn essential_acrs(ctx: &CheckContext<'_>) -> AuthResult<Option<InteractionOutcome>> {
    let Some(values) = ctx
        .request
        .claims
        .as_ref()
        .and_then(|c| c.essential_acr_values())
    else {
        return Ok(None);
    };
    if session_acr_in(ctx, values) {
        return Ok(None);
    }
    Ok(Some(InteractionOutcome::new(
        "login_required",
        "none of the requested ACRs could not be obtained",
        "essential_acrs",
        Some(format!(
            "{} asks you to Sign-in using a specific method.",
            ctx.client_name()
        )),
    )))
}

fn essential_acr(ctx: &CheckContext<'_>) -> AuthResult<Option<InteractionOutcome>> {
    let Some(value) = ctx
        .request
        .claims
        .as_ref()
        .and_then(|c| c.essential_acr_value())
    else {
        return Ok(None);
    };
    if session_acr_in(ctx, std::slice::from_ref(value)) {
        return Ok(None);
    }
    Ok(Some(InteractionOutcome::new(
        "login_required",
        "requested ACR could not be obtained",
        "essential_acr",
        Some(format!(
            "{} asks you to Sign-in using a specific method.",
            ctx.client_name()
        )),
    )))
}

fn outstanding_prompt(ctx: &CheckContext<'_>) -> AuthResult<Option<InteractionOutcome>> {
    let Some(prompt) = ctx
        .request
        .prompts
        .iter()
        .find(|p| *p != "none" && *p != "login" && ctx.prompted(p))
    else {
        return Ok(None);
    };
    let (error, description) = if prompt == "consent" {
        (
            "consent_required",
            Some(format!("{} asks for your consent.", ctx.client_name())),
        )
    } else {
        ("interaction_required", None)
    };
    Ok(Some(InteractionOutcome::new(
        error,
        format!("prompt {prompt} was not resolved"),
        format!("{prompt}_prompt"),
        description,
    )))
}

fn client_not_authorized(ctx: &CheckContext<'_>) -> AuthResult<Option<InteractionOutcome>> {
    if ctx.session.sid_for(&ctx.client.client_id).is_some() {
        return Ok(None);
    }
    Ok(Some(InteractionOutcome::new(
        "consent_required",
        "client not authorized for End-User session yet",
        "client_not_authorized",
        Some(format!("{} asks for your consent.", ctx.client_name())),
    )))
}

fn id_token_hint(ctx: &CheckContext<'_>) -> AuthResult<Option<InteractionOutcome>> {
    let Some(hint) = ctx.request.id_token_hint.as_deref() else {
        return Ok(None);
    };
    let claims = validate_hint(ctx.jwt, hint, ctx.client).map_err(|err| {
        AuthError::invalid_request(format!("could not validate id_token_hint ({err})"))
    })?;
    let hinted = claims.get("sub").and_then(serde_json::Value::as_str);
    if hinted.is_some() && hinted == ctx.subject().as_deref() {
        return Ok(None);
    }
    Ok(Some(InteractionOutcome::new(
        "login_required",
        "id_token_hint and authenticated subject do not match",
        "id_token_hint",
        Some(format!(
            "{} asks that you Sign-in with a specific account.",
            ctx.client_name()
        )),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;
    use crate::interaction::resume::{ConsentResult, LoginResult};
    use crate::oauth::authorize::RedirectTarget;
    use crate::oauth::params::Params;
    use crate::oauth::respond::ResponseModes;
    use crate::token::{IdToken, SigningAlgorithm, SigningKeyPair};
    use crate::types::SubjectType;
    use std::time::Duration;
    use time::OffsetDateTime;

    struct Fixture {
        session: Session,
        client: Client,
        jwt: JwtService,
        resolved: InteractionResult,
    }

    impl Fixture {
        /// An authenticated session that already authorized the client.
        fn new() -> Self {
            let mut client = Client::new("rp", "secret");
            client.client_name = Some("Example RP".to_string());
            client.redirect_uris = vec!["https://rp.example.com/cb".to_string()];

            let mut session = Session::new();
            session.bind_account("alice");
            session.auth_time = Some(OffsetDateTime::now_utc().unix_timestamp());
            session.acr = Some("1".to_string());
            session.bind_sid("rp", "sid-1");

            let jwt = JwtService::new(
                SigningKeyPair::generate(SigningAlgorithm::RS256).unwrap(),
                "https://op.example.com",
            );

            Self {
                session,
                client,
                jwt,
                resolved: InteractionResult::default(),
            }
        }

        fn request(&self, pairs: &[(&str, &str)]) -> AuthorizationRequest {
            let mut params: Params = [
                ("client_id", "rp"),
                ("redirect_uri", "https://rp.example.com/cb"),
                ("response_type", "code"),
                ("scope", "openid"),
            ]
            .into_iter()
            .collect();
            for (k, v) in pairs {
                params.set(*k, *v);
            }
            let mut config = ProviderConfig::default();
            config.prompts.push("select_account".to_string());
            let modes = ResponseModes::default();
            let target = RedirectTarget::resolve(&params, &self.client, &modes).unwrap();
            AuthorizationRequest::validate(&params, &self.client, &target, &config, &modes).unwrap()
        }

        fn decide(&self, pairs: &[(&str, &str)]) -> AuthResult<Option<InteractionOutcome>> {
            let request = self.request(pairs);
            decide(&CheckContext {
                session: &self.session,
                client: &self.client,
                request: &request,
                resolved: &self.resolved,
                jwt: &self.jwt,
                pairwise_salt: "salt",
            })
        }

        fn reason(&self, pairs: &[(&str, &str)]) -> Option<String> {
            self.decide(pairs).unwrap().map(|o| o.reason)
        }

        fn hint_for(&self, account: &str) -> String {
            let claims = serde_json::json!({"sub": account});
            IdToken::new(claims.as_object().unwrap().clone())
                .sign(&self.jwt, &self.client, "salt", Duration::from_secs(60))
                .unwrap()
        }
    }

    #[test]
    fn test_passes_for_authorized_session() {
        assert!(Fixture::new().decide(&[]).unwrap().is_none());
    }

    #[test]
    fn test_no_session_wins_over_everything() {
        let mut fx = Fixture::new();
        fx.session = Session::new();
        let outcome = fx
            .decide(&[("prompt", "login consent"), ("max_age", "0")])
            .unwrap()
            .unwrap();
        assert_eq!(outcome.reason, "no_session");
        assert_eq!(outcome.error, "login_required");
        assert_eq!(outcome.reason_description.as_deref(), Some("Please Sign-in to continue."));
    }

    #[test]
    fn test_login_prompt_before_max_age_and_consent() {
        let mut fx = Fixture::new();
        fx.session.auth_time = Some(0);
        let outcome = fx
            .decide(&[("prompt", "login consent"), ("max_age", "10")])
            .unwrap()
            .unwrap();
        assert_eq!(outcome.reason, "login_prompt");
        assert_eq!(
            outcome.reason_description.as_deref(),
            Some("Example RP asks you to Sign-in again.")
        );

        assert_eq!(fx.reason(&[("max_age", "10")]).as_deref(), Some("max_age"));
    }

    #[test]
    fn test_resolved_login_clears_login_prompt() {
        let mut fx = Fixture::new();
        fx.resolved.login = Some(LoginResult {
            account: "alice".to_string(),
            remember: Some(true),
            acr: None,
            ts: None,
        });
        assert!(fx.reason(&[("prompt", "login")]).is_none());
    }

    #[test]
    fn test_claims_sub_value() {
        let fx = Fixture::new();
        let claims = |sub: &str| format!(r#"{{"id_token":{{"sub":{{"value":"{sub}"}}}}}}"#);

        assert!(fx.reason(&[("claims", claims("alice").as_str())]).is_none());
        assert_eq!(
            fx.reason(&[("claims", claims("bob").as_str())]).as_deref(),
            Some("claims_id_token_sub_value")
        );

        // Pairwise clients request their own view of the subject.
        let mut fx = Fixture::new();
        fx.client.subject_type = SubjectType::Pairwise;
        let pairwise = subject_for("alice", &fx.client, "salt");
        assert!(fx.reason(&[("claims", claims(&pairwise).as_str())]).is_none());
        assert!(fx.reason(&[("claims", claims("alice").as_str())]).is_some());
    }

    #[test]
    fn test_essential_acr_checks() {
        let fx = Fixture::new();
        let values = r#"{"id_token":{"acr":{"essential":true,"values":["2","3"]}}}"#;
        let value = r#"{"id_token":{"acr":{"essential":true,"value":"2"}}}"#;
        let both = r#"{"id_token":{"acr":{"essential":true,"values":["1"],"value":"2"}}}"#;
        let voluntary = r#"{"id_token":{"acr":{"values":["2"]}}}"#;

        assert_eq!(fx.reason(&[("claims", values)]).as_deref(), Some("essential_acrs"));
        assert_eq!(fx.reason(&[("claims", value)]).as_deref(), Some("essential_acr"));
        assert_eq!(fx.reason(&[("claims", both)]).as_deref(), Some("essential_acr"));
        assert!(fx.reason(&[("claims", voluntary)]).is_none());
    }

    #[test]
    fn test_outstanding_prompts() {
        let mut fx = Fixture::new();
        let outcome = fx.decide(&[("prompt", "consent")]).unwrap().unwrap();
        assert_eq!(outcome.error, "consent_required");
        assert_eq!(outcome.reason, "consent_prompt");
        assert_eq!(outcome.error_description, "prompt consent was not resolved");

        let outcome = fx.decide(&[("prompt", "select_account")]).unwrap().unwrap();
        assert_eq!(outcome.error, "interaction_required");
        assert_eq!(outcome.reason, "select_account_prompt");

        fx.resolved.consent = Some(ConsentResult::default());
        assert!(fx.reason(&[("prompt", "consent")]).is_none());
    }

    #[test]
    fn test_client_not_authorized() {
        let mut fx = Fixture::new();
        fx.session.unbind_client("rp");
        let outcome = fx.decide(&[]).unwrap().unwrap();
        assert_eq!(outcome.error, "consent_required");
        assert_eq!(outcome.reason, "client_not_authorized");

        // An outstanding prompt is reported before the missing authorization.
        assert_eq!(
            fx.reason(&[("prompt", "consent")]).as_deref(),
            Some("consent_prompt")
        );
    }

    #[test]
    fn test_id_token_hint() {
        let fx = Fixture::new();
        let alice = fx.hint_for("alice");
        let bob = fx.hint_for("bob");

        assert!(fx.reason(&[("id_token_hint", alice.as_str())]).is_none());
        assert_eq!(fx.reason(&[("id_token_hint", bob.as_str())]).as_deref(), Some("id_token_hint"));

        let err = fx.decide(&[("id_token_hint", "garbage")]).unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_request");
        assert!(err.error_description().starts_with("could not validate id_token_hint"));
    }

    #[test]
    fn test_outcome_to_error() {
        let outcome = InteractionOutcome::default();
        assert_eq!(outcome.to_error().oauth_error_code(), "interaction_required");
    }
}

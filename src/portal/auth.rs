//! SSO handshake against the identity provider.
//!
//! The portal's login is a fixed linear sequence of cross-domain hops. Each
//! hop issues one request and reads the `Location` header itself (the
//! intermediate redirects set cookies that must be retained), switching the
//! session's [`DomainProfile`] when the sequence crosses between the academic
//! host and the identity provider. Modeled as an explicit state machine so
//! the hop order and host switches are auditable in one place.

use anyhow::Context;
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::portal::crypto::encode_secret;
use crate::portal::errors::PortalError;
use crate::portal::json::parse_json_with_context;
use crate::portal::session::{DomainProfile, Session, redirect_target};

/// IdP endpoint that both issues the login challenge and accepts credentials.
const ACTION_AUTH_CHAIN: &str = "/idp/authcenter/ActionAuthChain";
/// IdP engine endpoint; bare GET during bootstrap, credentialed POST to mint
/// the SAML-style redirect.
const AUTHN_ENGINE: &str = "/idp/AuthnEngine";
/// Service-provider entity the chain is bound to.
const ENTITY_ID: &str = "jiaowu";
/// Authentication method selector for the credentialed POST.
const CURRENT_AUTH: &str = "urn_oasis_names_tc_SAML_2.0_ac_classes_BAMUsernamePassword";
/// Fixed chain identifier captured from the deployment's login page.
const AUTH_CHAIN_CODE: &str = "cc2fdbc3599b48a69d5c82a665256b6b";
/// The deployment accepts this placeholder instead of a solved captcha.
const CAPTCHA_PLACEHOLDER: &str = "验证码";
/// Authenticated-only page used as the liveness probe.
const PROBE_PATH: &str = "/jsxsd/framework/xsMain.htmlx";

/// Credentials as read from configuration. The password never persists past
/// encoding.
#[derive(Debug, Clone, Deserialize)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

/// Login-outcome JSON returned by the credentials POST.
#[derive(Debug, Deserialize)]
struct LoginOutcome {
    #[serde(rename = "loginFailed")]
    login_failed: String,
}

impl LoginOutcome {
    /// The IdP reports the *failure* flag as a string; only the literal
    /// `"false"` means the credentials were accepted.
    fn accepted(&self) -> bool {
        self.login_failed == "false"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Init,
    Bootstrapping,
    ChallengeIssued,
    CredentialsSubmitted,
    SsoExchange,
    Authenticated,
    Failed,
}

/// Drives the login sequence over a [`Session`].
pub struct Handshake<'a> {
    session: &'a mut Session,
    portal_base: Url,
    auth_base: Url,
    state: HandshakeState,
    /// Credential form body, reused verbatim by the SSO-exchange POST.
    login_form: Vec<(String, String)>,
}

impl<'a> Handshake<'a> {
    pub fn new(session: &'a mut Session, portal_base: Url, auth_base: Url) -> Self {
        Self {
            session,
            portal_base,
            auth_base,
            state: HandshakeState::Init,
            login_form: Vec::new(),
        }
    }

    /// Run the full sequence. Terminates in `Authenticated` (session marked
    /// live) or `Failed` ([`PortalError::AuthenticationFailed`]); transport
    /// errors abort wherever they occur, with no retry at this layer.
    pub async fn run(mut self, credential: &Credential) -> Result<(), PortalError> {
        loop {
            debug!(state = ?self.state, "handshake transition");
            self.state = match self.state {
                HandshakeState::Init => HandshakeState::Bootstrapping,
                HandshakeState::Bootstrapping => {
                    self.bootstrap().await?;
                    HandshakeState::ChallengeIssued
                }
                HandshakeState::ChallengeIssued => {
                    self.fetch_challenge().await?;
                    HandshakeState::CredentialsSubmitted
                }
                HandshakeState::CredentialsSubmitted => {
                    if self.submit_credentials(credential).await? {
                        HandshakeState::SsoExchange
                    } else {
                        HandshakeState::Failed
                    }
                }
                HandshakeState::SsoExchange => {
                    self.exchange_ticket().await?;
                    HandshakeState::Authenticated
                }
                HandshakeState::Authenticated => {
                    if check_login(self.session, &self.portal_base).await? {
                        info!("handshake complete, session authenticated");
                        return Ok(());
                    }
                    HandshakeState::Failed
                }
                HandshakeState::Failed => return Err(PortalError::AuthenticationFailed),
            };
        }
    }

    /// Chase the portal's initial redirect chain onto the identity provider.
    /// Entry action: portal-domain profile; switches to the IdP profile at
    /// the cross-domain hop.
    async fn bootstrap(&mut self) -> Result<(), PortalError> {
        self.session
            .set_profile(DomainProfile::for_base(&self.portal_base));

        let mut target = self.portal_base.clone();
        for _ in 0..3 {
            let resp = self.session.get(target).await?;
            target = redirect_target(&resp)
                .ok_or(PortalError::MissingRedirect { step: "bootstrap" })?;
        }

        // Third redirect points at the IdP; from here on the virtual host
        // routes on the IdP's header triple.
        self.session.set_profile(self.idp_profile());
        self.session.get(target).await?;
        Ok(())
    }

    /// Touch the IdP's challenge endpoints so it issues its own cookies.
    async fn fetch_challenge(&mut self) -> Result<(), PortalError> {
        self.session.get(self.auth_url(AUTHN_ENGINE, None)).await?;
        self.session
            .get(self.auth_url(ACTION_AUTH_CHAIN, Some(&format!("entityId={ENTITY_ID}"))))
            .await?;
        Ok(())
    }

    /// POST the encoded credentials; `true` when the IdP accepts them.
    async fn submit_credentials(&mut self, credential: &Credential) -> Result<bool, PortalError> {
        let encoded = encode_secret(&credential.password)?;
        self.login_form = vec![
            ("j_username".to_string(), credential.username.clone()),
            ("j_password".to_string(), encoded),
            ("j_checkcode".to_string(), CAPTCHA_PLACEHOLDER.to_string()),
            ("op".to_string(), "login".to_string()),
            ("spAuthChainCode".to_string(), AUTH_CHAIN_CODE.to_string()),
        ];

        let url = self.auth_url(ACTION_AUTH_CHAIN, None);
        let resp = self.session.post_form(url.clone(), &self.login_form, None).await?;
        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .context("reading login outcome body")?;

        let outcome: LoginOutcome =
            parse_json_with_context(&body).map_err(|source| PortalError::ParseFailed {
                status,
                url: url.to_string(),
                source,
            })?;
        debug!(login_failed = outcome.login_failed.as_str(), "login outcome");
        Ok(outcome.accepted())
    }

    /// Follow the SAML-style redirect chain back onto the portal to mint the
    /// session ticket. Entry action: still on the IdP profile; switches back
    /// to the portal profile once the logon URL lands there.
    async fn exchange_ticket(&mut self) -> Result<(), PortalError> {
        let url = self.auth_url(AUTHN_ENGINE, Some(&format!("currentAuth={CURRENT_AUTH}")));
        let resp = self.session.post_form(url, &self.login_form, None).await?;
        let sso_url =
            redirect_target(&resp).ok_or(PortalError::MissingRedirect { step: "sso" })?;

        let resp = self.session.get(sso_url).await?;
        let logon_url =
            redirect_target(&resp).ok_or(PortalError::MissingRedirect { step: "logon" })?;

        self.session
            .set_profile(DomainProfile::for_base(&self.portal_base));
        let resp = self.session.get(logon_url).await?;
        let ticket_url =
            redirect_target(&resp).ok_or(PortalError::MissingRedirect { step: "ticket" })?;
        self.session.get(ticket_url).await?;
        Ok(())
    }

    fn idp_profile(&self) -> DomainProfile {
        let challenge = self.auth_url(ACTION_AUTH_CHAIN, Some(&format!("entityId={ENTITY_ID}")));
        DomainProfile::for_base(&self.auth_base).with_referer(challenge.as_str())
    }

    fn auth_url(&self, path: &str, query: Option<&str>) -> Url {
        let mut url = self.auth_base.clone();
        url.set_path(path);
        url.set_query(query);
        url
    }
}

/// Probe an authenticated-only page; a non-error status means the session is
/// live. Doubles as the liveness check for cookie-seeded sessions.
pub async fn check_login(session: &mut Session, portal_base: &Url) -> Result<bool, PortalError> {
    let mut probe = portal_base.clone();
    probe.set_path(PROBE_PATH);
    let resp = session.get(probe).await?;
    let live = resp.status().is_success();
    if live {
        session.mark_authenticated();
    }
    Ok(live)
}

//! HTTP client for the login / fetch bookings / logout sequence.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use tracing::{debug, warn};

use super::ntlm;
use crate::error::DormaError;
use crate::models::Entry;
use crate::parse;

/// Session cookie issued by the portal on a successful login.
const SESSION_COOKIE_NAME: &str = "ASP.NET_SessionId";

/// Fixed portal paths; the host comes from the local store.
const LOGIN_PATH: &str = "/scripts/login.aspx";
const LOGOUT_PATH: &str = "/scripts/login.aspx?sessiontimedout=2";
const ENTRIES_PATH: &str = "/scripts/buchungen/buchungsdata2.aspx?mode=0";

/// Client for one Dorma portal.
/// Clone is cheap - reqwest::Client uses Arc internally for connection
/// pooling, which also keeps the NTLM handshake and the follow-up
/// requests on the same pooled connection.
#[derive(Clone)]
pub struct DormaClient {
    http: Client,
    scheme: String,
}

impl DormaClient {
    /// Create a client talking https to the portal.
    pub fn new() -> Result<Self> {
        Self::with_scheme("https")
    }

    /// Create a client with an explicit URL scheme. Intranet portals
    /// occasionally run plain http; tests use this against a local
    /// mock server.
    pub fn with_scheme(scheme: &str) -> Result<Self> {
        let http = Client::builder()
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            scheme: scheme.to_string(),
        })
    }

    /// Fetch today's attendance entries from the portal.
    ///
    /// Runs the full session: login, fetch the bookings page, parse
    /// it, log out. Logout runs whether or not the fetch succeeded;
    /// its own failure is logged and discarded because the result is
    /// already decided at that point.
    pub async fn fetch_entries(
        &self,
        host: &str,
        user: &str,
        pass: &str,
    ) -> Result<Vec<Entry>> {
        let session_id = self.login(host, user, pass).await?;

        let result = match self.current_bookings(host, user, pass, &session_id).await {
            Ok(body) => parse::parse_entries(&body),
            Err(e) => Err(e),
        };

        if let Err(e) = self.logout(host, user, pass, &session_id).await {
            warn!(host, error = %e, "logout failed");
        }

        result
    }

    /// Authenticate against the portal and return the session id.
    /// Requires status 200 and the session cookie; anything else is an
    /// `Authentication` error. No retries.
    async fn login(&self, host: &str, user: &str, pass: &str) -> Result<String> {
        let url = format!("{}://{}{}", self.scheme, host, LOGIN_PATH);
        let response = self
            .get_authenticated(&url, user, pass, None)
            .await
            .map_err(|e| DormaError::Authentication(e.to_string()))?;

        if response.status() != StatusCode::OK {
            return Err(DormaError::Authentication(format!(
                "server returned code {}",
                response.status().as_u16()
            ))
            .into());
        }

        let session_id = response
            .cookies()
            .find(|c| c.name() == SESSION_COOKIE_NAME)
            .map(|c| c.value().to_string());

        match session_id {
            Some(id) if !id.is_empty() => {
                debug!(host, "login succeeded");
                Ok(id)
            }
            _ => Err(DormaError::Authentication(format!(
                "missing cookie {}",
                SESSION_COOKIE_NAME
            ))
            .into()),
        }
    }

    /// Fetch the raw "Aktuelle Buchungen" page for the session.
    async fn current_bookings(
        &self,
        host: &str,
        user: &str,
        pass: &str,
        session_id: &str,
    ) -> Result<String> {
        let url = format!("{}://{}{}", self.scheme, host, ENTRIES_PATH);
        let response = self
            .get_authenticated(&url, user, pass, Some(session_id))
            .await
            .map_err(|e| DormaError::Fetch(e.to_string()))?;

        if response.status() != StatusCode::OK {
            return Err(DormaError::Fetch(format!(
                "server returned code {}",
                response.status().as_u16()
            ))
            .into());
        }

        response
            .text()
            .await
            .map_err(|e| DormaError::Fetch(format!("failed to read response body: {}", e)).into())
    }

    /// Terminate the session. Best-effort only; the caller logs and
    /// discards any error from here.
    async fn logout(
        &self,
        host: &str,
        user: &str,
        pass: &str,
        session_id: &str,
    ) -> Result<()> {
        let url = format!("{}://{}{}", self.scheme, host, LOGOUT_PATH);
        let response = self
            .get_authenticated(&url, user, pass, Some(session_id))
            .await?;

        if response.status() != StatusCode::OK {
            anyhow::bail!("server returned code {}", response.status().as_u16());
        }

        debug!(host, "logout succeeded");
        Ok(())
    }

    /// Issue a GET carrying Basic credentials, transparently running
    /// the NTLM handshake when the server demands it with a 401.
    async fn get_authenticated(
        &self,
        url: &str,
        user: &str,
        pass: &str,
        session_id: Option<&str>,
    ) -> Result<Response> {
        let initial = self
            .base_request(url, session_id)
            .basic_auth(user, Some(pass))
            .send()
            .await?;

        if initial.status() != StatusCode::UNAUTHORIZED || !offers_ntlm(&initial) {
            return Ok(initial);
        }
        debug!(url, "server demands NTLM, starting handshake");

        // Type 1: negotiate
        let negotiate = BASE64.encode(ntlm::negotiate_message());
        let challenged = self
            .base_request(url, session_id)
            .header(header::AUTHORIZATION, format!("NTLM {}", negotiate))
            .send()
            .await?;

        let challenge_b64 = ntlm_challenge_payload(&challenged)
            .ok_or_else(|| anyhow::anyhow!("server sent no NTLM challenge"))?;
        let challenge_bytes = BASE64
            .decode(challenge_b64)
            .context("NTLM challenge is not valid base64")?;
        let challenge = ntlm::parse_challenge(&challenge_bytes)?;

        // Type 3: authenticate
        let authenticate = BASE64.encode(ntlm::authenticate_message(&challenge, user, pass));
        let response = self
            .base_request(url, session_id)
            .header(header::AUTHORIZATION, format!("NTLM {}", authenticate))
            .send()
            .await?;

        Ok(response)
    }

    fn base_request(&self, url: &str, session_id: Option<&str>) -> RequestBuilder {
        let mut request = self.http.get(url);
        if let Some(id) = session_id {
            request = request.header(
                header::COOKIE,
                format!("{}={}", SESSION_COOKIE_NAME, id),
            );
        }
        request
    }
}

/// Whether a 401 response offers NTLM authentication.
fn offers_ntlm(response: &Response) -> bool {
    response
        .headers()
        .get_all(header::WWW_AUTHENTICATE)
        .iter()
        .any(|v| {
            v.to_str()
                .map(|s| s.trim_start().starts_with("NTLM"))
                .unwrap_or(false)
        })
}

/// Extract the base64 challenge payload from a `WWW-Authenticate:
/// NTLM <base64>` header, if present.
fn ntlm_challenge_payload(response: &Response) -> Option<&str> {
    response
        .headers()
        .get_all(header::WWW_AUTHENTICATE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|s| s.trim_start().strip_prefix("NTLM "))
        .map(str::trim)
}

//! Portal login via the single sign-on service.
//!
//! The session itself is the client's cookie jar, hence nothing here survives the process.

use reqwest::{
    Client,
    Response,
    StatusCode,
    Url,
    header::{ACCEPT, CONTENT_TYPE, ORIGIN},
};
use serde::{Deserialize, Serialize};

use crate::{api::read_json, config::Credentials, error::ApiError, prelude::*};

pub struct Session {
    client: Client,
    base_url: Url,
    sso_url: Url,
    credentials: Credentials,
    is_active: bool,
}

impl Session {
    pub fn new(client: Client, base_url: Url, credentials: Credentials) -> Self {
        let sso_url = sso_url(&base_url);
        Self { client, base_url, sso_url, credentials, is_active: false }
    }

    pub const fn client(&self) -> &Client {
        &self.client
    }

    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Log in, unless already logged in.
    pub async fn ensure_active(&mut self) -> Result<(), ApiError> {
        if !self.is_active {
            self.login().await?;
        }
        Ok(())
    }

    /// Whether the portal has rejected the session.
    ///
    /// It either answers with 401/403, or redirects to the SSO.
    pub fn is_expired(&self, response: &Response) -> bool {
        if matches!(response.status(), StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return true;
        }
        let url = response.url();
        let sso_origin = self.sso_url.origin();
        url.origin() == sso_origin
            && (sso_origin != self.base_url.origin()
                || url.path().starts_with("/connect/authorize"))
    }

    #[instrument(skip_all, fields(login = %self.credentials.login))]
    pub async fn login(&mut self) -> Result<(), ApiError> {
        info!("logging in…");
        self.is_active = false;

        let antiforgery_token = self.get_antiforgery_token().await?;
        let return_url = self.get_return_url().await?;
        let redirect_uri = self.post_credentials(&antiforgery_token, &return_url).await?;
        let form = self.get_oidc_form(&redirect_uri).await?;
        self.post_oidc_form(&form).await?;

        self.is_active = true;
        info!("logged in");
        Ok(())
    }

    async fn get_antiforgery_token(&self) -> Result<String, ApiError> {
        #[derive(Deserialize)]
        struct Antiforgery {
            #[serde(rename = "requestToken")]
            request_token: String,
        }

        const PATH: &str = "/api/antiforgery";
        let mut url = self.sso_url.clone();
        url.set_path(PATH);
        let response = self.send(PATH, self.client.get(url)).await?;
        Ok(read_json::<Antiforgery>(PATH, response).await?.request_token)
    }

    /// Open the portal to obtain the return URL which the SSO is going to redirect back to.
    async fn get_return_url(&self) -> Result<String, ApiError> {
        let response = self.send("/", self.client.get(self.base_url.clone())).await?;
        let return_url = response
            .url()
            .query_pairs()
            .find(|(key, _)| key == "ReturnUrl")
            .map(|(_, value)| value.into_owned())
            .unwrap_or_default();
        debug!(%return_url, "got the return URL");
        Ok(return_url)
    }

    /// Submit the credentials and get the URI to continue the OAuth flow with.
    async fn post_credentials(
        &self,
        antiforgery_token: &str,
        return_url: &str,
    ) -> Result<String, ApiError> {
        #[derive(Serialize)]
        struct LoginRequest<'a> {
            username: &'a str,
            password: &'a str,

            #[serde(rename = "returnUrl")]
            return_url: &'a str,

            #[serde(rename = "rememberMe")]
            remember_me: bool,
        }

        #[derive(Deserialize)]
        struct LoginResponse {
            #[serde(default, rename = "validationProblemDetails")]
            validation_problem_details: Option<serde_json::Value>,

            #[serde(default, rename = "redirectUri")]
            redirect_uri: Option<String>,
        }

        const PATH: &str = "/api/login";
        let mut url = self.sso_url.clone();
        url.set_path(PATH);
        let request = self
            .client
            .post(url)
            .header("requestverificationtoken", antiforgery_token)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .header(ORIGIN, self.sso_url.origin().ascii_serialization())
            .header("Sec-Fetch-Dest", "empty")
            .header("Sec-Fetch-Mode", "cors")
            .header("Sec-Fetch-Site", "same-origin")
            .json(&LoginRequest {
                username: &self.credentials.login,
                password: &self.credentials.password,
                return_url,
                remember_me: true,
            });
        let response: LoginResponse = read_json(PATH, self.send(PATH, request).await?).await?;

        if let Some(details) = response.validation_problem_details.filter(|it| !it.is_null()) {
            return Err(ApiError::authentication(format!("login validation failed: {details}")));
        }
        response
            .redirect_uri
            .filter(|uri| !uri.is_empty())
            .ok_or_else(|| ApiError::authentication("no redirect URI received from the login"))
    }

    async fn get_oidc_form(&self, redirect_uri: &str) -> Result<OidcForm, ApiError> {
        let url = self.sso_url.join(redirect_uri).map_err(|error| {
            ApiError::authentication(format!("invalid redirect URI `{redirect_uri}`: {error}"))
        })?;
        let response = self.send("/connect/authorize", self.client.get(url)).await?;
        let html = response
            .text()
            .await
            .map_err(|error| ApiError::transport("/connect/authorize", error))?;
        OidcForm::parse(&html)
            .ok_or_else(|| ApiError::authentication("login failed, check your credentials"))
    }

    async fn post_oidc_form(&self, form: &OidcForm) -> Result<(), ApiError> {
        const PATH: &str = "/signin-oidc";
        let mut url = self.base_url.clone();
        url.set_path(PATH);
        let response = self.send(PATH, self.client.post(url).form(form)).await?;
        if self.is_expired(&response) {
            return Err(ApiError::authentication("the portal did not accept the sign-in"));
        }
        Ok(())
    }

    /// Send a login request.
    ///
    /// Bad request, unauthorised and forbidden mean that the portal did not accept us.
    /// Any other error status, such as a rate limit, is transient.
    async fn send(
        &self,
        path: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<Response, ApiError> {
        let response = request.send().await.map_err(|error| ApiError::transport(path, error))?;
        let status = response.status();
        if matches!(
            status,
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            return Err(ApiError::authentication(format!("`{path}` answered with {status}")));
        }
        response.error_for_status().map_err(|error| ApiError::transport(path, error))
    }
}

/// Derive the SSO URL: `mijn.greenchoice.nl` → `sso.greenchoice.nl`.
fn sso_url(base_url: &Url) -> Url {
    let mut sso_url = base_url.clone();
    if let Some(host) = base_url.host_str().and_then(|host| host.strip_prefix("mijn."))
        && sso_url.set_host(Some(&format!("sso.{host}"))).is_err()
    {
        return base_url.clone();
    }
    sso_url
}

/// Hidden inputs of the OpenID Connect form that the SSO hands back.
#[derive(Debug, Eq, PartialEq, Serialize)]
struct OidcForm {
    code: String,
    scope: String,
    state: String,
    session_state: String,
}

impl OidcForm {
    fn parse(html: &str) -> Option<Self> {
        let inputs = parse_inputs(html);
        let value = |name: &str| {
            inputs.iter().find(|(input_name, _)| input_name == name).map(|(_, value)| value.clone())
        };
        Some(Self {
            code: value("code")?,
            scope: value("scope")?.replace(' ', "+"),
            state: value("state")?,
            session_state: value("session_state")?,
        })
    }
}

/// Extract `(name, value)` of every `<input>` in the document.
fn parse_inputs(html: &str) -> Vec<(String, String)> {
    let mut inputs = Vec::new();
    let mut rest = html;
    while let Some(start) = find_ignore_ascii_case(rest, "<input") {
        rest = &rest[start + "<input".len()..];
        let end = find_tag_end(rest).unwrap_or(rest.len());
        let tag = &rest[..end];
        if let Some(name) = attribute(tag, "name") {
            inputs.push((name, attribute(tag, "value").unwrap_or_default()));
        }
        rest = &rest[end..];
    }
    inputs
}

/// Position of the `>` closing a tag, skipping quoted attribute values.
fn find_tag_end(tag: &str) -> Option<usize> {
    let mut quote = None;
    for (index, character) in tag.char_indices() {
        match (quote, character) {
            (None, '>') => return Some(index),
            (None, '"' | '\'') => quote = Some(character),
            (Some(open), _) if open == character => quote = None,
            _ => {}
        }
    }
    None
}

fn find_ignore_ascii_case(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .as_bytes()
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle.as_bytes()))
}

/// Read a quoted attribute value from the inside of a tag.
fn attribute(tag: &str, name: &str) -> Option<String> {
    let mut rest = tag;
    loop {
        let position = find_ignore_ascii_case(rest, name)?;
        let preceded_by_space =
            rest[..position].chars().next_back().is_none_or(char::is_whitespace);
        rest = &rest[position + name.len()..];
        let after_name = rest.trim_start();
        if !preceded_by_space || !after_name.starts_with('=') {
            continue;
        }
        let after_equals = after_name[1..].trim_start();
        let quote = after_equals.chars().next()?;
        if quote != '"' && quote != '\'' {
            let end = after_equals.find(char::is_whitespace).unwrap_or(after_equals.len());
            return Some(decode_entities(&after_equals[..end]));
        }
        let value = &after_equals[1..];
        let end = value.find(quote)?;
        return Some(decode_entities(&value[..end]));
    }
}

fn decode_entities(value: &str) -> String {
    let mut decoded = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find('&') {
        decoded.push_str(&rest[..start]);
        rest = &rest[start..];
        let Some(end) = rest.find(';') else {
            break;
        };
        let entity = &rest[1..end];
        let character = match entity {
            "amp" => Some('&'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "lt" => Some('<'),
            "gt" => Some('>'),
            _ => entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                .and_then(char::from_u32),
        };
        if let Some(character) = character {
            decoded.push(character);
            rest = &rest[end + 1..];
        } else {
            decoded.push('&');
            rest = &rest[1..];
        }
    }
    decoded.push_str(rest);
    decoded
}

//! OAuth2 plumbing against the identity platform v2.0 endpoints

use oauth2::basic::{
    BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse,
    BasicTokenType,
};
use oauth2::reqwest::async_http_client;
use oauth2::{
    AuthUrl, AuthorizationCode, Client, ClientId, CsrfToken, DeviceAuthorizationUrl,
    ErrorResponse, ExtraTokenFields, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl,
    RefreshToken, RequestTokenError, Scope, StandardDeviceAuthorizationResponse,
    StandardRevocableToken, StandardTokenResponse, TokenUrl,
};
use serde::{Deserialize, Serialize};
use url::Url;

use super::UserAgent;
use crate::client::Prompt;
use crate::config::{Authority, IdentityOptions};
use crate::error::ClientError;

/// Scopes added to every login so an ID token and a refresh token come back.
pub const LOGIN_SCOPES: [&str; 3] = ["openid", "profile", "offline_access"];

/// The token endpoint returns an ID token next to the access token.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdTokenFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

impl ExtraTokenFields for IdTokenFields {}

pub type EntraTokenResponse = StandardTokenResponse<IdTokenFields, BasicTokenType>;

pub type EntraClient = Client<
    BasicErrorResponse,
    EntraTokenResponse,
    BasicTokenType,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
>;

/// Redirect request ready to be opened in a user agent.
pub struct AuthorizeRequest {
    pub url: Url,
    pub state: String,
    pub pkce_verifier: String,
}

#[derive(Debug, Deserialize)]
struct ServerError {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

fn bad_url(what: &str, err: impl std::fmt::Display) -> ClientError {
    ClientError::invalid_config(format!("Invalid {}: {}", what, err))
}

/// Build the OAuth2 client from the identity options
pub fn build_client(options: &IdentityOptions) -> Result<EntraClient, ClientError> {
    let authority = &options.authority;
    let auth_url =
        AuthUrl::new(authority.authorize_endpoint()).map_err(|e| bad_url("authority", e))?;
    let token_url =
        TokenUrl::new(authority.token_endpoint()).map_err(|e| bad_url("authority", e))?;
    let device_url = DeviceAuthorizationUrl::new(authority.device_code_endpoint())
        .map_err(|e| bad_url("authority", e))?;
    let redirect_url =
        RedirectUrl::new(options.redirect_uri.clone()).map_err(|e| bad_url("redirect URI", e))?;

    Ok(EntraClient::new(
        ClientId::new(options.client_id.clone()),
        None,
        auth_url,
        Some(token_url),
    )
    .set_device_authorization_url(device_url)
    .set_redirect_uri(redirect_url))
}

/// Requested scopes plus the OIDC scopes, without duplicates.
pub fn with_login_scopes(scopes: &[String]) -> Vec<String> {
    let mut all = scopes.to_vec();
    for s in LOGIN_SCOPES {
        if !all.iter().any(|existing| existing.eq_ignore_ascii_case(s)) {
            all.push(s.to_string());
        }
    }
    all
}

/// Map a token endpoint failure onto a client error.
pub fn request_error<RE, T>(err: RequestTokenError<RE, T>) -> ClientError
where
    RE: std::error::Error + 'static,
    T: ErrorResponse + 'static,
{
    match err {
        RequestTokenError::ServerResponse(resp) => {
            match serde_json::to_value(&resp).and_then(serde_json::from_value::<ServerError>) {
                Ok(server) => ClientError::new(
                    server.error,
                    server.error_description.unwrap_or_default(),
                ),
                Err(_) => ClientError::new("server_error", format!("{:?}", resp)),
            }
        }
        RequestTokenError::Request(e) => ClientError::network(e.to_string()),
        other => ClientError::new("server_error", other.to_string()),
    }
}

/// Authorization code request with PKCE.
pub fn authorize_request(
    client: &EntraClient,
    scopes: &[String],
    prompt: Option<Prompt>,
    login_hint: Option<&str>,
) -> AuthorizeRequest {
    let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();
    let mut request = client
        .authorize_url(CsrfToken::new_random)
        .set_pkce_challenge(challenge);
    for scope in scopes {
        request = request.add_scope(Scope::new(scope.clone()));
    }
    if let Some(prompt) = prompt {
        request = request.add_extra_param("prompt", prompt.as_str());
    }
    if let Some(hint) = login_hint {
        request = request.add_extra_param("login_hint", hint.to_string());
    }
    let (url, csrf) = request.url();

    AuthorizeRequest {
        url,
        state: csrf.secret().to_string(),
        pkce_verifier: verifier.secret().to_string(),
    }
}

/// Redeem an authorization code.
pub async fn exchange_code(
    client: &EntraClient,
    code: &str,
    pkce_verifier: &str,
) -> Result<EntraTokenResponse, ClientError> {
    client
        .exchange_code(AuthorizationCode::new(code.to_string()))
        .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier.to_string()))
        .request_async(async_http_client)
        .await
        .map_err(request_error)
}

/// Device code flow: show the code, then poll until the user finishes.
pub async fn device_code_flow(
    client: &EntraClient,
    scopes: &[String],
    user_agent: &dyn UserAgent,
) -> Result<EntraTokenResponse, ClientError> {
    let mut request = client
        .exchange_device_code()
        .map_err(|e| ClientError::invalid_config(e.to_string()))?;
    for scope in scopes {
        request = request.add_scope(Scope::new(scope.clone()));
    }
    let details: StandardDeviceAuthorizationResponse = request
        .request_async(async_http_client)
        .await
        .map_err(request_error)?;

    user_agent.show_device_code(details.verification_uri().as_str(), details.user_code().secret());

    client
        .exchange_device_access_token(&details)
        .request_async(async_http_client, tokio::time::sleep, None)
        .await
        .map_err(request_error)
}

/// Redeem a refresh token for the given scopes.
pub async fn refresh(
    client: &EntraClient,
    refresh_token: &str,
    scopes: &[String],
) -> Result<EntraTokenResponse, ClientError> {
    let refresh_token = RefreshToken::new(refresh_token.to_string());
    let mut request = client.exchange_refresh_token(&refresh_token);
    for scope in scopes {
        request = request.add_scope(Scope::new(scope.clone()));
    }
    request
        .request_async(async_http_client)
        .await
        .map_err(request_error)
}

/// End-session URL of the authority.
pub fn logout_url(
    authority: &Authority,
    post_logout_redirect_uri: &str,
    logout_hint: Option<&str>,
) -> Result<Url, ClientError> {
    let mut params = vec![("post_logout_redirect_uri", post_logout_redirect_uri)];
    if let Some(hint) = logout_hint {
        params.push(("logout_hint", hint));
    }
    Url::parse_with_params(&authority.logout_endpoint(), &params)
        .map_err(|e| bad_url("authority", e))
}

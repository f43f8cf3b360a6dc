/// Keystone identity API client
use async_trait::async_trait;
use reqwest::{header, Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use super::credential::CredentialBackend;
use super::models::*;
use crate::config::IdentityConfig;
use crate::error::{Error, Result};

const SUBJECT_TOKEN_HEADER: &str = "X-Subject-Token";
const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

/// Authenticated Keystone v3 client
///
/// A client built by `authenticate` requests a fresh token and retries once
/// when the identity service rejects the current one.
#[derive(Clone)]
pub struct KeystoneClient {
    client: Client,
    base_url: Url,
    identity: Option<IdentityConfig>,
    token: Arc<RwLock<String>>,
}

impl KeystoneClient {
    /// Authenticate with username/password and build a client carrying the token
    pub async fn authenticate(config: &IdentityConfig) -> Result<Self> {
        let base_url = base_url(&config.auth_url)?;
        let client = http_client()?;
        let token = issue_token(&client, &base_url, config).await?;

        info!(auth_url = %config.auth_url, "Authenticated against identity service");

        Ok(Self {
            client,
            base_url,
            identity: Some(config.clone()),
            token: Arc::new(RwLock::new(token)),
        })
    }

    /// Build a client from an existing token
    ///
    /// Such a client cannot re-authenticate once the token expires.
    pub fn with_token(base_url: Url, token: &str) -> Result<Self> {
        header::HeaderValue::from_str(token)
            .map_err(|_| Error::auth_backend("invalid token format"))?;

        Ok(Self {
            client: http_client()?,
            base_url,
            identity: None,
            token: Arc::new(RwLock::new(token.to_string())),
        })
    }

    async fn send(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<Response> {
        let url = join(&self.base_url, endpoint)?;
        debug!("{} {}", method, url);

        let response = self.send_once(method.clone(), url.clone(), body).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }
        let Some(identity) = &self.identity else {
            return Ok(response);
        };

        warn!("Identity token rejected, re-authenticating");
        let token = issue_token(&self.client, &self.base_url, identity).await?;
        *self.token.write().await = token;

        self.send_once(method, url, body).await
    }

    async fn send_once(
        &self,
        method: Method,
        url: Url,
        body: Option<&serde_json::Value>,
    ) -> Result<Response> {
        let token = self.token.read().await.clone();
        let mut request = self
            .client
            .request(method.clone(), url)
            .header(AUTH_TOKEN_HEADER, token);
        if let Some(body) = body {
            request = request.json(body);
        }

        request
            .send()
            .await
            .map_err(|e| Error::auth_backend(format!("failed to send {} request: {}", method, e)))
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        let response = self.send(Method::GET, endpoint, None).await?;
        handle_response(response).await
    }

    async fn post<T: Serialize, R: DeserializeOwned>(&self, endpoint: &str, body: &T) -> Result<R> {
        let body = serde_json::to_value(body)?;
        let response = self.send(Method::POST, endpoint, Some(&body)).await?;
        handle_response(response).await
    }

    async fn delete(&self, endpoint: &str) -> Result<()> {
        let response = self.send(Method::DELETE, endpoint, None).await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(error_for_status(status, &body))
        }
    }
}

fn http_client() -> Result<Client> {
    let mut headers = header::HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );

    Client::builder()
        .default_headers(headers)
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .map_err(|e| Error::auth_backend(format!("failed to create HTTP client: {}", e)))
}

/// Request a project scoped token with password authentication
async fn issue_token(client: &Client, base_url: &Url, config: &IdentityConfig) -> Result<String> {
    let request = AuthRequest {
        auth: Auth {
            identity: Identity {
                methods: vec!["password".to_string()],
                password: PasswordMethod {
                    user: PasswordUser {
                        name: config.get_username()?,
                        domain: DomainRef {
                            name: config.user_domain_name.clone(),
                        },
                        password: config.get_password()?,
                    },
                },
            },
            scope: Scope {
                project: ProjectRef {
                    name: config.get_project_name()?,
                    domain: DomainRef {
                        name: config.project_domain_name.clone(),
                    },
                },
            },
        },
    };

    let url = join(base_url, "auth/tokens")?;
    debug!("POST {}", url);

    let response = client
        .post(url)
        .json(&request)
        .send()
        .await
        .map_err(|e| Error::auth_backend(format!("failed to reach identity service: {}", e)))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(error_for_status(status, &body));
    }

    response
        .headers()
        .get(SUBJECT_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| Error::auth_backend("identity service returned no token"))
}

#[async_trait]
impl CredentialBackend for KeystoneClient {
    async fn create_application_credential(
        &self,
        user_id: &str,
        name: &str,
        description: &str,
    ) -> Result<ApplicationCredential> {
        let request = CreateApplicationCredentialRequest {
            application_credential: NewApplicationCredential {
                name: name.to_string(),
                description: description.to_string(),
            },
        };

        let response: ApplicationCredentialResponse = self
            .post(&format!("users/{}/application_credentials", user_id), &request)
            .await?;
        Ok(response.application_credential)
    }

    async fn find_application_credential(
        &self,
        user_id: &str,
        name: &str,
    ) -> Result<ApplicationCredential> {
        let response: ApplicationCredentialListResponse = self
            .get(&format!(
                "users/{}/application_credentials?name={}",
                user_id, name
            ))
            .await?;

        response
            .application_credentials
            .into_iter()
            .find(|c| c.name == name)
            .ok_or_else(|| Error::not_found("ApplicationCredential", name))
    }

    async fn delete_application_credential(&self, user_id: &str, id: &str) -> Result<()> {
        self.delete(&format!("users/{}/application_credentials/{}", user_id, id))
            .await
    }
}

/// Handle API response, checking for errors
async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();

    if status.is_success() {
        response
            .json::<T>()
            .await
            .map_err(|e| Error::auth_backend(format!("failed to parse API response: {}", e)))
    } else {
        let body = response.text().await.unwrap_or_default();
        Err(error_for_status(status, &body))
    }
}

/// Map a failed Keystone response to a driver error
fn error_for_status(status: StatusCode, body: &str) -> Error {
    let message = serde_json::from_str::<ErrorResponse>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.to_string());

    if status == StatusCode::NOT_FOUND {
        Error::not_found("identity resource", message)
    } else {
        Error::auth_backend_status(status.as_u16(), message)
    }
}

/// Normalise the auth URL so relative joins land under `/v3/`
fn base_url(auth_url: &str) -> Result<Url> {
    let mut raw = auth_url.trim_end_matches('/').to_string();
    if !raw.ends_with("/v3") {
        raw.push_str("/v3");
    }
    raw.push('/');
    Url::parse(&raw).map_err(|e| Error::Config(format!("invalid auth_url {}: {}", auth_url, e)))
}

fn join(base: &Url, endpoint: &str) -> Result<Url> {
    base.join(endpoint)
        .map_err(|e| Error::auth_backend(format!("invalid endpoint {}: {}", endpoint, e)))
}

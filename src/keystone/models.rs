/// Keystone v3 API data models
use serde::{Deserialize, Serialize};

/// Keystone application credential
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationCredential {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Only returned by the create call
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
}

/// Response wrapping a single application credential
#[derive(Debug, Deserialize)]
pub struct ApplicationCredentialResponse {
    pub application_credential: ApplicationCredential,
}

/// Response listing application credentials
#[derive(Debug, Deserialize)]
pub struct ApplicationCredentialListResponse {
    pub application_credentials: Vec<ApplicationCredential>,
}

/// Request body for creating an application credential
#[derive(Debug, Serialize)]
pub struct CreateApplicationCredentialRequest {
    pub application_credential: NewApplicationCredential,
}

#[derive(Debug, Serialize)]
pub struct NewApplicationCredential {
    pub name: String,
    pub description: String,
}

/// Password authentication request
#[derive(Debug, Serialize)]
pub struct AuthRequest {
    pub auth: Auth,
}

#[derive(Debug, Serialize)]
pub struct Auth {
    pub identity: Identity,
    pub scope: Scope,
}

#[derive(Debug, Serialize)]
pub struct Identity {
    pub methods: Vec<String>,
    pub password: PasswordMethod,
}

#[derive(Debug, Serialize)]
pub struct PasswordMethod {
    pub user: PasswordUser,
}

#[derive(Debug, Serialize)]
pub struct PasswordUser {
    pub name: String,
    pub domain: DomainRef,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct Scope {
    pub project: ProjectRef,
}

#[derive(Debug, Serialize)]
pub struct ProjectRef {
    pub name: String,
    pub domain: DomainRef,
}

#[derive(Debug, Serialize)]
pub struct DomainRef {
    pub name: String,
}

/// Keystone error body
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Deserialize)]
pub struct ErrorDetails {
    pub code: u16,
    pub message: String,
    #[serde(default)]
    pub title: Option<String>,
}

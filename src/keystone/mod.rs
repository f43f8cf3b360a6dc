/// OpenStack identity (Keystone) integration
pub mod client;
pub mod credential;
pub mod models;

pub use client::KeystoneClient;
pub use credential::{Credential, CredentialBackend, CredentialManager};

//! # Account directory
//! Users with API keys, clients, and the user/client association used to
//! resolve who is submitting and which client a submission belongs to.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::{Arc, RwLock};
use tracing::info;

use crate::error::DirectoryError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub username: String,
    pub email: String,
    pub api_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Client {
    pub name: String,
    /// API keys of associated users, in association order.
    pub authorized_user_keys: Vec<String>,
}

#[async_trait]
pub trait AccountDirectory: Send + Sync {
    async fn create_user(&self, username: &str, email: &str) -> Result<User, DirectoryError>;
    async fn create_client(&self, name: &str) -> Result<Client, DirectoryError>;
    async fn associate(&self, client_name: &str, username: &str) -> Result<Client, DirectoryError>;
    async fn resolve_actor(&self, api_key: &str) -> Option<User>;
    async fn client(&self, name: &str) -> Option<Client>;
    /// First client (in creation order) the key is associated with.
    async fn client_by_user(&self, api_key: &str) -> Option<Client>;
    async fn users_by_keys(&self, keys: &[String]) -> Vec<User>;
}

pub type DynDirectory = Arc<dyn AccountDirectory>;

/// 16 random bytes, hex-encoded.
pub fn generate_api_key() -> String {
    let bytes: [u8; 16] = rand::random();
    hex(&bytes)
}

/// Short, non-reversible key id for logs. Raw keys are never logged.
pub fn key_fingerprint(api_key: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(api_key.as_bytes());
    hex(&digest[..6])
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

fn required<'a>(value: &'a str, field: &'static str) -> Result<&'a str, DirectoryError> {
    let v = value.trim();
    if v.is_empty() {
        Err(DirectoryError::EmptyField(field))
    } else {
        Ok(v)
    }
}

#[derive(Debug, Default)]
struct Inner {
    /// api_key → user
    users: HashMap<String, User>,
    /// creation order
    clients: Vec<Client>,
}

#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    inner: RwLock<Inner>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountDirectory for InMemoryDirectory {
    async fn create_user(&self, username: &str, email: &str) -> Result<User, DirectoryError> {
        let username = required(username, "username")?;
        let email = required(email, "email")?;

        let mut g = self.inner.write().expect("directory lock poisoned");
        if g.users.values().any(|u| u.email.eq_ignore_ascii_case(email)) {
            return Err(DirectoryError::EmailTaken(email.to_string()));
        }
        let user = User {
            username: username.to_string(),
            email: email.to_string(),
            api_key: generate_api_key(),
        };
        g.users.insert(user.api_key.clone(), user.clone());
        info!(target: "directory", username, key = %key_fingerprint(&user.api_key), "user created");
        Ok(user)
    }

    async fn create_client(&self, name: &str) -> Result<Client, DirectoryError> {
        let name = required(name, "name")?;

        let mut g = self.inner.write().expect("directory lock poisoned");
        if g.clients.iter().any(|c| c.name == name) {
            return Err(DirectoryError::ClientExists(name.to_string()));
        }
        let client = Client {
            name: name.to_string(),
            authorized_user_keys: Vec::new(),
        };
        g.clients.push(client.clone());
        info!(target: "directory", client = name, "client created");
        Ok(client)
    }

    async fn associate(&self, client_name: &str, username: &str) -> Result<Client, DirectoryError> {
        let mut g = self.inner.write().expect("directory lock poisoned");
        let key = g
            .users
            .values()
            .find(|u| u.username == username)
            .map(|u| u.api_key.clone())
            .ok_or_else(|| DirectoryError::UserNotFound(username.to_string()))?;
        let client = g
            .clients
            .iter_mut()
            .find(|c| c.name == client_name)
            .ok_or_else(|| DirectoryError::ClientNotFound(client_name.to_string()))?;
        if client.authorized_user_keys.contains(&key) {
            return Err(DirectoryError::AlreadyAssociated {
                username: username.to_string(),
                client: client_name.to_string(),
            });
        }
        client.authorized_user_keys.push(key);
        info!(target: "directory", client = client_name, username, "user associated");
        Ok(client.clone())
    }

    async fn resolve_actor(&self, api_key: &str) -> Option<User> {
        let g = self.inner.read().expect("directory lock poisoned");
        g.users.get(api_key).cloned()
    }

    async fn client(&self, name: &str) -> Option<Client> {
        let g = self.inner.read().expect("directory lock poisoned");
        g.clients.iter().find(|c| c.name == name).cloned()
    }

    async fn client_by_user(&self, api_key: &str) -> Option<Client> {
        let g = self.inner.read().expect("directory lock poisoned");
        g.clients
            .iter()
            .find(|c| c.authorized_user_keys.iter().any(|k| k == api_key))
            .cloned()
    }

    async fn users_by_keys(&self, keys: &[String]) -> Vec<User> {
        let g = self.inner.read().expect("directory lock poisoned");
        keys.iter().filter_map(|k| g.users.get(k).cloned()).collect()
    }
}

//! JSON file-backed user directory.
//!
//! Users are registered out of band; this store only resolves a sender phone
//! number to an owner id. Both sides of the comparison are normalized, so
//! registered numbers may be stored with or without the mobile "9" digit.

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::adapters::UserDirectory;
use crate::ingest::normalize_phone;

/// A registered user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub phone: String,
}

/// User directory over a JSON file (array of users).
pub struct JsonUserDirectory {
    path: PathBuf,
}

impl JsonUserDirectory {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    async fn load(&self) -> Result<Vec<User>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read user directory: {}", self.path.display()))?;

        serde_json::from_str(&content).context("Failed to parse user directory JSON")
    }
}

#[async_trait]
impl UserDirectory for JsonUserDirectory {
    async fn find_user_id_by_phone(&self, phone: &str) -> Result<Option<String>> {
        let target = normalize_phone(phone);
        let users = self.load().await?;
        Ok(users
            .into_iter()
            .find(|u| normalize_phone(&u.phone) == target)
            .map(|u| u.id))
    }
}

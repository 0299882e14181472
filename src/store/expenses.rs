//! JSON file-backed expense store.
//!
//! Committed expenses live in a single versioned JSON document, loaded and
//! rewritten whole on each commit. Commits re-validate the candidate and
//! assign the id.

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::adapters::ExpenseSink;
use crate::domain::Expense;

/// On-disk document shape
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ExpenseFile {
    version: u32,
    expenses: Vec<Expense>,
}

impl Default for ExpenseFile {
    fn default() -> Self {
        Self {
            version: 1,
            expenses: Vec::new(),
        }
    }
}

/// Expense store over a JSON file.
pub struct JsonExpenseStore {
    path: PathBuf,
    // Serializes load-modify-save cycles between concurrent commits
    write_lock: Mutex<()>,
}

impl JsonExpenseStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<ExpenseFile> {
        if !self.path.exists() {
            return Ok(ExpenseFile::default());
        }

        let content = fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read expense store: {}", self.path.display()))?;

        serde_json::from_str(&content).context("Failed to parse expense store JSON")
    }

    async fn save(&self, file: &ExpenseFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(file)?;
        fs::write(&self.path, content)
            .await
            .with_context(|| format!("Failed to write expense store: {}", self.path.display()))?;

        Ok(())
    }

    /// Get an expense by id
    pub async fn get(&self, id: Uuid) -> Result<Option<Expense>> {
        let file = self.load().await?;
        Ok(file.expenses.into_iter().find(|e| e.id == Some(id)))
    }

    /// List expenses for an owner, most recent first
    pub async fn list(&self, owner_id: &str) -> Result<Vec<Expense>> {
        let file = self.load().await?;
        let mut owned: Vec<Expense> = file
            .expenses
            .into_iter()
            .filter(|e| e.owner_id == owner_id)
            .collect();
        owned.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(owned)
    }
}

#[async_trait]
impl ExpenseSink for JsonExpenseStore {
    async fn commit(&self, mut expense: Expense) -> Result<Expense> {
        expense.validate().map_err(anyhow::Error::msg)?;
        expense.id = Some(Uuid::new_v4());

        let _guard = self.write_lock.lock().await;
        let mut file = self.load().await?;
        file.expenses.push(expense.clone());
        self.save(&file).await?;

        Ok(expense)
    }
}

//! Account collaborator
//!
//! The server only needs two questions answered: can this account be created,
//! and do these credentials match. Storage is somebody else's problem; the
//! in-memory store below lives as long as the process.

use log::info;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccountError {
    #[error("an account named {0} already exists")]
    Duplicate(String),

    #[error("invalid user id or password")]
    Invalid,
}

pub trait AccountStore: Send {
    fn create_account(&mut self, user_id: &str, password: &str) -> Result<(), AccountError>;

    fn authenticate(&self, user_id: &str, password: &str) -> Result<(), AccountError>;
}

#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    accounts: HashMap<String, String>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

impl AccountStore for MemoryAccountStore {
    fn create_account(&mut self, user_id: &str, password: &str) -> Result<(), AccountError> {
        if self.accounts.contains_key(user_id) {
            return Err(AccountError::Duplicate(user_id.to_string()));
        }

        self.accounts
            .insert(user_id.to_string(), password.to_string());
        info!("Created account {}", user_id);
        Ok(())
    }

    fn authenticate(&self, user_id: &str, password: &str) -> Result<(), AccountError> {
        match self.accounts.get(user_id) {
            Some(stored) if stored == password => Ok(()),
            _ => Err(AccountError::Invalid),
        }
    }
}

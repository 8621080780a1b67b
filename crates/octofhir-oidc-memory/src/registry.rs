//! Client and account registries.
//!
//! Both are populated up front by the embedding application and never
//! expire.

use async_trait::async_trait;
use dashmap::DashMap;
use octofhir_oidc::{Account, AccountStore, AuthResult, Client, ClientRegistry};

/// Registered clients keyed by `client_id`.
#[derive(Debug, Default)]
pub struct InMemoryClientRegistry {
    clients: DashMap<String, Client>,
}

impl InMemoryClientRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `client`, replacing a previous registration with the same id.
    pub fn insert(&self, client: Client) {
        self.clients.insert(client.client_id.clone(), client);
    }

    pub fn remove(&self, client_id: &str) -> Option<Client> {
        self.clients.remove(client_id).map(|(_, client)| client)
    }
}

impl FromIterator<Client> for InMemoryClientRegistry {
    fn from_iter<I: IntoIterator<Item = Client>>(iter: I) -> Self {
        let registry = Self::new();
        for client in iter {
            registry.insert(client);
        }
        registry
    }
}

#[async_trait]
impl ClientRegistry for InMemoryClientRegistry {
    async fn find(&self, client_id: &str) -> AuthResult<Option<Client>> {
        Ok(self.clients.get(client_id).map(|c| c.value().clone()))
    }
}

/// End-User accounts keyed by account id.
#[derive(Debug, Default)]
pub struct InMemoryAccountStore {
    accounts: DashMap<String, Account>,
}

impl InMemoryAccountStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, account: Account) {
        self.accounts.insert(account.account_id.clone(), account);
    }

    pub fn remove(&self, account_id: &str) -> Option<Account> {
        self.accounts.remove(account_id).map(|(_, account)| account)
    }
}

impl FromIterator<Account> for InMemoryAccountStore {
    fn from_iter<I: IntoIterator<Item = Account>>(iter: I) -> Self {
        let store = Self::new();
        for account in iter {
            store.insert(account);
        }
        store
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn find_by_id(&self, account_id: &str) -> AuthResult<Option<Account>> {
        Ok(self.accounts.get(account_id).map(|a| a.value().clone()))
    }
}

//! In-crate test doubles.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;

use crate::AuthResult;
use crate::config::ProviderConfig;
use crate::context::ProviderContext;
use crate::events::EventBroadcaster;
use crate::storage::{
    AccountStore, ClientRegistry, SessionStore, SuspensionTransport, TokenStore, TokenStores,
};
use crate::token::{JwtService, SigningAlgorithm, SigningKeyPair, TokenLookup};
use crate::types::{Account, Client, Session, Token, TokenKind};

/// Mock token store for testing.
#[derive(Default)]
pub struct MockTokenStore {
    tokens: RwLock<HashMap<String, Token>>,
}

#[async_trait]
impl TokenStore for MockTokenStore {
    async fn create(&self, token: &Token) -> AuthResult<()> {
        self.tokens
            .write()
            .unwrap()
            .insert(token.jti.clone(), token.clone());
        Ok(())
    }

    async fn find(&self, id: &str) -> AuthResult<Option<Token>> {
        Ok(self.tokens.read().unwrap().get(id).cloned())
    }

    async fn destroy(&self, id: &str) -> AuthResult<()> {
        self.tokens.write().unwrap().remove(id);
        Ok(())
    }

    async fn consume(&self, id: &str) -> AuthResult<bool> {
        let mut tokens = self.tokens.write().unwrap();
        Ok(tokens
            .get_mut(id)
            .is_some_and(|token| !std::mem::replace(&mut token.consumed, true)))
    }
}

/// Token store that yields to the scheduler after every read, so
/// concurrent requests interleave between their read and their write.
#[derive(Default)]
pub struct YieldingTokenStore(MockTokenStore);

#[async_trait]
impl TokenStore for YieldingTokenStore {
    async fn create(&self, token: &Token) -> AuthResult<()> {
        self.0.create(token).await
    }

    async fn find(&self, id: &str) -> AuthResult<Option<Token>> {
        let found = self.0.find(id).await;
        tokio::task::yield_now().await;
        found
    }

    async fn destroy(&self, id: &str) -> AuthResult<()> {
        self.0.destroy(id).await
    }

    async fn consume(&self, id: &str) -> AuthResult<bool> {
        self.0.consume(id).await
    }
}

/// Mock client registry for testing.
#[derive(Default)]
pub struct MockClientRegistry {
    clients: RwLock<HashMap<String, Client>>,
}

impl MockClientRegistry {
    pub fn insert(&self, client: Client) {
        self.clients
            .write()
            .unwrap()
            .insert(client.client_id.clone(), client);
    }
}

#[async_trait]
impl ClientRegistry for MockClientRegistry {
    async fn find(&self, client_id: &str) -> AuthResult<Option<Client>> {
        Ok(self.clients.read().unwrap().get(client_id).cloned())
    }
}

/// Mock account store for testing.
#[derive(Default)]
pub struct MockAccountStore {
    accounts: RwLock<HashMap<String, Account>>,
}

impl MockAccountStore {
    pub fn insert(&self, account: Account) {
        self.accounts
            .write()
            .unwrap()
            .insert(account.account_id.clone(), account);
    }
}

#[async_trait]
impl AccountStore for MockAccountStore {
    async fn find_by_id(&self, account_id: &str) -> AuthResult<Option<Account>> {
        Ok(self.accounts.read().unwrap().get(account_id).cloned())
    }
}

/// Mock session store for testing.
#[derive(Default)]
pub struct MockSessionStore {
    pub sessions: RwLock<HashMap<String, Session>>,
}

#[async_trait]
impl SessionStore for MockSessionStore {
    async fn find(&self, id: &str) -> AuthResult<Option<Session>> {
        Ok(self.sessions.read().unwrap().get(id).cloned())
    }

    async fn save(&self, session: &Session, _ttl: Duration) -> AuthResult<()> {
        self.sessions
            .write()
            .unwrap()
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn destroy(&self, id: &str) -> AuthResult<()> {
        self.sessions.write().unwrap().remove(id);
        Ok(())
    }
}

/// Mock suspension transport for testing.
#[derive(Default)]
pub struct MockTransport {
    pub records: RwLock<HashMap<String, String>>,
}

#[async_trait]
impl SuspensionTransport for MockTransport {
    async fn write(&self, key: &str, record: &str, _ttl: Duration) -> AuthResult<()> {
        self.records
            .write()
            .unwrap()
            .insert(key.to_string(), record.to_string());
        Ok(())
    }

    async fn read(&self, key: &str) -> AuthResult<Option<String>> {
        Ok(self.records.read().unwrap().get(key).cloned())
    }

    async fn remove(&self, key: &str) -> AuthResult<()> {
        self.records.write().unwrap().remove(key);
        Ok(())
    }
}

/// A confidential client redirecting to `https://rp.example.com/cb`.
pub fn client(client_id: &str) -> Client {
    let mut client = Client::new(client_id, "secret");
    client.redirect_uris = vec!["https://rp.example.com/cb".to_string()];
    client
}

pub fn jwt(issuer: &str) -> JwtService {
    JwtService::new(
        SigningKeyPair::generate(SigningAlgorithm::RS256).unwrap(),
        issuer,
    )
}

/// A context over empty mock stores.
pub fn context(config: ProviderConfig) -> ProviderContext {
    context_with(config, Arc::default(), Arc::default())
}

pub fn context_with(
    config: ProviderConfig,
    clients: Arc<MockClientRegistry>,
    accounts: Arc<MockAccountStore>,
) -> ProviderContext {
    context_over(
        config,
        clients,
        accounts,
        TokenStores::from_factory(|_| -> Arc<dyn TokenStore> {
            Arc::new(MockTokenStore::default())
        }),
    )
}

fn context_over(
    config: ProviderConfig,
    clients: Arc<MockClientRegistry>,
    accounts: Arc<MockAccountStore>,
    stores: TokenStores,
) -> ProviderContext {
    let jwt = jwt(&config.issuer);
    ProviderContext::new(
        config,
        jwt,
        TokenLookup::new(stores),
        clients,
        accounts,
        EventBroadcaster::new(),
    )
}

/// A context that knows client `rp` (allowed every built-in grant) and
/// account `alice`.
pub fn populated(config: ProviderConfig) -> (ProviderContext, Client) {
    populated_with(config, |_| -> Arc<dyn TokenStore> {
        Arc::new(MockTokenStore::default())
    })
}

/// Like [`populated`], with token stores from `factory`.
pub fn populated_with<F>(config: ProviderConfig, factory: F) -> (ProviderContext, Client)
where
    F: Fn(TokenKind) -> Arc<dyn TokenStore>,
{
    let mut rp = client("rp");
    rp.grant_types = ["authorization_code", "refresh_token", "client_credentials"]
        .map(String::from)
        .to_vec();

    let clients = Arc::new(MockClientRegistry::default());
    clients.insert(rp.clone());
    let accounts = Arc::new(MockAccountStore::default());
    accounts.insert(
        Account::new("alice")
            .with_claim("email", "alice@example.com")
            .with_claim("name", "Alice"),
    );

    let stores = TokenStores::from_factory(factory);
    (context_over(config, clients, accounts, stores), rp)
}

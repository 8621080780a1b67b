//! Subject identifier computation.

use sha2::{Digest, Sha256};

use crate::types::{Client, SubjectType};

/// Computes the `sub` value `client` sees for `account_id`.
///
/// Public clients see the account identifier. Pairwise clients see
/// `hex(sha256(sector || account_id || salt))`, so two clients sharing a
/// sector identifier see the same value.
#[must_use]
pub fn subject_for(account_id: &str, client: &Client, pairwise_salt: &str) -> String {
    match client.subject_type {
        SubjectType::Public => account_id.to_string(),
        SubjectType::Pairwise => {
            let sector = client
                .sector_identifier()
                .unwrap_or_else(|| client.client_id.clone());
            pairwise(&sector, account_id, pairwise_salt)
        }
    }
}

fn pairwise(sector: &str, account_id: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(sector.as_bytes());
    hasher.update(account_id.as_bytes());
    hasher.update(salt.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(id: &str, redirect: &str, subject_type: SubjectType) -> Client {
        let mut client = Client::new(id, "secret");
        client.redirect_uris = vec![redirect.to_string()];
        client.subject_type = subject_type;
        client
    }

    #[test]
    fn test_public_subject() {
        let client = client("a", "https://a.example.com/cb", SubjectType::Public);
        assert_eq!(subject_for("alice", &client, "salt"), "alice");
    }

    #[test]
    fn test_pairwise_subject_per_sector() {
        let a = client("a", "https://a.example.com/cb", SubjectType::Pairwise);
        let a2 = client("a2", "https://a.example.com/other", SubjectType::Pairwise);
        let b = client("b", "https://b.example.com/cb", SubjectType::Pairwise);

        let sub_a = subject_for("alice", &a, "salt");
        assert_eq!(sub_a.len(), 64);
        assert_ne!(sub_a, "alice");
        assert_eq!(sub_a, subject_for("alice", &a2, "salt"));
        assert_ne!(sub_a, subject_for("alice", &b, "salt"));
        assert_ne!(sub_a, subject_for("alice", &a, "other-salt"));
    }
}

use super::{DirectoryStore, ids::SequentialIds};
use parking_lot::RwLock;
use std::{collections::HashMap, sync::Arc};
use userhub_tonic_core::{Error, Result, proto::User, types::USER_ID_PREFIX};

/// In-memory [`DirectoryStore`] backed by a `parking_lot::RwLock<HashMap>`.
///
/// Cloning is cheap and every clone shares the same table and id counter.
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    users: Arc<RwLock<HashMap<String, User>>>,
    ids: Arc<SequentialIds>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            users: Arc::new(RwLock::new(HashMap::new())),
            ids: Arc::new(SequentialIds::new(USER_ID_PREFIX)),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectoryStore for InMemoryStore {
    fn next_id(&self) -> String {
        self.ids.next_id()
    }

    fn put(&self, user: User) {
        self.users.write().insert(user.user_id.clone(), user);
    }

    fn get(&self, user_id: &str) -> Result<User> {
        self.users
            .read()
            .get(user_id)
            .cloned()
            .ok_or_else(|| Error::NotFound {
                user_id: user_id.to_string(),
            })
    }

    fn len(&self) -> usize {
        self.users.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use userhub_tonic_core::proto::UserStatus;

    fn user(store: &InMemoryStore, name: &str) -> User {
        User {
            user_id: store.next_id(),
            name: name.to_string(),
            email: format!("{name}@example.com"),
            age: 30,
            status: UserStatus::Unspecified as i32,
        }
    }

    #[test]
    fn put_then_get_returns_the_same_user() {
        let store = InMemoryStore::new();
        let ada = user(&store, "ada");
        store.put(ada.clone());

        assert_eq!(store.get(&ada.user_id).unwrap(), ada);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn missing_user_is_not_found() {
        let store = InMemoryStore::new();
        store.put(user(&store, "ada"));

        assert_eq!(
            store.get("user_42").unwrap_err(),
            Error::NotFound {
                user_id: "user_42".to_string()
            }
        );
    }

    #[test]
    fn put_overwrites_existing_entry() {
        let store = InMemoryStore::new();
        let mut ada = user(&store, "ada");
        store.put(ada.clone());
        ada.age = 31;
        store.put(ada.clone());

        assert_eq!(store.get(&ada.user_id).unwrap().age, 31);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn clones_share_state() {
        let store = InMemoryStore::new();
        let other = store.clone();
        let ada = user(&store, "ada");
        other.put(ada.clone());

        assert_eq!(store.get(&ada.user_id).unwrap(), ada);
        assert_ne!(store.next_id(), ada.user_id);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_writers_lose_nothing() {
        let store = InMemoryStore::new();
        let tasks: Vec<_> = (0..100)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    let u = user(&store, &format!("u{i}"));
                    store.put(u.clone());
                    u.user_id
                })
            })
            .collect();

        let ids = futures::future::try_join_all(tasks).await.unwrap();
        assert_eq!(store.len(), 100);
        for id in ids {
            assert!(store.get(&id).is_ok());
        }
    }
}

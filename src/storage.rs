//! Store interfaces consumed by the session builder and cipher.
//!
//! All operations are synchronous. Callers must serialize operations on the
//! same [`ProtocolAddress`]; operations on different addresses are
//! independent.

use crate::{
    address::ProtocolAddress,
    error::{Error, Result},
    keys::{IdentityKey, IdentityKeyPair},
    prekey::{PreKeyRecord, SignedPreKeyRecord},
    record::SessionRecord,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Which way a message is going when an identity is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Sending,
    Receiving,
}

/// Local identity and trusted remote identities.
pub trait IdentityKeyStore: Send + Sync {
    fn identity_key_pair(&self) -> Result<IdentityKeyPair>;

    fn local_registration_id(&self) -> Result<u32>;

    /// Records `identity` for `address`.
    ///
    /// Returns `true` if a different identity was stored before.
    fn save_identity(&mut self, address: &ProtocolAddress, identity: &IdentityKey)
        -> Result<bool>;

    fn is_trusted_identity(
        &self,
        address: &ProtocolAddress,
        identity: &IdentityKey,
        direction: Direction,
    ) -> Result<bool>;

    fn identity(&self, address: &ProtocolAddress) -> Result<Option<IdentityKey>>;
}

/// One-time pre-keys, removed once consumed.
pub trait PreKeyStore: Send + Sync {
    fn load_pre_key(&self, id: u32) -> Result<Option<PreKeyRecord>>;

    /// Replaces any record with the same id.
    fn store_pre_key(&mut self, id: u32, record: PreKeyRecord) -> Result<()>;

    fn contains_pre_key(&self, id: u32) -> Result<bool>;

    fn remove_pre_key(&mut self, id: u32) -> Result<()>;

    fn all_pre_key_ids(&self) -> Result<Vec<u32>>;
}

pub trait SignedPreKeyStore: Send + Sync {
    fn load_signed_pre_key(&self, id: u32) -> Result<Option<SignedPreKeyRecord>>;

    fn store_signed_pre_key(&mut self, id: u32, record: SignedPreKeyRecord) -> Result<()>;

    fn contains_signed_pre_key(&self, id: u32) -> Result<bool>;

    fn remove_signed_pre_key(&mut self, id: u32) -> Result<()>;

    fn all_signed_pre_key_ids(&self) -> Result<Vec<u32>>;
}

/// Session records keyed by peer address.
pub trait SessionStore: Send + Sync {
    fn load_session(&self, address: &ProtocolAddress) -> Result<Option<SessionRecord>>;

    fn store_session(&mut self, address: &ProtocolAddress, record: &SessionRecord) -> Result<()>;

    /// Whether a record with a current session state exists.
    fn contains_session(&self, address: &ProtocolAddress) -> Result<bool>;

    fn delete_session(&mut self, address: &ProtocolAddress) -> Result<()>;

    /// Deletes the sessions of every device of `name`.
    fn delete_all_sessions(&mut self, name: &str) -> Result<()>;

    /// Every address of `name` with a stored session.
    fn session_addresses(&self, name: &str) -> Result<Vec<ProtocolAddress>>;
}

/// Everything the builder and cipher need.
pub trait ProtocolStore: IdentityKeyStore + PreKeyStore + SignedPreKeyStore + SessionStore {}

impl<T> ProtocolStore for T where T: IdentityKeyStore + PreKeyStore + SignedPreKeyStore + SessionStore {}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| Error::StorageError("store lock poisoned".to_owned()))
}

/// Thread-safe in-memory store with trust-on-first-use identities.
///
/// Clones share the same underlying maps.
///
/// ```
/// # use signal_session::{DefaultCryptoProvider, IdentityKeyPair, InMemoryProtocolStore};
/// # use signal_session::storage::IdentityKeyStore;
/// let crypto = DefaultCryptoProvider::new();
/// let identity = IdentityKeyPair::generate(&crypto).unwrap();
/// let store = InMemoryProtocolStore::new(identity, 42);
/// assert_eq!(store.local_registration_id().unwrap(), 42);
/// ```
#[derive(Clone, Debug)]
pub struct InMemoryProtocolStore {
    identity_key_pair: IdentityKeyPair,
    registration_id: u32,
    identities: Arc<Mutex<HashMap<ProtocolAddress, IdentityKey>>>,
    pre_keys: Arc<Mutex<HashMap<u32, PreKeyRecord>>>,
    signed_pre_keys: Arc<Mutex<HashMap<u32, SignedPreKeyRecord>>>,
    sessions: Arc<Mutex<HashMap<ProtocolAddress, SessionRecord>>>,
}

impl InMemoryProtocolStore {
    #[must_use]
    pub fn new(identity_key_pair: IdentityKeyPair, registration_id: u32) -> Self {
        Self {
            identity_key_pair,
            registration_id,
            identities: Arc::default(),
            pre_keys: Arc::default(),
            signed_pre_keys: Arc::default(),
            sessions: Arc::default(),
        }
    }
}

impl IdentityKeyStore for InMemoryProtocolStore {
    fn identity_key_pair(&self) -> Result<IdentityKeyPair> {
        Ok(self.identity_key_pair.clone())
    }

    fn local_registration_id(&self) -> Result<u32> {
        Ok(self.registration_id)
    }

    fn save_identity(
        &mut self,
        address: &ProtocolAddress,
        identity: &IdentityKey,
    ) -> Result<bool> {
        let previous = lock(&self.identities)?.insert(address.clone(), *identity);
        Ok(previous.is_some_and(|previous| previous != *identity))
    }

    fn is_trusted_identity(
        &self,
        address: &ProtocolAddress,
        identity: &IdentityKey,
        _direction: Direction,
    ) -> Result<bool> {
        Ok(lock(&self.identities)?
            .get(address)
            .map_or(true, |known| known == identity))
    }

    fn identity(&self, address: &ProtocolAddress) -> Result<Option<IdentityKey>> {
        Ok(lock(&self.identities)?.get(address).copied())
    }
}

impl PreKeyStore for InMemoryProtocolStore {
    fn load_pre_key(&self, id: u32) -> Result<Option<PreKeyRecord>> {
        Ok(lock(&self.pre_keys)?.get(&id).cloned())
    }

    fn store_pre_key(&mut self, id: u32, record: PreKeyRecord) -> Result<()> {
        lock(&self.pre_keys)?.insert(id, record);
        Ok(())
    }

    fn contains_pre_key(&self, id: u32) -> Result<bool> {
        Ok(lock(&self.pre_keys)?.contains_key(&id))
    }

    fn remove_pre_key(&mut self, id: u32) -> Result<()> {
        lock(&self.pre_keys)?.remove(&id);
        Ok(())
    }

    fn all_pre_key_ids(&self) -> Result<Vec<u32>> {
        let mut ids: Vec<u32> = lock(&self.pre_keys)?.keys().copied().collect();
        ids.sort_unstable();
        Ok(ids)
    }
}

impl SignedPreKeyStore for InMemoryProtocolStore {
    fn load_signed_pre_key(&self, id: u32) -> Result<Option<SignedPreKeyRecord>> {
        Ok(lock(&self.signed_pre_keys)?.get(&id).cloned())
    }

    fn store_signed_pre_key(&mut self, id: u32, record: SignedPreKeyRecord) -> Result<()> {
        lock(&self.signed_pre_keys)?.insert(id, record);
        Ok(())
    }

    fn contains_signed_pre_key(&self, id: u32) -> Result<bool> {
        Ok(lock(&self.signed_pre_keys)?.contains_key(&id))
    }

    fn remove_signed_pre_key(&mut self, id: u32) -> Result<()> {
        lock(&self.signed_pre_keys)?.remove(&id);
        Ok(())
    }

    fn all_signed_pre_key_ids(&self) -> Result<Vec<u32>> {
        let mut ids: Vec<u32> = lock(&self.signed_pre_keys)?.keys().copied().collect();
        ids.sort_unstable();
        Ok(ids)
    }
}

impl SessionStore for InMemoryProtocolStore {
    fn load_session(&self, address: &ProtocolAddress) -> Result<Option<SessionRecord>> {
        Ok(lock(&self.sessions)?.get(address).cloned())
    }

    fn store_session(&mut self, address: &ProtocolAddress, record: &SessionRecord) -> Result<()> {
        lock(&self.sessions)?.insert(address.clone(), record.clone());
        Ok(())
    }

    fn contains_session(&self, address: &ProtocolAddress) -> Result<bool> {
        Ok(lock(&self.sessions)?
            .get(address)
            .is_some_and(|record| record.session_state().is_some()))
    }

    fn delete_session(&mut self, address: &ProtocolAddress) -> Result<()> {
        lock(&self.sessions)?.remove(address);
        Ok(())
    }

    fn delete_all_sessions(&mut self, name: &str) -> Result<()> {
        lock(&self.sessions)?.retain(|address, _| address.name() != name);
        Ok(())
    }

    fn session_addresses(&self, name: &str) -> Result<Vec<ProtocolAddress>> {
        let mut addresses: Vec<ProtocolAddress> = lock(&self.sessions)?
            .keys()
            .filter(|address| address.name() == name)
            .cloned()
            .collect();
        addresses.sort();
        Ok(addresses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::DefaultCryptoProvider;

    fn store(crypto: &DefaultCryptoProvider) -> InMemoryProtocolStore {
        InMemoryProtocolStore::new(IdentityKeyPair::generate(crypto).unwrap(), 7)
    }

    #[test]
    fn test_trust_on_first_use() {
        let crypto = DefaultCryptoProvider::new();
        let mut store = store(&crypto);
        let address = ProtocolAddress::new("bob", 1);
        let first = *IdentityKeyPair::generate(&crypto).unwrap().identity_key();
        let second = *IdentityKeyPair::generate(&crypto).unwrap().identity_key();

        assert!(store
            .is_trusted_identity(&address, &first, Direction::Sending)
            .unwrap());
        assert!(!store.save_identity(&address, &first).unwrap());
        assert!(!store.save_identity(&address, &first).unwrap());
        assert!(store
            .is_trusted_identity(&address, &first, Direction::Receiving)
            .unwrap());
        assert!(!store
            .is_trusted_identity(&address, &second, Direction::Sending)
            .unwrap());

        assert!(store.save_identity(&address, &second).unwrap());
        assert_eq!(store.identity(&address).unwrap(), Some(second));
    }

    #[test]
    fn test_pre_key_lifecycle() {
        let crypto = DefaultCryptoProvider::new();
        let mut store = store(&crypto);
        for record in PreKeyRecord::generate_batch(10, 3, &crypto).unwrap() {
            store.store_pre_key(record.id(), record).unwrap();
        }

        assert_eq!(store.all_pre_key_ids().unwrap(), vec![10, 11, 12]);
        assert!(store.contains_pre_key(11).unwrap());
        store.remove_pre_key(11).unwrap();
        assert!(!store.contains_pre_key(11).unwrap());
        assert!(store.load_pre_key(11).unwrap().is_none());
    }

    #[test]
    fn test_signed_pre_key_lifecycle() {
        let crypto = DefaultCryptoProvider::new();
        let mut store = store(&crypto);
        let identity = store.identity_key_pair().unwrap();
        let record = SignedPreKeyRecord::generate(3, 100, &identity, &crypto).unwrap();

        store.store_signed_pre_key(3, record.clone()).unwrap();
        assert_eq!(store.load_signed_pre_key(3).unwrap(), Some(record));
        assert_eq!(store.all_signed_pre_key_ids().unwrap(), vec![3]);
        store.remove_signed_pre_key(3).unwrap();
        assert!(!store.contains_signed_pre_key(3).unwrap());
    }

    #[test]
    fn test_session_addresses_and_bulk_delete() {
        let crypto = DefaultCryptoProvider::new();
        let mut store = store(&crypto);
        let record = SessionRecord::new_fresh();
        for address in [
            ProtocolAddress::new("bob", 2),
            ProtocolAddress::new("bob", 1),
            ProtocolAddress::new("carol", 1),
        ] {
            store.store_session(&address, &record).unwrap();
        }

        assert_eq!(
            store.session_addresses("bob").unwrap(),
            vec![ProtocolAddress::new("bob", 1), ProtocolAddress::new("bob", 2)]
        );
        // a fresh record holds no current state
        assert!(!store
            .contains_session(&ProtocolAddress::new("bob", 1))
            .unwrap());

        store.delete_all_sessions("bob").unwrap();
        assert!(store.session_addresses("bob").unwrap().is_empty());
        assert_eq!(store.session_addresses("carol").unwrap().len(), 1);
    }

    #[test]
    fn test_clones_share_state() {
        let crypto = DefaultCryptoProvider::new();
        let mut store = store(&crypto);
        let view = store.clone();
        let record = PreKeyRecord::generate(1, &crypto).unwrap();
        store.store_pre_key(1, record).unwrap();
        assert!(view.contains_pre_key(1).unwrap());
    }
}

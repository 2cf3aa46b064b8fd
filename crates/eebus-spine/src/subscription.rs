//! Subscription and binding registries of the local device.
//!
//! Both track (client feature, server feature) address pairs per remote
//! peer. Linear scans over a mutex-guarded vec; the sets stay tiny.

use parking_lot::Mutex;

use crate::model::FeatureAddress;

#[derive(Debug, Clone, PartialEq)]
struct Entry {
    ski: String,
    client_address: FeatureAddress,
    server_address: FeatureAddress,
}

#[derive(Debug, Default)]
struct PairRegistry {
    entries: Mutex<Vec<Entry>>,
}

impl PairRegistry {
    /// Returns false when the pair is already registered.
    fn add(&self, ski: &str, client: FeatureAddress, server: FeatureAddress) -> bool {
        let mut entries = self.entries.lock();
        let exists = entries.iter().any(|e| {
            e.ski == ski && e.client_address.matches(&client) && e.server_address.matches(&server)
        });
        if exists {
            return false;
        }
        entries.push(Entry {
            ski: ski.to_string(),
            client_address: client,
            server_address: server,
        });
        true
    }

    /// Returns false when no matching pair existed.
    fn remove(&self, ski: &str, client: &FeatureAddress, server: &FeatureAddress) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|e| {
            !(e.ski == ski
                && e.client_address.matches(client)
                && e.server_address.matches(server))
        });
        entries.len() != before
    }

    fn remove_device(&self, ski: &str) {
        self.entries.lock().retain(|e| e.ski != ski);
    }

    fn has_server(&self, ski: &str, server: &FeatureAddress) -> bool {
        self.entries
            .lock()
            .iter()
            .any(|e| e.ski == ski && e.server_address.matches(server))
    }

    fn clients_of(&self, server: &FeatureAddress) -> Vec<(String, FeatureAddress)> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.server_address.matches(server))
            .map(|e| (e.ski.clone(), e.client_address.clone()))
            .collect()
    }
}

/// Subscriptions held against local server features.
#[derive(Debug, Default)]
pub struct SubscriptionManager {
    registry: PairRegistry,
}

impl SubscriptionManager {
    pub fn add(&self, ski: &str, client: FeatureAddress, server: FeatureAddress) -> bool {
        self.registry.add(ski, client, server)
    }

    pub fn remove(&self, ski: &str, client: &FeatureAddress, server: &FeatureAddress) -> bool {
        self.registry.remove(ski, client, server)
    }

    pub fn remove_device(&self, ski: &str) {
        self.registry.remove_device(ski)
    }

    /// Does this peer hold any subscription on the given server feature?
    pub fn has_server_subscription(&self, ski: &str, server: &FeatureAddress) -> bool {
        self.registry.has_server(ski, server)
    }

    /// All (peer, client address) pairs subscribed to a server feature.
    pub fn subscribers_of(&self, server: &FeatureAddress) -> Vec<(String, FeatureAddress)> {
        self.registry.clients_of(server)
    }
}

/// Bindings held against local server features.
#[derive(Debug, Default)]
pub struct BindingManager {
    registry: PairRegistry,
}

impl BindingManager {
    pub fn add(&self, ski: &str, client: FeatureAddress, server: FeatureAddress) -> bool {
        self.registry.add(ski, client, server)
    }

    pub fn remove(&self, ski: &str, client: &FeatureAddress, server: &FeatureAddress) -> bool {
        self.registry.remove(ski, client, server)
    }

    pub fn remove_device(&self, ski: &str) {
        self.registry.remove_device(ski)
    }

    /// A write requires an existing binding from the writing client.
    pub fn has_binding(&self, ski: &str, client: &FeatureAddress, server: &FeatureAddress) -> bool {
        self.registry
            .entries
            .lock()
            .iter()
            .any(|e| {
                e.ski == ski
                    && e.client_address.matches(client)
                    && e.server_address.matches(server)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(entity: u32, feature: u32) -> FeatureAddress {
        FeatureAddress::new(None, vec![entity], feature)
    }

    #[test]
    fn duplicate_subscription_is_rejected() {
        let manager = SubscriptionManager::default();
        assert!(manager.add("ski", addr(1, 0), addr(0, 1)));
        assert!(!manager.add("ski", addr(1, 0), addr(0, 1)));
        assert!(manager.add("other", addr(1, 0), addr(0, 1)));
    }

    #[test]
    fn remove_device_drops_all_entries_of_peer() {
        let manager = SubscriptionManager::default();
        manager.add("ski", addr(1, 0), addr(0, 1));
        manager.add("ski", addr(1, 1), addr(0, 2));
        manager.add("other", addr(1, 0), addr(0, 1));

        manager.remove_device("ski");

        assert!(!manager.has_server_subscription("ski", &addr(0, 1)));
        assert!(manager.has_server_subscription("other", &addr(0, 1)));
    }
}

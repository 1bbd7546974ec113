//! 订阅注册表
//!
//! 每个客户端最多一个 meterId 过滤条件，后写覆盖前写。
//! 两张分片并发表：client → meter 与 meter → clients。
//! 同一客户端的修改在 client 表分片锁内完成，两张表不会出现不一致；
//! 加锁顺序固定为 client 表 → meter 表。

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use domain::ClientId;
use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    by_client: DashMap<ClientId, u32>,
    by_meter: DashMap<u32, HashSet<ClientId>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建或替换客户端的过滤条件，返回被替换的 meterId。
    pub fn upsert(&self, client: ClientId, meter_id: u32) -> Option<u32> {
        match self.by_client.entry(client) {
            Entry::Occupied(mut entry) => {
                let previous = entry.insert(meter_id);
                if previous != meter_id {
                    self.unindex(client, previous);
                    self.by_meter.entry(meter_id).or_default().insert(client);
                }
                Some(previous)
            }
            Entry::Vacant(entry) => {
                // 持有分片锁直到索引更新完成
                let _guard = entry.insert(meter_id);
                self.by_meter.entry(meter_id).or_default().insert(client);
                None
            }
        }
    }

    /// 删除客户端的订阅；重复删除无副作用。
    pub fn remove(&self, client: ClientId) -> Option<u32> {
        match self.by_client.entry(client) {
            Entry::Occupied(entry) => {
                let meter_id = *entry.get();
                self.unindex(client, meter_id);
                entry.remove();
                Some(meter_id)
            }
            Entry::Vacant(_) => None,
        }
    }

    /// 当前订阅了该 meterId 的客户端快照。
    pub fn matching_clients(&self, meter_id: u32) -> HashSet<ClientId> {
        self.by_meter
            .get(&meter_id)
            .map(|clients| clients.clone())
            .unwrap_or_default()
    }

    pub fn meter_of(&self, client: ClientId) -> Option<u32> {
        self.by_client.get(&client).map(|meter_id| *meter_id)
    }

    /// 活跃订阅数。
    pub fn len(&self) -> usize {
        self.by_client.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_client.is_empty()
    }

    fn unindex(&self, client: ClientId, meter_id: u32) {
        if let Entry::Occupied(mut clients) = self.by_meter.entry(meter_id) {
            clients.get_mut().remove(&client);
            if clients.get().is_empty() {
                clients.remove();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn upsert_then_match() {
        let registry = SubscriptionRegistry::new();
        let client = ClientId::new();
        assert_eq!(registry.upsert(client, 42), None);
        assert!(registry.matching_clients(42).contains(&client));
        assert_eq!(registry.meter_of(client), Some(42));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn later_upsert_supersedes_earlier() {
        let registry = SubscriptionRegistry::new();
        let client = ClientId::new();
        registry.upsert(client, 42);
        assert_eq!(registry.upsert(client, 7), Some(42));
        assert!(registry.matching_clients(42).is_empty());
        assert!(registry.matching_clients(7).contains(&client));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn same_filter_upsert_is_stable() {
        let registry = SubscriptionRegistry::new();
        let client = ClientId::new();
        registry.upsert(client, 42);
        assert_eq!(registry.upsert(client, 42), Some(42));
        assert_eq!(registry.matching_clients(42).len(), 1);
    }

    #[test]
    fn remove_is_idempotent() {
        let registry = SubscriptionRegistry::new();
        let client = ClientId::new();
        let other = ClientId::new();
        registry.upsert(client, 42);
        registry.upsert(other, 42);
        assert_eq!(registry.remove(client), Some(42));
        assert_eq!(registry.remove(client), None);
        assert_eq!(registry.matching_clients(42).len(), 1);
        assert!(registry.matching_clients(42).contains(&other));
        assert_eq!(registry.remove(ClientId::new()), None);
    }

    #[test]
    fn unknown_meter_matches_nobody() {
        let registry = SubscriptionRegistry::new();
        assert!(registry.matching_clients(99).is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn concurrent_updates_keep_index_consistent() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let clients: Vec<ClientId> = (0..16).map(|_| ClientId::new()).collect();

        std::thread::scope(|scope| {
            for (worker, client) in clients.iter().enumerate() {
                let registry = Arc::clone(&registry);
                let client = *client;
                scope.spawn(move || {
                    for round in 0..200u32 {
                        registry.upsert(client, (worker as u32 + round) % 5);
                        if round % 7 == 0 {
                            registry.remove(client);
                        }
                    }
                    registry.upsert(client, worker as u32 % 5);
                });
            }
        });

        assert_eq!(registry.len(), clients.len());
        let mut indexed = 0;
        for meter_id in 0..5u32 {
            for client in registry.matching_clients(meter_id) {
                assert_eq!(registry.meter_of(client), Some(meter_id));
                indexed += 1;
            }
        }
        assert_eq!(indexed, clients.len());
    }
}

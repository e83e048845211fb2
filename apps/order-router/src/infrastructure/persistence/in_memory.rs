//! In-memory order ledger.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::domain::order::{
    DEFAULT_LIST_LIMIT, Order, OrderError, OrderFilters, OrderRepository, OrderStatus,
    OrderStatusHistory,
};

#[derive(Debug, Default)]
struct Ledger {
    orders: HashMap<Uuid, Order>,
    history: HashMap<Uuid, Vec<OrderStatusHistory>>,
}

impl Ledger {
    fn find(&self, predicate: impl Fn(&Order) -> bool, id: &str) -> Result<Order, OrderError> {
        self.orders
            .values()
            .find(|o| predicate(o))
            .cloned()
            .ok_or_else(|| OrderError::NotFound { id: id.to_string() })
    }

    fn append(&mut self, entry: OrderStatusHistory) {
        self.history.entry(entry.order_id).or_default().push(entry);
    }
}

/// In-memory implementation of `OrderRepository`.
///
/// Same semantics as the database adapter (version checks, automatic
/// history); used in tests and for `:memory:`-style dry runs.
#[derive(Debug, Default)]
pub struct InMemoryOrderRepository {
    ledger: RwLock<Ledger>,
}

impl InMemoryOrderRepository {
    /// Create a new empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of orders in the repository.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ledger.read().orders.len()
    }

    /// Check if the repository is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ledger.read().orders.is_empty()
    }
}

fn newest_first(mut orders: Vec<Order>) -> Vec<Order> {
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    orders
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn create_order(&self, order: &Order) -> Result<(), OrderError> {
        order.validate()?;
        let mut ledger = self.ledger.write();
        if ledger.orders.contains_key(&order.id)
            || ledger.orders.values().any(|o| o.client_id == order.client_id)
        {
            return Err(OrderError::Duplicate {
                client_id: order.client_id.clone(),
            });
        }
        ledger.orders.insert(order.id, order.clone());
        ledger.append(OrderStatusHistory::record(order, None, Some("order created")));
        Ok(())
    }

    async fn get_order_by_id(&self, id: Uuid) -> Result<Order, OrderError> {
        self.ledger
            .read()
            .orders
            .get(&id)
            .cloned()
            .ok_or_else(|| OrderError::NotFound { id: id.to_string() })
    }

    async fn get_order_by_client_id(&self, client_id: &str) -> Result<Order, OrderError> {
        self.ledger
            .read()
            .find(|o| o.client_id == client_id, client_id)
    }

    async fn get_order_by_order_id(&self, order_id: &str) -> Result<Order, OrderError> {
        self.ledger
            .read()
            .find(|o| o.order_id.as_deref() == Some(order_id), order_id)
    }

    async fn update_order(
        &self,
        order: &mut Order,
        reason: Option<String>,
    ) -> Result<(), OrderError> {
        order.validate()?;
        let mut ledger = self.ledger.write();
        let stored = ledger
            .orders
            .get(&order.id)
            .ok_or_else(|| OrderError::NotFound {
                id: order.id.to_string(),
            })?;
        if stored.version != order.version {
            return Err(OrderError::ConcurrentModification {
                order_id: order.id.to_string(),
                expected: order.version,
            });
        }
        let old_status = stored.status;

        order.version += 1;
        order.updated_at = Utc::now();
        ledger.orders.insert(order.id, order.clone());
        if old_status != order.status {
            ledger.append(OrderStatusHistory::record(
                order,
                Some(old_status),
                reason.as_deref(),
            ));
        }
        Ok(())
    }

    async fn delete_order(&self, id: Uuid) -> Result<(), OrderError> {
        let mut ledger = self.ledger.write();
        ledger
            .orders
            .remove(&id)
            .ok_or_else(|| OrderError::NotFound { id: id.to_string() })?;
        ledger.history.remove(&id);
        Ok(())
    }

    async fn list_orders(&self, filters: &OrderFilters) -> Result<Vec<Order>, OrderError> {
        let matching = self
            .ledger
            .read()
            .orders
            .values()
            .filter(|o| filters.matches(o))
            .cloned()
            .collect();
        Ok(newest_first(matching)
            .into_iter()
            .skip(filters.offset.unwrap_or(0) as usize)
            .take(filters.limit.unwrap_or(DEFAULT_LIST_LIMIT) as usize)
            .collect())
    }

    async fn list_active_orders(&self, market: Option<String>) -> Result<Vec<Order>, OrderError> {
        let active = self
            .ledger
            .read()
            .orders
            .values()
            .filter(|o| o.status.is_active())
            .filter(|o| market.as_ref().is_none_or(|m| *m == o.market))
            .cloned()
            .collect();
        Ok(newest_first(active))
    }

    async fn list_orders_by_status(
        &self,
        status: OrderStatus,
        limit: u32,
    ) -> Result<Vec<Order>, OrderError> {
        let matching = self
            .ledger
            .read()
            .orders
            .values()
            .filter(|o| o.status == status)
            .cloned()
            .collect();
        Ok(newest_first(matching)
            .into_iter()
            .take(limit as usize)
            .collect())
    }

    async fn count_orders_by_status(&self, status: OrderStatus) -> Result<u64, OrderError> {
        Ok(self
            .ledger
            .read()
            .orders
            .values()
            .filter(|o| o.status == status)
            .count() as u64)
    }

    async fn get_order_history(&self, order_id: Uuid) -> Result<Vec<OrderStatusHistory>, OrderError> {
        Ok(self
            .ledger
            .read()
            .history
            .get(&order_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_order_status_history(
        &self,
        history: &OrderStatusHistory,
    ) -> Result<(), OrderError> {
        let mut ledger = self.ledger.write();
        if !ledger.orders.contains_key(&history.order_id) {
            return Err(OrderError::NotFound {
                id: history.order_id.to_string(),
            });
        }
        ledger.append(history.clone());
        Ok(())
    }

    async fn update_orders_status(
        &self,
        ids: &[Uuid],
        status: OrderStatus,
    ) -> Result<u64, OrderError> {
        let mut ledger = self.ledger.write();
        let mut changed = Vec::new();
        for id in ids {
            if let Some(order) = ledger.orders.get_mut(id) {
                if order.status == status {
                    continue;
                }
                let old_status = order.status;
                order.set_status(status);
                order.version += 1;
                order.updated_at = Utc::now();
                changed.push(OrderStatusHistory::record(
                    order,
                    Some(old_status),
                    Some("bulk status update"),
                ));
            }
        }
        let count = changed.len() as u64;
        for entry in changed {
            ledger.append(entry);
        }
        Ok(count)
    }

    async fn get_orders_for_sync(&self, limit: u32) -> Result<Vec<Order>, OrderError> {
        let mut orders: Vec<Order> = self
            .ledger
            .read()
            .orders
            .values()
            .filter(|o| o.status.needs_sync())
            .cloned()
            .collect();
        orders.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
        orders.truncate(limit as usize);
        Ok(orders)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::domain::order::{NewOrder, OrderSide, OrderType, TimeInForce};

    fn order(client_id: &str, market: &str) -> Order {
        Order::new(NewOrder {
            client_id: client_id.to_string(),
            market: market.to_string(),
            side: OrderSide::Buy,
            order_type: OrderType::Limit,
            size: dec!(2),
            price: Some(dec!(10)),
            time_in_force: TimeInForce::Gtt,
            good_til_block: None,
            good_til_block_time: None,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn create_and_lookup() {
        let repo = InMemoryOrderRepository::new();
        let mut o = order("c1", "BTC-USD");
        o.order_id = Some("ex-1".to_string());
        repo.create_order(&o).await.unwrap();

        assert_eq!(repo.len(), 1);
        assert_eq!(repo.get_order_by_id(o.id).await.unwrap(), o);
        assert_eq!(repo.get_order_by_client_id("c1").await.unwrap().id, o.id);
        assert_eq!(repo.get_order_by_order_id("ex-1").await.unwrap().id, o.id);
        assert!(matches!(
            repo.get_order_by_client_id("nope").await,
            Err(OrderError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn rejects_duplicate_client_id() {
        let repo = InMemoryOrderRepository::new();
        repo.create_order(&order("c1", "BTC-USD")).await.unwrap();
        assert!(matches!(
            repo.create_order(&order("c1", "ETH-USD")).await,
            Err(OrderError::Duplicate { .. })
        ));
    }

    #[tokio::test]
    async fn status_change_appends_history() {
        let repo = InMemoryOrderRepository::new();
        let mut o = order("c1", "BTC-USD");
        repo.create_order(&o).await.unwrap();

        o.mark_placed("HASH", Some(7));
        repo.update_order(&mut o, Some("placed".to_string()))
            .await
            .unwrap();
        assert_eq!(o.version, 1);

        // A write without a status change leaves history alone.
        o.apply_fill(dec!(0)).unwrap();
        repo.update_order(&mut o, None).await.unwrap();

        let history = repo.get_order_history(o.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].old_status, None);
        assert_eq!(history[1].old_status, Some(OrderStatus::Pending));
        assert_eq!(history[1].new_status, OrderStatus::Open);
        assert_eq!(history[1].reason.as_deref(), Some("placed"));
    }

    #[tokio::test]
    async fn stale_version_is_rejected() {
        let repo = InMemoryOrderRepository::new();
        let o = order("c1", "BTC-USD");
        repo.create_order(&o).await.unwrap();

        let mut first = o.clone();
        let mut second = o;
        repo.update_order(&mut first, None).await.unwrap();
        assert!(matches!(
            repo.update_order(&mut second, None).await,
            Err(OrderError::ConcurrentModification { expected: 0, .. })
        ));
    }

    #[tokio::test]
    async fn concurrent_writers_on_one_version_have_one_winner() {
        let repo = InMemoryOrderRepository::new();
        let o = order("c1", "BTC-USD");
        repo.create_order(&o).await.unwrap();

        let mut copies = vec![o.clone(); 8];
        let results = futures::future::join_all(
            copies
                .iter_mut()
                .map(|copy| repo.update_order(copy, Some("race".to_string()))),
        )
        .await;

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(repo.get_order_by_id(o.id).await.unwrap().version, 1);
    }

    #[tokio::test]
    async fn invariant_violation_is_not_written() {
        let repo = InMemoryOrderRepository::new();
        let mut o = order("c1", "BTC-USD");
        repo.create_order(&o).await.unwrap();

        o.remaining_size = dec!(5);
        assert!(matches!(
            repo.update_order(&mut o, None).await,
            Err(OrderError::InvariantViolation { .. })
        ));
        assert_eq!(
            repo.get_order_by_id(o.id).await.unwrap().remaining_size,
            dec!(2)
        );
    }

    #[tokio::test]
    async fn listing_and_sync_selection() {
        let repo = InMemoryOrderRepository::new();
        let mut a = order("a", "BTC-USD");
        let b = order("b", "ETH-USD");
        let mut c = order("c", "BTC-USD");
        for o in [&a, &b, &c] {
            repo.create_order(o).await.unwrap();
        }
        a.mark_placed("H1", None);
        repo.update_order(&mut a, None).await.unwrap();
        c.mark_rejected("boom");
        repo.update_order(&mut c, None).await.unwrap();

        let active = repo
            .list_active_orders(Some("BTC-USD".to_string()))
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, a.id);

        let for_sync = repo.get_orders_for_sync(10).await.unwrap();
        let ids: Vec<_> = for_sync.iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![b.id, a.id]);

        let filters = OrderFilters {
            market: Some("BTC-USD".to_string()),
            limit: Some(1),
            ..OrderFilters::default()
        };
        assert_eq!(repo.list_orders(&filters).await.unwrap().len(), 1);
        assert_eq!(
            repo.count_orders_by_status(OrderStatus::Rejected)
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn bulk_status_update_counts_changes() {
        let repo = InMemoryOrderRepository::new();
        let a = order("a", "BTC-USD");
        let b = order("b", "BTC-USD");
        repo.create_order(&a).await.unwrap();
        repo.create_order(&b).await.unwrap();

        let changed = repo
            .update_orders_status(&[a.id, b.id, Uuid::new_v4()], OrderStatus::Expired)
            .await
            .unwrap();
        assert_eq!(changed, 2);
        assert_eq!(
            repo.update_orders_status(&[a.id], OrderStatus::Expired)
                .await
                .unwrap(),
            0
        );
        assert_eq!(repo.get_order_history(a.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn delete_removes_order_and_history() {
        let repo = InMemoryOrderRepository::new();
        let o = order("a", "BTC-USD");
        repo.create_order(&o).await.unwrap();
        repo.delete_order(o.id).await.unwrap();
        assert!(repo.is_empty());
        assert!(repo.get_order_history(o.id).await.unwrap().is_empty());
        assert!(repo.delete_order(o.id).await.is_err());
    }
}

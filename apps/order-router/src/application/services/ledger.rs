//! Ledger write helpers shared by the pipeline, sync and reconciliation.

use std::collections::HashMap;

use crate::application::ports::IndexerOrder;
use crate::domain::market::{client_order_id_for, protocol_client_id};
use crate::domain::order::{Order, OrderError, OrderRepository};

/// Apply `mutate` to `order` and write it, re-reading and re-applying once
/// if another writer got there first.
pub async fn update_with_retry<F>(
    repo: &dyn OrderRepository,
    order: &mut Order,
    reason: Option<String>,
    mut mutate: F,
) -> Result<(), OrderError>
where
    F: FnMut(&mut Order) -> Result<(), OrderError> + Send,
{
    mutate(order)?;
    match repo.update_order(order, reason.clone()).await {
        Err(OrderError::ConcurrentModification { expected, .. }) => {
            tracing::debug!(
                order_id = %order.id,
                expected,
                "Concurrent ledger update, re-reading order"
            );
            *order = repo.get_order_by_id(order.id).await?;
            mutate(order)?;
            repo.update_order(order, reason).await
        }
        other => other,
    }
}

/// Local orders not yet linked to an exchange order id, keyed by market and
/// protocol client id.
#[derive(Debug, Default)]
pub struct UnlinkedOrders {
    by_client_id: HashMap<(String, u32), Order>,
}

impl UnlinkedOrders {
    /// Index the unlinked orders among `orders`.
    #[must_use]
    pub fn new(orders: Vec<Order>) -> Self {
        let by_client_id = orders
            .into_iter()
            .filter(|o| o.order_id.is_none())
            .map(|o| {
                let key = (
                    o.market.clone(),
                    protocol_client_id(client_order_id_for(&o.client_id)),
                );
                (key, o)
            })
            .collect();
        Self { by_client_id }
    }

    /// Number of indexed orders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_client_id.len()
    }

    /// Returns true if nothing is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_client_id.is_empty()
    }

    fn take(&mut self, remote: &IndexerOrder) -> Option<Order> {
        let client_id = remote.client_id.parse::<u32>().ok()?;
        self.by_client_id
            .remove(&(remote.market.clone(), client_id))
    }
}

/// A local order matched to a remote one.
#[derive(Debug, Clone)]
pub struct LocalMatch {
    /// The ledger row, with `order_id` set.
    pub order: Order,
    /// True if the match was made by client id and `order_id` is not yet
    /// persisted.
    pub linked: bool,
}

/// Find the local order for `remote`.
///
/// Looks up by exchange order id first. Otherwise an unlinked local order
/// with the same market and protocol client id is claimed and its `order_id`
/// set in memory; the caller persists it with its next write.
pub async fn resolve_local_order(
    repo: &dyn OrderRepository,
    remote: &IndexerOrder,
    unlinked: &mut UnlinkedOrders,
) -> Result<Option<LocalMatch>, OrderError> {
    match repo.get_order_by_order_id(&remote.id).await {
        Ok(order) => Ok(Some(LocalMatch {
            order,
            linked: false,
        })),
        Err(OrderError::NotFound { .. }) => Ok(unlinked.take(remote).map(|mut order| {
            tracing::debug!(
                order_id = %order.id,
                remote_id = %remote.id,
                "Linked local order to exchange order"
            );
            order.order_id = Some(remote.id.clone());
            LocalMatch {
                order,
                linked: true,
            }
        })),
        Err(e) => Err(e),
    }
}

//! Turso order ledger.
//!
//! SQLite-dialect tables `orders` and `order_status_history`. Decimals and
//! timestamps are stored as text (RFC 3339, microsecond precision, so text
//! ordering matches time ordering). Writes go through a single connection
//! guarded by an async mutex; an order update and its history row commit in
//! one transaction.

use std::fmt::Display;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use turso::{Builder, Connection, Database, Row, Value};
use uuid::Uuid;

use crate::domain::order::{
    DEFAULT_LIST_LIMIT, Order, OrderError, OrderFilters, OrderRepository, OrderStatus,
    OrderStatusHistory,
};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS orders (
        id TEXT PRIMARY KEY,
        client_id TEXT NOT NULL UNIQUE,
        order_id TEXT,
        market TEXT NOT NULL,
        side TEXT NOT NULL,
        order_type TEXT NOT NULL,
        size TEXT NOT NULL,
        price TEXT,
        quantums INTEGER,
        subticks INTEGER,
        time_in_force TEXT NOT NULL,
        good_til_block INTEGER,
        good_til_block_time TEXT,
        status TEXT NOT NULL,
        filled_size TEXT NOT NULL,
        remaining_size TEXT NOT NULL,
        average_fill_price TEXT,
        tx_hash TEXT,
        block_height INTEGER,
        maker_fee TEXT,
        taker_fee TEXT,
        gas_used INTEGER,
        gas_fee TEXT,
        error_message TEXT,
        retry_count INTEGER NOT NULL DEFAULT 0,
        version INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        placed_at TEXT,
        filled_at TEXT,
        cancelled_at TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_orders_order_id ON orders (order_id)",
    "CREATE INDEX IF NOT EXISTS idx_orders_market ON orders (market)",
    "CREATE INDEX IF NOT EXISTS idx_orders_status ON orders (status)",
    "CREATE INDEX IF NOT EXISTS idx_orders_created_at ON orders (created_at)",
    "CREATE TABLE IF NOT EXISTS order_status_history (
        id TEXT PRIMARY KEY,
        order_id TEXT NOT NULL,
        old_status TEXT,
        new_status TEXT NOT NULL,
        filled_size TEXT NOT NULL,
        remaining_size TEXT NOT NULL,
        fill_price TEXT,
        tx_hash TEXT,
        block_height INTEGER,
        reason TEXT,
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_history_order_id ON order_status_history (order_id)",
];

const ORDER_COLUMNS: &str = "id, client_id, order_id, market, side, order_type, size, price, \
     quantums, subticks, time_in_force, good_til_block, good_til_block_time, status, \
     filled_size, remaining_size, average_fill_price, tx_hash, block_height, maker_fee, \
     taker_fee, gas_used, gas_fee, error_message, retry_count, version, created_at, \
     updated_at, placed_at, filled_at, cancelled_at";

const HISTORY_COLUMNS: &str = "id, order_id, old_status, new_status, filled_size, \
     remaining_size, fill_price, tx_hash, block_height, reason, created_at";

const ACTIVE_STATUSES: &str = "('OPEN', 'PARTIALLY_FILLED')";
const SYNC_STATUSES: &str = "('PENDING', 'OPEN', 'PARTIALLY_FILLED')";

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn text(value: impl Display) -> Value {
    Value::Text(value.to_string())
}

fn opt_text<T: Display>(value: Option<T>) -> Value {
    value.map_or(Value::Null, text)
}

fn opt_timestamp(value: Option<DateTime<Utc>>) -> Value {
    value.map_or(Value::Null, |at| Value::Text(timestamp(at)))
}

fn integer(value: u64) -> Result<Value, OrderError> {
    i64::try_from(value)
        .map(Value::Integer)
        .map_err(|_| OrderError::storage(format!("integer {value} out of range")))
}

fn opt_integer(value: Option<u64>) -> Result<Value, OrderError> {
    value.map_or(Ok(Value::Null), integer)
}

fn order_values(order: &Order) -> Result<Vec<Value>, OrderError> {
    Ok(vec![
        text(order.id),
        text(&order.client_id),
        opt_text(order.order_id.as_deref()),
        text(&order.market),
        text(order.side.as_str()),
        text(order.order_type.as_str()),
        text(order.size),
        opt_text(order.price),
        opt_integer(order.quantums)?,
        opt_integer(order.subticks)?,
        text(order.time_in_force.as_str()),
        opt_integer(order.good_til_block.map(u64::from))?,
        opt_timestamp(order.good_til_block_time),
        text(order.status.as_str()),
        text(order.filled_size),
        text(order.remaining_size),
        opt_text(order.average_fill_price),
        opt_text(order.tx_hash.as_deref()),
        opt_integer(order.block_height)?,
        opt_text(order.maker_fee),
        opt_text(order.taker_fee),
        opt_integer(order.gas_used)?,
        opt_text(order.gas_fee),
        opt_text(order.error_message.as_deref()),
        integer(u64::from(order.retry_count))?,
        integer(order.version)?,
        Value::Text(timestamp(order.created_at)),
        Value::Text(timestamp(order.updated_at)),
        opt_timestamp(order.placed_at),
        opt_timestamp(order.filled_at),
        opt_timestamp(order.cancelled_at),
    ])
}

fn history_values(entry: &OrderStatusHistory) -> Result<Vec<Value>, OrderError> {
    Ok(vec![
        text(entry.id),
        text(entry.order_id),
        opt_text(entry.old_status.map(|s| s.as_str())),
        text(entry.new_status.as_str()),
        text(entry.filled_size),
        text(entry.remaining_size),
        opt_text(entry.fill_price),
        opt_text(entry.tx_hash.as_deref()),
        opt_integer(entry.block_height)?,
        opt_text(entry.reason.as_deref()),
        Value::Text(timestamp(entry.created_at)),
    ])
}

/// Sequential column reader over a result row.
struct Columns<'a> {
    row: &'a Row,
    next: usize,
}

impl<'a> Columns<'a> {
    const fn new(row: &'a Row) -> Self {
        Self { row, next: 0 }
    }

    fn value(&mut self) -> Result<Value, OrderError> {
        let index = self.next;
        self.next += 1;
        self.row.get_value(index).map_err(OrderError::storage)
    }

    fn opt_text(&mut self) -> Result<Option<String>, OrderError> {
        match self.value()? {
            Value::Null => Ok(None),
            Value::Text(s) => Ok(Some(s)),
            Value::Integer(i) => Ok(Some(i.to_string())),
            other => Err(OrderError::storage(format!(
                "column {} expected text, got {other:?}",
                self.next - 1
            ))),
        }
    }

    fn text(&mut self) -> Result<String, OrderError> {
        self.opt_text()?
            .ok_or_else(|| OrderError::storage(format!("column {} is null", self.next - 1)))
    }

    fn opt_parse<T>(&mut self) -> Result<Option<T>, OrderError>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.opt_text()?
            .map(|s| s.parse::<T>().map_err(OrderError::storage))
            .transpose()
    }

    fn parse<T>(&mut self) -> Result<T, OrderError>
    where
        T: FromStr,
        T::Err: Display,
    {
        let raw = self.text()?;
        raw.parse::<T>().map_err(OrderError::storage)
    }

    fn opt_u64(&mut self) -> Result<Option<u64>, OrderError> {
        match self.value()? {
            Value::Null => Ok(None),
            Value::Integer(i) => u64::try_from(i)
                .map(Some)
                .map_err(|_| OrderError::storage(format!("negative integer {i}"))),
            other => Err(OrderError::storage(format!(
                "column {} expected integer, got {other:?}",
                self.next - 1
            ))),
        }
    }

    fn u64(&mut self) -> Result<u64, OrderError> {
        self.opt_u64()?
            .ok_or_else(|| OrderError::storage(format!("column {} is null", self.next - 1)))
    }

    fn opt_timestamp(&mut self) -> Result<Option<DateTime<Utc>>, OrderError> {
        self.opt_text()?
            .map(|s| {
                DateTime::parse_from_rfc3339(&s)
                    .map(|at| at.with_timezone(&Utc))
                    .map_err(OrderError::storage)
            })
            .transpose()
    }

    fn timestamp(&mut self) -> Result<DateTime<Utc>, OrderError> {
        self.opt_timestamp()?
            .ok_or_else(|| OrderError::storage(format!("column {} is null", self.next - 1)))
    }
}

fn order_from_row(row: &Row) -> Result<Order, OrderError> {
    let mut c = Columns::new(row);
    Ok(Order {
        id: c.parse()?,
        client_id: c.text()?,
        order_id: c.opt_text()?,
        market: c.text()?,
        side: c.parse()?,
        order_type: c.parse()?,
        size: c.parse()?,
        price: c.opt_parse()?,
        quantums: c.opt_u64()?,
        subticks: c.opt_u64()?,
        time_in_force: c.parse()?,
        good_til_block: c
            .opt_u64()?
            .map(|b| u32::try_from(b).map_err(OrderError::storage))
            .transpose()?,
        good_til_block_time: c.opt_timestamp()?,
        status: c.parse()?,
        filled_size: c.parse()?,
        remaining_size: c.parse()?,
        average_fill_price: c.opt_parse()?,
        tx_hash: c.opt_text()?,
        block_height: c.opt_u64()?,
        maker_fee: c.opt_parse()?,
        taker_fee: c.opt_parse()?,
        gas_used: c.opt_u64()?,
        gas_fee: c.opt_parse::<Decimal>()?,
        error_message: c.opt_text()?,
        retry_count: u32::try_from(c.u64()?).map_err(OrderError::storage)?,
        version: c.u64()?,
        created_at: c.timestamp()?,
        updated_at: c.timestamp()?,
        placed_at: c.opt_timestamp()?,
        filled_at: c.opt_timestamp()?,
        cancelled_at: c.opt_timestamp()?,
    })
}

fn history_from_row(row: &Row) -> Result<OrderStatusHistory, OrderError> {
    let mut c = Columns::new(row);
    Ok(OrderStatusHistory {
        id: c.parse()?,
        order_id: c.parse()?,
        old_status: c.opt_parse()?,
        new_status: c.parse()?,
        filled_size: c.parse()?,
        remaining_size: c.parse()?,
        fill_price: c.opt_parse()?,
        tx_hash: c.opt_text()?,
        block_height: c.opt_u64()?,
        reason: c.opt_text()?,
        created_at: c.timestamp()?,
    })
}

fn is_unique_violation(error: &turso::Error) -> bool {
    error.to_string().contains("UNIQUE constraint failed")
}

/// Turso implementation of `OrderRepository`.
pub struct TursoOrderRepository {
    // Keeps the database open for the connection's lifetime.
    _db: Database,
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for TursoOrderRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TursoOrderRepository").finish_non_exhaustive()
    }
}

impl TursoOrderRepository {
    /// Open (or create) the database at `path` and apply the schema.
    ///
    /// `:memory:` opens a private in-memory database.
    pub async fn open(path: &str) -> Result<Self, OrderError> {
        let db = Builder::new_local(path)
            .build()
            .await
            .map_err(OrderError::storage)?;
        let conn = db.connect().map_err(OrderError::storage)?;
        for statement in SCHEMA {
            conn.execute(statement, ())
                .await
                .map_err(OrderError::storage)?;
        }
        tracing::info!(path, "Order ledger opened");
        Ok(Self {
            _db: db,
            conn: Mutex::new(conn),
        })
    }

    /// Open a private in-memory database.
    pub async fn in_memory() -> Result<Self, OrderError> {
        Self::open(":memory:").await
    }

    async fn query_orders(
        conn: &Connection,
        sql: &str,
        params: Vec<Value>,
    ) -> Result<Vec<Order>, OrderError> {
        let mut rows = conn.query(sql, params).await.map_err(OrderError::storage)?;
        let mut orders = Vec::new();
        while let Some(row) = rows.next().await.map_err(OrderError::storage)? {
            orders.push(order_from_row(&row)?);
        }
        Ok(orders)
    }

    async fn query_one(
        conn: &Connection,
        column: &str,
        key: String,
    ) -> Result<Order, OrderError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE {column} = ? LIMIT 1");
        Self::query_orders(conn, &sql, vec![Value::Text(key.clone())])
            .await?
            .into_iter()
            .next()
            .ok_or(OrderError::NotFound { id: key })
    }

    async fn insert_history(
        conn: &Connection,
        entry: &OrderStatusHistory,
    ) -> Result<(), OrderError> {
        let sql = format!(
            "INSERT INTO order_status_history ({HISTORY_COLUMNS}) VALUES ({})",
            placeholders(11)
        );
        conn.execute(&sql, history_values(entry)?)
            .await
            .map_err(OrderError::storage)?;
        Ok(())
    }

    async fn begin(conn: &Connection) -> Result<(), OrderError> {
        conn.execute("BEGIN", ()).await.map_err(OrderError::storage)?;
        Ok(())
    }

    async fn finish<T>(conn: &Connection, result: Result<T, OrderError>) -> Result<T, OrderError> {
        match result {
            Ok(value) => {
                conn.execute("COMMIT", ()).await.map_err(OrderError::storage)?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = conn.execute("ROLLBACK", ()).await {
                    tracing::error!(error = %rollback, "Rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Write `next` if the stored row is still at version `expected`.
    async fn update_locked(
        conn: &Connection,
        next: &Order,
        expected: u64,
        reason: Option<&str>,
    ) -> Result<(), OrderError> {
        let stored = Self::query_one(conn, "id", next.id.to_string()).await?;
        let conflict = || OrderError::ConcurrentModification {
            order_id: next.id.to_string(),
            expected,
        };
        if stored.version != expected {
            return Err(conflict());
        }

        let assignments = ORDER_COLUMNS
            .split(", ")
            .skip(1)
            .map(|column| format!("{column} = ?"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("UPDATE orders SET {assignments} WHERE id = ? AND version = ?");
        let mut params = order_values(next)?;
        let id = params.remove(0);
        params.push(id);
        params.push(integer(expected)?);

        let changed = conn.execute(&sql, params).await.map_err(OrderError::storage)?;
        if changed == 0 {
            return Err(conflict());
        }
        if stored.status != next.status {
            Self::insert_history(
                conn,
                &OrderStatusHistory::record(next, Some(stored.status), reason),
            )
            .await?;
        }
        Ok(())
    }
}

fn bumped(order: &Order) -> Order {
    let mut next = order.clone();
    next.version += 1;
    next.updated_at = Utc::now();
    next
}

#[async_trait]
impl OrderRepository for TursoOrderRepository {
    async fn create_order(&self, order: &Order) -> Result<(), OrderError> {
        order.validate()?;
        let conn = self.conn.lock().await;
        Self::begin(&conn).await?;
        let result = async {
            let sql = format!(
                "INSERT INTO orders ({ORDER_COLUMNS}) VALUES ({})",
                placeholders(31)
            );
            conn.execute(&sql, order_values(order)?)
                .await
                .map_err(|e| {
                    if is_unique_violation(&e) {
                        OrderError::Duplicate {
                            client_id: order.client_id.clone(),
                        }
                    } else {
                        OrderError::storage(e)
                    }
                })?;
            Self::insert_history(
                &conn,
                &OrderStatusHistory::record(order, None, Some("order created")),
            )
            .await
        }
        .await;
        Self::finish(&conn, result).await
    }

    async fn get_order_by_id(&self, id: Uuid) -> Result<Order, OrderError> {
        let conn = self.conn.lock().await;
        Self::query_one(&conn, "id", id.to_string()).await
    }

    async fn get_order_by_client_id(&self, client_id: &str) -> Result<Order, OrderError> {
        let conn = self.conn.lock().await;
        Self::query_one(&conn, "client_id", client_id.to_string()).await
    }

    async fn get_order_by_order_id(&self, order_id: &str) -> Result<Order, OrderError> {
        let conn = self.conn.lock().await;
        Self::query_one(&conn, "order_id", order_id.to_string()).await
    }

    async fn update_order(
        &self,
        order: &mut Order,
        reason: Option<String>,
    ) -> Result<(), OrderError> {
        order.validate()?;
        let next = bumped(order);
        let conn = self.conn.lock().await;
        Self::begin(&conn).await?;
        let result = Self::update_locked(&conn, &next, order.version, reason.as_deref()).await;
        Self::finish(&conn, result).await?;
        *order = next;
        Ok(())
    }

    async fn delete_order(&self, id: Uuid) -> Result<(), OrderError> {
        let conn = self.conn.lock().await;
        Self::begin(&conn).await?;
        let result = async {
            let key = Value::Text(id.to_string());
            conn.execute("DELETE FROM order_status_history WHERE order_id = ?", vec![key.clone()])
                .await
                .map_err(OrderError::storage)?;
            let deleted = conn
                .execute("DELETE FROM orders WHERE id = ?", vec![key])
                .await
                .map_err(OrderError::storage)?;
            if deleted == 0 {
                return Err(OrderError::NotFound { id: id.to_string() });
            }
            Ok(())
        }
        .await;
        Self::finish(&conn, result).await
    }

    async fn list_orders(&self, filters: &OrderFilters) -> Result<Vec<Order>, OrderError> {
        let mut clauses = Vec::new();
        let mut params = Vec::new();
        if let Some(market) = &filters.market {
            clauses.push("market = ?");
            params.push(text(market));
        }
        if let Some(side) = filters.side {
            clauses.push("side = ?");
            params.push(text(side.as_str()));
        }
        if let Some(order_type) = filters.order_type {
            clauses.push("order_type = ?");
            params.push(text(order_type.as_str()));
        }
        if let Some(status) = filters.status {
            clauses.push("status = ?");
            params.push(text(status.as_str()));
        }
        if let Some(after) = filters.created_after {
            clauses.push("created_at >= ?");
            params.push(Value::Text(timestamp(after)));
        }
        if let Some(before) = filters.created_before {
            clauses.push("created_at <= ?");
            params.push(Value::Text(timestamp(before)));
        }
        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };
        params.push(integer(u64::from(filters.limit.unwrap_or(DEFAULT_LIST_LIMIT)))?);
        params.push(integer(u64::from(filters.offset.unwrap_or(0)))?);

        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders{where_clause} ORDER BY created_at DESC LIMIT ? OFFSET ?"
        );
        let conn = self.conn.lock().await;
        Self::query_orders(&conn, &sql, params).await
    }

    async fn list_active_orders(&self, market: Option<String>) -> Result<Vec<Order>, OrderError> {
        let (sql, params) = match market {
            Some(market) => (
                format!(
                    "SELECT {ORDER_COLUMNS} FROM orders WHERE status IN {ACTIVE_STATUSES} \
                     AND market = ? ORDER BY created_at DESC"
                ),
                vec![Value::Text(market)],
            ),
            None => (
                format!(
                    "SELECT {ORDER_COLUMNS} FROM orders WHERE status IN {ACTIVE_STATUSES} \
                     ORDER BY created_at DESC"
                ),
                Vec::new(),
            ),
        };
        let conn = self.conn.lock().await;
        Self::query_orders(&conn, &sql, params).await
    }

    async fn list_orders_by_status(
        &self,
        status: OrderStatus,
        limit: u32,
    ) -> Result<Vec<Order>, OrderError> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE status = ? ORDER BY created_at DESC LIMIT ?"
        );
        let conn = self.conn.lock().await;
        Self::query_orders(
            &conn,
            &sql,
            vec![text(status.as_str()), integer(u64::from(limit))?],
        )
        .await
    }

    async fn count_orders_by_status(&self, status: OrderStatus) -> Result<u64, OrderError> {
        let conn = self.conn.lock().await;
        let mut rows = conn
            .query(
                "SELECT COUNT(*) FROM orders WHERE status = ?",
                vec![text(status.as_str())],
            )
            .await
            .map_err(OrderError::storage)?;
        match rows.next().await.map_err(OrderError::storage)? {
            Some(row) => Columns::new(&row).u64(),
            None => Ok(0),
        }
    }

    async fn get_order_history(&self, order_id: Uuid) -> Result<Vec<OrderStatusHistory>, OrderError> {
        let sql = format!(
            "SELECT {HISTORY_COLUMNS} FROM order_status_history WHERE order_id = ? \
             ORDER BY created_at ASC"
        );
        let conn = self.conn.lock().await;
        let mut rows = conn
            .query(&sql, vec![text(order_id)])
            .await
            .map_err(OrderError::storage)?;
        let mut history = Vec::new();
        while let Some(row) = rows.next().await.map_err(OrderError::storage)? {
            history.push(history_from_row(&row)?);
        }
        Ok(history)
    }

    async fn create_order_status_history(
        &self,
        history: &OrderStatusHistory,
    ) -> Result<(), OrderError> {
        let conn = self.conn.lock().await;
        Self::query_one(&conn, "id", history.order_id.to_string()).await?;
        Self::insert_history(&conn, history).await
    }

    async fn update_orders_status(
        &self,
        ids: &[Uuid],
        status: OrderStatus,
    ) -> Result<u64, OrderError> {
        let conn = self.conn.lock().await;
        Self::begin(&conn).await?;
        let result = async {
            let mut changed = 0;
            for id in ids {
                let order = match Self::query_one(&conn, "id", id.to_string()).await {
                    Ok(order) => order,
                    Err(OrderError::NotFound { .. }) => continue,
                    Err(e) => return Err(e),
                };
                if order.status == status {
                    continue;
                }
                let mut next = bumped(&order);
                next.set_status(status);
                Self::update_locked(&conn, &next, order.version, Some("bulk status update"))
                    .await?;
                changed += 1;
            }
            Ok(changed)
        }
        .await;
        Self::finish(&conn, result).await
    }

    async fn get_orders_for_sync(&self, limit: u32) -> Result<Vec<Order>, OrderError> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE status IN {SYNC_STATUSES} \
             ORDER BY updated_at ASC LIMIT ?"
        );
        let conn = self.conn.lock().await;
        Self::query_orders(&conn, &sql, vec![integer(u64::from(limit))?]).await
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::domain::order::{NewOrder, OrderSide, OrderType, TimeInForce};

    fn order(client_id: &str, market: &str, order_type: OrderType) -> Order {
        Order::new(NewOrder {
            client_id: client_id.to_string(),
            market: market.to_string(),
            side: OrderSide::Sell,
            order_type,
            size: dec!(0.015),
            price: order_type.requires_price().then_some(dec!(65000.5)),
            time_in_force: TimeInForce::Gtt,
            good_til_block: Some(1_234),
            good_til_block_time: None,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn file_backed_round_trip_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        let path = path.to_str().unwrap();

        let mut o = order("c1", "BTC-USD", OrderType::Limit);
        o.quantums = Some(1_500_000);
        o.subticks = Some(65_000_500_000);
        {
            let repo = TursoOrderRepository::open(path).await.unwrap();
            repo.create_order(&o).await.unwrap();
        }

        let repo = TursoOrderRepository::open(path).await.unwrap();
        let loaded = repo.get_order_by_client_id("c1").await.unwrap();
        assert_eq!(loaded.id, o.id);
        assert_eq!(loaded.size, dec!(0.015));
        assert_eq!(loaded.price, Some(dec!(65000.5)));
        assert_eq!(loaded.subticks, Some(65_000_500_000));
        assert_eq!(loaded.good_til_block, Some(1_234));
        assert_eq!(loaded.status, OrderStatus::Pending);
        assert_eq!(loaded.created_at.timestamp_micros(), o.created_at.timestamp_micros());
    }

    #[tokio::test]
    async fn update_checks_version_and_records_history() {
        let repo = TursoOrderRepository::in_memory().await.unwrap();
        let mut o = order("c1", "BTC-USD", OrderType::Market);
        repo.create_order(&o).await.unwrap();
        let stale = o.clone();

        o.mark_placed("ABCDEF", Some(99));
        o.order_id = Some("remote-1".to_string());
        repo.update_order(&mut o, Some("placed".to_string()))
            .await
            .unwrap();
        assert_eq!(o.version, 1);

        let mut stale = stale;
        assert!(matches!(
            repo.update_order(&mut stale, None).await,
            Err(OrderError::ConcurrentModification { expected: 0, .. })
        ));

        let loaded = repo.get_order_by_order_id("remote-1").await.unwrap();
        assert_eq!(loaded.status, OrderStatus::Open);
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.block_height, Some(99));

        let history = repo.get_order_history(o.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].new_status, OrderStatus::Pending);
        assert_eq!(history[1].old_status, Some(OrderStatus::Pending));
        assert_eq!(history[1].reason.as_deref(), Some("placed"));
    }

    #[tokio::test]
    async fn duplicate_client_id_is_rejected() {
        let repo = TursoOrderRepository::in_memory().await.unwrap();
        repo.create_order(&order("dup", "BTC-USD", OrderType::Limit))
            .await
            .unwrap();
        assert!(matches!(
            repo.create_order(&order("dup", "ETH-USD", OrderType::Limit))
                .await,
            Err(OrderError::Duplicate { .. })
        ));
        assert!(
            repo.list_orders(&OrderFilters::default())
                .await
                .unwrap()
                .len()
                == 1
        );
    }

    #[tokio::test]
    async fn filters_and_status_queries() {
        let repo = TursoOrderRepository::in_memory().await.unwrap();
        let mut a = order("a", "BTC-USD", OrderType::Limit);
        let b = order("b", "ETH-USD", OrderType::Limit);
        let c = order("c", "BTC-USD", OrderType::Market);
        for o in [&a, &b, &c] {
            repo.create_order(o).await.unwrap();
        }
        a.mark_placed("H", None);
        repo.update_order(&mut a, None).await.unwrap();

        let btc = repo
            .list_orders(&OrderFilters {
                market: Some("BTC-USD".to_string()),
                ..OrderFilters::default()
            })
            .await
            .unwrap();
        assert_eq!(btc.len(), 2);
        assert!(btc[0].created_at >= btc[1].created_at);

        let active = repo.list_active_orders(None).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, a.id);
        assert_eq!(repo.count_orders_by_status(OrderStatus::Pending).await.unwrap(), 2);
        assert_eq!(repo.get_orders_for_sync(10).await.unwrap().len(), 3);
        assert_eq!(
            repo.list_orders_by_status(OrderStatus::Pending, 1)
                .await
                .unwrap()
                .len(),
            1
        );

        let expired = repo
            .update_orders_status(&[b.id, c.id, Uuid::new_v4()], OrderStatus::Expired)
            .await
            .unwrap();
        assert_eq!(expired, 2);
        assert_eq!(repo.get_order_history(b.id).await.unwrap().len(), 2);
        assert_eq!(repo.get_orders_for_sync(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_and_missing_rows() {
        let repo = TursoOrderRepository::in_memory().await.unwrap();
        let o = order("a", "BTC-USD", OrderType::Limit);
        repo.create_order(&o).await.unwrap();
        repo.delete_order(o.id).await.unwrap();

        assert!(matches!(
            repo.get_order_by_id(o.id).await,
            Err(OrderError::NotFound { .. })
        ));
        assert!(repo.get_order_history(o.id).await.unwrap().is_empty());
        assert!(matches!(
            repo.delete_order(o.id).await,
            Err(OrderError::NotFound { .. })
        ));
        assert!(matches!(
            repo.create_order_status_history(&OrderStatusHistory::record(&o, None, None))
                .await,
            Err(OrderError::NotFound { .. })
        ));
    }
}

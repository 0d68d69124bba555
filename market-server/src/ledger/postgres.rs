//! PostgreSQL ledger (sqlx)

use super::{LedgerError, LedgerResult, LedgerStore};
use async_trait::async_trait;
use rust_decimal::Decimal;
use shared::models::{
    NewOrder, NewOrderItem, NewReservation, Order, OrderItem, OrderStatus, PaymentStatus, Product,
    Reservation, ReservationStatus,
};
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::str::FromStr;

const PRODUCT_COLUMNS: &str = "id, name, seller_id, price, stock_quantity";
const RESERVATION_COLUMNS: &str =
    "id, product_id, customer_id, quantity, status, created_at, expires_at";
const ORDER_COLUMNS: &str = "id, order_number, customer_id, seller_id, subtotal, shipping_fee, tax, \
     total_amount, shipping_region, payment_method, payment_status, order_status, \
     payment_reference, needs_review, created_at, cancelled_at, cancellation_reason";
const ORDER_ITEM_COLUMNS: &str = "id, order_id, product_id, seller_id, quantity, unit_price, subtotal";

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: i64,
    name: String,
    seller_id: i64,
    price: Decimal,
    stock_quantity: i32,
}

impl From<ProductRow> for Product {
    fn from(r: ProductRow) -> Self {
        Self {
            id: r.id,
            name: r.name,
            seller_id: r.seller_id,
            price: r.price,
            stock_quantity: r.stock_quantity,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ReservationRow {
    id: i64,
    product_id: i64,
    customer_id: i64,
    quantity: i32,
    status: String,
    created_at: i64,
    expires_at: i64,
}

impl TryFrom<ReservationRow> for Reservation {
    type Error = LedgerError;

    fn try_from(r: ReservationRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            product_id: r.product_id,
            customer_id: r.customer_id,
            quantity: r.quantity,
            status: parse_column(&r.status)?,
            created_at: r.created_at,
            expires_at: r.expires_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: i64,
    order_number: String,
    customer_id: i64,
    seller_id: Option<i64>,
    subtotal: Decimal,
    shipping_fee: Decimal,
    tax: Decimal,
    total_amount: Decimal,
    shipping_region: String,
    payment_method: String,
    payment_status: String,
    order_status: String,
    payment_reference: Option<String>,
    needs_review: bool,
    created_at: i64,
    cancelled_at: Option<i64>,
    cancellation_reason: Option<String>,
}

impl TryFrom<OrderRow> for Order {
    type Error = LedgerError;

    fn try_from(r: OrderRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            order_number: r.order_number,
            customer_id: r.customer_id,
            seller_id: r.seller_id,
            subtotal: r.subtotal,
            shipping_fee: r.shipping_fee,
            tax: r.tax,
            total_amount: r.total_amount,
            shipping_region: r.shipping_region,
            payment_method: parse_column(&r.payment_method)?,
            payment_status: parse_column(&r.payment_status)?,
            order_status: parse_column(&r.order_status)?,
            payment_reference: r.payment_reference,
            needs_review: r.needs_review,
            created_at: r.created_at,
            cancelled_at: r.cancelled_at,
            cancellation_reason: r.cancellation_reason,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    id: i64,
    order_id: i64,
    product_id: i64,
    seller_id: i64,
    quantity: i32,
    unit_price: Decimal,
    subtotal: Decimal,
}

impl From<OrderItemRow> for OrderItem {
    fn from(r: OrderItemRow) -> Self {
        Self {
            id: r.id,
            order_id: r.order_id,
            product_id: r.product_id,
            seller_id: r.seller_id,
            quantity: r.quantity,
            unit_price: r.unit_price,
            subtotal: r.subtotal,
        }
    }
}

fn parse_column<T: FromStr<Err = String>>(value: &str) -> LedgerResult<T> {
    T::from_str(value).map_err(LedgerError::Corrupt)
}

/// Ledger backed by a shared Postgres database
#[derive(Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and run embedded migrations
    pub async fn connect(database_url: &str) -> LedgerResult<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(20)
            .connect(database_url)
            .await?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| LedgerError::Database(format!("migration failed: {e}")))?;
        tracing::info!("Ledger database connected and migrated");
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LedgerStore for PgLedger {
    async fn find_product(&self, id: i64) -> LedgerResult<Option<Product>> {
        let row: Option<ProductRow> =
            sqlx::query_as(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Product::from))
    }

    async fn find_products(&self, ids: &[i64]) -> LedgerResult<Vec<Product>> {
        let rows: Vec<ProductRow> = sqlx::query_as(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn update_stock_if(
        &self,
        id: i64,
        expected: i32,
        new_quantity: i32,
    ) -> LedgerResult<u64> {
        let result = sqlx::query(
            "UPDATE products SET stock_quantity = $3 WHERE id = $1 AND stock_quantity = $2",
        )
        .bind(id)
        .bind(expected)
        .bind(new_quantity)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn decrement_stock_guarded(
        &self,
        id: i64,
        expected: i32,
        quantity: i32,
    ) -> LedgerResult<u64> {
        let result = sqlx::query(
            "UPDATE products SET stock_quantity = $2 - $3
             WHERE id = $1 AND stock_quantity = $2 AND stock_quantity > $3 - 1",
        )
        .bind(id)
        .bind(expected)
        .bind(quantity)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn increment_stock(&self, id: i64, quantity: i32) -> LedgerResult<()> {
        sqlx::query("UPDATE products SET stock_quantity = stock_quantity + $2 WHERE id = $1")
            .bind(id)
            .bind(quantity)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn low_stock_products(&self, threshold: i32) -> LedgerResult<Vec<Product>> {
        let rows: Vec<ProductRow> = sqlx::query_as(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products
             WHERE stock_quantity <= $1
             ORDER BY stock_quantity ASC, id ASC"
        ))
        .bind(threshold)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn insert_reservation(&self, reservation: &NewReservation) -> LedgerResult<Reservation> {
        let row: ReservationRow = sqlx::query_as(&format!(
            "INSERT INTO stock_reservations (product_id, customer_id, quantity, status, created_at, expires_at)
             VALUES ($1, $2, $3, 'pending', $4, $5)
             RETURNING {RESERVATION_COLUMNS}"
        ))
        .bind(reservation.product_id)
        .bind(reservation.customer_id)
        .bind(reservation.quantity)
        .bind(reservation.created_at)
        .bind(reservation.expires_at)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn find_reservation(&self, id: i64) -> LedgerResult<Option<Reservation>> {
        let row: Option<ReservationRow> = sqlx::query_as(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM stock_reservations WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Reservation::try_from).transpose()
    }

    async fn expired_reservations(&self, now: i64) -> LedgerResult<Vec<Reservation>> {
        let rows: Vec<ReservationRow> = sqlx::query_as(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM stock_reservations
             WHERE status = 'pending' AND expires_at <= $1
             ORDER BY expires_at ASC"
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Reservation::try_from).collect()
    }

    async fn transition_reservation(
        &self,
        id: i64,
        from: ReservationStatus,
        to: ReservationStatus,
    ) -> LedgerResult<u64> {
        let result =
            sqlx::query("UPDATE stock_reservations SET status = $3 WHERE id = $1 AND status = $2")
                .bind(id)
                .bind(from.as_str())
                .bind(to.as_str())
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    async fn next_order_sequence(&self) -> LedgerResult<Option<i64>> {
        let row: (i64,) = sqlx::query_as("SELECT nextval('order_number_seq')")
            .fetch_one(&self.pool)
            .await?;
        Ok(Some(row.0))
    }

    async fn insert_order(&self, order: &NewOrder) -> LedgerResult<Order> {
        let row: OrderRow = sqlx::query_as(&format!(
            "INSERT INTO orders (order_number, customer_id, seller_id, subtotal, shipping_fee, tax,
                total_amount, shipping_region, payment_method, payment_status, order_status,
                payment_reference, needs_review, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(&order.order_number)
        .bind(order.customer_id)
        .bind(order.seller_id)
        .bind(order.totals.subtotal)
        .bind(order.totals.shipping_fee)
        .bind(order.totals.tax)
        .bind(order.totals.total_amount)
        .bind(&order.shipping_region)
        .bind(order.payment_method.as_str())
        .bind(order.payment_status.as_str())
        .bind(order.order_status.as_str())
        .bind(&order.payment_reference)
        .bind(order.needs_review)
        .bind(order.created_at)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn insert_order_items(&self, items: &[NewOrderItem]) -> LedgerResult<Vec<OrderItem>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO order_items (order_id, product_id, seller_id, quantity, unit_price, subtotal) ",
        );
        builder.push_values(items, |mut b, item| {
            b.push_bind(item.order_id)
                .push_bind(item.product_id)
                .push_bind(item.seller_id)
                .push_bind(item.quantity)
                .push_bind(item.unit_price)
                .push_bind(item.subtotal);
        });
        builder.push(format!(" RETURNING {ORDER_ITEM_COLUMNS}"));
        let rows: Vec<OrderItemRow> = builder
            .build_query_as()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(OrderItem::from).collect())
    }

    async fn find_order(&self, id: i64) -> LedgerResult<Option<Order>> {
        let row: Option<OrderRow> =
            sqlx::query_as(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(Order::try_from).transpose()
    }

    async fn find_order_by_reference(
        &self,
        payment_reference: &str,
    ) -> LedgerResult<Option<Order>> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE payment_reference = $1"
        ))
        .bind(payment_reference)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Order::try_from).transpose()
    }

    async fn find_order_items(&self, order_id: i64) -> LedgerResult<Vec<OrderItem>> {
        let rows: Vec<OrderItemRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_ITEM_COLUMNS} FROM order_items WHERE order_id = $1 ORDER BY id"
        ))
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(OrderItem::from).collect())
    }

    async fn cancel_order_if(
        &self,
        id: i64,
        allowed: &[OrderStatus],
        reason: &str,
        cancelled_at: i64,
    ) -> LedgerResult<u64> {
        let allowed: Vec<&str> = allowed.iter().map(OrderStatus::as_str).collect();
        let result = sqlx::query(
            "UPDATE orders
             SET order_status = 'cancelled', cancelled_at = $3, cancellation_reason = $4
             WHERE id = $1 AND order_status = ANY($2)",
        )
        .bind(id)
        .bind(&allowed)
        .bind(cancelled_at)
        .bind(reason)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn orders_without_items(&self, created_before: i64) -> LedgerResult<Vec<Order>> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders o
             WHERE o.order_status <> 'cancelled'
               AND o.created_at < $1
               AND NOT EXISTS (SELECT 1 FROM order_items i WHERE i.order_id = o.id)
             ORDER BY o.created_at ASC"
        ))
        .bind(created_before)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Order::try_from).collect()
    }

    async fn update_payment_status(
        &self,
        payment_reference: &str,
        status: PaymentStatus,
        clear_review: bool,
    ) -> LedgerResult<u64> {
        let result = sqlx::query(
            "UPDATE orders
             SET payment_status = $2,
                 needs_review = CASE WHEN $3 THEN FALSE ELSE needs_review END
             WHERE payment_reference = $1",
        )
        .bind(payment_reference)
        .bind(status.as_str())
        .bind(clear_review)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

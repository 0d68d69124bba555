//! In-memory ledger
//!
//! Same row-level semantics as [`super::PgLedger`]: every method is one
//! atomic "statement", and callers may interleave arbitrarily between
//! statements. Each call yields to the scheduler first so concurrent tests
//! actually interleave like remote round-trips do.

use super::{LedgerError, LedgerResult, LedgerStore};
use async_trait::async_trait;
use parking_lot::Mutex;
use shared::models::{
    NewOrder, NewOrderItem, NewReservation, Order, OrderItem, OrderStatus, PaymentStatus, Product,
    Reservation, ReservationStatus,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Default)]
struct Tables {
    products: HashMap<i64, Product>,
    reservations: BTreeMap<i64, Reservation>,
    orders: BTreeMap<i64, Order>,
    order_items: BTreeMap<i64, OrderItem>,
    next_id: i64,
    order_sequence: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Ledger backed by process memory
#[derive(Default)]
pub struct MemoryLedger {
    tables: Mutex<Tables>,
    /// Whether `next_order_sequence` hands out numbers (server-side sequence)
    sequence_enabled: AtomicBool,
    fail_reservation_inserts: AtomicBool,
    fail_order_item_inserts: AtomicBool,
    fail_order_inserts: AtomicBool,
    fail_stock_increments: AtomicBool,
}

impl MemoryLedger {
    pub fn new() -> Self {
        let ledger = Self::default();
        ledger.sequence_enabled.store(true, Ordering::SeqCst);
        ledger
    }

    /// Seed or overwrite a product row
    pub fn put_product(&self, product: Product) {
        self.tables.lock().products.insert(product.id, product);
    }

    /// Current stock of a product (test/diagnostic helper)
    pub fn stock_of(&self, product_id: i64) -> Option<i32> {
        self.tables
            .lock()
            .products
            .get(&product_id)
            .map(|p| p.stock_quantity)
    }

    pub fn orders(&self) -> Vec<Order> {
        self.tables.lock().orders.values().cloned().collect()
    }

    pub fn reservations(&self) -> Vec<Reservation> {
        self.tables.lock().reservations.values().cloned().collect()
    }

    pub fn set_sequence_enabled(&self, enabled: bool) {
        self.sequence_enabled.store(enabled, Ordering::SeqCst);
    }

    /// Make the advisory reservation insert fail
    pub fn fail_reservation_inserts(&self, fail: bool) {
        self.fail_reservation_inserts.store(fail, Ordering::SeqCst);
    }

    /// Make the second commit write (order lines) fail
    pub fn fail_order_item_inserts(&self, fail: bool) {
        self.fail_order_item_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_order_inserts(&self, fail: bool) {
        self.fail_order_inserts.store(fail, Ordering::SeqCst);
    }

    /// Make stock increments (releases) fail
    pub fn fail_stock_increments(&self, fail: bool) {
        self.fail_stock_increments.store(fail, Ordering::SeqCst);
    }

    fn check_fault(flag: &AtomicBool, what: &str) -> LedgerResult<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable(format!("{what} rejected")));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn find_product(&self, id: i64) -> LedgerResult<Option<Product>> {
        tokio::task::yield_now().await;
        Ok(self.tables.lock().products.get(&id).cloned())
    }

    async fn find_products(&self, ids: &[i64]) -> LedgerResult<Vec<Product>> {
        tokio::task::yield_now().await;
        let tables = self.tables.lock();
        Ok(ids
            .iter()
            .filter_map(|id| tables.products.get(id).cloned())
            .collect())
    }

    async fn update_stock_if(
        &self,
        id: i64,
        expected: i32,
        new_quantity: i32,
    ) -> LedgerResult<u64> {
        tokio::task::yield_now().await;
        if new_quantity < 0 {
            return Err(LedgerError::Database(
                "stock_quantity check constraint violated".into(),
            ));
        }
        let mut tables = self.tables.lock();
        match tables.products.get_mut(&id) {
            Some(p) if p.stock_quantity == expected => {
                p.stock_quantity = new_quantity;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn decrement_stock_guarded(
        &self,
        id: i64,
        expected: i32,
        quantity: i32,
    ) -> LedgerResult<u64> {
        tokio::task::yield_now().await;
        let mut tables = self.tables.lock();
        match tables.products.get_mut(&id) {
            Some(p) if p.stock_quantity == expected && p.stock_quantity > quantity - 1 => {
                p.stock_quantity = expected - quantity;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn increment_stock(&self, id: i64, quantity: i32) -> LedgerResult<()> {
        tokio::task::yield_now().await;
        Self::check_fault(&self.fail_stock_increments, "stock increment")?;
        if let Some(p) = self.tables.lock().products.get_mut(&id) {
            p.stock_quantity += quantity;
        }
        Ok(())
    }

    async fn low_stock_products(&self, threshold: i32) -> LedgerResult<Vec<Product>> {
        tokio::task::yield_now().await;
        let mut products: Vec<Product> = self
            .tables
            .lock()
            .products
            .values()
            .filter(|p| p.stock_quantity <= threshold)
            .cloned()
            .collect();
        products.sort_by_key(|p| (p.stock_quantity, p.id));
        Ok(products)
    }

    async fn insert_reservation(&self, reservation: &NewReservation) -> LedgerResult<Reservation> {
        tokio::task::yield_now().await;
        Self::check_fault(&self.fail_reservation_inserts, "reservation insert")?;
        let mut tables = self.tables.lock();
        let id = tables.next_id();
        let row = Reservation {
            id,
            product_id: reservation.product_id,
            customer_id: reservation.customer_id,
            quantity: reservation.quantity,
            status: ReservationStatus::Pending,
            created_at: reservation.created_at,
            expires_at: reservation.expires_at,
        };
        tables.reservations.insert(id, row.clone());
        Ok(row)
    }

    async fn find_reservation(&self, id: i64) -> LedgerResult<Option<Reservation>> {
        tokio::task::yield_now().await;
        Ok(self.tables.lock().reservations.get(&id).cloned())
    }

    async fn expired_reservations(&self, now: i64) -> LedgerResult<Vec<Reservation>> {
        tokio::task::yield_now().await;
        Ok(self
            .tables
            .lock()
            .reservations
            .values()
            .filter(|r| r.is_expired_at(now))
            .cloned()
            .collect())
    }

    async fn transition_reservation(
        &self,
        id: i64,
        from: ReservationStatus,
        to: ReservationStatus,
    ) -> LedgerResult<u64> {
        tokio::task::yield_now().await;
        let mut tables = self.tables.lock();
        match tables.reservations.get_mut(&id) {
            Some(r) if r.status == from => {
                r.status = to;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn next_order_sequence(&self) -> LedgerResult<Option<i64>> {
        tokio::task::yield_now().await;
        if !self.sequence_enabled.load(Ordering::SeqCst) {
            return Ok(None);
        }
        let mut tables = self.tables.lock();
        tables.order_sequence += 1;
        Ok(Some(tables.order_sequence))
    }

    async fn insert_order(&self, order: &NewOrder) -> LedgerResult<Order> {
        tokio::task::yield_now().await;
        Self::check_fault(&self.fail_order_inserts, "order insert")?;
        let mut tables = self.tables.lock();
        if tables
            .orders
            .values()
            .any(|o| o.order_number == order.order_number)
        {
            return Err(LedgerError::Database(format!(
                "duplicate order_number {}",
                order.order_number
            )));
        }
        let id = tables.next_id();
        let row = Order {
            id,
            order_number: order.order_number.clone(),
            customer_id: order.customer_id,
            seller_id: order.seller_id,
            subtotal: order.totals.subtotal,
            shipping_fee: order.totals.shipping_fee,
            tax: order.totals.tax,
            total_amount: order.totals.total_amount,
            shipping_region: order.shipping_region.clone(),
            payment_method: order.payment_method,
            payment_status: order.payment_status,
            order_status: order.order_status,
            payment_reference: order.payment_reference.clone(),
            needs_review: order.needs_review,
            created_at: order.created_at,
            cancelled_at: None,
            cancellation_reason: None,
        };
        tables.orders.insert(id, row.clone());
        Ok(row)
    }

    async fn insert_order_items(&self, items: &[NewOrderItem]) -> LedgerResult<Vec<OrderItem>> {
        tokio::task::yield_now().await;
        Self::check_fault(&self.fail_order_item_inserts, "order item insert")?;
        let mut tables = self.tables.lock();
        let mut rows = Vec::with_capacity(items.len());
        for item in items {
            let id = tables.next_id();
            let row = OrderItem {
                id,
                order_id: item.order_id,
                product_id: item.product_id,
                seller_id: item.seller_id,
                quantity: item.quantity,
                unit_price: item.unit_price,
                subtotal: item.subtotal,
            };
            tables.order_items.insert(id, row.clone());
            rows.push(row);
        }
        Ok(rows)
    }

    async fn find_order(&self, id: i64) -> LedgerResult<Option<Order>> {
        tokio::task::yield_now().await;
        Ok(self.tables.lock().orders.get(&id).cloned())
    }

    async fn find_order_by_reference(
        &self,
        payment_reference: &str,
    ) -> LedgerResult<Option<Order>> {
        tokio::task::yield_now().await;
        Ok(self
            .tables
            .lock()
            .orders
            .values()
            .find(|o| o.payment_reference.as_deref() == Some(payment_reference))
            .cloned())
    }

    async fn find_order_items(&self, order_id: i64) -> LedgerResult<Vec<OrderItem>> {
        tokio::task::yield_now().await;
        Ok(self
            .tables
            .lock()
            .order_items
            .values()
            .filter(|i| i.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn cancel_order_if(
        &self,
        id: i64,
        allowed: &[OrderStatus],
        reason: &str,
        cancelled_at: i64,
    ) -> LedgerResult<u64> {
        tokio::task::yield_now().await;
        let mut tables = self.tables.lock();
        match tables.orders.get_mut(&id) {
            Some(o) if allowed.contains(&o.order_status) => {
                o.order_status = OrderStatus::Cancelled;
                o.cancelled_at = Some(cancelled_at);
                o.cancellation_reason = Some(reason.to_string());
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn orders_without_items(&self, created_before: i64) -> LedgerResult<Vec<Order>> {
        tokio::task::yield_now().await;
        let tables = self.tables.lock();
        Ok(tables
            .orders
            .values()
            .filter(|o| o.order_status != OrderStatus::Cancelled && o.created_at < created_before)
            .filter(|o| !tables.order_items.values().any(|i| i.order_id == o.id))
            .cloned()
            .collect())
    }

    async fn update_payment_status(
        &self,
        payment_reference: &str,
        status: PaymentStatus,
        clear_review: bool,
    ) -> LedgerResult<u64> {
        tokio::task::yield_now().await;
        let mut tables = self.tables.lock();
        let mut affected = 0;
        for order in tables
            .orders
            .values_mut()
            .filter(|o| o.payment_reference.as_deref() == Some(payment_reference))
        {
            order.payment_status = status;
            if clear_review {
                order.needs_review = false;
            }
            affected += 1;
        }
        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn product(id: i64, stock: i32) -> Product {
        Product {
            id,
            name: format!("Product {id}"),
            seller_id: 1,
            price: Decimal::new(1000, 2),
            stock_quantity: stock,
        }
    }

    #[tokio::test]
    async fn test_update_stock_if_requires_observed_value() {
        let ledger = MemoryLedger::new();
        ledger.put_product(product(1, 5));

        assert_eq!(ledger.update_stock_if(1, 4, 2).await.unwrap(), 0);
        assert_eq!(ledger.stock_of(1), Some(5));

        assert_eq!(ledger.update_stock_if(1, 5, 2).await.unwrap(), 1);
        assert_eq!(ledger.stock_of(1), Some(2));
    }

    #[tokio::test]
    async fn test_update_stock_if_rejects_negative() {
        let ledger = MemoryLedger::new();
        ledger.put_product(product(1, 1));
        assert!(ledger.update_stock_if(1, 1, -1).await.is_err());
    }

    #[tokio::test]
    async fn test_guarded_decrement_never_goes_negative() {
        let ledger = MemoryLedger::new();
        ledger.put_product(product(1, 2));

        assert_eq!(ledger.decrement_stock_guarded(1, 2, 3).await.unwrap(), 0);
        assert_eq!(ledger.decrement_stock_guarded(1, 2, 2).await.unwrap(), 1);
        assert_eq!(ledger.stock_of(1), Some(0));
    }

    #[tokio::test]
    async fn test_transition_reservation_only_from_expected_state() {
        let ledger = MemoryLedger::new();
        let r = ledger
            .insert_reservation(&NewReservation {
                product_id: 1,
                customer_id: 2,
                quantity: 1,
                created_at: 0,
                expires_at: 10,
            })
            .await
            .unwrap();

        let first = ledger
            .transition_reservation(r.id, ReservationStatus::Pending, ReservationStatus::Expired)
            .await
            .unwrap();
        let second = ledger
            .transition_reservation(r.id, ReservationStatus::Pending, ReservationStatus::Expired)
            .await
            .unwrap();
        assert_eq!((first, second), (1, 0));
    }

    #[tokio::test]
    async fn test_low_stock_sorted_ascending() {
        let ledger = MemoryLedger::new();
        ledger.put_product(product(1, 3));
        ledger.put_product(product(2, 0));
        ledger.put_product(product(3, 10));

        let low = ledger.low_stock_products(5).await.unwrap();
        let ids: Vec<i64> = low.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[tokio::test]
    async fn test_sequence_can_be_disabled() {
        let ledger = MemoryLedger::new();
        assert_eq!(ledger.next_order_sequence().await.unwrap(), Some(1));
        ledger.set_sequence_enabled(false);
        assert_eq!(ledger.next_order_sequence().await.unwrap(), None);
    }
}

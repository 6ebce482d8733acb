//! In-memory unit of work with staged transactions and fault injection.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::PersistenceError;
use super::repositories::{AuditLogOrderRepository, OrderItemRepository, OrderRepository};
use super::rows::{
    AuditLogOrderRow, OrderItemRow, OrderRow, QueryOrderItemsFilter, QueryOrdersFilter,
};
use super::unit_of_work::{UnitOfWork, UnitOfWorkFactory};

#[derive(Debug, Clone, Default)]
pub struct Tables {
    pub orders: Vec<OrderRow>,
    pub order_items: Vec<OrderItemRow>,
    pub audit_logs: Vec<AuditLogOrderRow>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    OrderInsert,
    OrderItemInsert,
    OrderQuery,
    AuditLogInsert,
    Commit,
}

#[derive(Default)]
pub struct MemoryStore {
    committed: Mutex<Tables>,
    failures: Mutex<Vec<(FailPoint, bool)>>,
    pub begins: AtomicUsize,
    pub commits: AtomicUsize,
    pub rollbacks: AtomicUsize,
    pub closes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make the next call through `point` fail. Transient failures look like
    /// a pool timeout, permanent ones like a protocol error.
    pub fn fail_once(&self, point: FailPoint, transient: bool) {
        lock(&self.failures).push((point, transient));
    }

    pub fn snapshot(&self) -> Tables {
        lock(&self.committed).clone()
    }

    pub fn seed_order(&self, mut order: OrderRow, items: Vec<OrderItemRow>) -> (OrderRow, Vec<OrderItemRow>) {
        let mut tables = lock(&self.committed);
        order.id = tables.next_id();
        tables.orders.push(order.clone());
        let items: Vec<OrderItemRow> = items
            .into_iter()
            .map(|mut item| {
                item.id = tables.next_id();
                item.order_id = order.id;
                item
            })
            .collect();
        tables.order_items.extend(items.iter().cloned());
        (order, items)
    }

    fn check(&self, point: FailPoint) -> Result<(), PersistenceError> {
        let mut failures = lock(&self.failures);
        match failures.iter().position(|(p, _)| *p == point) {
            Some(idx) => {
                let (_, transient) = failures.remove(idx);
                Err(PersistenceError::Database(if transient {
                    sqlx::Error::PoolTimedOut
                } else {
                    sqlx::Error::Protocol(format!("injected failure at {point:?}"))
                }))
            }
            None => Ok(()),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct MemoryUnitOfWork {
    store: Arc<MemoryStore>,
    staged: Mutex<Option<Tables>>,
    closed: Mutex<bool>,
}

impl MemoryUnitOfWork {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            store,
            staged: Mutex::new(None),
            closed: Mutex::new(false),
        }
    }

    fn with_tables<R>(&self, f: impl FnOnce(&mut Tables) -> R) -> Result<R, PersistenceError> {
        if *lock(&self.closed) {
            return Err(PersistenceError::Closed);
        }
        let mut staged = lock(&self.staged);
        match staged.as_mut() {
            Some(tables) => Ok(f(tables)),
            None => Ok(f(&mut lock(&self.store.committed))),
        }
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn begin_transaction(&self) -> Result<(), PersistenceError> {
        if *lock(&self.closed) {
            return Err(PersistenceError::Closed);
        }
        let mut staged = lock(&self.staged);
        if staged.is_none() {
            *staged = Some(self.store.snapshot());
            self.store.begins.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn commit(&self) -> Result<(), PersistenceError> {
        if *lock(&self.closed) {
            return Err(PersistenceError::Closed);
        }
        let Some(tables) = lock(&self.staged).take() else {
            return Ok(());
        };
        self.store.check(FailPoint::Commit)?;
        *lock(&self.store.committed) = tables;
        self.store.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&self) -> Result<(), PersistenceError> {
        if *lock(&self.closed) {
            return Err(PersistenceError::Closed);
        }
        if lock(&self.staged).take().is_some() {
            self.store.rollbacks.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), PersistenceError> {
        let mut closed = lock(&self.closed);
        if *closed {
            return Err(PersistenceError::Closed);
        }
        *closed = true;
        if lock(&self.staged).take().is_some() {
            self.store.rollbacks.fetch_add(1, Ordering::SeqCst);
        }
        self.store.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn orders(&self) -> Box<dyn OrderRepository + '_> {
        Box::new(MemoryRepository { uow: self })
    }

    fn order_items(&self) -> Box<dyn OrderItemRepository + '_> {
        Box::new(MemoryRepository { uow: self })
    }

    fn audit_log_orders(&self) -> Box<dyn AuditLogOrderRepository + '_> {
        Box::new(MemoryRepository { uow: self })
    }
}

pub struct MemoryUnitOfWorkFactory {
    pub store: Arc<MemoryStore>,
}

impl UnitOfWorkFactory for MemoryUnitOfWorkFactory {
    fn create(&self) -> Box<dyn UnitOfWork> {
        Box::new(MemoryUnitOfWork::new(self.store.clone()))
    }
}

struct MemoryRepository<'a> {
    uow: &'a MemoryUnitOfWork,
}

fn page<T>(rows: Vec<T>, limit: i64, offset: i64) -> Vec<T> {
    let skipped = rows.into_iter().skip(offset.max(0) as usize);
    if limit > 0 {
        skipped.take(limit as usize).collect()
    } else {
        skipped.collect()
    }
}

#[async_trait]
impl OrderRepository for MemoryRepository<'_> {
    async fn bulk_insert(&self, orders: Vec<OrderRow>) -> Result<Vec<OrderRow>, PersistenceError> {
        self.uow.store.check(FailPoint::OrderInsert)?;
        self.uow.with_tables(|t| {
            orders
                .into_iter()
                .map(|mut o| {
                    o.id = t.next_id();
                    t.orders.push(o.clone());
                    o
                })
                .collect()
        })
    }

    async fn query(&self, filter: QueryOrdersFilter) -> Result<Vec<OrderRow>, PersistenceError> {
        self.uow.store.check(FailPoint::OrderQuery)?;
        let ids: HashSet<i64> = filter.ids.iter().copied().collect();
        let customers: HashSet<i64> = filter.customer_ids.iter().copied().collect();
        let mut rows = self.uow.with_tables(|t| {
            t.orders
                .iter()
                .filter(|o| ids.is_empty() || ids.contains(&o.id))
                .filter(|o| customers.is_empty() || customers.contains(&o.customer_id))
                .cloned()
                .collect::<Vec<_>>()
        })?;
        rows.sort_by_key(|o| o.id);
        Ok(page(rows, filter.limit, filter.offset))
    }

    async fn update_status(
        &self,
        ids: &[i64],
        status: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<Vec<OrderRow>, PersistenceError> {
        self.uow.with_tables(|t| {
            t.orders
                .iter_mut()
                .filter(|o| ids.contains(&o.id))
                .map(|o| {
                    o.status = status.to_string();
                    o.updated_at = updated_at;
                    o.clone()
                })
                .collect()
        })
    }
}

#[async_trait]
impl OrderItemRepository for MemoryRepository<'_> {
    async fn bulk_insert(
        &self,
        items: Vec<OrderItemRow>,
    ) -> Result<Vec<OrderItemRow>, PersistenceError> {
        self.uow.store.check(FailPoint::OrderItemInsert)?;
        self.uow.with_tables(|t| {
            items
                .into_iter()
                .map(|mut i| {
                    i.id = t.next_id();
                    t.order_items.push(i.clone());
                    i
                })
                .collect()
        })
    }

    async fn query(
        &self,
        filter: QueryOrderItemsFilter,
    ) -> Result<Vec<OrderItemRow>, PersistenceError> {
        let rows = self.uow.with_tables(|t| {
            t.order_items
                .iter()
                .filter(|i| filter.ids.is_empty() || filter.ids.contains(&i.id))
                .filter(|i| filter.order_ids.is_empty() || filter.order_ids.contains(&i.order_id))
                .cloned()
                .collect::<Vec<_>>()
        })?;
        Ok(page(rows, filter.limit, filter.offset))
    }
}

#[async_trait]
impl AuditLogOrderRepository for MemoryRepository<'_> {
    async fn bulk_insert(
        &self,
        logs: Vec<AuditLogOrderRow>,
    ) -> Result<Vec<AuditLogOrderRow>, PersistenceError> {
        self.uow.store.check(FailPoint::AuditLogInsert)?;
        self.uow.with_tables(|t| {
            logs.into_iter()
                .map(|mut l| {
                    l.id = t.next_id();
                    t.audit_logs.push(l.clone());
                    l
                })
                .collect()
        })
    }
}

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::model::{AuditLogOrder, NewAuditLogOrder};
use crate::domain::mappers::{audit_log_from_row, new_audit_log_to_row};
use crate::domain::order::OrderError;
use crate::persistence::{complete_unit_of_work, UnitOfWork, UnitOfWorkFactory};

pub struct AuditLogOrderService {
    uow_factory: Arc<dyn UnitOfWorkFactory>,
}

impl AuditLogOrderService {
    pub fn new(uow_factory: Arc<dyn UnitOfWorkFactory>) -> Self {
        Self { uow_factory }
    }

    pub async fn batch_insert(
        &self,
        logs: Vec<NewAuditLogOrder>,
    ) -> Result<Vec<AuditLogOrder>, OrderError> {
        if logs.is_empty() {
            return Ok(Vec::new());
        }

        let now = Utc::now();
        let uow = self.uow_factory.create();
        let outcome = insert_logs(uow.as_ref(), &logs, now).await;
        let inserted = complete_unit_of_work(uow.as_ref(), outcome).await?;

        tracing::info!(count = inserted.len(), "📝 Audit log entries stored");
        Ok(inserted)
    }
}

async fn insert_logs(
    uow: &dyn UnitOfWork,
    logs: &[NewAuditLogOrder],
    now: DateTime<Utc>,
) -> Result<Vec<AuditLogOrder>, OrderError> {
    uow.begin_transaction().await?;
    let rows = logs.iter().map(|l| new_audit_log_to_row(l, now)).collect();
    let inserted = uow.audit_log_orders().bulk_insert(rows).await?;
    uow.commit().await?;

    inserted.into_iter().map(audit_log_from_row).collect()
}

use crate::utils::IsTransient;

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Unit of work is closed")]
    Closed,
}

/// SQLSTATE classes worth retrying: connection exception, transaction
/// rollback (deadlock, serialization), insufficient resources, operator
/// intervention.
const TRANSIENT_SQLSTATE_CLASSES: [&str; 4] = ["08", "40", "53", "57"];

impl IsTransient for PersistenceError {
    fn is_transient(&self) -> bool {
        match self {
            PersistenceError::Closed => false,
            PersistenceError::Database(e) => match e {
                sqlx::Error::Io(_)
                | sqlx::Error::PoolTimedOut
                | sqlx::Error::PoolClosed
                | sqlx::Error::WorkerCrashed => true,
                sqlx::Error::Database(db) => db
                    .code()
                    .map(|code| {
                        TRANSIENT_SQLSTATE_CLASSES
                            .iter()
                            .any(|class| code.starts_with(class))
                    })
                    .unwrap_or(false),
                _ => false,
            },
        }
    }
}

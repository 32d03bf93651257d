use sqlx::PgPool;

/// Executes entity queries against the shared connection pool.
///
/// Every query lives next to its entity as a request struct implementing
/// `kanau::processor::Processor<Req> for DatabaseProcessor`.
#[derive(Clone)]
pub struct DatabaseProcessor {
    pub pool: PgPool,
}

impl DatabaseProcessor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a transaction for multi-row conditional updates that must
    /// succeed or fail together.
    pub async fn begin(&self) -> Result<sqlx::Transaction<'static, sqlx::Postgres>, sqlx::Error> {
        self.pool.begin().await
    }
}

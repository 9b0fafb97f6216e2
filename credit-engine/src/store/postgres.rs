//! PostgreSQL ledger store
//!
//! A unit of work is a database transaction. `lock_consumer_for_update`
//! issues `SELECT ... FOR UPDATE`, so the row lock lives exactly as long as
//! the transaction; lock waits and deadlock detection are left to the
//! server defaults.

use super::{schema, ConsumerRepository, Store, SubLimitRepository, TransactionRepository};
use crate::{
    config::DatabaseConfig,
    types::{
        Consumer, ConsumerChanges, ConsumerId, CreditSubLimit, NewConsumer, NewSubLimit,
        NewTransaction, SubLimitId, Tenor, Transaction, TransactionId, TransactionStatus,
    },
    Error, Result,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres};
use std::time::Duration;

const CONSUMER_COLUMNS: &str = "id, national_id, full_name, legal_name, birth_place, birth_date, \
     salary, overall_credit_limit, created_at, updated_at";

const SUB_LIMIT_COLUMNS: &str = "id, consumer_id, tenor_months, limit_amount, created_at";

const TRANSACTION_COLUMNS: &str = "id, consumer_id, sub_limit_id, contract_number, contract_date, \
     otr, down_payment, admin_fee, principal, interest, installment_value, tenor_months, \
     asset_name, asset_type, source, status, notes, created_at";

/// Ledger store backed by a PostgreSQL pool
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect a pool using `config`
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.url)
            .await?;

        tracing::info!(
            max_connections = config.max_connections,
            "Connected to PostgreSQL"
        );

        Ok(Self { pool })
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Underlying pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create tables and indices if missing
    pub async fn init_schema(&self) -> Result<()> {
        for statement in schema::STATEMENTS {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::info!(statements = schema::STATEMENTS.len(), "Schema ready");
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct ConsumerRow {
    id: i64,
    national_id: String,
    full_name: String,
    legal_name: String,
    birth_place: String,
    birth_date: Option<NaiveDate>,
    salary: Decimal,
    overall_credit_limit: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ConsumerRow> for Consumer {
    fn from(row: ConsumerRow) -> Self {
        Consumer {
            id: ConsumerId::new(row.id),
            national_id: row.national_id,
            full_name: row.full_name,
            legal_name: row.legal_name,
            birth_place: row.birth_place,
            birth_date: row.birth_date,
            salary: row.salary,
            overall_credit_limit: row.overall_credit_limit,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SubLimitRow {
    id: i64,
    consumer_id: i64,
    tenor_months: i32,
    limit_amount: Decimal,
    created_at: DateTime<Utc>,
}

impl TryFrom<SubLimitRow> for CreditSubLimit {
    type Error = Error;

    fn try_from(row: SubLimitRow) -> Result<Self> {
        Ok(CreditSubLimit {
            id: SubLimitId::new(row.id),
            consumer_id: ConsumerId::new(row.consumer_id),
            tenor: stored_tenor(row.tenor_months)?,
            limit_amount: row.limit_amount,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TransactionRow {
    id: i64,
    consumer_id: i64,
    sub_limit_id: i64,
    contract_number: String,
    contract_date: DateTime<Utc>,
    otr: Decimal,
    down_payment: Decimal,
    admin_fee: Decimal,
    principal: Decimal,
    interest: Decimal,
    installment_value: Decimal,
    tenor_months: i32,
    asset_name: String,
    asset_type: String,
    source: String,
    status: String,
    notes: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = Error;

    fn try_from(row: TransactionRow) -> Result<Self> {
        Ok(Transaction {
            id: TransactionId::new(row.id),
            consumer_id: ConsumerId::new(row.consumer_id),
            sub_limit_id: SubLimitId::new(row.sub_limit_id),
            contract_number: row.contract_number,
            contract_date: row.contract_date,
            otr: row.otr,
            down_payment: row.down_payment,
            admin_fee: row.admin_fee,
            principal: row.principal,
            interest: row.interest,
            installment_value: row.installment_value,
            tenor: stored_tenor(row.tenor_months)?,
            asset_name: row.asset_name,
            asset_type: row.asset_type,
            source: row.source,
            status: row.status.parse()?,
            notes: row.notes,
            created_at: row.created_at,
        })
    }
}

// A tenor outside the allowed set in a stored row is corrupt data, not bad input
fn stored_tenor(months: i32) -> Result<Tenor> {
    Tenor::try_from(months)
        .map_err(|_| Error::Persistence(format!("stored row has invalid tenor {}", months)))
}

fn transactions_from_rows(rows: Vec<TransactionRow>) -> Result<Vec<Transaction>> {
    rows.into_iter().map(Transaction::try_from).collect()
}

#[async_trait]
impl Store for PgStore {
    type Unit = sqlx::Transaction<'static, Postgres>;

    async fn begin(&self) -> Result<Self::Unit> {
        Ok(self.pool.begin().await?)
    }

    async fn commit(&self, unit: Self::Unit) -> Result<()> {
        unit.commit().await?;
        Ok(())
    }

    async fn rollback(&self, unit: Self::Unit) -> Result<()> {
        unit.rollback().await?;
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl ConsumerRepository for PgStore {
    async fn lock_consumer_for_update(
        &self,
        unit: &mut Self::Unit,
        id: ConsumerId,
    ) -> Result<Consumer> {
        let sql = format!(
            "SELECT {} FROM consumers WHERE id = $1 FOR UPDATE",
            CONSUMER_COLUMNS
        );
        sqlx::query_as::<_, ConsumerRow>(&sql)
            .bind(id.as_i64())
            .fetch_optional(&mut **unit)
            .await?
            .map(Consumer::from)
            .ok_or(Error::ConsumerNotFound(id))
    }

    async fn find_consumer(&self, unit: &mut Self::Unit, id: ConsumerId) -> Result<Consumer> {
        let sql = format!("SELECT {} FROM consumers WHERE id = $1", CONSUMER_COLUMNS);
        sqlx::query_as::<_, ConsumerRow>(&sql)
            .bind(id.as_i64())
            .fetch_optional(&mut **unit)
            .await?
            .map(Consumer::from)
            .ok_or(Error::ConsumerNotFound(id))
    }

    async fn find_consumer_by_national_id(
        &self,
        unit: &mut Self::Unit,
        national_id: &str,
    ) -> Result<Option<Consumer>> {
        let sql = format!(
            "SELECT {} FROM consumers WHERE national_id = $1",
            CONSUMER_COLUMNS
        );
        let row = sqlx::query_as::<_, ConsumerRow>(&sql)
            .bind(national_id)
            .fetch_optional(&mut **unit)
            .await?;
        Ok(row.map(Consumer::from))
    }

    async fn list_consumers(&self, unit: &mut Self::Unit) -> Result<Vec<Consumer>> {
        let sql = format!("SELECT {} FROM consumers ORDER BY id", CONSUMER_COLUMNS);
        let rows = sqlx::query_as::<_, ConsumerRow>(&sql)
            .fetch_all(&mut **unit)
            .await?;
        Ok(rows.into_iter().map(Consumer::from).collect())
    }

    async fn insert_consumer(
        &self,
        unit: &mut Self::Unit,
        consumer: &NewConsumer,
    ) -> Result<Consumer> {
        let sql = format!(
            "INSERT INTO consumers (national_id, full_name, legal_name, birth_place, birth_date, \
             salary, overall_credit_limit) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {}",
            CONSUMER_COLUMNS
        );
        let row = sqlx::query_as::<_, ConsumerRow>(&sql)
            .bind(&consumer.national_id)
            .bind(&consumer.full_name)
            .bind(&consumer.legal_name)
            .bind(&consumer.birth_place)
            .bind(consumer.birth_date)
            .bind(consumer.salary)
            .bind(consumer.overall_credit_limit)
            .fetch_one(&mut **unit)
            .await?;
        Ok(row.into())
    }

    async fn update_consumer(
        &self,
        unit: &mut Self::Unit,
        id: ConsumerId,
        changes: &ConsumerChanges,
    ) -> Result<Consumer> {
        let sql = format!(
            "UPDATE consumers SET \
                full_name = COALESCE($2, full_name), \
                legal_name = COALESCE($3, legal_name), \
                birth_place = COALESCE($4, birth_place), \
                birth_date = COALESCE($5, birth_date), \
                salary = COALESCE($6, salary), \
                overall_credit_limit = COALESCE($7, overall_credit_limit), \
                updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {}",
            CONSUMER_COLUMNS
        );
        sqlx::query_as::<_, ConsumerRow>(&sql)
            .bind(id.as_i64())
            .bind(changes.full_name.as_deref())
            .bind(changes.legal_name.as_deref())
            .bind(changes.birth_place.as_deref())
            .bind(changes.birth_date)
            .bind(changes.salary)
            .bind(changes.overall_credit_limit)
            .fetch_optional(&mut **unit)
            .await?
            .map(Consumer::from)
            .ok_or(Error::ConsumerNotFound(id))
    }

    async fn delete_consumer(&self, unit: &mut Self::Unit, id: ConsumerId) -> Result<()> {
        let result = sqlx::query("DELETE FROM consumers WHERE id = $1")
            .bind(id.as_i64())
            .execute(&mut **unit)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::ConsumerNotFound(id));
        }
        Ok(())
    }
}

#[async_trait]
impl SubLimitRepository for PgStore {
    async fn insert_sub_limit(
        &self,
        unit: &mut Self::Unit,
        sub_limit: &NewSubLimit,
    ) -> Result<CreditSubLimit> {
        let sql = format!(
            "INSERT INTO credit_sub_limits (consumer_id, tenor_months, limit_amount) \
             VALUES ($1, $2, $3) \
             RETURNING {}",
            SUB_LIMIT_COLUMNS
        );
        sqlx::query_as::<_, SubLimitRow>(&sql)
            .bind(sub_limit.consumer_id.as_i64())
            .bind(sub_limit.tenor.months())
            .bind(sub_limit.limit_amount)
            .fetch_one(&mut **unit)
            .await?
            .try_into()
    }

    async fn find_sub_limit(
        &self,
        unit: &mut Self::Unit,
        consumer_id: ConsumerId,
        tenor: Tenor,
    ) -> Result<Option<CreditSubLimit>> {
        let sql = format!(
            "SELECT {} FROM credit_sub_limits WHERE consumer_id = $1 AND tenor_months = $2",
            SUB_LIMIT_COLUMNS
        );
        sqlx::query_as::<_, SubLimitRow>(&sql)
            .bind(consumer_id.as_i64())
            .bind(tenor.months())
            .fetch_optional(&mut **unit)
            .await?
            .map(CreditSubLimit::try_from)
            .transpose()
    }

    async fn list_sub_limits(
        &self,
        unit: &mut Self::Unit,
        consumer_id: ConsumerId,
    ) -> Result<Vec<CreditSubLimit>> {
        let sql = format!(
            "SELECT {} FROM credit_sub_limits WHERE consumer_id = $1 ORDER BY tenor_months",
            SUB_LIMIT_COLUMNS
        );
        let rows = sqlx::query_as::<_, SubLimitRow>(&sql)
            .bind(consumer_id.as_i64())
            .fetch_all(&mut **unit)
            .await?;
        rows.into_iter().map(CreditSubLimit::try_from).collect()
    }
}

#[async_trait]
impl TransactionRepository for PgStore {
    async fn insert_transaction(
        &self,
        unit: &mut Self::Unit,
        transaction: &NewTransaction,
    ) -> Result<Transaction> {
        let sql = format!(
            "INSERT INTO transactions (consumer_id, sub_limit_id, contract_number, contract_date, \
             otr, down_payment, admin_fee, principal, interest, installment_value, tenor_months, \
             asset_name, asset_type, source, status, notes) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16) \
             RETURNING {}",
            TRANSACTION_COLUMNS
        );
        sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(transaction.consumer_id.as_i64())
            .bind(transaction.sub_limit_id.as_i64())
            .bind(&transaction.contract_number)
            .bind(transaction.contract_date)
            .bind(transaction.otr)
            .bind(transaction.down_payment)
            .bind(transaction.admin_fee)
            .bind(transaction.principal)
            .bind(transaction.interest)
            .bind(transaction.installment_value)
            .bind(transaction.tenor.months())
            .bind(&transaction.asset_name)
            .bind(&transaction.asset_type)
            .bind(&transaction.source)
            .bind(transaction.status.as_str())
            .bind(&transaction.notes)
            .fetch_one(&mut **unit)
            .await?
            .try_into()
    }

    async fn find_transactions_by_consumer(
        &self,
        unit: &mut Self::Unit,
        consumer_id: ConsumerId,
    ) -> Result<Vec<Transaction>> {
        let sql = format!(
            "SELECT {} FROM transactions WHERE consumer_id = $1 \
             ORDER BY contract_date DESC, id DESC",
            TRANSACTION_COLUMNS
        );
        let rows = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(consumer_id.as_i64())
            .fetch_all(&mut **unit)
            .await?;
        transactions_from_rows(rows)
    }

    async fn find_active_transactions(
        &self,
        unit: &mut Self::Unit,
        consumer_id: ConsumerId,
    ) -> Result<Vec<Transaction>> {
        let sql = format!(
            "SELECT {} FROM transactions WHERE consumer_id = $1 AND status = $2",
            TRANSACTION_COLUMNS
        );
        let rows = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(consumer_id.as_i64())
            .bind(TransactionStatus::Active.as_str())
            .fetch_all(&mut **unit)
            .await?;
        transactions_from_rows(rows)
    }
}

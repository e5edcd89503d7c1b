use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use common::{
    CategoryId, ItemId, ItemStatus, Money, PaymentId, PaymentStatus, ReviewId, Role, TransactionId,
    TransactionStatus, UserId,
};
use futures_util::TryStreamExt;
use sqlx::{PgConnection, PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    ActivityLog, ActivityQuery, ActorSnapshot, Item, Page, Payment, Result, Review,
    StoreError, Transaction,
    query::sql_bound,
    store::{ActivityStream, ItemStatusWrite, MarketStore, PaymentStatusWrite, TransitionWrite},
};

const ITEM_COLUMNS: &str = "id, owner_id, category_id, title, description, condition, price_cents, status, created_at, updated_at";
const TRANSACTION_COLUMNS: &str =
    "id, item_id, buyer_id, seller_id, offered_price_cents, status, created_at, updated_at";
const PAYMENT_COLUMNS: &str = "id, transaction_id, amount_cents, currency, status, method, external_reference, created_at, updated_at";
const REVIEW_COLUMNS: &str =
    "id, transaction_id, item_id, reviewer_id, rating, comment, created_at";

/// Rows fetched per round trip when exporting the activity log.
const EXPORT_BATCH_SIZE: i64 = 500;

const ACTIVITY_COLUMNS: &str = "id, actor_id, actor_name, actor_role, entity_type, entity_id, action, description, properties, created_at";

/// PostgreSQL-backed marketplace store.
#[derive(Clone)]
pub struct PostgresMarketStore {
    pool: PgPool,
}

impl PostgresMarketStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        tracing::info!("database migrations applied");
        Ok(())
    }

    fn active_statuses() -> Vec<String> {
        TransactionStatus::ALL
            .iter()
            .filter(|s| s.is_active())
            .map(|s| s.as_str().to_string())
            .collect()
    }

    fn row_to_item(row: PgRow) -> Result<Item> {
        Ok(Item {
            id: ItemId::from_uuid(row.try_get::<Uuid, _>("id")?),
            owner_id: UserId::from_uuid(row.try_get::<Uuid, _>("owner_id")?),
            category_id: CategoryId::from_uuid(row.try_get::<Uuid, _>("category_id")?),
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            condition: parse_column(&row, "condition")?,
            price: Money::from_cents(row.try_get("price_cents")?),
            status: parse_column(&row, "status")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_transaction(row: PgRow) -> Result<Transaction> {
        Ok(Transaction {
            id: TransactionId::from_uuid(row.try_get::<Uuid, _>("id")?),
            item_id: ItemId::from_uuid(row.try_get::<Uuid, _>("item_id")?),
            buyer_id: UserId::from_uuid(row.try_get::<Uuid, _>("buyer_id")?),
            seller_id: UserId::from_uuid(row.try_get::<Uuid, _>("seller_id")?),
            offered_price: Money::from_cents(row.try_get("offered_price_cents")?),
            status: parse_column(&row, "status")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_payment(row: PgRow) -> Result<Payment> {
        Ok(Payment {
            id: PaymentId::from_uuid(row.try_get::<Uuid, _>("id")?),
            transaction_id: TransactionId::from_uuid(row.try_get::<Uuid, _>("transaction_id")?),
            amount: Money::from_cents(row.try_get("amount_cents")?),
            currency: row.try_get("currency")?,
            status: parse_column(&row, "status")?,
            method: row.try_get("method")?,
            external_reference: row.try_get("external_reference")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_review(row: PgRow) -> Result<Review> {
        let rating: i16 = row.try_get("rating")?;
        Ok(Review {
            id: ReviewId::from_uuid(row.try_get::<Uuid, _>("id")?),
            transaction_id: TransactionId::from_uuid(row.try_get::<Uuid, _>("transaction_id")?),
            item_id: ItemId::from_uuid(row.try_get::<Uuid, _>("item_id")?),
            reviewer_id: UserId::from_uuid(row.try_get::<Uuid, _>("reviewer_id")?),
            rating: u8::try_from(rating)
                .map_err(|_| StoreError::Corrupt(format!("rating out of range: {rating}")))?,
            comment: row.try_get("comment")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_activity(row: PgRow) -> Result<ActivityLog> {
        let actor_id: Option<Uuid> = row.try_get("actor_id")?;
        let actor = match actor_id {
            Some(id) => {
                let role: Option<String> = row.try_get("actor_role")?;
                Some(ActorSnapshot {
                    id: UserId::from_uuid(id),
                    name: row
                        .try_get::<Option<String>, _>("actor_name")?
                        .unwrap_or_default(),
                    role: role
                        .as_deref()
                        .map(Role::from_str)
                        .transpose()
                        .map_err(|e| StoreError::Corrupt(e.to_string()))?
                        .unwrap_or_default(),
                })
            }
            None => None,
        };

        Ok(ActivityLog {
            id: common::ActivityId::from_uuid(row.try_get::<Uuid, _>("id")?),
            actor,
            entity_type: parse_column(&row, "entity_type")?,
            entity_id: row.try_get("entity_id")?,
            action: row.try_get("action")?,
            description: row.try_get("description")?,
            properties: row.try_get("properties")?,
            created_at: row.try_get("created_at")?,
        })
    }

    /// Reads the next export batch after the given `seq`, returning the rows
    /// and the cursor to continue from. `None` once the log is exhausted.
    async fn activity_batch(
        pool: PgPool,
        after: i64,
    ) -> Result<Option<(Vec<ActivityLog>, i64)>> {
        let sql = format!(
            r#"
            SELECT seq, {ACTIVITY_COLUMNS} FROM activity_logs
            WHERE seq > $1
            ORDER BY seq ASC
            LIMIT $2
            "#
        );
        let mut rows = sqlx::query(&sql)
        .bind(after)
        .bind(EXPORT_BATCH_SIZE)
        .fetch(&pool);

        let mut batch = Vec::new();
        let mut cursor = after;
        while let Some(row) = rows.try_next().await? {
            cursor = row.try_get("seq")?;
            batch.push(Self::row_to_activity(row)?);
        }

        Ok((!batch.is_empty()).then_some((batch, cursor)))
    }

    async fn insert_activity(conn: &mut PgConnection, row: &ActivityLog) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO activity_logs (id, actor_id, actor_name, actor_role, entity_type, entity_id, action, description, properties, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(row.id.as_uuid())
        .bind(row.actor.as_ref().map(|a| a.id.as_uuid()))
        .bind(row.actor.as_ref().map(|a| a.name.clone()))
        .bind(row.actor.as_ref().map(|a| a.role.as_str()))
        .bind(row.entity_type.as_str())
        .bind(row.entity_id)
        .bind(&row.action)
        .bind(&row.description)
        .bind(&row.properties)
        .bind(row.created_at)
        .execute(conn)
        .await?;

        Ok(())
    }
}

/// Reads a text column and parses it into one of the closed status enums.
fn parse_column<T>(row: &PgRow, column: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw: String = row.try_get(column)?;
    raw.parse()
        .map_err(|e: T::Err| StoreError::Corrupt(format!("{column}: {e}")))
}

fn violates(err: &sqlx::Error, constraint: &str) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.constraint() == Some(constraint))
}

#[async_trait]
impl MarketStore for PostgresMarketStore {
    async fn insert_item(&self, item: Item, activity: ActivityLog) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO items (id, owner_id, category_id, title, description, condition, price_cents, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(item.owner_id.as_uuid())
        .bind(item.category_id.as_uuid())
        .bind(&item.title)
        .bind(&item.description)
        .bind(item.condition.as_str())
        .bind(item.price.cents())
        .bind(item.status.as_str())
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&mut *tx)
        .await?;

        Self::insert_activity(&mut tx, &activity).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_item(&self, item_id: ItemId) -> Result<Option<Item>> {
        let row = sqlx::query(&format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = $1"))
            .bind(item_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_item).transpose()
    }

    async fn update_item_status(&self, write: ItemStatusWrite) -> Result<Item> {
        let mut tx = self.pool.begin().await?;

        // Lock the item so no order can be opened on it concurrently.
        let current: Option<String> =
            sqlx::query_scalar("SELECT status FROM items WHERE id = $1 FOR UPDATE")
                .bind(write.item_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?;

        let current = current.ok_or_else(|| StoreError::not_found("Item", write.item_id))?;
        let actual = current
            .parse()
            .map_err(|e: common::ParseEnumError| StoreError::Corrupt(e.to_string()))?;

        if actual != write.expected_status {
            return Err(StoreError::ItemConflict {
                item_id: write.item_id,
                expected: write.expected_status,
                actual,
            });
        }

        let active: Option<Uuid> = sqlx::query_scalar(
            "SELECT id FROM transactions WHERE item_id = $1 AND status = ANY($2) LIMIT 1",
        )
        .bind(write.item_id.as_uuid())
        .bind(Self::active_statuses())
        .fetch_optional(&mut *tx)
        .await?;

        if active.is_some() {
            return Err(StoreError::ActiveTransactionExists(write.item_id));
        }

        let row = sqlx::query(&format!(
            "UPDATE items SET status = $1, updated_at = $2 WHERE id = $3 RETURNING {ITEM_COLUMNS}"
        ))
        .bind(write.new_status.as_str())
        .bind(Utc::now())
        .bind(write.item_id.as_uuid())
        .fetch_one(&mut *tx)
        .await?;
        let item = Self::row_to_item(row)?;

        Self::insert_activity(&mut tx, &write.activity).await?;

        tx.commit().await?;
        Ok(item)
    }

    async fn create_transaction(
        &self,
        transaction: Transaction,
        activity: ActivityLog,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        // Same row lock as the owner edit, so the item cannot be sold while
        // the order is being opened.
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM items WHERE id = $1 FOR UPDATE")
                .bind(transaction.item_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?;

        let status: ItemStatus = status
            .ok_or_else(|| StoreError::not_found("Item", transaction.item_id))?
            .parse()
            .map_err(|e: common::ParseEnumError| StoreError::Corrupt(e.to_string()))?;

        if status != ItemStatus::Available {
            return Err(StoreError::ItemUnavailable {
                item_id: transaction.item_id,
                status,
            });
        }

        sqlx::query(
            r#"
            INSERT INTO transactions (id, item_id, buyer_id, seller_id, offered_price_cents, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(transaction.id.as_uuid())
        .bind(transaction.item_id.as_uuid())
        .bind(transaction.buyer_id.as_uuid())
        .bind(transaction.seller_id.as_uuid())
        .bind(transaction.offered_price.cents())
        .bind(transaction.status.as_str())
        .bind(transaction.created_at)
        .bind(transaction.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if violates(&e, "one_active_transaction_per_item") {
                return StoreError::ActiveTransactionExists(transaction.item_id);
            }
            if violates(&e, "transactions_item_id_fkey") {
                return StoreError::not_found("Item", transaction.item_id);
            }
            StoreError::Database(e)
        })?;

        Self::insert_activity(&mut tx, &activity).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_transaction(&self, transaction_id: TransactionId) -> Result<Option<Transaction>> {
        let row = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = $1"
        ))
        .bind(transaction_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_transaction).transpose()
    }

    async fn list_transactions_for_user(
        &self,
        user_id: UserId,
        page: Page,
    ) -> Result<Vec<Transaction>> {
        let (limit, offset) = page.bounds()?;

        let rows = sqlx::query(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS} FROM transactions
            WHERE buyer_id = $1 OR seller_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(user_id.as_uuid())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_transaction).collect()
    }

    async fn apply_transition(&self, write: TransitionWrite) -> Result<Transaction> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        // The status predicate doubles as the optimistic lock: a concurrent
        // writer that committed first makes this update match no row.
        let row = sqlx::query(&format!(
            r#"
            UPDATE transactions SET status = $1, updated_at = $2
            WHERE id = $3 AND status = $4
            RETURNING {TRANSACTION_COLUMNS}
            "#
        ))
        .bind(write.new_status.as_str())
        .bind(now)
        .bind(write.transaction_id.as_uuid())
        .bind(write.expected_status.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            let actual: Option<String> =
                sqlx::query_scalar("SELECT status FROM transactions WHERE id = $1")
                    .bind(write.transaction_id.as_uuid())
                    .fetch_optional(&mut *tx)
                    .await?;

            tracing::debug!(
                transaction_id = %write.transaction_id,
                expected = %write.expected_status,
                ?actual,
                "conditional status update matched no row"
            );

            return match actual {
                None => Err(StoreError::not_found("Transaction", write.transaction_id)),
                Some(actual) => Err(StoreError::StatusConflict {
                    transaction_id: write.transaction_id,
                    expected: write.expected_status,
                    actual: actual
                        .parse()
                        .map_err(|e: common::ParseEnumError| StoreError::Corrupt(e.to_string()))?,
                }),
            };
        };
        let transaction = Self::row_to_transaction(row)?;

        if let Some(status) = write.item_status {
            let updated = sqlx::query("UPDATE items SET status = $1, updated_at = $2 WHERE id = $3")
                .bind(status.as_str())
                .bind(now)
                .bind(transaction.item_id.as_uuid())
                .execute(&mut *tx)
                .await?;

            if updated.rows_affected() != 1 {
                return Err(StoreError::not_found("Item", transaction.item_id));
            }
        }

        if write.refund_payments {
            sqlx::query(
                "UPDATE payments SET status = $1, updated_at = $2 WHERE transaction_id = $3 AND status = $4",
            )
            .bind(PaymentStatus::Refunded.as_str())
            .bind(now)
            .bind(write.transaction_id.as_uuid())
            .bind(PaymentStatus::Paid.as_str())
            .execute(&mut *tx)
            .await?;
        }

        Self::insert_activity(&mut tx, &write.activity).await?;

        tx.commit().await?;
        Ok(transaction)
    }

    async fn insert_payment(&self, payment: Payment) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO payments (id, transaction_id, amount_cents, currency, status, method, external_reference, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(payment.transaction_id.as_uuid())
        .bind(payment.amount.cents())
        .bind(&payment.currency)
        .bind(payment.status.as_str())
        .bind(&payment.method)
        .bind(&payment.external_reference)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if violates(&e, "payments_transaction_id_fkey") {
                return StoreError::not_found("Transaction", payment.transaction_id);
            }
            StoreError::Database(e)
        })?;

        Ok(())
    }

    async fn get_payment(&self, payment_id: PaymentId) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1"))
            .bind(payment_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_payment).transpose()
    }

    async fn payments_for_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Vec<Payment>> {
        let rows = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE transaction_id = $1 ORDER BY created_at ASC"
        ))
        .bind(transaction_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_payment).collect()
    }

    async fn update_payment_status(&self, write: PaymentStatusWrite) -> Result<Payment> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            r#"
            UPDATE payments SET status = $1, method = COALESCE($2, method), updated_at = $3
            WHERE id = $4 AND status = $5
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(write.new_status.as_str())
        .bind(&write.method)
        .bind(Utc::now())
        .bind(write.payment_id.as_uuid())
        .bind(write.expected_status.as_str())
        .fetch_optional(&mut *tx)
        .await;

        let row = match row {
            Ok(row) => row,
            Err(e) if violates(&e, "one_paid_payment_per_transaction") => {
                tx.rollback().await?;
                let transaction_id: Uuid =
                    sqlx::query_scalar("SELECT transaction_id FROM payments WHERE id = $1")
                        .bind(write.payment_id.as_uuid())
                        .fetch_one(&self.pool)
                        .await?;
                return Err(StoreError::AlreadyPaid(TransactionId::from_uuid(
                    transaction_id,
                )));
            }
            Err(e) => return Err(e.into()),
        };

        let Some(row) = row else {
            let actual: Option<String> =
                sqlx::query_scalar("SELECT status FROM payments WHERE id = $1")
                    .bind(write.payment_id.as_uuid())
                    .fetch_optional(&mut *tx)
                    .await?;

            return match actual {
                None => Err(StoreError::not_found("Payment", write.payment_id)),
                Some(actual) => Err(StoreError::PaymentConflict {
                    payment_id: write.payment_id,
                    expected: write.expected_status,
                    actual: actual
                        .parse()
                        .map_err(|e: common::ParseEnumError| StoreError::Corrupt(e.to_string()))?,
                }),
            };
        };
        let payment = Self::row_to_payment(row)?;

        if let Some(activity) = &write.activity {
            Self::insert_activity(&mut tx, activity).await?;
        }

        tx.commit().await?;
        Ok(payment)
    }

    async fn insert_review(&self, review: Review) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO reviews (id, transaction_id, item_id, reviewer_id, rating, comment, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(review.id.as_uuid())
        .bind(review.transaction_id.as_uuid())
        .bind(review.item_id.as_uuid())
        .bind(review.reviewer_id.as_uuid())
        .bind(i16::from(review.rating))
        .bind(&review.comment)
        .bind(review.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if violates(&e, "reviews_transaction_id_key") {
                return StoreError::DuplicateReview(review.transaction_id);
            }
            StoreError::Database(e)
        })?;

        Ok(())
    }

    async fn list_reviews(&self, item_id: Option<ItemId>) -> Result<Vec<Review>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {REVIEW_COLUMNS} FROM reviews
            WHERE ($1::uuid IS NULL OR item_id = $1)
            ORDER BY created_at DESC
            "#
        ))
        .bind(item_id.map(|id| id.as_uuid()))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_review).collect()
    }

    async fn query_activity(&self, query: ActivityQuery) -> Result<Vec<ActivityLog>> {
        let mut sql = format!("SELECT {ACTIVITY_COLUMNS} FROM activity_logs WHERE 1=1");
        let mut param_count = 0;

        // Build dynamic query
        if query.entity_type.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND entity_type = ${param_count}"));
        }
        if query.entity_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND entity_id = ${param_count}"));
        }
        if query.actor_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND actor_id = ${param_count}"));
        }
        if query.actions.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND action = ANY(${param_count})"));
        }
        if query.from_timestamp.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND created_at >= ${param_count}"));
        }
        if query.to_timestamp.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND created_at <= ${param_count}"));
        }

        sql.push_str(" ORDER BY seq ASC");

        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }
        if query.offset.is_some() {
            param_count += 1;
            sql.push_str(&format!(" OFFSET ${param_count}"));
        }

        let mut sqlx_query = sqlx::query(&sql);

        if let Some(entity_type) = query.entity_type {
            sqlx_query = sqlx_query.bind(entity_type.as_str());
        }
        if let Some(entity_id) = query.entity_id {
            sqlx_query = sqlx_query.bind(entity_id);
        }
        if let Some(actor_id) = query.actor_id {
            sqlx_query = sqlx_query.bind(actor_id.as_uuid());
        }
        if let Some(actions) = query.actions {
            sqlx_query = sqlx_query.bind(actions);
        }
        if let Some(from_ts) = query.from_timestamp {
            sqlx_query = sqlx_query.bind(from_ts);
        }
        if let Some(to_ts) = query.to_timestamp {
            sqlx_query = sqlx_query.bind(to_ts);
        }
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(sql_bound("limit", limit)?);
        }
        if let Some(offset) = query.offset {
            sqlx_query = sqlx_query.bind(sql_bound("offset", offset)?);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_activity).collect()
    }

    async fn stream_activity(&self) -> Result<ActivityStream> {
        use futures_util::stream;

        let pool = self.pool.clone();
        let stream = stream::try_unfold(0_i64, move |after| {
            Self::activity_batch(pool.clone(), after)
        })
        .map_ok(|batch| stream::iter(batch.into_iter().map(Ok)))
        .try_flatten();

        Ok(Box::pin(stream))
    }
}

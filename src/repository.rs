use crate::{
    error::AppError,
    models::{Sweet, SweetPayload, SweetSearch, User, check_amount},
};
use async_trait::async_trait;
use sqlx::{PgPool, query_builder::QueryBuilder};
use std::{future::Future, sync::Arc, time::Duration};

/// Repository Trait
///
/// The persistence contract consumed by the auth layer and the handlers. Two stores back
/// it: `PostgresRepository` in production and `InMemoryRepository` (see `memory`) in tests
/// and local runs started with `STORE_BACKEND=memory`.
///
/// Every quantity-changing method is atomic per item: the availability check and the
/// write can never interleave with another mutator of the same row, so concurrent
/// purchases cannot oversell.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Credentials ---
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError>;
    // Fails with Conflict when the email is already registered.
    async fn create_user(
        &self,
        email: &str,
        hashed_password: &str,
        is_admin: bool,
    ) -> Result<User, AppError>;

    // --- Catalog ---
    async fn list_sweets(&self) -> Result<Vec<Sweet>, AppError>;
    async fn search_sweets(&self, filter: &SweetSearch) -> Result<Vec<Sweet>, AppError>;
    async fn create_sweet(&self, payload: &SweetPayload) -> Result<Sweet, AppError>;
    // Full replace of the mutable fields.
    async fn update_sweet(&self, id: i64, payload: &SweetPayload) -> Result<Sweet, AppError>;
    async fn delete_sweet(&self, id: i64) -> Result<(), AppError>;

    // --- Stock ---
    /// Decrement by `amount`, or fail with `InsufficientStock` leaving the row untouched.
    async fn purchase_sweet(&self, id: i64, amount: i64) -> Result<Sweet, AppError>;
    /// Increment by `amount`. No upper bound beyond the integer range.
    async fn restock_sweet(&self, id: i64, amount: i64) -> Result<Sweet, AppError>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

const SWEET_COLUMNS: &str = "id, name, category, price, quantity";
const USER_COLUMNS: &str = "id, email, hashed_password, is_admin";

/// PostgresRepository
///
/// The `Repository` implementation backed by PostgreSQL. Each call is bounded by
/// `timeout`; a call that overruns fails with `AppError::Timeout` instead of hanging the
/// request.
pub struct PostgresRepository {
    pool: PgPool,
    timeout: Duration,
}

impl PostgresRepository {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                tracing::error!("{op} error: {:?}", e);
                Err(AppError::from(e))
            }
            Err(_) => Err(AppError::Timeout(op)),
        }
    }
}

/// Escapes LIKE metacharacters so user text is matched literally, then wraps it for a
/// substring match. The pattern is used with `ESCAPE '\'`.
pub fn like_pattern(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 2);
    escaped.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        self.bounded(
            "find_user_by_email",
            sqlx::query_as::<_, User>(&sql)
                .bind(email)
                .fetch_optional(&self.pool),
        )
        .await
    }

    /// create_user
    ///
    /// Relies on the unique index on `users.email`: a registration that races past the
    /// handler's pre-check surfaces as a unique violation, which converts to `Conflict`.
    async fn create_user(
        &self,
        email: &str,
        hashed_password: &str,
        is_admin: bool,
    ) -> Result<User, AppError> {
        let sql = format!(
            "INSERT INTO users (email, hashed_password, is_admin) VALUES ($1, $2, $3) RETURNING {USER_COLUMNS}"
        );
        self.bounded(
            "create_user",
            sqlx::query_as::<_, User>(&sql)
                .bind(email)
                .bind(hashed_password)
                .bind(is_admin)
                .fetch_one(&self.pool),
        )
        .await
    }

    async fn list_sweets(&self) -> Result<Vec<Sweet>, AppError> {
        let sql = format!("SELECT {SWEET_COLUMNS} FROM sweets ORDER BY id");
        self.bounded(
            "list_sweets",
            sqlx::query_as::<_, Sweet>(&sql).fetch_all(&self.pool),
        )
        .await
    }

    /// search_sweets
    ///
    /// Builds the WHERE clause with `QueryBuilder` so every user value is a bound parameter.
    async fn search_sweets(&self, filter: &SweetSearch) -> Result<Vec<Sweet>, AppError> {
        let mut builder: QueryBuilder<sqlx::Postgres> =
            QueryBuilder::new(format!("SELECT {SWEET_COLUMNS} FROM sweets WHERE TRUE"));

        if let Some(name) = &filter.name {
            builder.push(" AND name ILIKE ");
            builder.push_bind(like_pattern(name));
            builder.push(r" ESCAPE '\'");
        }
        if let Some(category) = &filter.category {
            builder.push(" AND category ILIKE ");
            builder.push_bind(like_pattern(category));
            builder.push(r" ESCAPE '\'");
        }
        if let Some(min) = filter.min_price {
            builder.push(" AND price >= ");
            builder.push_bind(min);
        }
        if let Some(max) = filter.max_price {
            builder.push(" AND price <= ");
            builder.push_bind(max);
        }

        builder.push(" ORDER BY id");

        self.bounded(
            "search_sweets",
            builder.build_query_as::<Sweet>().fetch_all(&self.pool),
        )
        .await
    }

    async fn create_sweet(&self, payload: &SweetPayload) -> Result<Sweet, AppError> {
        let sql = format!(
            "INSERT INTO sweets (name, category, price, quantity) VALUES ($1, $2, $3, $4) RETURNING {SWEET_COLUMNS}"
        );
        self.bounded(
            "create_sweet",
            sqlx::query_as::<_, Sweet>(&sql)
                .bind(&payload.name)
                .bind(&payload.category)
                .bind(payload.price)
                .bind(payload.quantity)
                .fetch_one(&self.pool),
        )
        .await
    }

    async fn update_sweet(&self, id: i64, payload: &SweetPayload) -> Result<Sweet, AppError> {
        let sql = format!(
            "UPDATE sweets SET name = $2, category = $3, price = $4, quantity = $5 WHERE id = $1 RETURNING {SWEET_COLUMNS}"
        );
        self.bounded(
            "update_sweet",
            sqlx::query_as::<_, Sweet>(&sql)
                .bind(id)
                .bind(&payload.name)
                .bind(&payload.category)
                .bind(payload.price)
                .bind(payload.quantity)
                .fetch_optional(&self.pool),
        )
        .await?
        .ok_or_else(|| AppError::sweet_not_found(id))
    }

    async fn delete_sweet(&self, id: i64) -> Result<(), AppError> {
        let result = self
            .bounded(
                "delete_sweet",
                sqlx::query("DELETE FROM sweets WHERE id = $1")
                    .bind(id)
                    .execute(&self.pool),
            )
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::sweet_not_found(id));
        }
        Ok(())
    }

    /// purchase_sweet
    ///
    /// One transaction: `SELECT ... FOR UPDATE` takes the row lock, so the availability
    /// check, the decrement and the quantity reported in `InsufficientStock` all see the
    /// same row state. Concurrent purchases and restocks of the sweet queue behind the lock.
    async fn purchase_sweet(&self, id: i64, amount: i64) -> Result<Sweet, AppError> {
        check_amount(amount)?;

        let sql = format!(
            "UPDATE sweets SET quantity = quantity - $2 WHERE id = $1 AND quantity >= $2 RETURNING {SWEET_COLUMNS}"
        );
        let purchase = async {
            let mut tx = self.pool.begin().await?;

            let locked =
                sqlx::query_scalar::<_, i64>("SELECT quantity FROM sweets WHERE id = $1 FOR UPDATE")
                    .bind(id)
                    .fetch_optional(&mut *tx)
                    .await?;

            let outcome = match locked {
                None => Err(AppError::sweet_not_found(id)),
                Some(available) if available < amount => Err(AppError::InsufficientStock {
                    requested: amount,
                    available,
                }),
                Some(_) => Ok(sqlx::query_as::<_, Sweet>(&sql)
                    .bind(id)
                    .bind(amount)
                    .fetch_one(&mut *tx)
                    .await?),
            };

            // Nothing was written on the error paths; committing just releases the lock.
            tx.commit().await?;
            Ok::<_, sqlx::Error>(outcome)
        };

        self.bounded("purchase_sweet", purchase).await?
    }

    async fn restock_sweet(&self, id: i64, amount: i64) -> Result<Sweet, AppError> {
        check_amount(amount)?;

        let sql = format!(
            "UPDATE sweets SET quantity = quantity + $2 WHERE id = $1 RETURNING {SWEET_COLUMNS}"
        );
        self.bounded(
            "restock_sweet",
            sqlx::query_as::<_, Sweet>(&sql)
                .bind(id)
                .bind(amount)
                .fetch_optional(&self.pool),
        )
        .await?
        .ok_or_else(|| AppError::sweet_not_found(id))
    }
}

#[cfg(test)]
mod tests {
    use super::like_pattern;

    #[test]
    fn like_pattern_escapes_metacharacters() {
        assert_eq!(like_pattern("indian"), "%indian%");
        assert_eq!(like_pattern("50%_off"), r"%50\%\_off%");
        assert_eq!(like_pattern(r"a\b"), r"%a\\b%");
    }
}

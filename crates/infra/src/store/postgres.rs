//! Postgres-backed record store.
//!
//! Aggregates are pushed down to SQL (`SUM`, `COUNT`, `GROUP BY`, `HAVING`);
//! only the small result sets cross the wire. Schema lives in
//! `migrations/0001_retail_records.sql`.
//!
//! ## Error Mapping
//!
//! | SQLx error | Postgres code | `StoreError` |
//! |------------|---------------|--------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | RowNotFound | N/A | `NotFound` |
//! | anything else | any | `Backend` |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::instrument;

use storepulse_core::{Cents, CustomerId, ExpenseId, SaleId, TimeWindow, TrendInterval};
use storepulse_records::{Customer, Expense, Sale};

use super::r#trait::{
    AnalyticsQuery, CategoryTotal, CustomerPurchases, PeriodRevenue, ProductRevenue, RecordStore,
    SalesTotals, StoreError, UNCATEGORIZED,
};

const SCHEMA: &str = include_str!("../../migrations/0001_retail_records.sql");

#[derive(Debug, Clone)]
pub struct PostgresRecordStore {
    pool: Arc<PgPool>,
}

impl PostgresRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Open a pool against `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the tables if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    async fn execute_expecting_row(
        &self,
        operation: &str,
        what: String,
        query: sqlx::query::Query<'_, sqlx::Postgres, sqlx::postgres::PgArguments>,
    ) -> Result<(), StoreError> {
        let result = query
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(what));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for PostgresRecordStore {
    #[instrument(skip(self, sale), fields(sale_id = %sale.id), err)]
    async fn insert_sale(&self, sale: &Sale) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO sales (id, date, product_name, amount_cents, customer_id, category, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(sale.id.as_uuid())
        .bind(sale.date)
        .bind(&sale.product_name)
        .bind(sale.amount_cents.get())
        .bind(sale.customer_id.as_ref().map(CustomerId::as_str))
        .bind(sale.category.as_deref())
        .bind(sale.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_sale", e))?;
        Ok(())
    }

    #[instrument(skip(self, sale), fields(sale_id = %sale.id), err)]
    async fn update_sale(&self, sale: &Sale) -> Result<(), StoreError> {
        let query = sqlx::query(
            r#"
            UPDATE sales
            SET date = $2, product_name = $3, amount_cents = $4, customer_id = $5, category = $6
            WHERE id = $1
            "#,
        )
        .bind(sale.id.as_uuid())
        .bind(sale.date)
        .bind(&sale.product_name)
        .bind(sale.amount_cents.get())
        .bind(sale.customer_id.as_ref().map(CustomerId::as_str))
        .bind(sale.category.as_deref());
        self.execute_expecting_row("update_sale", format!("sale {}", sale.id), query)
            .await
    }

    #[instrument(skip(self), fields(sale_id = %id), err)]
    async fn delete_sale(&self, id: SaleId) -> Result<Sale, StoreError> {
        let row = sqlx::query(
            r#"
            DELETE FROM sales WHERE id = $1
            RETURNING id, date, product_name, amount_cents, customer_id, category, created_at
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("delete_sale", e))?
        .ok_or_else(|| StoreError::NotFound(format!("sale {id}")))?;
        sale_from_row(&row)
    }

    #[instrument(skip(self), fields(sale_id = %id), err)]
    async fn get_sale(&self, id: SaleId) -> Result<Option<Sale>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, date, product_name, amount_cents, customer_id, category, created_at
            FROM sales WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_sale", e))?;
        row.as_ref().map(sale_from_row).transpose()
    }

    #[instrument(skip(self, expense), fields(expense_id = %expense.id), err)]
    async fn insert_expense(&self, expense: &Expense) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO expenses (id, date, description, amount_cents, category, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(expense.id.as_uuid())
        .bind(expense.date)
        .bind(&expense.description)
        .bind(expense.amount_cents.get())
        .bind(expense.category.as_deref())
        .bind(expense.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_expense", e))?;
        Ok(())
    }

    #[instrument(skip(self, expense), fields(expense_id = %expense.id), err)]
    async fn update_expense(&self, expense: &Expense) -> Result<(), StoreError> {
        let query = sqlx::query(
            r#"
            UPDATE expenses
            SET date = $2, description = $3, amount_cents = $4, category = $5
            WHERE id = $1
            "#,
        )
        .bind(expense.id.as_uuid())
        .bind(expense.date)
        .bind(&expense.description)
        .bind(expense.amount_cents.get())
        .bind(expense.category.as_deref());
        self.execute_expecting_row("update_expense", format!("expense {}", expense.id), query)
            .await
    }

    #[instrument(skip(self), fields(expense_id = %id), err)]
    async fn delete_expense(&self, id: ExpenseId) -> Result<Expense, StoreError> {
        let row = sqlx::query(
            r#"
            DELETE FROM expenses WHERE id = $1
            RETURNING id, date, description, amount_cents, category, created_at
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("delete_expense", e))?
        .ok_or_else(|| StoreError::NotFound(format!("expense {id}")))?;
        expense_from_row(&row)
    }

    #[instrument(skip(self), fields(expense_id = %id), err)]
    async fn get_expense(&self, id: ExpenseId) -> Result<Option<Expense>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, date, description, amount_cents, category, created_at
            FROM expenses WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_expense", e))?;
        row.as_ref().map(expense_from_row).transpose()
    }

    #[instrument(skip(self, customer), fields(customer_id = %customer.id), err)]
    async fn insert_customer(&self, customer: &Customer) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO customers (id, name, email, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(customer.id.as_str())
        .bind(customer.name.as_deref())
        .bind(customer.email.as_deref())
        .bind(customer.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_customer", e))?;
        Ok(())
    }

    #[instrument(skip(self, customer), fields(customer_id = %customer.id), err)]
    async fn update_customer(&self, customer: &Customer) -> Result<(), StoreError> {
        let query = sqlx::query("UPDATE customers SET name = $2, email = $3 WHERE id = $1")
            .bind(customer.id.as_str())
            .bind(customer.name.as_deref())
            .bind(customer.email.as_deref());
        self.execute_expecting_row("update_customer", format!("customer {}", customer.id), query)
            .await
    }

    #[instrument(skip(self), fields(customer_id = %id), err)]
    async fn delete_customer(&self, id: &CustomerId) -> Result<Customer, StoreError> {
        let row = sqlx::query(
            "DELETE FROM customers WHERE id = $1 RETURNING id, name, email, created_at",
        )
        .bind(id.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("delete_customer", e))?
        .ok_or_else(|| StoreError::NotFound(format!("customer {id}")))?;
        customer_from_row(&row)
    }

    #[instrument(skip(self), fields(customer_id = %id), err)]
    async fn get_customer(&self, id: &CustomerId) -> Result<Option<Customer>, StoreError> {
        let row = sqlx::query("SELECT id, name, email, created_at FROM customers WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_customer", e))?;
        row.as_ref().map(customer_from_row).transpose()
    }
}

#[async_trait]
impl AnalyticsQuery for PostgresRecordStore {
    #[instrument(skip(self), err)]
    async fn sales_totals(&self, window: TimeWindow) -> Result<SalesTotals, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(amount_cents), 0)::BIGINT AS total, COUNT(*) AS sales_count
            FROM sales
            WHERE date >= $1 AND date < $2
            "#,
        )
        .bind(window.start())
        .bind(window.end())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("sales_totals", e))?;

        Ok(SalesTotals {
            total_cents: Cents::new(get(&row, "total")?),
            count: count(&row, "sales_count")?,
        })
    }

    #[instrument(skip(self), err)]
    async fn revenue_by_product(
        &self,
        window: TimeWindow,
        limit: usize,
    ) -> Result<Vec<ProductRevenue>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT product_name, SUM(amount_cents)::BIGINT AS total, COUNT(*) AS sales_count
            FROM sales
            WHERE date >= $1 AND date < $2
            GROUP BY product_name
            ORDER BY total DESC, product_name ASC
            LIMIT $3
            "#,
        )
        .bind(window.start())
        .bind(window.end())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("revenue_by_product", e))?;

        rows.iter()
            .map(|row| {
                Ok(ProductRevenue {
                    product_name: get(row, "product_name")?,
                    total_cents: Cents::new(get(row, "total")?),
                    sales_count: count(row, "sales_count")?,
                })
            })
            .collect()
    }

    #[instrument(skip(self), err)]
    async fn repeat_customer_count(&self, window: TimeWindow) -> Result<u64, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS repeat_count FROM (
                SELECT customer_id
                FROM sales
                WHERE customer_id IS NOT NULL AND date >= $1 AND date < $2
                GROUP BY customer_id
                HAVING COUNT(*) > 1
            ) AS repeaters
            "#,
        )
        .bind(window.start())
        .bind(window.end())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("repeat_customer_count", e))?;
        count(&row, "repeat_count")
    }

    #[instrument(skip(self), err)]
    async fn customer_purchases(
        &self,
        window: TimeWindow,
    ) -> Result<Vec<CustomerPurchases>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT customer_id, COUNT(*) AS purchase_count, SUM(amount_cents)::BIGINT AS total_spent
            FROM sales
            WHERE customer_id IS NOT NULL AND date >= $1 AND date < $2
            GROUP BY customer_id
            ORDER BY customer_id ASC
            "#,
        )
        .bind(window.start())
        .bind(window.end())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("customer_purchases", e))?;

        rows.iter()
            .map(|row| {
                Ok(CustomerPurchases {
                    customer_id: customer_id(get(row, "customer_id")?)?,
                    purchase_count: count(row, "purchase_count")?,
                    total_spent: Cents::new(get(row, "total_spent")?),
                })
            })
            .collect()
    }

    #[instrument(skip(self), err)]
    async fn expense_total(&self, window: TimeWindow) -> Result<Cents, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(amount_cents), 0)::BIGINT AS total
            FROM expenses
            WHERE date >= $1 AND date < $2
            "#,
        )
        .bind(window.start())
        .bind(window.end())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("expense_total", e))?;
        Ok(Cents::new(get(&row, "total")?))
    }

    #[instrument(skip(self), err)]
    async fn expenses_by_category(
        &self,
        window: TimeWindow,
    ) -> Result<Vec<CategoryTotal>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT COALESCE(category, $3) AS category,
                   SUM(amount_cents)::BIGINT AS total,
                   COUNT(*) AS expense_count
            FROM expenses
            WHERE date >= $1 AND date < $2
            GROUP BY 1
            ORDER BY total DESC, category ASC
            "#,
        )
        .bind(window.start())
        .bind(window.end())
        .bind(UNCATEGORIZED)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("expenses_by_category", e))?;

        rows.iter()
            .map(|row| {
                Ok(CategoryTotal {
                    category: get(row, "category")?,
                    total_cents: Cents::new(get(row, "total")?),
                    count: count(row, "expense_count")?,
                })
            })
            .collect()
    }

    #[instrument(skip(self), fields(interval = interval.as_str()), err)]
    async fn revenue_by_period(
        &self,
        window: TimeWindow,
        interval: TrendInterval,
    ) -> Result<Vec<PeriodRevenue>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT to_char(date AT TIME ZONE 'UTC', $3) AS period,
                   SUM(amount_cents)::BIGINT AS revenue
            FROM sales
            WHERE date >= $1 AND date < $2
            GROUP BY 1
            ORDER BY period ASC
            "#,
        )
        .bind(window.start())
        .bind(window.end())
        .bind(period_format(interval))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("revenue_by_period", e))?;

        rows.iter()
            .map(|row| {
                Ok(PeriodRevenue {
                    period: get(row, "period")?,
                    revenue: Cents::new(get(row, "revenue")?),
                })
            })
            .collect()
    }

    #[instrument(skip(self), err)]
    async fn customer_count(&self) -> Result<u64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS customer_count FROM customers")
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("customer_count", e))?;
        count(&row, "customer_count")
    }
}

/// `to_char` pattern producing the same labels as [`TrendInterval::bucket_label`].
fn period_format(interval: TrendInterval) -> &'static str {
    match interval {
        TrendInterval::Daily => "YYYY-MM-DD",
        TrendInterval::Weekly => r#"IYYY-"W"IW"#,
        TrendInterval::Monthly => "YYYY-MM",
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::RowNotFound => StoreError::NotFound(format!("no row in {operation}")),
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {operation}"))
        }
        other => StoreError::Backend(format!("{operation} failed: {other}")),
    }
}

fn get<'r, T>(row: &'r PgRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column)
        .map_err(|e| StoreError::Backend(format!("failed to decode column {column}: {e}")))
}

/// `COUNT(*)` comes back as BIGINT.
fn count(row: &PgRow, column: &str) -> Result<u64, StoreError> {
    let n: i64 = get(row, column)?;
    u64::try_from(n).map_err(|_| StoreError::Backend(format!("negative count in {column}")))
}

fn customer_id(raw: String) -> Result<CustomerId, StoreError> {
    CustomerId::new(raw).map_err(|e| StoreError::Backend(format!("stored customer id: {e}")))
}

fn sale_from_row(row: &PgRow) -> Result<Sale, StoreError> {
    let customer: Option<String> = get(row, "customer_id")?;
    Ok(Sale {
        id: SaleId::from_uuid(get(row, "id")?),
        date: get::<DateTime<Utc>>(row, "date")?,
        product_name: get(row, "product_name")?,
        amount_cents: Cents::new(get(row, "amount_cents")?),
        customer_id: customer.map(customer_id).transpose()?,
        category: get(row, "category")?,
        created_at: get(row, "created_at")?,
    })
}

fn expense_from_row(row: &PgRow) -> Result<Expense, StoreError> {
    Ok(Expense {
        id: ExpenseId::from_uuid(get(row, "id")?),
        date: get(row, "date")?,
        description: get(row, "description")?,
        amount_cents: Cents::new(get(row, "amount_cents")?),
        category: get(row, "category")?,
        created_at: get(row, "created_at")?,
    })
}

fn customer_from_row(row: &PgRow) -> Result<Customer, StoreError> {
    Ok(Customer {
        id: customer_id(get(row, "id")?)?,
        name: get(row, "name")?,
        email: get(row, "email")?,
        created_at: get(row, "created_at")?,
    })
}

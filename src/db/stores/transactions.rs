use async_trait::async_trait;
use chrono::NaiveDate;
use diesel::QueryableByName;
use diesel::sql_types::{Double, Text};

use super::{
    SumRow, TransactionStore, format_date, format_timestamp, parse_date, parse_enum,
    parse_timestamp,
};
use crate::db::models::{CategoryTotal, MonthlyTotals, Totals, Transaction, TransactionFilter, TransactionKind};
use crate::db::{Database, DatabaseError, SqlValue};
use crate::params;

#[derive(QueryableByName)]
struct DbTransaction {
    #[diesel(sql_type = Text)]
    id: String,
    #[diesel(sql_type = Text)]
    user_id: String,
    #[diesel(sql_type = Text)]
    kind: String,
    #[diesel(sql_type = Double)]
    amount: f64,
    #[diesel(sql_type = Text)]
    category: String,
    #[diesel(sql_type = Text)]
    description: String,
    #[diesel(sql_type = Text)]
    occurred_on: String,
    #[diesel(sql_type = Text)]
    created_at: String,
    #[diesel(sql_type = Text)]
    updated_at: String,
}

impl DbTransaction {
    fn to_transaction(&self) -> Result<Transaction, DatabaseError> {
        Ok(Transaction {
            id: self.id.clone(),
            user_id: self.user_id.clone(),
            kind: parse_enum(&self.kind)?,
            amount: self.amount,
            category: self.category.clone(),
            description: self.description.clone(),
            occurred_on: parse_date(&self.occurred_on)?,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

#[derive(QueryableByName)]
struct DbCategoryTotal {
    #[diesel(sql_type = Text)]
    category: String,
    #[diesel(sql_type = Double)]
    total: f64,
}

#[derive(QueryableByName)]
struct DbCategory {
    #[diesel(sql_type = Text)]
    category: String,
}

#[derive(QueryableByName)]
struct DbTotals {
    #[diesel(sql_type = Double)]
    income: f64,
    #[diesel(sql_type = Double)]
    expense: f64,
}

#[derive(QueryableByName)]
struct DbMonthlyTotals {
    #[diesel(sql_type = Text)]
    month: String,
    #[diesel(sql_type = Double)]
    income: f64,
    #[diesel(sql_type = Double)]
    expense: f64,
}

const TRANSACTION_COLUMNS: &str =
    "id, user_id, kind, amount, category, description, occurred_on, created_at, updated_at";

fn to_transactions(rows: Vec<DbTransaction>) -> Result<Vec<Transaction>, DatabaseError> {
    rows.iter().map(DbTransaction::to_transaction).collect()
}

/// Appends the filter's optional conditions, numbering placeholders after
/// the ones already in `params`.
fn push_filter(sql: &mut String, params: &mut Vec<SqlValue>, filter: &TransactionFilter) {
    if let Some(kind) = filter.kind {
        params.push(kind.as_str().into());
        sql.push_str(&format!(" AND kind = ${}", params.len()));
    }
    if let Some(category) = &filter.category {
        params.push(category.into());
        sql.push_str(&format!(" AND category = ${}", params.len()));
    }
    if let Some(search) = &filter.search {
        params.push(format!("%{search}%").into());
        let n = params.len();
        sql.push_str(&format!(
            " AND (description ILIKE ${n} OR category ILIKE ${n})"
        ));
    }
    if let Some(from) = filter.from {
        params.push(format_date(from).into());
        sql.push_str(&format!(" AND occurred_on >= ${}", params.len()));
    }
    if let Some(to) = filter.to {
        params.push(format_date(to).into());
        sql.push_str(&format!(" AND occurred_on <= ${}", params.len()));
    }
    if let Some(year) = filter.year {
        params.push(i64::from(year).into());
        sql.push_str(&format!(
            " AND EXTRACT(YEAR FROM occurred_on::date) = ${}",
            params.len()
        ));
    }
}

pub struct SqlTransactionStore {
    db: Database,
}

impl SqlTransactionStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TransactionStore for SqlTransactionStore {
    async fn create_transaction(&self, transaction: &Transaction) -> Result<(), DatabaseError> {
        self.db
            .execute(
                &format!(
                    "INSERT INTO transactions ({TRANSACTION_COLUMNS}) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
                ),
                params![
                    &transaction.id,
                    &transaction.user_id,
                    transaction.kind.as_str(),
                    transaction.amount,
                    &transaction.category,
                    &transaction.description,
                    format_date(transaction.occurred_on),
                    format_timestamp(&transaction.created_at),
                    format_timestamp(&transaction.updated_at),
                ],
            )
            .await?;
        Ok(())
    }

    async fn get_transaction(
        &self,
        user_id: &str,
        id: &str,
    ) -> Result<Option<Transaction>, DatabaseError> {
        let row: Option<DbTransaction> = self
            .db
            .fetch_optional(
                &format!(
                    "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = $1 AND user_id = $2"
                ),
                params![id, user_id],
            )
            .await?;
        row.map(|r| r.to_transaction()).transpose()
    }

    async fn update_transaction(&self, transaction: &Transaction) -> Result<bool, DatabaseError> {
        let affected = self
            .db
            .execute(
                "UPDATE transactions SET kind = $1, amount = $2, category = $3, description = $4, \
                 occurred_on = $5, updated_at = $6 WHERE id = $7 AND user_id = $8",
                params![
                    transaction.kind.as_str(),
                    transaction.amount,
                    &transaction.category,
                    &transaction.description,
                    format_date(transaction.occurred_on),
                    format_timestamp(&transaction.updated_at),
                    &transaction.id,
                    &transaction.user_id,
                ],
            )
            .await?;
        Ok(affected > 0)
    }

    async fn delete_transaction(&self, user_id: &str, id: &str) -> Result<bool, DatabaseError> {
        let affected = self
            .db
            .execute(
                "DELETE FROM transactions WHERE id = $1 AND user_id = $2",
                params![id, user_id],
            )
            .await?;
        Ok(affected > 0)
    }

    async fn list_transactions(
        &self,
        user_id: &str,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>, DatabaseError> {
        let mut sql = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE user_id = $1");
        let mut params = params![user_id];
        push_filter(&mut sql, &mut params, filter);

        params.push(filter.limit.into());
        params.push(filter.offset.into());
        sql.push_str(&format!(
            " ORDER BY occurred_on DESC, created_at DESC LIMIT ${} OFFSET ${}",
            params.len() - 1,
            params.len()
        ));

        let rows: Vec<DbTransaction> = self.db.fetch_all(&sql, params).await?;
        to_transactions(rows)
    }

    async fn list_categories(&self, user_id: &str) -> Result<Vec<String>, DatabaseError> {
        let rows: Vec<DbCategory> = self
            .db
            .fetch_all(
                "SELECT DISTINCT category FROM transactions WHERE user_id = $1 ORDER BY category",
                params![user_id],
            )
            .await?;
        Ok(rows.into_iter().map(|r| r.category).collect())
    }

    async fn category_totals(
        &self,
        user_id: &str,
        kind: TransactionKind,
        from: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<CategoryTotal>, DatabaseError> {
        let rows: Vec<DbCategoryTotal> = self
            .db
            .fetch_all(
                "SELECT category, COALESCE(SUM(amount), 0) AS total FROM transactions \
                 WHERE user_id = $1 AND kind = $2 AND occurred_on >= $3 AND occurred_on < $4 \
                 GROUP BY category ORDER BY total DESC",
                params![user_id, kind.as_str(), format_date(from), format_date(until)],
            )
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| CategoryTotal {
                category: r.category,
                total: r.total,
            })
            .collect())
    }

    async fn category_spent(
        &self,
        user_id: &str,
        category: &str,
        from: NaiveDate,
        until: NaiveDate,
    ) -> Result<f64, DatabaseError> {
        let row: SumRow = self
            .db
            .fetch_one(
                "SELECT COALESCE(SUM(amount), 0) AS total FROM transactions \
                 WHERE user_id = $1 AND kind = 'expense' AND category = $2 \
                 AND occurred_on >= $3 AND occurred_on < $4",
                params![user_id, category, format_date(from), format_date(until)],
            )
            .await?;
        Ok(row.total)
    }

    async fn totals(
        &self,
        user_id: &str,
        from: NaiveDate,
        until: NaiveDate,
    ) -> Result<Totals, DatabaseError> {
        let row: DbTotals = self
            .db
            .fetch_one(
                "SELECT \
                 COALESCE(SUM(CASE WHEN kind = 'income' THEN amount ELSE 0 END), 0) AS income, \
                 COALESCE(SUM(CASE WHEN kind = 'expense' THEN amount ELSE 0 END), 0) AS expense \
                 FROM transactions WHERE user_id = $1 AND occurred_on >= $2 AND occurred_on < $3",
                params![user_id, format_date(from), format_date(until)],
            )
            .await?;
        Ok(Totals {
            income: row.income,
            expense: row.expense,
        })
    }

    async fn monthly_totals(
        &self,
        user_id: &str,
        from: NaiveDate,
    ) -> Result<Vec<MonthlyTotals>, DatabaseError> {
        let rows: Vec<DbMonthlyTotals> = self
            .db
            .fetch_all(
                "SELECT TO_CHAR(occurred_on::date, 'YYYY-MM') AS month, \
                 COALESCE(SUM(CASE WHEN kind = 'income' THEN amount ELSE 0 END), 0) AS income, \
                 COALESCE(SUM(CASE WHEN kind = 'expense' THEN amount ELSE 0 END), 0) AS expense \
                 FROM transactions WHERE user_id = $1 AND occurred_on >= $2 \
                 GROUP BY TO_CHAR(occurred_on::date, 'YYYY-MM') ORDER BY month",
                params![user_id, format_date(from)],
            )
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| MonthlyTotals {
                month: r.month,
                income: r.income,
                expense: r.expense,
            })
            .collect())
    }

    async fn list_family_transactions(
        &self,
        family_id: &str,
        limit: i64,
    ) -> Result<Vec<Transaction>, DatabaseError> {
        let rows: Vec<DbTransaction> = self
            .db
            .fetch_all(
                "SELECT t.id, t.user_id, t.kind, t.amount, t.category, t.description, \
                 t.occurred_on, t.created_at, t.updated_at \
                 FROM transactions t JOIN family_members m ON m.user_id = t.user_id \
                 WHERE m.family_id = $1 \
                 ORDER BY t.occurred_on DESC, t.created_at DESC LIMIT $2",
                params![family_id, limit],
            )
            .await?;
        to_transactions(rows)
    }
}

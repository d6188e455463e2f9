use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use diesel::QueryableByName;
use diesel::sql_types::{Double, Text};

use super::{ReferenceStore, format_timestamp, parse_timestamp};
use crate::db::models::ExchangeRate;
use crate::db::{Database, DatabaseError, Statement};
use crate::params;

#[derive(QueryableByName)]
struct DbTranslation {
    #[diesel(sql_type = Text)]
    msg_key: String,
    #[diesel(sql_type = Text)]
    msg_value: String,
}

#[derive(QueryableByName)]
struct DbExchangeRate {
    #[diesel(sql_type = Text)]
    provider: String,
    #[diesel(sql_type = Text)]
    currency: String,
    #[diesel(sql_type = Double)]
    rate: f64,
    #[diesel(sql_type = Text)]
    fetched_at: String,
}

impl DbExchangeRate {
    fn to_rate(&self) -> Result<ExchangeRate, DatabaseError> {
        Ok(ExchangeRate {
            provider: self.provider.clone(),
            currency: self.currency.clone(),
            rate: self.rate,
            fetched_at: parse_timestamp(&self.fetched_at)?,
        })
    }
}

pub struct SqlReferenceStore {
    db: Database,
}

impl SqlReferenceStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ReferenceStore for SqlReferenceStore {
    async fn translations(
        &self,
        language: &str,
    ) -> Result<BTreeMap<String, String>, DatabaseError> {
        let rows: Vec<DbTranslation> = self
            .db
            .fetch_all(
                "SELECT msg_key, msg_value FROM translations WHERE language = $1",
                params![language],
            )
            .await?;
        Ok(rows.into_iter().map(|r| (r.msg_key, r.msg_value)).collect())
    }

    async fn upsert_translations(
        &self,
        language: &str,
        entries: &BTreeMap<String, String>,
    ) -> Result<(), DatabaseError> {
        if entries.is_empty() {
            return Ok(());
        }
        let now = format_timestamp(&Utc::now());
        let statements = entries
            .iter()
            .map(|(key, value)| {
                Statement::new(
                    "INSERT INTO translations (language, msg_key, msg_value, updated_at) \
                     VALUES ($1, $2, $3, $4) \
                     ON CONFLICT (language, msg_key) DO UPDATE SET \
                     msg_value = EXCLUDED.msg_value, updated_at = EXCLUDED.updated_at",
                    params![language, key, value, &now],
                )
            })
            .collect();
        self.db.execute_batch(statements).await?;
        Ok(())
    }

    async fn upsert_rates(&self, rates: &[ExchangeRate]) -> Result<(), DatabaseError> {
        if rates.is_empty() {
            return Ok(());
        }
        let statements = rates
            .iter()
            .map(|rate| {
                Statement::new(
                    "INSERT INTO exchange_rates (provider, currency, rate, fetched_at) \
                     VALUES ($1, $2, $3, $4) \
                     ON CONFLICT (provider, currency) DO UPDATE SET \
                     rate = EXCLUDED.rate, fetched_at = EXCLUDED.fetched_at",
                    params![
                        &rate.provider,
                        &rate.currency,
                        rate.rate,
                        format_timestamp(&rate.fetched_at),
                    ],
                )
            })
            .collect();
        self.db.execute_batch(statements).await?;
        Ok(())
    }

    async fn list_rates(&self, provider: &str) -> Result<Vec<ExchangeRate>, DatabaseError> {
        let rows: Vec<DbExchangeRate> = self
            .db
            .fetch_all(
                "SELECT provider, currency, rate, fetched_at FROM exchange_rates \
                 WHERE provider = $1 ORDER BY currency",
                params![provider],
            )
            .await?;
        rows.iter().map(DbExchangeRate::to_rate).collect()
    }
}

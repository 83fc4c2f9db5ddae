//! PostgreSQL feature store over `user_activity` / `user_features`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{error, info};

use likelihood_core::{
    ActivityId, ActivityLookup, EmployeeId, FeatureRow, FeatureSeries, PostgresConfig,
};

use crate::error::StoreError;
use crate::store::{ActivityDirectory, FeatureSeriesLoader, FeatureStore, FeatureUnit};

/// Create a PostgreSQL connection pool and run migrations.
pub async fn init_pg_pool(config: &PostgresConfig) -> Result<PgPool, StoreError> {
    if !config.is_configured() {
        return Err(StoreError::NotConfigured(
            "set PG_URL or PG_USERNAME to reach the feature store".to_string(),
        ));
    }

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url())
        .await?;
    info!("PostgreSQL connected: {}", config.host);

    sqlx::migrate!("../../migrations").run(&pool).await?;
    info!("Database migrations applied successfully");

    Ok(pool)
}

/// Feature store backed by a `PgPool`. Each unit of work is one transaction.
#[derive(Clone)]
pub struct PgFeatureStore {
    pool: PgPool,
}

impl PgFeatureStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn map_unique_violation(e: sqlx::Error, row: &FeatureRow) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e {
        if db_err.code().as_deref() == Some("23505") {
            return StoreError::UniqueViolation {
                activity_id: row.activity_id,
                name: row.name.clone(),
            };
        }
    }
    StoreError::Database(e)
}

pub struct PgFeatureUnit {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl FeatureUnit for PgFeatureUnit {
    async fn insert(&mut self, row: &FeatureRow) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO user_features (activity_id, name, value) VALUES ($1, $2, $3)")
            .bind(row.activity_id)
            .bind(&row.name)
            .bind(row.value)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_unique_violation(e, row))?;
        Ok(())
    }

    async fn update(&mut self, row: &FeatureRow) -> Result<(), StoreError> {
        sqlx::query("UPDATE user_features SET value = $3 WHERE activity_id = $1 AND name = $2")
            .bind(row.activity_id)
            .bind(&row.name)
            .bind(row.value)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn delete(&mut self, activity_id: ActivityId, name: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM user_features WHERE activity_id = $1 AND name = $2")
            .bind(activity_id)
            .bind(name)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl FeatureStore for PgFeatureStore {
    async fn begin(&self) -> Result<Box<dyn FeatureUnit>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgFeatureUnit { tx }))
    }
}

#[async_trait]
impl FeatureSeriesLoader for PgFeatureStore {
    async fn load_series(
        &self,
        names: &[String],
        employees: &[EmployeeId],
        start: Option<NaiveDate>,
        end: NaiveDate,
    ) -> Result<HashMap<EmployeeId, FeatureSeries>, StoreError> {
        let rows = sqlx::query(
            "SELECT a.login, a.day_date, f.name, f.value \
             FROM user_features f \
             JOIN user_activity a ON a.id = f.activity_id \
             WHERE f.name = ANY($1) \
               AND a.login = ANY($2) \
               AND ($3::date IS NULL OR a.day_date >= $3) \
               AND a.day_date <= $4 \
               AND f.value IS NOT NULL \
             ORDER BY a.login, a.day_date",
        )
        .bind(names)
        .bind(employees)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("feature series query failed: {}", e);
            StoreError::Database(e)
        })?;

        let mut series: HashMap<EmployeeId, FeatureSeries> = employees
            .iter()
            .map(|login| (login.clone(), FeatureSeries::new()))
            .collect();

        for row in rows {
            let login: String = row.try_get("login")?;
            let day: NaiveDate = row.try_get("day_date")?;
            let name: String = row.try_get("name")?;
            let value: f64 = row.try_get("value")?;
            series
                .entry(login)
                .or_default()
                .entry(day)
                .or_default()
                .insert(name, value);
        }

        Ok(series)
    }
}

#[async_trait]
impl ActivityDirectory for PgFeatureStore {
    async fn load_activities(
        &self,
        employees: &[EmployeeId],
        start: Option<NaiveDate>,
        end: NaiveDate,
    ) -> Result<ActivityLookup, StoreError> {
        let rows = sqlx::query(
            "SELECT id, login, day_date FROM user_activity \
             WHERE login = ANY($1) \
               AND ($2::date IS NULL OR day_date >= $2) \
               AND day_date <= $3",
        )
        .bind(employees)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        let mut lookup = ActivityLookup::new();
        for row in rows {
            let id: ActivityId = row.try_get("id")?;
            let login: String = row.try_get("login")?;
            let day: NaiveDate = row.try_get("day_date")?;
            lookup.entry(login).or_default().insert(day, id);
        }

        Ok(lookup)
    }
}

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder};

use crate::query::{QueryError, ReportFilter};
use crate::report::NormalizedReport;

const REPORT_COLUMNS: &str = "report_type, reported_at, recorded_at, magnitude, direction, distance_miles, landmark, county, state, latitude, longitude, remarks, office";

/// Durable storage for normalized reports.
///
/// Implementations must enforce uniqueness over the report's natural key and surface a
/// conflicting write as a unique violation (SQLSTATE 23505), not as a silent success.
#[async_trait]
pub trait ReportWriter: Send + Sync {
    /// Insert one report, returning the number of rows written.
    async fn insert(&self, report: &NormalizedReport) -> Result<u64, sqlx::Error>;
}

/// The `reports` table in PostgreSQL.
#[derive(Clone)]
pub struct PgReportStore {
    pool: PgPool,
}

impl PgReportStore {
    /// Connect a new pool to the reports database.
    pub async fn new(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;

        Ok(Self { pool })
    }

    /// Build a store on top of an existing pool.
    pub fn new_from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Read-only access for the query surface: every stored report matching `filter`,
    /// oldest first.
    pub async fn query(&self, filter: &ReportFilter) -> Result<Vec<NormalizedReport>, QueryError> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {REPORT_COLUMNS} FROM reports WHERE TRUE"));

        if let Some(report_type) = filter.report_type {
            builder.push(" AND report_type = ").push_bind(report_type);
        }
        if let Some(reported_at) = filter.reported_at {
            builder.push(" AND reported_at = ").push_bind(reported_at);
        }
        if let Some(state) = &filter.state {
            builder.push(" AND state = ").push_bind(state.clone());
        }
        if let Some(county) = &filter.county {
            builder.push(" AND county = ").push_bind(county.clone());
        }
        builder.push(" ORDER BY reported_at, id");

        let reports = builder
            .build_query_as::<NormalizedReport>()
            .fetch_all(&self.pool)
            .await?;

        Ok(reports)
    }
}

#[async_trait]
impl ReportWriter for PgReportStore {
    async fn insert(&self, report: &NormalizedReport) -> Result<u64, sqlx::Error> {
        let query = format!(
            r#"
INSERT INTO reports
    ({REPORT_COLUMNS})
VALUES
    ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#
        );

        let result = sqlx::query(&query)
            .bind(report.report_type)
            .bind(report.reported_at)
            .bind(report.recorded_at)
            .bind(report.magnitude)
            .bind(&report.direction)
            .bind(report.distance_miles)
            .bind(&report.landmark)
            .bind(&report.county)
            .bind(&report.state)
            .bind(&report.latitude)
            .bind(&report.longitude)
            .bind(&report.remarks)
            .bind(&report.office)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

/// Determines if a sqlx::Error is a unique constraint violation, i.e. the row is already stored.
pub fn is_unique_violation(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db_error) => match db_error.code() {
            // 23505 unique_violation
            Some(code) => code.as_ref() == "23505",
            None => db_error
                .message()
                .contains("duplicate key value violates unique constraint"),
        },
        _ => false,
    }
}

/// Determines if a sqlx::Error represents a transient failure that a later attempt could clear.
pub fn is_transient_error(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Tls(_) => true,

        sqlx::Error::Database(db_error) => match db_error.code() {
            // 08*** Connection Exception, 53*** Insufficient Resources,
            // 57*** Operator Intervention, 58*** System Error,
            // 40001 Serialization Failure, 40P01 Deadlock Detected,
            // 40003 Statement Completion Unknown (inserts are idempotent on the natural key)
            Some(code) => {
                let code = code.as_ref();
                code.starts_with("08")
                    || code.starts_with("53")
                    || code.starts_with("57")
                    || code.starts_with("58")
                    || code == "40001"
                    || code == "40003"
                    || code == "40P01"
            }
            None => {
                let msg = db_error.message().to_lowercase();
                msg.contains("connection")
                    || msg.contains("timeout")
                    || msg.contains("timed out")
                    || msg.contains("temporary")
                    || msg.contains("deadlock")
                    || msg.contains("serialization")
                    || msg.contains("disk full")
                    || msg.contains("canceling statement due to")
                    || msg.contains("terminating connection due to")
                    || msg.contains("ssl")
                    || msg.contains("tls")
            }
        },

        sqlx::Error::Protocol(msg) => {
            let msg = msg.to_lowercase();
            msg.contains("connection")
                || msg.contains("timeout")
                || msg.contains("ssl")
                || msg.contains("tls")
        }

        _ => false,
    }
}

//! SQLite storage implementation

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{
    sqlite::{SqlitePool, SqlitePoolOptions},
    Row,
};
use tracing::{debug, info};

use super::traits::{AttendanceEntry, AttendanceStorage, EmployeeRecord};

/// SQLite-based employee and attendance storage
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a new SQLite storage
    pub async fn new(db_path: &str) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = Path::new(db_path).parent() {
            std::fs::create_dir_all(parent)?;
        }

        let database_url = format!("sqlite:{}?mode=rwc", db_path);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&database_url)
            .await
            .context("Failed to connect to SQLite database")?;

        let storage = Self { pool };
        storage.initialize().await?;

        Ok(storage)
    }

    /// Initialize database schema
    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS employees (
                employee_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                member_code TEXT NOT NULL DEFAULT '',
                embedding BLOB NOT NULL,
                image_path TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_employees_name ON employees(name)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS attendance_log (
                id TEXT PRIMARY KEY,
                employee_id TEXT NOT NULL,
                name TEXT NOT NULL,
                member_code TEXT NOT NULL,
                timestamp INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_attendance_timestamp ON attendance_log(timestamp DESC)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_attendance_employee_id ON attendance_log(employee_id)
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("SQLite database initialized");
        Ok(())
    }
}

fn employee_from_row(row: sqlx::sqlite::SqliteRow) -> EmployeeRecord {
    EmployeeRecord {
        employee_id: row.get("employee_id"),
        name: row.get("name"),
        member_code: row.get("member_code"),
        embedding: row.get("embedding"),
        image_path: row.get("image_path"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[async_trait]
impl AttendanceStorage for SqliteStorage {
    async fn load_employees(&self) -> Result<Vec<EmployeeRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT employee_id, name, member_code, embedding, image_path, created_at, updated_at
            FROM employees
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(employee_from_row).collect())
    }

    async fn get_employee(&self, employee_id: &str) -> Result<Option<EmployeeRecord>> {
        let row = sqlx::query(
            r#"
            SELECT employee_id, name, member_code, embedding, image_path, created_at, updated_at
            FROM employees
            WHERE employee_id = ?
            "#,
        )
        .bind(employee_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(employee_from_row))
    }

    async fn save_employee(&self, record: &EmployeeRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO employees (employee_id, name, member_code, embedding, image_path, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.employee_id)
        .bind(&record.name)
        .bind(&record.member_code)
        .bind(&record.embedding)
        .bind(&record.image_path)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        debug!("Saved employee: {}", record.employee_id);
        Ok(())
    }

    async fn update_employee(&self, record: &EmployeeRecord) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE employees
            SET name = ?, member_code = ?, embedding = ?, image_path = ?, updated_at = ?
            WHERE employee_id = ?
            "#,
        )
        .bind(&record.name)
        .bind(&record.member_code)
        .bind(&record.embedding)
        .bind(&record.image_path)
        .bind(record.updated_at)
        .bind(&record.employee_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_employee(&self, employee_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM employees WHERE employee_id = ?")
            .bind(employee_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_employees(&self, offset: i64, limit: i64) -> Result<Vec<EmployeeRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT employee_id, name, member_code, embedding, image_path, created_at, updated_at
            FROM employees
            ORDER BY created_at DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(employee_from_row).collect())
    }

    async fn count_employees(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM employees")
            .fetch_one(&self.pool)
            .await?;

        Ok(row.get("count"))
    }

    async fn append_attendance(&self, entry: &AttendanceEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO attendance_log (id, employee_id, name, member_code, timestamp)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.employee_id)
        .bind(&entry.name)
        .bind(&entry.member_code)
        .bind(entry.timestamp)
        .execute(&self.pool)
        .await?;

        debug!("Logged attendance for: {}", entry.employee_id);
        Ok(())
    }

    async fn list_attendance(&self, limit: i64) -> Result<Vec<AttendanceEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, employee_id, name, member_code, timestamp
            FROM attendance_log
            ORDER BY timestamp DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| AttendanceEntry {
                id: row.get("id"),
                employee_id: row.get("employee_id"),
                name: row.get("name"),
                member_code: row.get("member_code"),
                timestamp: row.get("timestamp"),
            })
            .collect())
    }
}

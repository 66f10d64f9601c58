use std::collections::HashMap;

use chrono::{DateTime, Utc};
use cortex_core::{
    error::{CoordError, Result},
    models::{AccessType, AuditReport, FileLockRecord, RaHistory, TaskStatus, TaskStep},
};
use sqlx::{sqlite::SqliteRow, Row};

/// Parse a task status string coming out of the database.
/// Unknown values are rejected rather than coerced.
pub fn string_to_status(s: &str) -> Result<TaskStatus> {
    TaskStatus::parse(s)
        .ok_or_else(|| CoordError::Database(format!("Invalid task status in database: {s}")))
}

/// Parse an access type string coming out of the database.
pub fn string_to_access_type(s: &str) -> Result<AccessType> {
    AccessType::parse(s)
        .ok_or_else(|| CoordError::Database(format!("Invalid access type in database: {s}")))
}

/// Decode a JSON-encoded string list column.
pub fn parse_string_list(raw: &str) -> Result<Vec<String>> {
    serde_json::from_str(raw)
        .map_err(|e| CoordError::Database(format!("Invalid JSON list in database: {e}")))
}

/// Decode the JSON-encoded path -> access-type column.
pub fn parse_access_map(raw: &str) -> Result<HashMap<String, AccessType>> {
    serde_json::from_str(raw)
        .map_err(|e| CoordError::Database(format!("Invalid access map in database: {e}")))
}

/// Convert a SQLite row into a TaskStep
pub fn row_to_task(row: &SqliteRow) -> Result<TaskStep> {
    let status_str: String = row.get("status");
    let dependencies: String = row.get("dependencies");
    let file_dependencies: String = row.get("file_dependencies");
    let file_access_types: String = row.get("file_access_types");

    Ok(TaskStep {
        step_id: row.get("step_id"),
        workflow_id: row.get("workflow_id"),
        task_name: row.get("task_name"),
        task_description: row.get("task_description"),
        assigned_agent: row.get("assigned_agent"),
        dependencies: parse_string_list(&dependencies)?,
        project_path: row.get("project_path"),
        file_dependencies: parse_string_list(&file_dependencies)?,
        file_access_types: parse_access_map(&file_access_types)?,
        status: string_to_status(&status_str)?,
        client_id: row.get("client_id"),
        started_at: row.get("started_at"),
        completed_at: row.get("completed_at"),
        created_at: row.get("created_at"),
    })
}

/// Convert a SQLite row into an RaHistory (joined result row)
pub fn row_to_history(row: &SqliteRow) -> Result<RaHistory> {
    let iterations: String = row.get("iterations");

    Ok(RaHistory {
        iterations: serde_json::from_str(&iterations)
            .map_err(|e| CoordError::Database(format!("Invalid iterations JSON: {e}")))?,
        final_result: row.get("final_result"),
        source_agent: row.get("source_agent"),
        execution_time: row.get("execution_time"),
        client_id: row.get("client_id"),
    })
}

/// Convert a SQLite row into an AuditReport
pub fn row_to_audit_report(row: &SqliteRow) -> Result<AuditReport> {
    let rework_suggestions: String = row.get("rework_suggestions");
    let reviewed_tasks: String = row.get("reviewed_tasks");
    let audit_criteria: String = row.get("audit_criteria");

    Ok(AuditReport {
        workflow_id: row.get("workflow_id"),
        is_successful: row.get("is_successful"),
        feedback: row.get("feedback"),
        rework_suggestions: parse_string_list(&rework_suggestions)?,
        confidence_score: row.get("confidence_score"),
        reviewed_tasks: parse_string_list(&reviewed_tasks)?,
        audit_criteria: parse_string_list(&audit_criteria)?,
        created_at: row.get("created_at"),
    })
}

/// Convert a SQLite row into a FileLockRecord
pub fn row_to_lock_record(row: &SqliteRow) -> Result<FileLockRecord> {
    let access_type: String = row.get("access_type");

    Ok(FileLockRecord {
        file_path: row.get("file_path"),
        client_id: row.get("client_id"),
        task_step_id: row.get("task_step_id"),
        workflow_id: row.get("workflow_id"),
        access_type: string_to_access_type(&access_type)?,
        locked_at: row.get("locked_at"),
        expires_at: row.get("expires_at"),
        is_active: row.get("is_active"),
    })
}

/// Convert a SQLx error into a CoordError
pub fn sqlx_error_to_coord_error(err: sqlx::Error) -> CoordError {
    match &err {
        sqlx::Error::Database(db_err) => {
            let message = db_err.message();
            if message.contains("UNIQUE constraint failed") {
                CoordError::Conflict(format!("Constraint violation: {message}"))
            } else {
                CoordError::Database(format!("Database constraint error: {message}"))
            }
        }
        sqlx::Error::RowNotFound => {
            CoordError::Database("Unexpected RowNotFound error".to_string())
        }
        sqlx::Error::PoolTimedOut => CoordError::Database("Connection pool timeout".to_string()),
        sqlx::Error::Io(io_err) => CoordError::Database(format!("Database I/O error: {io_err}")),
        _ => CoordError::Database(format!("Database operation failed: {err}")),
    }
}

/// Push the FIFO claim candidate subquery: the oldest unclaimed READY task
/// whose assigned agent lies in the worker's capability set.
pub fn push_claim_candidate<'a>(
    query_builder: &mut sqlx::QueryBuilder<'a, sqlx::Sqlite>,
    capabilities: &'a [String],
) {
    query_builder.push(
        "SELECT step_id FROM tasks WHERE status = 'READY' AND client_id IS NULL AND assigned_agent IN (",
    );
    let mut separated = query_builder.separated(", ");
    for capability in capabilities {
        separated.push_bind(capability);
    }
    query_builder.push(") ORDER BY created_at ASC LIMIT 1");
}

/// Encode a string list for a JSON column. Encoding a plain string list
/// cannot fail; the fallback keeps the column well-formed regardless.
pub fn encode_string_list(values: &[String]) -> String {
    serde_json::to_string(values).unwrap_or_else(|_| "[]".to_string())
}

/// Encode the path -> access-type map for a JSON column.
pub fn encode_access_map(map: &HashMap<String, AccessType>) -> String {
    serde_json::to_string(map).unwrap_or_else(|_| "{}".to_string())
}

/// ISO timestamp for metadata annotations
pub fn iso_now() -> String {
    let now: DateTime<Utc> = Utc::now();
    now.to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parsing() {
        assert_eq!(string_to_status("READY").unwrap(), TaskStatus::Ready);
        assert_eq!(
            string_to_status("IN_PROGRESS").unwrap(),
            TaskStatus::InProgress
        );
        assert!(string_to_status("Ready").is_err());
        assert!(string_to_status("").is_err());
    }

    #[test]
    fn test_access_type_parsing() {
        assert_eq!(
            string_to_access_type("exclusive").unwrap(),
            AccessType::Exclusive
        );
        assert!(string_to_access_type("rw").is_err());
    }

    #[test]
    fn test_string_list_round_trip() {
        let values = vec!["TID0000000001".to_string(), "TID0000000002".to_string()];
        let encoded = encode_string_list(&values);
        assert_eq!(parse_string_list(&encoded).unwrap(), values);

        assert!(parse_string_list("not json").is_err());
        assert!(parse_string_list("[]").unwrap().is_empty());
    }

    #[test]
    fn test_access_map_round_trip() {
        let mut map = HashMap::new();
        map.insert("/tmp/x".to_string(), AccessType::Write);
        let encoded = encode_access_map(&map);
        let decoded = parse_access_map(&encoded).unwrap();
        assert_eq!(decoded.get("/tmp/x"), Some(&AccessType::Write));
    }

    #[test]
    fn test_claim_query_shape() {
        use sqlx::Execute;

        let capabilities = vec!["researcher".to_string(), "writer".to_string()];
        let mut qb = sqlx::QueryBuilder::<sqlx::Sqlite>::new("");
        push_claim_candidate(&mut qb, &capabilities);
        let query = qb.build();
        let sql = query.sql();

        assert!(sql.contains("status = 'READY'"));
        assert!(sql.contains("client_id IS NULL"));
        assert!(sql.contains("assigned_agent IN ("));
        assert!(sql.contains("ORDER BY created_at ASC LIMIT 1"));
    }
}

//! Memory deletion.
//!
//! Deletion is explicit and permanent: the row is removed from the memories
//! table, the FTS5 index, the vectors table, and the waypoint graph (both
//! directions, via FK cascade).

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use super::store::write_audit_log;
use crate::error::{EngineError, Result};

/// Result returned from a delete operation.
#[derive(Debug, Serialize)]
pub struct DeleteResult {
    /// ID of the deleted memory.
    pub id: String,
    /// Waypoints removed alongside it (outgoing plus incoming).
    pub waypoints_removed: usize,
}

/// Permanently delete a memory and everything hanging off it.
pub fn delete_memory(conn: &mut Connection, memory_id: &str) -> Result<DeleteResult> {
    let tx = conn.transaction()?;

    let row: Option<(i64, String)> = tx
        .query_row(
            "SELECT rowid, content FROM memories WHERE id = ?1",
            params![memory_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let Some((rowid, content)) = row else {
        return Err(EngineError::NotFound {
            kind: "memory",
            id: memory_id.to_string(),
        });
    };

    // External-content FTS5 requires the old values on delete.
    tx.execute(
        "INSERT INTO memories_fts(memories_fts, rowid, content, id) VALUES('delete', ?1, ?2, ?3)",
        params![rowid, content, memory_id],
    )?;

    let waypoints_removed: i64 = tx.query_row(
        "SELECT COUNT(*) FROM waypoints WHERE src_id = ?1 OR dst_id = ?1",
        params![memory_id],
        |row| row.get(0),
    )?;

    // Audit before the row disappears; memory_log keeps the id as text.
    write_audit_log(
        &tx,
        "delete",
        memory_id,
        Some(&serde_json::json!({ "waypoints_removed": waypoints_removed })),
    )?;

    // Cascades to vectors and waypoints via FK.
    tx.execute("DELETE FROM memories WHERE id = ?1", params![memory_id])?;

    tx.commit()?;

    Ok(DeleteResult {
        id: memory_id.to_string(),
        waypoints_removed: waypoints_removed as usize,
    })
}

//! Database queries for memory operations

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use crate::error::{MnemoError, Result};
use crate::types::*;

/// Parse a memory from a database row (tags loaded separately)
pub fn memory_from_row(row: &Row) -> rusqlite::Result<MemoryRecord> {
    let id: i64 = row.get("id")?;
    let user_id: String = row.get("user_id")?;
    let content: String = row.get("content")?;
    let category_str: String = row.get("category")?;
    let source_str: String = row.get("source")?;
    let importance: i32 = row.get("importance")?;
    let conversation_id: Option<String> = row.get("conversation_id")?;
    let extracted_from: Option<String> = row.get("extracted_from")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(MemoryRecord {
        id,
        user_id,
        content,
        category: category_str.parse().unwrap_or_default(),
        tags: vec![], // Loaded separately
        source: source_str.parse().unwrap_or_default(),
        importance,
        conversation_id,
        extracted_from,
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Load tags for a memory
pub fn load_tags(conn: &Connection, memory_id: MemoryId) -> Result<Vec<String>> {
    let mut stmt = conn.prepare_cached(
        "SELECT t.name FROM tags t
         JOIN memory_tags mt ON t.id = mt.tag_id
         WHERE mt.memory_id = ?
         ORDER BY t.id",
    )?;

    let tags: Vec<String> = stmt
        .query_map([memory_id], |row| row.get(0))?
        .filter_map(|r| r.ok())
        .collect();

    Ok(tags)
}

/// Associate tags with a memory, deduplicating while preserving order
pub fn save_tags(conn: &Connection, memory_id: MemoryId, tags: &[String]) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for tag in tags {
        let tag = tag.trim();
        if tag.is_empty() || !seen.insert(tag) {
            continue;
        }

        conn.execute("INSERT OR IGNORE INTO tags (name) VALUES (?)", [tag])?;
        let tag_id: i64 =
            conn.query_row("SELECT id FROM tags WHERE name = ?", [tag], |row| {
                row.get(0)
            })?;
        conn.execute(
            "INSERT OR IGNORE INTO memory_tags (memory_id, tag_id) VALUES (?, ?)",
            params![memory_id, tag_id],
        )?;
    }
    Ok(())
}

/// Insert a new memory, returning the stored record
pub fn insert_memory(conn: &Connection, input: &CreateMemoryInput) -> Result<MemoryRecord> {
    if input.user_id.trim().is_empty() {
        return Err(MnemoError::InvalidInput("user_id is required".to_string()));
    }
    if input.content.trim().is_empty() {
        return Err(MnemoError::InvalidInput("content is required".to_string()));
    }

    let now = Utc::now();
    let now_str = now.to_rfc3339();
    let importance = clamp_importance(input.importance);
    let hash = content_key(&input.content);

    conn.execute(
        "INSERT INTO memories
            (user_id, content, category, source, importance,
             conversation_id, extracted_from, content_hash, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            input.user_id,
            input.content,
            input.category.as_str(),
            input.source.as_str(),
            importance,
            input.conversation_id,
            input.extracted_from,
            hash,
            now_str,
            now_str,
        ],
    )?;

    let id = conn.last_insert_rowid();
    save_tags(conn, id, &input.tags)?;

    get_memory(conn, id)
}

/// Find an existing memory with the same `(user_id, trimmed content)`
/// natural key, for duplicate detection during import
pub fn find_duplicate(
    conn: &Connection,
    user_id: &str,
    content: &str,
) -> Result<Option<MemoryRecord>> {
    let hash = content_key(content);
    let mut stmt = conn.prepare_cached(
        "SELECT id, user_id, content, category, source, importance,
                conversation_id, extracted_from, created_at, updated_at
         FROM memories
         WHERE user_id = ? AND content_hash = ?
         LIMIT 1",
    )?;

    let result = stmt
        .query_row(params![user_id, hash], memory_from_row)
        .ok();

    if let Some(mut memory) = result {
        memory.tags = load_tags(conn, memory.id)?;
        Ok(Some(memory))
    } else {
        Ok(None)
    }
}

/// Get a memory by id
pub fn get_memory(conn: &Connection, id: MemoryId) -> Result<MemoryRecord> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, user_id, content, category, source, importance,
                conversation_id, extracted_from, created_at, updated_at
         FROM memories
         WHERE id = ?",
    )?;

    let mut memory = stmt
        .query_row([id], memory_from_row)
        .map_err(|_| MnemoError::NotFound(id))?;
    memory.tags = load_tags(conn, id)?;

    Ok(memory)
}

/// Escape LIKE wildcards so keywords match literally
fn escape_like(keyword: &str) -> String {
    keyword
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Lexical search: records whose content or any tag contains any keyword
/// as a substring, ordered by importance descending.
///
/// An empty keyword set broadens instead of matching nothing: the
/// caller gets the `limit` most important records for the user.
pub fn search_memories(
    conn: &Connection,
    user_id: &str,
    keywords: &[String],
    limit: i64,
) -> Result<Vec<MemoryRecord>> {
    let mut sql = String::from(
        "SELECT m.id, m.user_id, m.content, m.category, m.source, m.importance,
                m.conversation_id, m.extracted_from, m.created_at, m.updated_at
         FROM memories m
         WHERE m.user_id = ?",
    );
    let mut sql_params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(user_id.to_string())];

    let keywords: Vec<&String> = keywords.iter().filter(|k| !k.trim().is_empty()).collect();
    if !keywords.is_empty() {
        let mut conditions: Vec<String> = Vec::with_capacity(keywords.len());
        for keyword in &keywords {
            let like = format!("%{}%", escape_like(keyword));
            conditions.push(
                "(m.content LIKE ? ESCAPE '\\' OR EXISTS (
                    SELECT 1 FROM memory_tags mt
                    JOIN tags t ON mt.tag_id = t.id
                    WHERE mt.memory_id = m.id AND t.name LIKE ? ESCAPE '\\'))"
                    .to_string(),
            );
            sql_params.push(Box::new(like.clone()));
            sql_params.push(Box::new(like));
        }
        sql.push_str(" AND (");
        sql.push_str(&conditions.join(" OR "));
        sql.push(')');
    }

    sql.push_str(" ORDER BY m.importance DESC, m.created_at DESC LIMIT ?");
    sql_params.push(Box::new(limit));

    let mut stmt = conn.prepare(&sql)?;
    let param_refs: Vec<&dyn rusqlite::ToSql> = sql_params.iter().map(|b| b.as_ref()).collect();

    let mut memories: Vec<MemoryRecord> = stmt
        .query_map(param_refs.as_slice(), memory_from_row)?
        .filter_map(|r| r.ok())
        .collect();

    for memory in &mut memories {
        memory.tags = load_tags(conn, memory.id)?;
    }

    Ok(memories)
}

/// List a user's memories by importance then recency
pub fn list_memories(conn: &Connection, user_id: &str, limit: i64) -> Result<Vec<MemoryRecord>> {
    search_memories(conn, user_id, &[], limit)
}

/// Get all memories in a category for a user
pub fn get_by_category(
    conn: &Connection,
    user_id: &str,
    category: Category,
) -> Result<Vec<MemoryRecord>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, user_id, content, category, source, importance,
                conversation_id, extracted_from, created_at, updated_at
         FROM memories
         WHERE user_id = ? AND category = ?
         ORDER BY importance DESC, created_at DESC",
    )?;

    let mut memories: Vec<MemoryRecord> = stmt
        .query_map(params![user_id, category.as_str()], memory_from_row)?
        .filter_map(|r| r.ok())
        .collect();

    for memory in &mut memories {
        memory.tags = load_tags(conn, memory.id)?;
    }

    Ok(memories)
}

/// Delete a memory; returns whether a row was removed
pub fn delete_memory(conn: &Connection, id: MemoryId) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM memories WHERE id = ?", [id])?;
    Ok(deleted > 0)
}

/// Per-user lexical store statistics
pub fn memory_stats(conn: &Connection, user_id: &str) -> Result<MemoryStats> {
    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM memories WHERE user_id = ?",
        [user_id],
        |row| row.get(0),
    )?;

    let mut by_category = std::collections::HashMap::new();
    let mut stmt = conn.prepare_cached(
        "SELECT category, COUNT(*) FROM memories WHERE user_id = ? GROUP BY category",
    )?;
    let rows = stmt.query_map([user_id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;
    for row in rows {
        let (category, count) = row?;
        by_category.insert(category, count);
    }

    Ok(MemoryStats { total, by_category })
}

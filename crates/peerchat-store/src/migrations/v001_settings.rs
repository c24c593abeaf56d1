use rusqlite::Connection;

const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS settings (
    key        TEXT PRIMARY KEY NOT NULL,     -- "<namespace>/<name>"
    value      TEXT NOT NULL,                 -- JSON
    updated_at TEXT NOT NULL                  -- RFC 3339
);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}

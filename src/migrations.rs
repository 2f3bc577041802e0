use crate::db::DbPool;

pub struct Migration {
    pub name: &'static str,
    pub sql: &'static str,
}

/// Schema changes on top of the tables `init_db` creates, in apply order.
pub fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            name: "001_source_health_table",
            sql: "CREATE TABLE IF NOT EXISTS source_health (
                      source_id TEXT PRIMARY KEY,
                      status TEXT NOT NULL DEFAULT 'healthy',
                      last_success INTEGER,
                      last_failure INTEGER,
                      fail_count INTEGER NOT NULL DEFAULT 0,
                      latency_ms INTEGER NOT NULL DEFAULT 0,
                      message TEXT,
                      updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                  );",
        },
    ]
}

pub fn run_pending(pool: &DbPool) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let conn = pool.get()?;
    let applied_set: std::collections::HashSet<String> = conn
        .prepare("SELECT name FROM migrations ORDER BY id")?
        .query_map([], |row| row.get::<_, String>(0))?
        .filter_map(|r| r.ok())
        .collect();

    let mut newly_applied = Vec::new();

    for migration in all_migrations() {
        if !applied_set.contains(migration.name) {
            conn.execute_batch(migration.sql)?;
            conn.execute("INSERT INTO migrations (name) VALUES (?1)", [migration.name])?;
            tracing::debug!(migration = migration.name, "Applied migration");
            newly_applied.push(migration.name.to_string());
        }
    }

    Ok(newly_applied)
}

pub fn applied(pool: &DbPool) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let conn = pool.get()?;
    let names: Vec<String> = conn
        .prepare("SELECT name FROM migrations ORDER BY id")?
        .query_map([], |row| row.get(0))?
        .filter_map(|r| r.ok())
        .collect();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn test_pool() -> (tempfile::TempDir, DbPool) {
        let dir = tempfile::tempdir().unwrap();
        let pool = db::create_pool(&dir.path().join("test.sqlite")).unwrap();
        db::init_db(&pool).unwrap();
        (dir, pool)
    }

    #[test]
    fn run_pending_on_fresh_db_applies_all() {
        let (_dir, pool) = test_pool();
        let applied = run_pending(&pool).unwrap();
        assert_eq!(applied.len(), all_migrations().len());
    }

    #[test]
    fn run_pending_is_idempotent() {
        let (_dir, pool) = test_pool();
        let first = run_pending(&pool).unwrap();
        let second = run_pending(&pool).unwrap();
        assert!(!first.is_empty());
        assert!(second.is_empty());
    }

    #[test]
    fn applied_returns_names_in_order() {
        let (_dir, pool) = test_pool();
        run_pending(&pool).unwrap();
        let names = applied(&pool).unwrap();
        let expected: Vec<&str> = all_migrations().iter().map(|m| m.name).collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn source_health_table_has_expected_columns() {
        let (_dir, pool) = test_pool();
        run_pending(&pool).unwrap();
        let conn = pool.get().unwrap();
        conn.execute_batch(
            "SELECT source_id, status, last_success, last_failure, fail_count, latency_ms, message
             FROM source_health LIMIT 0",
        )
        .unwrap();
    }

    #[test]
    fn every_migration_changes_the_schema() {
        let (_dir, pool) = test_pool();
        let conn: &rusqlite::Connection = &pool.get().unwrap();
        let objects = || -> i64 {
            conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| row.get(0))
                .unwrap()
        };
        for migration in all_migrations() {
            let before = objects();
            conn.execute_batch(migration.sql).unwrap();
            assert!(objects() > before, "{} is a no-op", migration.name);
        }
    }
}

//! SQLite-based store implementation

use chrono::{DateTime, Local};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tether_api::SharingConfig;
use tether_util::ProfileName;
use tracing::{debug, warn};

use crate::{AuditEvent, MAX_PROFILE_NAME_LEN, Profile, Store, StoreError, StoreResult};

/// SQLite-based store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection lock poisoned".into()))
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- Named sharing profiles
            CREATE TABLE IF NOT EXISTS profiles (
                name TEXT PRIMARY KEY NOT NULL,
                config_json TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            -- Audit log (append-only)
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                event_json TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }
}

fn check_name(name: &ProfileName) -> StoreResult<()> {
    if name.is_blank() {
        return Err(StoreError::InvalidName("name must not be empty".into()));
    }
    if name.as_str().len() > MAX_PROFILE_NAME_LEN {
        return Err(StoreError::InvalidName(format!(
            "name is longer than {} bytes",
            MAX_PROFILE_NAME_LEN
        )));
    }
    Ok(())
}

fn parse_timestamp(s: &str) -> DateTime<Local> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Local))
        .unwrap_or_else(|_| tether_util::now())
}

impl Store for SqliteStore {
    fn list_profiles(&self) -> StoreResult<Vec<ProfileName>> {
        let conn = self.conn()?;

        // BINARY collation: plain byte order, case-sensitive
        let mut stmt = conn.prepare("SELECT name FROM profiles ORDER BY name")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut names = Vec::new();
        for row in rows {
            names.push(ProfileName::new(row?));
        }
        Ok(names)
    }

    fn save_profile(&self, name: &ProfileName, config: &SharingConfig) -> StoreResult<Profile> {
        check_name(name)?;

        let conn = self.conn()?;
        let config_json = serde_json::to_string(config)?;
        let now = tether_util::now();

        let created_at: String = conn.query_row(
            r#"
            INSERT INTO profiles (name, config_json, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?3)
            ON CONFLICT(name)
            DO UPDATE SET config_json = excluded.config_json, updated_at = excluded.updated_at
            RETURNING created_at
            "#,
            params![name.as_str(), config_json, now.to_rfc3339()],
            |row| row.get(0),
        )?;

        debug!(profile = %name, mode = %config.mode, "Profile saved");

        Ok(Profile {
            name: name.clone(),
            config: config.clone(),
            created_at: parse_timestamp(&created_at),
            updated_at: now,
        })
    }

    fn get_profile(&self, name: &ProfileName) -> StoreResult<Profile> {
        let conn = self.conn()?;

        let row: Option<(String, String, String)> = conn
            .query_row(
                "SELECT config_json, created_at, updated_at FROM profiles WHERE name = ?",
                [name.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let (config_json, created_at, updated_at) =
            row.ok_or_else(|| StoreError::NotFound(name.to_string()))?;

        Ok(Profile {
            name: name.clone(),
            config: serde_json::from_str(&config_json)?,
            created_at: parse_timestamp(&created_at),
            updated_at: parse_timestamp(&updated_at),
        })
    }

    fn delete_profile(&self, name: &ProfileName) -> StoreResult<()> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM profiles WHERE name = ?", [name.as_str()])?;

        if deleted == 0 {
            return Err(StoreError::NotFound(name.to_string()));
        }

        debug!(profile = %name, "Profile deleted");
        Ok(())
    }

    fn append_audit(&self, mut event: AuditEvent) -> StoreResult<()> {
        let conn = self.conn()?;
        let event_json = serde_json::to_string(&event.event)?;

        conn.execute(
            "INSERT INTO audit_log (timestamp, event_json) VALUES (?, ?)",
            params![event.timestamp.to_rfc3339(), event_json],
        )?;

        event.id = conn.last_insert_rowid();
        debug!(event_id = event.id, "Audit event appended");

        Ok(())
    }

    fn recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT id, timestamp, event_json FROM audit_log ORDER BY id DESC LIMIT ?",
        )?;

        let rows = stmt.query_map([limit as i64], |row| {
            let id: i64 = row.get(0)?;
            let timestamp: String = row.get(1)?;
            let event_json: String = row.get(2)?;
            Ok((id, timestamp, event_json))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, timestamp, event_json) = row?;
            events.push(AuditEvent {
                id,
                timestamp: parse_timestamp(&timestamp),
                event: serde_json::from_str(&event_json)?,
            });
        }

        Ok(events)
    }

    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AuditEventType;
    use tether_api::SharingMode;

    fn hotspot() -> SharingConfig {
        SharingConfig::new(SharingMode::Hotspot, "eth0", "wlan0")
            .with_ssid("Cafe")
            .with_password("longenough")
            .with_channel(11)
    }

    #[test]
    fn test_in_memory_store() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.is_healthy());
        assert!(store.list_profiles().unwrap().is_empty());
    }

    #[test]
    fn save_then_get() {
        let store = SqliteStore::in_memory().unwrap();
        let name = ProfileName::new("home");

        store.save_profile(&name, &hotspot()).unwrap();
        let profile = store.get_profile(&name).unwrap();

        assert_eq!(profile.name, name);
        assert_eq!(profile.config, hotspot());
    }

    #[test]
    fn save_overwrites_silently() {
        let store = SqliteStore::in_memory().unwrap();
        let name = ProfileName::new("office");
        let first = store
            .save_profile(&name, &SharingConfig::new(SharingMode::Nat, "eth0", "eth1"))
            .unwrap();

        let replacement = SharingConfig::new(SharingMode::Bridge, "eth0", "eth2");
        let second = store.save_profile(&name, &replacement).unwrap();

        assert_eq!(store.get_profile(&name).unwrap().config, replacement);
        assert_eq!(store.list_profiles().unwrap().len(), 1);
        assert_eq!(
            second.created_at.timestamp(),
            first.created_at.timestamp()
        );
    }

    #[test]
    fn invalid_names_rejected() {
        let store = SqliteStore::in_memory().unwrap();

        for name in ["", "   "] {
            let err = store
                .save_profile(&ProfileName::new(name), &hotspot())
                .unwrap_err();
            assert!(matches!(err, StoreError::InvalidName(_)));
        }

        let long = "x".repeat(MAX_PROFILE_NAME_LEN + 1);
        assert!(matches!(
            store.save_profile(&ProfileName::new(long), &hotspot()),
            Err(StoreError::InvalidName(_))
        ));
        assert!(store.list_profiles().unwrap().is_empty());
    }

    #[test]
    fn list_is_byte_ordered() {
        let store = SqliteStore::in_memory().unwrap();
        for name in ["beta", "Zulu", "alpha", "Alpha"] {
            store.save_profile(&ProfileName::new(name), &hotspot()).unwrap();
        }

        let names: Vec<String> = store
            .list_profiles()
            .unwrap()
            .into_iter()
            .map(|n| n.to_string())
            .collect();
        assert_eq!(names, vec!["Alpha", "Zulu", "alpha", "beta"]);
    }

    #[test]
    fn get_missing_profile() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(matches!(
            store.get_profile(&ProfileName::new("nope")),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn delete_twice_is_not_found_both_times() {
        let store = SqliteStore::in_memory().unwrap();
        let name = ProfileName::new("travel");
        store.save_profile(&name, &hotspot()).unwrap();

        store.delete_profile(&name).unwrap();
        assert!(matches!(store.delete_profile(&name), Err(StoreError::NotFound(_))));
        assert!(matches!(store.delete_profile(&name), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn profiles_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("tether.db");
        let name = ProfileName::new("persisted");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.save_profile(&name, &hotspot()).unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.get_profile(&name).unwrap().config, hotspot());
    }

    #[test]
    fn test_audit_log() {
        let store = SqliteStore::in_memory().unwrap();

        store
            .append_audit(AuditEvent::new(AuditEventType::ServiceStarted))
            .unwrap();
        store
            .append_audit(AuditEvent::new(AuditEventType::ProfileDeleted {
                name: ProfileName::new("old"),
            }))
            .unwrap();

        let events = store.recent_audits(10).unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0].event, AuditEventType::ProfileDeleted { .. }));
        assert!(matches!(events[1].event, AuditEventType::ServiceStarted));

        assert_eq!(store.recent_audits(1).unwrap().len(), 1);
    }
}

//! SQLite persistence: settings and the origin allow-list.
//! Opens `vspeed.db` under the platform data directory.

use log::{debug, warn};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::Result;
use crate::settings::SettingsStore;
use crate::site::{normalize_origin, AllowList};

#[derive(Clone)]
pub struct Db(Arc<Mutex<Connection>>);

impl Db {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        debug!("db: {}", path.display());
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;").ok();
        let db = Db(Arc::new(Mutex::new(conn)));
        db.ensure_schema()?;
        Ok(db)
    }

    pub fn open_default() -> Result<Self> {
        Db::open(&default_db_path())
    }

    pub fn open_memory() -> Result<Self> {
        let db = Db(Arc::new(Mutex::new(Connection::open_in_memory()?)));
        db.ensure_schema()?;
        Ok(db)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock cannot leave SQLite half-written.
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn ensure_schema(&self) -> Result<()> {
        self.conn().execute_batch(
            "CREATE TABLE IF NOT EXISTS settings (
                name          TEXT PRIMARY KEY,
                value         REAL NOT NULL,
                updated_at    TEXT DEFAULT (datetime('now'))
            );
            CREATE TABLE IF NOT EXISTS origins (
                origin        TEXT PRIMARY KEY,
                created_at    TEXT DEFAULT (datetime('now'))
            );",
        )?;
        Ok(())
    }

    // ── Settings ─────────────────────────────────────────────────────────

    pub fn setting(&self, name: &str) -> Result<Option<f64>> {
        Ok(self
            .conn()
            .query_row("SELECT value FROM settings WHERE name = ?1", [name], |r| {
                r.get(0)
            })
            .optional()?)
    }

    /// Every stored setting, by name.
    pub fn settings(&self) -> Result<Vec<(String, f64)>> {
        let db = self.conn();
        let mut stmt = db.prepare("SELECT name, value FROM settings ORDER BY name")?;
        let rows = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ── Allow-list ───────────────────────────────────────────────────────

    /// Returns true if the origin was not already opted in.
    pub fn origin_allow(&self, origin: &str) -> Result<bool> {
        let n = self.conn().execute(
            "INSERT OR IGNORE INTO origins (origin) VALUES (?1)",
            [normalize_origin(origin)],
        )?;
        Ok(n > 0)
    }

    pub fn origin_deny(&self, origin: &str) -> Result<bool> {
        let n = self.conn().execute(
            "DELETE FROM origins WHERE origin = ?1",
            [normalize_origin(origin)],
        )?;
        Ok(n > 0)
    }

    pub fn origins(&self) -> Result<Vec<String>> {
        let db = self.conn();
        let mut stmt = db.prepare("SELECT origin FROM origins ORDER BY origin")?;
        let rows = stmt
            .query_map([], |r| r.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(rows)
    }

    pub fn allow_list(&self) -> Result<AllowList> {
        Ok(AllowList::new(self.origins()?))
    }
}

impl SettingsStore for Db {
    fn get_setting(&self, name: &str, default: f64) -> f64 {
        match self.setting(name) {
            Ok(Some(v)) => v,
            Ok(None) => default,
            Err(e) => {
                warn!("db: reading {}: {}", name, e);
                default
            }
        }
    }

    fn set_setting(&mut self, name: &str, value: f64) -> Result<()> {
        self.conn().execute(
            "INSERT INTO settings (name, value) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET value = excluded.value,
                                             updated_at = datetime('now')",
            params![name, value],
        )?;
        Ok(())
    }

    fn clear_settings(&mut self) -> Result<()> {
        self.conn().execute("DELETE FROM settings", [])?;
        Ok(())
    }
}

pub fn default_db_path() -> PathBuf {
    if let Some(dirs) = directories::ProjectDirs::from("dev", "vspeed", "vspeed") {
        dirs.data_dir().join("vspeed.db")
    } else {
        PathBuf::from("vspeed.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{SettingKey, Settings};

    #[test]
    fn empty_db() {
        let db = Db::open_memory().unwrap();
        assert!(db.settings().unwrap().is_empty());
        assert!(db.origins().unwrap().is_empty());
        assert_eq!(db.get_setting("targetRate", 2.5), 2.5);
    }

    #[test]
    fn settings_round_trip_through_sqlite() {
        let mut db = Db::open_memory().unwrap();
        let mut s = Settings::default();
        s.update(&mut db, SettingKey::TargetRate, 4.0).unwrap();
        s.update(&mut db, SettingKey::TargetRate, 3.5).unwrap();
        assert_eq!(db.settings().unwrap(), vec![("targetRate".to_string(), 3.5)]);
        assert_eq!(Settings::load(&db).target_rate, 3.5);

        db.clear_settings().unwrap();
        assert_eq!(Settings::load(&db), Settings::default());
    }

    #[test]
    fn origins_are_normalized() {
        let db = Db::open_memory().unwrap();
        assert!(db.origin_allow("https://Vimeo.com/123").unwrap());
        assert!(!db.origin_allow("https://vimeo.com").unwrap());
        assert_eq!(db.origins().unwrap(), vec!["https://vimeo.com".to_string()]);
        assert!(db.allow_list().unwrap().is_enabled_for_origin("https://vimeo.com/9"));
        assert!(db.origin_deny("https://vimeo.com/").unwrap());
        assert!(!db.origin_deny("https://vimeo.com").unwrap());
    }

    #[test]
    fn file_db_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("vspeed.db");
        {
            let mut db = Db::open(&path).unwrap();
            db.set_setting("seekStep", 10.0).unwrap();
            db.origin_allow("https://example.org").unwrap();
        }
        let db = Db::open(&path).unwrap();
        assert_eq!(db.get_setting("seekStep", 5.0), 10.0);
        assert_eq!(db.origins().unwrap(), vec!["https://example.org".to_string()]);
    }
}

//! CLI subcommand implementations. Each returns the process exit code.

use std::path::Path;

use log::error;

use vspeed::db::Db;
use vspeed::scenario::Scenario;
use vspeed::settings::{SettingKey, Settings, SettingsStore};
use vspeed::site::AllowList;
use vspeed::toast::ToastQueue;

pub fn get(db: &Db, name: Option<&str>) -> i32 {
    let settings = Settings::load(db);
    let keys = match name {
        Some(n) => match SettingKey::from_name(n) {
            Ok(k) => vec![k],
            Err(e) => {
                eprintln!("vspeed get: {}", e);
                return 2;
            }
        },
        None => SettingKey::ALL.to_vec(),
    };
    for key in keys {
        let (min, max) = key.range();
        let value = settings.get(key);
        let marker = if value == key.default_value() { "" } else { "  *" };
        println!(
            "{:<16} {:>8}   ({}..{}){}",
            key.name(),
            value,
            min,
            max,
            marker
        );
    }
    0
}

pub fn set(db: &mut Db, name: &str, value: &str) -> i32 {
    let key = match SettingKey::from_name(name) {
        Ok(k) => k,
        Err(e) => {
            eprintln!("vspeed set: {}", e);
            return 2;
        }
    };
    let mut settings = Settings::load(&*db);
    let mut toasts = ToastQueue::default();
    let result = settings.parse_and_update(db, &mut toasts, key, value);
    if let Some(msg) = toasts.last() {
        println!("{}", msg);
    }
    match result {
        Ok(_) => 0,
        Err(e) => {
            error!("vspeed set: {}", e);
            1
        }
    }
}

pub fn reset(db: &mut Db) -> i32 {
    match db.clear_settings() {
        Ok(()) => {
            println!("Settings restored to defaults");
            0
        }
        Err(e) => {
            eprintln!("vspeed reset: {}", e);
            1
        }
    }
}

pub fn allow(db: &Db, origin: &str) -> i32 {
    if AllowList::is_builtin(origin) {
        println!("{} is always enabled", origin);
        return 0;
    }
    match db.origin_allow(origin) {
        Ok(true) => println!("Enabled on {}", origin),
        Ok(false) => println!("{} was already enabled", origin),
        Err(e) => {
            eprintln!("vspeed allow: {}", e);
            return 1;
        }
    }
    0
}

pub fn deny(db: &Db, origin: &str) -> i32 {
    if AllowList::is_builtin(origin) {
        eprintln!("vspeed deny: {} is built in and cannot be disabled", origin);
        return 2;
    }
    match db.origin_deny(origin) {
        Ok(true) => println!("Disabled on {}", origin),
        Ok(false) => println!("{} was not enabled", origin),
        Err(e) => {
            eprintln!("vspeed deny: {}", e);
            return 1;
        }
    }
    0
}

pub fn sites(db: &Db) -> i32 {
    let origins = match db.origins() {
        Ok(o) => o,
        Err(e) => {
            eprintln!("vspeed sites: {}", e);
            return 1;
        }
    };
    println!("built in: *.youtube.com, *.bilibili.com, local files");
    if origins.is_empty() {
        println!("no other sites. Use `vspeed allow ORIGIN` to add one.");
    }
    for o in &origins {
        println!("  {}", o);
    }
    0
}

pub fn replay(file: &Path) -> i32 {
    let replay = match Scenario::load(file).and_then(Scenario::run) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("vspeed replay: {}: {}", file.display(), e);
            return 1;
        }
    };
    for line in &replay.trace {
        println!("{}", line);
    }
    println!(
        "final: active={} target={}",
        replay.active_name().unwrap_or("-"),
        vspeed::toast::rate_label(replay.controller.target_rate())
    );
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_persists_valid_values_only() {
        let mut db = Db::open_memory().unwrap();
        assert_eq!(set(&mut db, "targetRate", "3"), 0);
        assert_eq!(db.setting("targetRate").unwrap(), Some(3.0));

        assert_eq!(set(&mut db, "targetRate", "40"), 1);
        assert_eq!(set(&mut db, "targetRate", "fast"), 1);
        assert_eq!(db.setting("targetRate").unwrap(), Some(3.0));

        assert_eq!(set(&mut db, "warpFactor", "9"), 2);
    }

    #[test]
    fn reset_forgets_everything() {
        let mut db = Db::open_memory().unwrap();
        set(&mut db, "seekStep", "10");
        assert_eq!(reset(&mut db), 0);
        assert!(db.settings().unwrap().is_empty());
        assert_eq!(get(&db, Some("seekStep")), 0);
        assert_eq!(get(&db, Some("nope")), 2);
    }

    #[test]
    fn allow_and_deny_round_trip() {
        let db = Db::open_memory().unwrap();
        assert_eq!(allow(&db, "https://vimeo.com/123"), 0);
        assert_eq!(db.origins().unwrap(), vec!["https://vimeo.com"]);
        assert_eq!(deny(&db, "https://vimeo.com"), 0);
        assert!(db.origins().unwrap().is_empty());

        assert_eq!(allow(&db, "https://www.youtube.com"), 0);
        assert!(db.origins().unwrap().is_empty());
        assert_eq!(deny(&db, "https://www.youtube.com"), 2);
        assert_eq!(sites(&db), 0);
    }

    #[test]
    fn replay_reports_bad_files() {
        assert_eq!(replay(Path::new("/nonexistent/scenario.json")), 1);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.json");
        std::fs::write(&path, r#"{"url": "https://www.youtube.com/watch", "page": [], "steps": []}"#)
            .unwrap();
        assert_eq!(replay(&path), 0);
    }
}

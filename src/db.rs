use crate::model::{Absence, ScheduleData};
use rusqlite::{Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

pub const SCHEDULES_KEY: &str = "schedules";
pub const ABSENCES_KEY: &str = "absences";
pub const APPROVED_SCHOOL_NAME_KEY: &str = "approvedSchoolName";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("timetabled.sqlite3");
    let conn = Connection::open(db_path)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS kv(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;

    // Early workspaces created kv without updated_at.
    ensure_kv_updated_at(&conn)?;

    Ok(conn)
}

pub fn kv_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row("SELECT value_json FROM kv WHERE key = ?", [key], |r| r.get(0))
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn kv_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO kv(key, value_json, updated_at) VALUES(?, ?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json, updated_at = excluded.updated_at",
        (key, serde_json::to_string(value)?, now),
    )?;
    Ok(())
}

fn load_slot<T: DeserializeOwned + Default>(conn: &Connection, key: &str) -> anyhow::Result<T> {
    match kv_get_json(conn, key)? {
        Some(v) => Ok(serde_json::from_value(v)?),
        None => Ok(T::default()),
    }
}

fn save_slot<T: Serialize>(conn: &Connection, key: &str, value: &T) -> anyhow::Result<()> {
    kv_set_json(conn, key, &serde_json::to_value(value)?)
}

pub fn load_schedules(conn: &Connection) -> anyhow::Result<Vec<ScheduleData>> {
    load_slot(conn, SCHEDULES_KEY)
}

pub fn save_schedules(conn: &Connection, schedules: &[ScheduleData]) -> anyhow::Result<()> {
    save_slot(conn, SCHEDULES_KEY, &schedules)
}

pub fn load_absences(conn: &Connection) -> anyhow::Result<Vec<Absence>> {
    load_slot(conn, ABSENCES_KEY)
}

pub fn save_absences(conn: &Connection, absences: &[Absence]) -> anyhow::Result<()> {
    save_slot(conn, ABSENCES_KEY, &absences)
}

pub fn approved_school_name(conn: &Connection) -> anyhow::Result<Option<String>> {
    load_slot(conn, APPROVED_SCHOOL_NAME_KEY)
}

pub fn set_approved_school_name(conn: &Connection, name: &str) -> anyhow::Result<()> {
    save_slot(conn, APPROVED_SCHOOL_NAME_KEY, &name)
}

fn ensure_kv_updated_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "kv", "updated_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE kv ADD COLUMN updated_at TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_default_to_empty_and_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let conn = open_db(dir.path()).expect("open");
        assert!(load_schedules(&conn).expect("load").is_empty());
        assert!(load_absences(&conn).expect("load").is_empty());
        assert_eq!(approved_school_name(&conn).expect("load"), None);

        set_approved_school_name(&conn, "مدرسة النور").expect("save");
        set_approved_school_name(&conn, "مدرسة الفجر").expect("save");
        assert_eq!(
            approved_school_name(&conn).expect("load").as_deref(),
            Some("مدرسة الفجر")
        );
    }

    #[test]
    fn reopening_keeps_values_and_adds_missing_column() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let conn = Connection::open(dir.path().join("timetabled.sqlite3")).expect("open");
            conn.execute(
                "CREATE TABLE kv(key TEXT PRIMARY KEY, value_json TEXT NOT NULL)",
                [],
            )
            .expect("create");
            conn.execute(
                "INSERT INTO kv(key, value_json) VALUES('setup.timetable', '{\"periodsPerDay\":7}')",
                [],
            )
            .expect("insert");
        }
        let conn = open_db(dir.path()).expect("open");
        assert!(table_has_column(&conn, "kv", "updated_at").expect("pragma"));
        let v = kv_get_json(&conn, "setup.timetable").expect("get").expect("some");
        assert_eq!(v["periodsPerDay"], 7);
    }
}

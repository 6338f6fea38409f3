#![allow(dead_code)]

use changelog_core::db::schema::add_change_column;
use changelog_core::{
    open_db_in_memory, ChangeId, ChangeRepository, ChangeStatus, ConnectionRegistry, Enrollment,
    RecordStore, SqliteChangeRepository, TrackedRecord, DEFAULT_CHANGE_ID_COLUMN,
};
use rusqlite::types::Value;
use rusqlite::Connection;

/// Enforcing record on `widgets.change_id`.
#[derive(Debug, Clone)]
pub struct Widget {
    pub id: Option<i64>,
    pub name: String,
    pub change_id: Option<ChangeId>,
    dirty: bool,
}

impl Widget {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            change_id: None,
            dirty: true,
        }
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.dirty = true;
    }
}

impl TrackedRecord for Widget {
    const TABLE: &'static str = "widgets";

    fn row_id(&self) -> Option<i64> {
        self.id
    }

    fn set_row_id(&mut self, row_id: i64) {
        self.id = Some(row_id);
    }

    fn column_values(&self) -> Vec<(&'static str, Value)> {
        vec![("name", Value::Text(self.name.clone()))]
    }

    fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn mark_clean(&mut self) {
        self.dirty = false;
    }

    fn change_id(&self) -> Option<ChangeId> {
        self.change_id
    }

    fn set_change_id(&mut self, change_id: Option<ChangeId>) {
        self.change_id = change_id;
    }
}

/// Non-enforcing record stamped on `gadgets.revision_id`.
#[derive(Debug, Clone)]
pub struct Gadget {
    pub id: Option<i64>,
    pub label: String,
    pub revision_id: Option<ChangeId>,
    dirty: bool,
}

impl Gadget {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            id: None,
            label: label.into(),
            revision_id: None,
            dirty: true,
        }
    }
}

impl TrackedRecord for Gadget {
    const TABLE: &'static str = "gadgets";

    fn enrollment() -> Option<Enrollment> {
        Some(Enrollment::optional().with_column("revision_id"))
    }

    fn row_id(&self) -> Option<i64> {
        self.id
    }

    fn set_row_id(&mut self, row_id: i64) {
        self.id = Some(row_id);
    }

    fn column_values(&self) -> Vec<(&'static str, Value)> {
        vec![("label", Value::Text(self.label.clone()))]
    }

    fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn mark_clean(&mut self) {
        self.dirty = false;
    }

    fn change_id(&self) -> Option<ChangeId> {
        self.revision_id
    }

    fn set_change_id(&mut self, change_id: Option<ChangeId>) {
        self.revision_id = change_id;
    }
}

/// Record whose table has no change column; never enrolled.
#[derive(Debug, Clone)]
pub struct PlainNote {
    pub id: Option<i64>,
    pub body: String,
    dirty: bool,
}

impl PlainNote {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            id: None,
            body: body.into(),
            dirty: true,
        }
    }
}

impl TrackedRecord for PlainNote {
    const TABLE: &'static str = "plain_notes";

    fn row_id(&self) -> Option<i64> {
        self.id
    }

    fn set_row_id(&mut self, row_id: i64) {
        self.id = Some(row_id);
    }

    fn column_values(&self) -> Vec<(&'static str, Value)> {
        vec![("body", Value::Text(self.body.clone()))]
    }

    fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn mark_clean(&mut self) {
        self.dirty = false;
    }

    fn change_id(&self) -> Option<ChangeId> {
        None
    }

    fn set_change_id(&mut self, _change_id: Option<ChangeId>) {}
}

/// In-memory registry with `widgets`, `gadgets` and `plain_notes` tables.
pub fn setup_registry() -> ConnectionRegistry {
    let conn = open_db_in_memory().unwrap();
    create_entity_tables(&conn);
    ConnectionRegistry::new(conn)
}

pub fn create_entity_tables(conn: &Connection) {
    conn.execute_batch(
        "CREATE TABLE widgets (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
         CREATE TABLE gadgets (id INTEGER PRIMARY KEY, label TEXT NOT NULL);
         CREATE TABLE plain_notes (id INTEGER PRIMARY KEY, body TEXT NOT NULL);",
    )
    .unwrap();
    add_change_column(conn, "widgets", DEFAULT_CHANGE_ID_COLUMN).unwrap();
    add_change_column(conn, "gadgets", "revision_id").unwrap();
}

/// Store with `Widget` and `Gadget` enrolled.
pub fn enrolled_store(conn: &Connection) -> RecordStore<'_> {
    let mut store = RecordStore::new(conn);
    store.enroll::<Widget>().unwrap();
    store.enroll::<Gadget>().unwrap();
    store
}

pub fn count_rows(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| {
        row.get(0)
    })
    .unwrap()
}

pub fn status_of(conn: &Connection, change_id: ChangeId) -> ChangeStatus {
    SqliteChangeRepository::new(conn)
        .get_change(change_id)
        .unwrap()
        .unwrap()
        .status
}

pub fn stored_widget_change_id(conn: &Connection, widget_id: i64) -> Option<ChangeId> {
    conn.query_row(
        "SELECT change_id FROM widgets WHERE id = ?1;",
        [widget_id],
        |row| row.get(0),
    )
    .unwrap()
}

use std::path::{Path, PathBuf};

use log::debug;
use rusqlite::{Connection, OptionalExtension, Statement, Transaction, params};

use crate::artifacts::{ArtifactKind, Assignment, Snapshot, SnapshotMeta};

use super::{SnapshotReader, StoreError};

const NAMED_COLUMNS: &[&str] = &["id TEXT NOT NULL", "display_name TEXT NOT NULL"];
const MEMBERSHIP_COLUMNS: &[&str] = &["parent_id TEXT NOT NULL", "child_id TEXT NOT NULL"];
const ASSIGNMENT_COLUMNS: &[&str] = &[
    "artifact_id TEXT NOT NULL",
    "group_id TEXT NOT NULL",
    "intent TEXT",
];
const META_COLUMNS: &[&str] = &[
    "refreshed_at INTEGER NOT NULL",
    "group_prefix TEXT NOT NULL",
    "extended INTEGER NOT NULL",
];

/// Shape of one snapshot table
struct TableDef {
    name: &'static str,
    columns: &'static [&'static str],
    indexes: &'static [&'static str],
}

impl TableDef {
    fn create_sql(&self) -> String {
        let mut sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({});",
            self.name,
            self.columns.join(", ")
        );
        for column in self.indexes {
            sql.push_str(&format!(
                "CREATE INDEX IF NOT EXISTS idx_{name}_{column} ON {name} ({column});",
                name = self.name
            ));
        }
        sql
    }

    fn insert_sql(&self) -> String {
        let placeholders = vec!["?"; self.columns.len()].join(", ");
        format!("INSERT INTO {} VALUES ({placeholders})", self.name)
    }
}

const GROUPS: TableDef = TableDef {
    name: "directory_groups",
    columns: NAMED_COLUMNS,
    indexes: &["id", "display_name"],
};

const MEMBERSHIPS: TableDef = TableDef {
    name: "memberships",
    columns: MEMBERSHIP_COLUMNS,
    indexes: &["parent_id", "child_id"],
};

const META: TableDef = TableDef {
    name: "snapshot_meta",
    columns: META_COLUMNS,
    indexes: &[],
};

fn artifact_table(kind: ArtifactKind) -> TableDef {
    TableDef {
        name: kind.table(),
        columns: NAMED_COLUMNS,
        indexes: &["id"],
    }
}

fn assignment_table(kind: ArtifactKind) -> TableDef {
    TableDef {
        name: kind.assignment_table(),
        columns: ASSIGNMENT_COLUMNS,
        indexes: &["group_id"],
    }
}

/// Drop, recreate and fill a single table inside an open transaction
fn replace_table<T, F>(
    tx: &Transaction<'_>,
    def: &TableDef,
    rows: &[T],
    mut insert: F,
) -> rusqlite::Result<()>
where
    F: FnMut(&mut Statement<'_>, &T) -> rusqlite::Result<usize>,
{
    tx.execute_batch(&format!("DROP TABLE IF EXISTS {};", def.name))?;
    tx.execute_batch(&def.create_sql())?;
    let mut stmt = tx.prepare(&def.insert_sql())?;
    for row in rows {
        insert(&mut stmt, row)?;
    }
    debug!("Replaced table {} with {} rows", def.name, rows.len());
    Ok(())
}

/// SQLite-backed snapshot store.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open (or create) a store at the given path.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` if the parent directory cannot be created, or
    /// `StoreError::Sqlite` if the database cannot be opened or initialized.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        debug!("Opening snapshot store at {}", path.display());
        let store = Self {
            conn: Connection::open(path)?,
            path: Some(path.to_path_buf()),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Sqlite` if the schema cannot be created.
    pub fn in_memory() -> Result<Self, StoreError> {
        let store = Self {
            conn: Connection::open_in_memory()?,
            path: None,
        };
        store.initialize()?;
        Ok(store)
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Make sure every table exists so lookups against a kind that was never
    /// fetched return nothing instead of failing.
    fn initialize(&self) -> Result<(), StoreError> {
        self.conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        let mut sql = String::new();
        for def in Self::all_tables() {
            sql.push_str(&def.create_sql());
        }
        self.conn.execute_batch(&sql)?;
        Ok(())
    }

    fn all_tables() -> Vec<TableDef> {
        let mut tables = vec![GROUPS, MEMBERSHIPS, META];
        for kind in ArtifactKind::ALL {
            tables.push(artifact_table(kind));
            tables.push(assignment_table(kind));
        }
        tables
    }

    /// Metadata of the stored snapshot, or `None` if no refresh ever completed.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Sqlite` if the metadata table cannot be read.
    pub fn meta(&self) -> Result<Option<SnapshotMeta>, StoreError> {
        let meta = self
            .conn
            .query_row(
                "SELECT refreshed_at, group_prefix, extended FROM snapshot_meta LIMIT 1",
                [],
                |row| {
                    let refreshed_at: i64 = row.get(0)?;
                    Ok(SnapshotMeta {
                        refreshed_at: u64::try_from(refreshed_at).unwrap_or_default(),
                        group_prefix: row.get(1)?,
                        extended: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(meta)
    }

    /// Replace the whole snapshot. Every table is dropped, recreated and
    /// repopulated inside one transaction, so a failure leaves the previous
    /// snapshot untouched.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Sqlite` if any statement fails; the transaction is
    /// rolled back in that case.
    pub fn replace_snapshot(
        &mut self,
        snapshot: &Snapshot,
        meta: &SnapshotMeta,
    ) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;

        replace_table(&tx, &GROUPS, &snapshot.groups, |stmt, g| {
            stmt.execute(params![g.id, g.display_name])
        })?;
        replace_table(&tx, &MEMBERSHIPS, &snapshot.memberships, |stmt, m| {
            stmt.execute(params![m.parent_id, m.child_id])
        })?;
        for kind in ArtifactKind::ALL {
            replace_table(
                &tx,
                &artifact_table(kind),
                snapshot.artifacts_of(kind),
                |stmt, a| stmt.execute(params![a.id, a.display_name]),
            )?;
            replace_table(
                &tx,
                &assignment_table(kind),
                snapshot.assignments_of(kind),
                |stmt, a| stmt.execute(params![a.artifact_id, a.group_id, a.intent]),
            )?;
        }
        let refreshed_at = i64::try_from(meta.refreshed_at).unwrap_or(i64::MAX);
        replace_table(&tx, &META, std::slice::from_ref(meta), |stmt, m| {
            stmt.execute(params![refreshed_at, m.group_prefix, m.extended])
        })?;

        tx.commit()?;
        Ok(())
    }

    /// Display name of the row with the given ID
    fn lookup_by_id(&self, table: &str, id: &str) -> Result<Option<String>, StoreError> {
        let name = self
            .conn
            .query_row(
                &format!("SELECT display_name FROM {table} WHERE id = ?1 LIMIT 1"),
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(name)
    }

    /// ID of the row with the given display name, lowest ID first
    fn lookup_id_by_name(&self, table: &str, name: &str) -> Result<Option<String>, StoreError> {
        let id = self
            .conn
            .query_row(
                &format!("SELECT id FROM {table} WHERE display_name = ?1 ORDER BY id LIMIT 1"),
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Values of `column` for every row whose `key_column` equals `value`
    fn find(
        &self,
        table: &str,
        column: &str,
        key_column: &str,
        value: &str,
    ) -> Result<Vec<String>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {column} FROM {table} WHERE {key_column} = ?1 ORDER BY {column}"
        ))?;
        let rows = stmt
            .query_map(params![value], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(rows)
    }
}

impl SnapshotReader for SqliteStore {
    fn group_id_by_name(&self, name: &str) -> Result<Option<String>, StoreError> {
        self.lookup_id_by_name(GROUPS.name, name)
    }

    fn group_name(&self, group_id: &str) -> Result<Option<String>, StoreError> {
        self.lookup_by_id(GROUPS.name, group_id)
    }

    fn parents_of(&self, child_id: &str) -> Result<Vec<String>, StoreError> {
        self.find(MEMBERSHIPS.name, "parent_id", "child_id", child_id)
    }

    fn children_of(&self, parent_id: &str) -> Result<Vec<String>, StoreError> {
        self.find(MEMBERSHIPS.name, "child_id", "parent_id", parent_id)
    }

    fn artifact_name(
        &self,
        kind: ArtifactKind,
        artifact_id: &str,
    ) -> Result<Option<String>, StoreError> {
        self.lookup_by_id(kind.table(), artifact_id)
    }

    fn assignments_to(
        &self,
        kind: ArtifactKind,
        group_id: &str,
    ) -> Result<Vec<Assignment>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT artifact_id, group_id, intent FROM {} WHERE group_id = ?1 ORDER BY rowid",
            kind.assignment_table()
        ))?;
        let rows = stmt
            .query_map(params![group_id], |row| {
                Ok(Assignment {
                    artifact_id: row.get(0)?,
                    group_id: row.get(1)?,
                    intent: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<Assignment>, _>>()?;
        Ok(rows)
    }
}

//! External-identifier resolution
//!
//! Test data is addressed by fully-qualified identifiers of the form
//! `module.name`, mapped to concrete row ids through the `model_data` table
//! inside the current transaction.

use folio_common::{Cursor, Error, Result};
use rusqlite::types::ValueRef;
use serde_json::{Map, Value};
use tracing::debug;

/// A hydrated record: the model it belongs to, its row id, and its fields as
/// JSON values.
#[derive(Debug, Clone)]
pub struct ModelRecord {
    pub model: String,
    pub id: i64,
    pub fields: Map<String, Value>,
}

/// Resolver bound to one scope's cursor. Pure lookup, no side effects.
pub struct RefResolver<'a> {
    cursor: &'a Cursor,
}

impl<'a> RefResolver<'a> {
    pub fn new(cursor: &'a Cursor) -> Self {
        Self { cursor }
    }

    /// Resolve a fully-qualified identifier to its row id
    pub fn resolve(&self, xid: &str) -> Result<i64> {
        let (module, name) = split_xid(xid)?;
        let id: Option<i64> = self.cursor.query_row(
            "SELECT res_id FROM model_data WHERE module = ?1 AND name = ?2",
            [module, name],
            |row| row.get(0),
        )?;
        id.ok_or_else(|| Error::NotFound {
            module: module.to_string(),
            name: name.to_string(),
        })
    }

    /// Resolve a fully-qualified identifier to a hydrated record
    pub fn resolve_record(&self, xid: &str) -> Result<ModelRecord> {
        let (module, name) = split_xid(xid)?;
        let mapping: Option<(String, i64)> = self.cursor.query_row(
            "SELECT model, res_id FROM model_data WHERE module = ?1 AND name = ?2",
            [module, name],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let (model, res_id) = mapping.ok_or_else(|| Error::NotFound {
            module: module.to_string(),
            name: name.to_string(),
        })?;

        let table = table_for_model(&model);
        let fields = self.cursor.with(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT * FROM {} WHERE id = ?1", table))?;
            let columns: Vec<String> =
                stmt.column_names().iter().map(|c| c.to_string()).collect();
            let row = stmt
                .query_row([res_id], |row| {
                    let mut fields = Map::new();
                    for (i, column) in columns.iter().enumerate() {
                        fields.insert(column.clone(), json_value(row.get_ref(i)?));
                    }
                    Ok(fields)
                })
                .map_err(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Error::NotFound {
                        module: module.to_string(),
                        name: name.to_string(),
                    },
                    other => other.into(),
                })?;
            Ok(row)
        })?;

        debug!(%model, res_id, "resolved {xid}");
        Ok(ModelRecord {
            model,
            id: res_id,
            fields,
        })
    }
}

/// Register an identifier mapping inside the current transaction.
///
/// Fixture counterpart of the resolver: module loaders use this when seeding
/// demo data a test later addresses by `module.name`.
pub fn bind_reference(
    cursor: &Cursor,
    module: &str,
    name: &str,
    model: &str,
    res_id: i64,
) -> Result<()> {
    cursor.execute(
        "INSERT INTO model_data (module, name, model, res_id) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![module, name, model, res_id],
    )?;
    Ok(())
}

fn split_xid(xid: &str) -> Result<(&str, &str)> {
    match xid.split_once('.') {
        Some((module, name)) if !module.is_empty() && !name.is_empty() => Ok((module, name)),
        _ => Err(Error::InvalidReference(xid.to_string())),
    }
}

/// Model names use dots, their backing tables underscores
fn table_for_model(model: &str) -> String {
    model.replace('.', "_")
}

fn json_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(hex::encode(b)),
    }
}

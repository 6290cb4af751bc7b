//! Schema-match engine (spec component C7): a pure comparison of two
//! [`Database`] values. `check_schema_match` either succeeds or fails with
//! a [`Error::SchemaMismatch`] whose message is part of the public
//! contract — exact wording matters, since it is what a user sees when a
//! sync refuses to start.
//!
//! Column comparison only checks name equality; this is deliberately
//! lenient, preserving the source's current behavior (Open Question §9a)
//! rather than guessing at which of name/nullable/kind/default a tightened
//! mismatch message should report.

use kitchensync_core::error::{Error, Result};

use crate::model::{Database, Key, Table};

/// Tables/columns a sync should ignore entirely, applied before both
/// sides are compared (spec.md §4.7).
#[derive(Debug, Clone, Default)]
pub struct TableFilter {
    pub ignore_tables: Vec<String>,
    pub only_tables: Vec<String>,
}

impl TableFilter {
    fn keep(&self, table_name: &str) -> bool {
        if !self.only_tables.is_empty() && !self.only_tables.iter().any(|t| t == table_name) {
            return false;
        }
        !self.ignore_tables.iter().any(|t| t == table_name)
    }
}

/// Compare `from_database` against `to_database`, the `to` side's own
/// schema. Fails fast on the first mismatch found, in table order.
pub fn check_schema_match(from_database: &Database, to_database: &Database) -> Result<()> {
    check_schema_match_filtered(from_database, to_database, &TableFilter::default())
}

pub fn check_schema_match_filtered(
    from_database: &Database,
    to_database: &Database,
    filter: &TableFilter,
) -> Result<()> {
    let mut from_tables: Vec<&Table> = from_database.tables.iter().filter(|t| filter.keep(&t.name)).collect();
    from_tables.sort_by(|a, b| a.name.cmp(&b.name));
    let mut to_tables: Vec<&Table> = to_database.tables.iter().filter(|t| filter.keep(&t.name)).collect();
    to_tables.sort_by(|a, b| a.name.cmp(&b.name));

    let mut from_iter = from_tables.into_iter().peekable();
    let mut to_iter = to_tables.into_iter().peekable();

    loop {
        match (from_iter.peek(), to_iter.peek()) {
            (Some(from_table), Some(to_table)) => {
                if to_table.name > from_table.name {
                    return Err(Error::schema_mismatch(format!("Missing table {}", from_table.name)));
                } else if to_table.name < from_table.name {
                    return Err(Error::schema_mismatch(format!("Extra table {}", to_table.name)));
                }
                check_table_match(from_table, to_table)?;
                from_iter.next();
                to_iter.next();
            }
            (Some(from_table), None) => {
                return Err(Error::schema_mismatch(format!("Missing table {}", from_table.name)));
            }
            (None, Some(to_table)) => {
                return Err(Error::schema_mismatch(format!("Extra table {}", to_table.name)));
            }
            (None, None) => return Ok(()),
        }
    }
}

fn check_table_match(from_table: &Table, to_table: &Table) -> Result<()> {
    check_columns_match(from_table, to_table)?;
    check_primary_key_match(from_table, to_table)?;
    check_keys_match(from_table, to_table)?;
    Ok(())
}

/// Column order matters: two cursors, the `from` side always advancing.
/// See spec.md §4.7 for the exact case analysis this implements.
fn check_columns_match(from_table: &Table, to_table: &Table) -> Result<()> {
    let from_cols = &from_table.columns;
    let to_cols = &to_table.columns;
    let mut fi = 0_usize;
    let mut ti = 0_usize;

    while fi < from_cols.len() {
        let from_col = &from_cols[fi];
        if ti < to_cols.len() && to_cols[ti].name == from_col.name {
            check_column_match(&from_table.name, from_col, &to_cols[ti])?;
            fi += 1;
            ti += 1;
            continue;
        }

        let from_name_seen_later_in_to = to_cols[ti..].iter().any(|c| c.name == from_col.name);
        if !from_name_seen_later_in_to {
            return Err(Error::schema_mismatch(format!(
                "Missing column {} on table {}",
                from_col.name, from_table.name
            )));
        }

        if ti < to_cols.len() {
            let to_name_seen_later_in_from = from_cols[fi..].iter().any(|c| c.name == to_cols[ti].name);
            if !to_name_seen_later_in_from {
                return Err(Error::schema_mismatch(format!(
                    "Extra column {} on table {}",
                    to_cols[ti].name, from_table.name
                )));
            }
        }

        return Err(Error::schema_mismatch(format!(
            "Misordered column {} on table {}, should have {} first",
            from_col.name, from_table.name, to_cols[ti].name
        )));
    }

    if ti < to_cols.len() {
        return Err(Error::schema_mismatch(format!(
            "Extra column {} on table {}",
            to_cols[ti].name, from_table.name
        )));
    }

    Ok(())
}

/// Column match currently checks name equality only. `Table`'s derived
/// equality compares every other attribute too, but no dedicated mismatch
/// message exists yet for type/nullable/default differences — see
/// spec.md §9, Open Question (a). Preserved as-is rather than guessed at.
fn check_column_match(
    _table_name: &str,
    _from_col: &crate::model::Column,
    _to_col: &crate::model::Column,
) -> Result<()> {
    Ok(())
}

fn check_primary_key_match(from_table: &Table, to_table: &Table) -> Result<()> {
    if from_table.primary_key_columns != to_table.primary_key_columns {
        let from_names = column_names(from_table, &from_table.primary_key_columns);
        let to_names = column_names(to_table, &to_table.primary_key_columns);
        return Err(Error::schema_mismatch(format!(
            "Primary key mismatch on table {}: {} vs {}",
            from_table.name,
            from_names.join(", "),
            to_names.join(", ")
        )));
    }
    Ok(())
}

fn column_names(table: &Table, indices: &[usize]) -> Vec<String> {
    indices.iter().filter_map(|&i| table.columns.get(i)).map(|c| c.name.clone()).collect()
}

fn check_keys_match(from_table: &Table, to_table: &Table) -> Result<()> {
    let from_keys = from_table.keys_sorted();
    let to_keys = to_table.keys_sorted();

    let mut fi = 0_usize;
    let mut ti = 0_usize;
    while fi < from_keys.len() || ti < to_keys.len() {
        match (from_keys.get(fi), to_keys.get(ti)) {
            (Some(fk), Some(tk)) => {
                if fk.kind == tk.kind && fk.name == tk.name {
                    check_key_match(&from_table.name, fk, tk)?;
                    fi += 1;
                    ti += 1;
                } else if (tk.kind, tk.name.as_str()) < (fk.kind, fk.name.as_str()) {
                    return Err(Error::schema_mismatch(format!(
                        "Extra key {} on table {}",
                        tk.name, from_table.name
                    )));
                } else {
                    return Err(Error::schema_mismatch(format!(
                        "Missing key {} on table {}",
                        fk.name, from_table.name
                    )));
                }
            }
            (Some(fk), None) => {
                return Err(Error::schema_mismatch(format!("Missing key {} on table {}", fk.name, from_table.name)));
            }
            (None, Some(tk)) => {
                return Err(Error::schema_mismatch(format!("Extra key {} on table {}", tk.name, from_table.name)));
            }
            (None, None) => break,
        }
    }
    Ok(())
}

fn check_key_match(table_name: &str, from_key: &Key, to_key: &Key) -> Result<()> {
    let from_unique = from_key.kind == crate::model::KeyKind::Unique;
    let to_unique = to_key.kind == crate::model::KeyKind::Unique;
    if from_unique != to_unique || from_key.columns != to_key.columns {
        return Err(Error::schema_mismatch(format!(
            "Key {} mismatch on table {}",
            from_key.name, table_name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Column, ColumnKind, Database, Key, KeyKind, PrimaryKeyKind, Table};

    #[test]
    fn two_empty_databases_match() {
        assert!(check_schema_match(&Database::new(), &Database::new()).is_ok());
    }

    #[test]
    fn missing_table_is_reported_with_exact_wording() {
        let mut from = Database::new();
        from.tables.push(Table::new("a"));
        from.tables.push(Table::new("b"));
        let mut to = Database::new();
        to.tables.push(Table::new("a"));

        let err = check_schema_match(&from, &to).unwrap_err();
        assert_eq!(err.to_string(), "Missing table b");
    }

    #[test]
    fn extra_table_is_reported() {
        let mut from = Database::new();
        from.tables.push(Table::new("a"));
        let mut to = Database::new();
        to.tables.push(Table::new("a"));
        to.tables.push(Table::new("z"));

        let err = check_schema_match(&from, &to).unwrap_err();
        assert_eq!(err.to_string(), "Extra table z");
    }

    #[test]
    fn misordered_column_is_reported_with_exact_wording() {
        let mut from = Database::new();
        let mut from_table = Table::new("t");
        from_table.columns.push(Column::new("x", ColumnKind::Text));
        from_table.columns.push(Column::new("y", ColumnKind::Text));
        from.tables.push(from_table);

        let mut to = Database::new();
        let mut to_table = Table::new("t");
        to_table.columns.push(Column::new("y", ColumnKind::Text));
        to_table.columns.push(Column::new("x", ColumnKind::Text));
        to.tables.push(to_table);

        let err = check_schema_match(&from, &to).unwrap_err();
        assert_eq!(err.to_string(), "Misordered column x on table t, should have y first");
    }

    #[test]
    fn reflexivity_holds_for_a_nontrivial_database() {
        let mut table = Table::new("widgets");
        let mut id = Column::new("id", ColumnKind::SignedInt);
        id.nullable = false;
        table.columns.push(id);
        table.columns.push(Column::new("name", ColumnKind::Text));
        table.primary_key_columns = vec![0];
        table.primary_key_kind = PrimaryKeyKind::ExplicitPrimaryKey;
        table.keys.push(Key { name: "widgets_name_idx".into(), kind: KeyKind::Standard, columns: vec![1] });
        let mut db = Database::new();
        db.tables.push(table);

        assert!(check_schema_match(&db, &db).is_ok());
    }

    #[test]
    fn table_ordering_does_not_affect_match_result() {
        let mut db_a = Database::new();
        db_a.tables.push(Table::new("a"));
        db_a.tables.push(Table::new("b"));
        let mut db_b = Database::new();
        db_b.tables.push(Table::new("b"));
        db_b.tables.push(Table::new("a"));

        assert!(check_schema_match(&db_a, &db_b).is_ok());
    }

    #[test]
    fn missing_column_is_reported() {
        let mut from = Database::new();
        let mut from_table = Table::new("t");
        from_table.columns.push(Column::new("x", ColumnKind::Text));
        from_table.columns.push(Column::new("y", ColumnKind::Text));
        from.tables.push(from_table);

        let mut to = Database::new();
        let mut to_table = Table::new("t");
        to_table.columns.push(Column::new("x", ColumnKind::Text));
        to.tables.push(to_table);

        let err = check_schema_match(&from, &to).unwrap_err();
        assert_eq!(err.to_string(), "Missing column y on table t");
    }

    #[test]
    fn extra_trailing_column_is_reported() {
        let mut from = Database::new();
        let mut from_table = Table::new("t");
        from_table.columns.push(Column::new("x", ColumnKind::Text));
        from.tables.push(from_table);

        let mut to = Database::new();
        let mut to_table = Table::new("t");
        to_table.columns.push(Column::new("x", ColumnKind::Text));
        to_table.columns.push(Column::new("y", ColumnKind::Text));
        to.tables.push(to_table);

        let err = check_schema_match(&from, &to).unwrap_err();
        assert_eq!(err.to_string(), "Extra column y on table t");
    }
}

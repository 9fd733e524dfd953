//! Statement Builder.
//!
//! Pure renderers for the seven DDL/DML shapes. Every renderer validates
//! that column/primary-key names carry a recognized kind prefix before
//! touching SQL text, and `rename_column` additionally requires the source
//! and destination kinds to match.

use crate::segment::StatementRecord;
use crate::value::{Params, Value};
use crate::{Error, Result};

fn kind_token(name: &str) -> Result<&'static str> {
    match name.chars().next() {
        Some('i') => Ok("int"),
        Some('f') => Ok("float"),
        Some('t') => Ok("text"),
        Some('b') => Ok("blob"),
        _ => Err(Error::UnknownKind(name.to_string())),
    }
}

pub fn create_table(table: &str, primary_key: &[String]) -> Result<StatementRecord> {
    let columns = primary_key
        .iter()
        .map(|k| Ok(format!("{k} {} not null", kind_token(k)?)))
        .collect::<Result<Vec<_>>>()?
        .join(", ");

    let sql = format!(
        "create table {table} ({columns}, primary key({}))",
        primary_key.join(", ")
    );
    Ok(StatementRecord { sql, params: Params::new() })
}

pub fn drop_table(table: &str) -> Result<StatementRecord> {
    Ok(StatementRecord {
        sql: format!("drop table {table}"),
        params: Params::new(),
    })
}

pub fn add_column(table: &str, column: &str) -> Result<StatementRecord> {
    let kind = kind_token(column)?;
    Ok(StatementRecord {
        sql: format!("alter table {table} add column {column} {kind}"),
        params: Params::new(),
    })
}

pub fn rename_column(table: &str, src: &str, dst: &str) -> Result<StatementRecord> {
    let src_kind = src.chars().next();
    let dst_kind = dst.chars().next();
    if src_kind != dst_kind || src_kind.is_none() {
        return Err(Error::DdlTypeMismatch {
            src: src.to_string(),
            dst: dst.to_string(),
        });
    }
    // Ensure both names at least carry a known kind, for consistency with
    // every other DDL renderer.
    kind_token(src)?;

    Ok(StatementRecord {
        sql: format!("alter table {table} rename column {src} to {dst}"),
        params: Params::new(),
    })
}

pub fn drop_column(table: &str, column: &str) -> Result<StatementRecord> {
    Ok(StatementRecord {
        sql: format!("alter table {table} drop column {column}"),
        params: Params::new(),
    })
}

pub fn insert(table: &str, row: Params) -> Result<StatementRecord> {
    let columns: Vec<&String> = row.keys().collect();
    let placeholders: Vec<String> = columns.iter().map(|c| format!(":{c}")).collect();
    let column_list: Vec<&str> = columns.iter().map(|c| c.as_str()).collect();

    let sql = format!(
        "insert into {table}({}) values({})",
        column_list.join(", "),
        placeholders.join(", ")
    );
    Ok(StatementRecord { sql, params: row })
}

pub fn update(table: &str, set: Params, r#where: Params) -> Result<StatementRecord> {
    let first = set
        .keys()
        .map(|k| format!("{k}=:{k}_set"))
        .collect::<Vec<_>>()
        .join(", ");
    let second = r#where
        .keys()
        .map(|k| format!("{k}=:{k}_where"))
        .collect::<Vec<_>>()
        .join(" and ");

    let mut params = Params::new();
    for (k, v) in set {
        params.insert(format!("{k}_set"), v);
    }
    for (k, v) in r#where {
        params.insert(format!("{k}_where"), v);
    }

    Ok(StatementRecord {
        sql: format!("update {table} set {first} where {second}"),
        params,
    })
}

pub fn delete(table: &str, r#where: Params) -> Result<StatementRecord> {
    let clause = r#where
        .keys()
        .map(|k| format!("{k}=:{k}"))
        .collect::<Vec<_>>()
        .join(" and ");

    Ok(StatementRecord {
        sql: format!("delete from {table} where {clause}"),
        params: r#where,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn create_table_renders_primary_key_columns() {
        let rec = create_table("users", &["ikey".to_string(), "tname".to_string()]).unwrap();
        assert_eq!(
            rec.sql,
            "create table users (ikey int not null, tname text not null, primary key(ikey, tname))"
        );
        assert!(rec.params.is_empty());
    }

    #[test]
    fn add_column_uses_kind_token() {
        let rec = add_column("blobs", "bpayload").unwrap();
        assert_eq!(rec.sql, "alter table blobs add column bpayload blob");
    }

    #[test]
    fn rename_column_rejects_kind_mismatch() {
        let err = rename_column("t", "iA", "tA").unwrap_err();
        assert!(matches!(err, Error::DdlTypeMismatch { .. }));
    }

    #[test]
    fn rename_column_accepts_matching_kind() {
        let rec = rename_column("t", "iA", "iB").unwrap();
        assert_eq!(rec.sql, "alter table t rename column iA to iB");
    }

    #[test]
    fn insert_renders_named_placeholders() {
        let mut row = Params::new();
        row.insert("ikey".into(), Value::Int(1));
        row.insert("tname".into(), Value::Text("a".into()));
        let rec = insert("users", row).unwrap();
        assert_eq!(rec.sql, "insert into users(ikey, tname) values(:ikey, :tname)");
        assert_eq!(rec.params["ikey"], Value::Int(1));
    }

    #[test]
    fn update_binds_set_and_where_suffixes() {
        let mut set = Params::new();
        set.insert("iX".into(), Value::Int(9));
        let mut r#where = Params::new();
        r#where.insert("iK".into(), Value::Int(1));

        let rec = update("t", set, r#where).unwrap();
        assert_eq!(rec.sql, "update t set iX=:iX_set where iK=:iK_where");
        assert_eq!(rec.params["iX_set"], Value::Int(9));
        assert_eq!(rec.params["iK_where"], Value::Int(1));
    }

    #[test]
    fn delete_binds_where_columns_directly() {
        let mut r#where = Params::new();
        r#where.insert("iK".into(), Value::Int(1));
        let rec = delete("t", r#where).unwrap();
        assert_eq!(rec.sql, "delete from t where iK=:iK");
        assert_eq!(rec.params["iK"], Value::Int(1));
    }
}

//! SQL builders for batched upsert, region-scoped clear and verification.

use geo_core::{ColumnValue, Entity, EntityKind, RegionalEntity};
use tokio_postgres::types::ToSql;

/// PostgreSQL wire protocol limit on bind parameters per statement.
pub const MAX_BIND_PARAMS: usize = 65_535;

/// Default number of rows per batch.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Quote an identifier for use in SQL.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Largest batch of `kind` rows that fits in one statement.
pub fn max_batch_rows(kind: EntityKind) -> usize {
    MAX_BIND_PARAMS / kind.columns().len()
}

/// Build a multi-row upsert for `rows` rows of `kind`.
///
/// ```text
/// INSERT INTO "users" ("user_id", ...) VALUES ($1, ...), (...)
/// ON CONFLICT ("user_id") DO UPDATE SET "name" = excluded."name", ...
/// ```
pub fn upsert_statement(kind: EntityKind, rows: usize) -> String {
    let columns = kind.columns();
    let col_count = columns.len();

    let mut param_idx = 1;
    let placeholders: Vec<String> = (0..rows)
        .map(|_| {
            let row: Vec<String> = (0..col_count)
                .map(|_| {
                    let p = format!("${param_idx}");
                    param_idx += 1;
                    p
                })
                .collect();
            format!("({})", row.join(", "))
        })
        .collect();

    let column_list = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");

    let updates = columns
        .iter()
        .skip(1)
        .map(|c| format!("{col} = excluded.{col}", col = quote_ident(c)))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "INSERT INTO {} ({}) VALUES {} ON CONFLICT ({}) DO UPDATE SET {}",
        quote_ident(kind.table()),
        column_list,
        placeholders.join(", "),
        quote_ident(kind.id_column()),
        updates
    )
}

/// Delete up to `$2` rows of `kind` whose region column equals `$1`.
pub fn clear_statement(kind: EntityKind) -> String {
    let table = quote_ident(kind.table());
    let id = quote_ident(kind.id_column());
    let region = quote_ident(kind.region_column());
    format!(
        "DELETE FROM {table} WHERE {id} IN (SELECT {id} FROM {table} WHERE {region} = $1 LIMIT $2)"
    )
}

/// Row counts per (stored region, placement region).
///
/// Regional-by-row tables compare against the database's `crdb_region`
/// marker; the global `regions` table reports its own region code.
pub fn placement_statement(kind: EntityKind) -> String {
    let table = quote_ident(kind.table());
    let region = quote_ident(kind.region_column());
    if kind.is_regional_by_row() {
        format!(
            "SELECT {region}::STRING, crdb_region::STRING, count(*) FROM {table} \
             GROUP BY {region}, crdb_region ORDER BY {region}"
        )
    } else {
        format!(
            "SELECT {region}::STRING, {region}::STRING, count(*) FROM {table} \
             GROUP BY {region} ORDER BY {region}"
        )
    }
}

/// List the database's configured regions.
pub fn show_regions_statement(database: &str) -> String {
    format!("SHOW REGIONS FROM DATABASE {}", quote_ident(database))
}

/// Convert a column value to a boxed ToSql trait object.
pub fn column_value_to_boxed(value: ColumnValue) -> Box<dyn ToSql + Sync + Send> {
    match value {
        ColumnValue::Uuid(u) => Box::new(u),
        ColumnValue::NullableUuid(u) => Box::new(u),
        ColumnValue::Text(s) => Box::new(s),
        ColumnValue::Float(f) => Box::new(f),
        ColumnValue::Int(i) => Box::new(i),
        ColumnValue::Timestamp(ts) => Box::new(ts),
    }
}

/// Bind parameters for an upsert of `rows`, row-major in column order.
pub fn batch_params(rows: &[Entity]) -> Vec<Box<dyn ToSql + Sync + Send>> {
    rows.iter()
        .flat_map(|row| row.row_values())
        .map(column_value_to_boxed)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_statement() {
        let sql = upsert_statement(EntityKind::Vehicle, 2);
        assert_eq!(
            sql,
            "INSERT INTO \"vehicles\" (\"vehicle_id\", \"driver_id\", \"region\", \"vehicle_type\", \
             \"brand\", \"color\", \"license_plate\", \"created_at\") VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8), ($9, $10, $11, $12, $13, $14, $15, $16) \
             ON CONFLICT (\"vehicle_id\") DO UPDATE SET \"driver_id\" = excluded.\"driver_id\", \
             \"region\" = excluded.\"region\", \"vehicle_type\" = excluded.\"vehicle_type\", \
             \"brand\" = excluded.\"brand\", \"color\" = excluded.\"color\", \
             \"license_plate\" = excluded.\"license_plate\", \"created_at\" = excluded.\"created_at\""
        );
    }

    #[test]
    fn test_upsert_updates_every_non_key_column() {
        for kind in EntityKind::LOAD_ORDER {
            let sql = upsert_statement(kind, 1);
            let updates = sql.split("DO UPDATE SET ").nth(1).unwrap();
            assert_eq!(updates.matches("excluded.").count(), kind.columns().len() - 1);
            assert!(sql.contains(&format!("${}", kind.columns().len())));
        }
    }

    #[test]
    fn test_clear_statement() {
        assert_eq!(
            clear_statement(EntityKind::Ride),
            "DELETE FROM \"rides\" WHERE \"ride_id\" IN \
             (SELECT \"ride_id\" FROM \"rides\" WHERE \"region\" = $1 LIMIT $2)"
        );
        assert!(clear_statement(EntityKind::Region).contains("\"region_code\" = $1"));
    }

    #[test]
    fn test_placement_statement() {
        let users = placement_statement(EntityKind::Rider);
        assert!(users.contains("crdb_region::STRING"));
        assert!(users.contains("FROM \"users\""));

        let regions = placement_statement(EntityKind::Region);
        assert!(!regions.contains("crdb_region"));
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("rideshare"), "\"rideshare\"");
        assert_eq!(quote_ident("odd\"name"), "\"odd\"\"name\"");
        assert_eq!(
            show_regions_statement("rideshare"),
            "SHOW REGIONS FROM DATABASE \"rideshare\""
        );
    }

    #[test]
    fn test_max_batch_rows() {
        assert_eq!(max_batch_rows(EntityKind::Ride), 65_535 / 15);
        assert!(max_batch_rows(EntityKind::Ride) >= DEFAULT_BATCH_SIZE);
    }
}

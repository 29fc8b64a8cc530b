//! Load statement builders
//!
//! Builds the `COPY INTO` and `MERGE INTO` statements that load a staged file
//! into its target table. Pure string building: table, stage, file-format
//! names and transform expressions are inserted verbatim and must already be
//! safe identifiers. Column identifiers come from [`Column::sql_name`].

use crate::schema::{safe_column_name, Column};

/// Staged file location as referenced from SQL
fn staged_location(stage: &str, key: &str) -> String {
    format!("'@{stage}/{key}'")
}

/// Build a bulk `COPY INTO` statement for a staged file.
///
/// Columns are listed in schema order so they line up with the staged fields.
pub fn build_copy_statement(
    table: &str,
    stage: &str,
    key: &str,
    file_format: &str,
    columns: &[Column],
) -> String {
    let column_list = columns
        .iter()
        .map(Column::sql_name)
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "COPY INTO {table} ({column_list}) FROM {} FILE_FORMAT = (format_name='{file_format}')",
        staged_location(stage, key)
    )
}

/// Build an upsert `MERGE INTO` statement for a staged file.
///
/// Field `$i` of the staged file feeds column `i`, wrapped in the column's
/// transform when it has one. Matched rows are updated, the rest inserted.
pub fn build_merge_statement(
    table: &str,
    stage: &str,
    key: &str,
    file_format: &str,
    columns: &[Column],
    primary_key_condition: &str,
) -> String {
    let names: Vec<String> = columns.iter().map(Column::sql_name).collect();

    let source_columns = columns
        .iter()
        .zip(&names)
        .enumerate()
        .map(|(i, (column, name))| match &column.transform {
            Some(transform) => format!("{transform}(${}) {name}", i + 1),
            None => format!("${} {name}", i + 1),
        })
        .collect::<Vec<_>>()
        .join(", ");
    let update = names
        .iter()
        .map(|name| format!("{name}=s.{name}"))
        .collect::<Vec<_>>()
        .join(", ");
    let insert_columns = names.join(", ");
    let insert_values = names
        .iter()
        .map(|name| format!("s.{name}"))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "MERGE INTO {table} t USING (\
         SELECT {source_columns} FROM {} (FILE_FORMAT => '{file_format}')) s \
         ON {primary_key_condition} \
         WHEN MATCHED THEN UPDATE SET {update} \
         WHEN NOT MATCHED THEN INSERT ({insert_columns}) VALUES ({insert_values})",
        staged_location(stage, key)
    )
}

/// Join primary key columns into a merge condition: `s."ID" = t."ID" AND ...`
pub fn build_primary_key_condition<S: AsRef<str>>(keys: &[S]) -> String {
    keys.iter()
        .map(|key| {
            let name = safe_column_name(key.as_ref());
            format!("s.{name} = t.{name}")
        })
        .collect::<Vec<_>>()
        .join(" AND ")
}

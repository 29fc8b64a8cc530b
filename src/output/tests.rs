//! Tests for output module

use super::*;
use crate::error::Error;
use crate::schema::Schema;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tempfile::tempdir;

fn users() -> Schema {
    Schema::from_names(&["id", "name", "active"]).unwrap()
}

fn users_batch() -> Batch {
    let mut batch = Batch::new();
    batch.insert("1", json!({"id": 1, "name": "Alice", "active": true}));
    batch.insert("2", json!({"id": 2, "active": false}));
    batch
}

// ============================================================================
// Batch Tests
// ============================================================================

#[test]
fn test_batch_orders_by_identifier() {
    let mut batch = Batch::new();
    batch.insert("b", json!({"id": 2}));
    batch.insert("a", json!({"id": 1}));

    let ids: Vec<&str> = batch.iter().map(|(id, _)| id).collect();
    assert_eq!(ids, vec!["a", "b"]);
}

#[test]
fn test_batch_insert_replaces() {
    let mut batch = Batch::new();
    assert!(batch.insert("1", json!({"v": 1})).is_none());
    let previous = batch.insert("1", json!({"v": 2}));

    assert_eq!(previous, Some(json!({"v": 1})));
    assert_eq!(batch.len(), 1);
    assert_eq!(batch.get("1"), Some(&json!({"v": 2})));
}

#[test]
fn test_batch_from_iterator() {
    let batch: Batch = vec![("x", json!({})), ("y", json!({}))].into_iter().collect();
    assert_eq!(batch.len(), 2);
    assert!(!batch.is_empty());
}

#[test]
fn test_batch_from_ndjson_keeps_line_order() {
    let content = "{\"id\": 3}\n\n{\"id\": 1}\n{\"id\": 2}\n";
    let batch = Batch::from_ndjson::<&str>(content, &[]).unwrap();

    let ids: Vec<&Value> = batch.records().map(|r| &r["id"]).collect();
    assert_eq!(ids, vec![&json!(3), &json!(1), &json!(2)]);
}

#[test]
fn test_batch_from_ndjson_later_key_wins() {
    let content = r#"{"id": 1, "tenant": "a", "v": "old"}
{"id": 2, "tenant": "a", "v": "x"}
{"id": 1, "tenant": "a", "v": "new"}"#;
    let batch = Batch::from_ndjson(content, &["id", "tenant"]).unwrap();

    assert_eq!(batch.len(), 2);
    assert_eq!(batch.get(r#"[1,"a"]"#).unwrap()["v"], json!("new"));
}

#[test]
fn test_batch_from_ndjson_errors_carry_line_index() {
    let err = Batch::from_ndjson::<&str>("{}\nnot json\n", &[]).unwrap_err();
    assert!(matches!(
        err,
        Error::Encoding {
            record_index: Some(1),
            ..
        }
    ));

    let err = Batch::from_ndjson("{\"id\": null}", &["id"]).unwrap_err();
    assert!(matches!(
        err,
        Error::Encoding {
            record_index: Some(0),
            ..
        }
    ));
}

#[test]
fn test_record_id_formats_values() {
    let record = json!({"id": 7, "name": "x", "flag": true});
    assert_eq!(record_id(&record, &["id"]).unwrap(), "7");
    assert_eq!(record_id(&record, &["name"]).unwrap(), "x");
    assert_eq!(
        record_id(&record, &["id", "name", "flag"]).unwrap(),
        r#"[7,"x",true]"#
    );
}

#[test]
fn test_composite_keys_with_separator_stay_distinct() {
    let content = r#"{"a": "x-y", "b": "z", "v": 1}
{"a": "x", "b": "y-z", "v": 2}"#;
    let batch = Batch::from_ndjson(content, &["a", "b"]).unwrap();

    assert_eq!(batch.len(), 2);
    assert_eq!(batch.get(r#"["x-y","z"]"#).unwrap()["v"], json!(1));
    assert_eq!(batch.get(r#"["x","y-z"]"#).unwrap()["v"], json!(2));
}

// ============================================================================
// Write Options Tests
// ============================================================================

#[test]
fn test_write_options_default() {
    let options = WriteOptions::default();
    assert!(!options.is_compressed());
    assert_eq!(options.max_level(), 0);
}

#[test]
fn test_write_options_builder() {
    let options = WriteOptions::new()
        .with_compression(true)
        .with_max_level(2)
        .with_prefix("users_")
        .with_suffix("txt");
    assert!(options.is_compressed());
    assert_eq!(options.max_level(), 2);
}

// ============================================================================
// Batch Writer Tests
// ============================================================================

#[tokio::test]
async fn test_write_batch_plain() {
    let dir = tempdir().unwrap();
    let options = WriteOptions::new().with_dest_dir(dir.path());

    let staged = write_batch(&users_batch(), &users(), &options).await.unwrap();

    assert!(staged.path.is_absolute());
    assert!(staged.file_name().starts_with("batch_"));
    assert!(staged.file_name().ends_with(".csv"));
    assert_eq!(staged.row_count, 2);
    assert!(!staged.compressed);
    assert_eq!(staged.file_format, DEFAULT_FILE_FORMAT);

    let content = std::fs::read_to_string(&staged.path).unwrap();
    assert_eq!(content, "\"1\",\"Alice\",\"true\"\n\"2\",,\"false\"\n");
    assert_eq!(staged.size_bytes, content.len() as u64);
}

#[tokio::test]
async fn test_write_batch_compressed() {
    let dir = tempdir().unwrap();
    let options = WriteOptions::new()
        .with_dest_dir(dir.path())
        .with_compression(true);

    let staged = write_batch(&users_batch(), &users(), &options).await.unwrap();
    assert!(staged.file_name().ends_with(".csv.gz"));
    assert!(staged.compressed);

    let raw = std::fs::read(&staged.path).unwrap();
    assert_eq!(&raw[..2], &[0x1f, 0x8b]);

    let rows = read_staged_rows(&staged.path, 3).await.unwrap();
    assert_eq!(
        rows,
        vec![
            vec![
                Some("1".to_string()),
                Some("Alice".to_string()),
                Some("true".to_string())
            ],
            vec![Some("2".to_string()), None, Some("false".to_string())],
        ]
    );
}

#[tokio::test]
async fn test_write_empty_batch_plain() {
    let dir = tempdir().unwrap();
    let options = WriteOptions::new().with_dest_dir(dir.path());

    let staged = write_batch(&Batch::new(), &users(), &options).await.unwrap();
    assert!(staged.path.exists());
    assert_eq!(staged.size_bytes, 0);
    assert_eq!(staged.row_count, 0);
}

#[tokio::test]
async fn test_write_empty_batch_compressed() {
    let dir = tempdir().unwrap();
    let options = WriteOptions::new()
        .with_dest_dir(dir.path())
        .with_compression(true);

    let staged = write_batch(&Batch::new(), &users(), &options).await.unwrap();
    assert!(staged.size_bytes > 0);
    assert!(read_staged_rows(&staged.path, 3).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_write_batch_creates_dest_dir() {
    let dir = tempdir().unwrap();
    let nested = dir.path().join("a").join("b");
    let options = WriteOptions::new().with_dest_dir(&nested);

    let staged = write_batch(&users_batch(), &users(), &options).await.unwrap();
    assert!(staged.path.starts_with(&nested));
}

#[tokio::test]
async fn test_write_batch_custom_prefix_suffix() {
    let dir = tempdir().unwrap();
    let options = WriteOptions::new()
        .with_dest_dir(dir.path())
        .with_prefix("users_")
        .with_suffix("txt")
        .with_file_format("MY_DB.PUBLIC.CSV_FMT");

    let staged = write_batch(&users_batch(), &users(), &options).await.unwrap();
    assert!(staged.file_name().starts_with("users_"));
    assert!(staged.file_name().ends_with(".txt"));
    assert_eq!(staged.file_format, "MY_DB.PUBLIC.CSV_FMT");
}

#[tokio::test]
async fn test_write_batch_flattens_with_max_level() {
    let dir = tempdir().unwrap();
    let schema = Schema::from_names(&["id", "address__city"]).unwrap();
    let batch: Batch = vec![("1", json!({"id": 1, "address": {"city": "Oslo"}}))]
        .into_iter()
        .collect();
    let options = WriteOptions::new()
        .with_dest_dir(dir.path())
        .with_max_level(1);

    let staged = write_batch(&batch, &schema, &options).await.unwrap();
    let content = std::fs::read_to_string(&staged.path).unwrap();
    assert_eq!(content, "\"1\",\"Oslo\"\n");
}

#[tokio::test]
async fn test_control_characters_survive_gzip_roundtrip() {
    let dir = tempdir().unwrap();
    let schema = Schema::from_names(&["text"]).unwrap();
    let batch: Batch = vec![("1", json!({"text": "a\r\nb\t\"c\""}))].into_iter().collect();
    let options = WriteOptions::new()
        .with_dest_dir(dir.path())
        .with_compression(true);

    let staged = write_batch(&batch, &schema, &options).await.unwrap();
    let rows = read_staged_rows(&staged.path, 1).await.unwrap();
    assert_eq!(rows, vec![vec![Some("a\r\nb\t\"c\"".to_string())]]);
}

#[tokio::test]
async fn test_dropped_writer_leaves_no_file() {
    let dir = tempdir().unwrap();
    let options = WriteOptions::new().with_dest_dir(dir.path());

    let mut writer = CsvFileWriter::create(&options).await.unwrap();
    writer.write_row("\"partial\"").await.unwrap();
    let path = writer.path().to_path_buf();
    assert!(path.exists());

    drop(writer);
    assert!(!path.exists());
}

#[tokio::test]
async fn test_writer_counts_rows() {
    let dir = tempdir().unwrap();
    let options = WriteOptions::new().with_dest_dir(dir.path());

    let mut writer = CsvFileWriter::create(&options).await.unwrap();
    writer
        .write_record(&json!({"id": 1}), &users(), 0)
        .await
        .unwrap();
    writer.write_row("\"2\",,").await.unwrap();
    assert_eq!(writer.rows_written(), 2);

    let staged = writer.close().await.unwrap();
    assert_eq!(staged.row_count, 2);
}

#[tokio::test]
async fn test_concurrent_writers_share_new_dir() {
    let dir = tempdir().unwrap();
    let shared = dir.path().join("shared");
    let schema = users();
    let batch = users_batch();

    let writes = (0..8).map(|_| {
        let options = WriteOptions::new().with_dest_dir(&shared);
        let schema = schema.clone();
        let batch = batch.clone();
        tokio::spawn(async move { write_batch(&batch, &schema, &options).await })
    });

    let mut paths = Vec::new();
    for handle in futures::future::join_all(writes).await {
        paths.push(handle.unwrap().unwrap().path);
    }
    paths.sort();
    paths.dedup();
    assert_eq!(paths.len(), 8);
}

#[tokio::test]
async fn test_staged_file_remove() {
    let dir = tempdir().unwrap();
    let options = WriteOptions::new().with_dest_dir(dir.path());
    let staged = write_batch(&users_batch(), &users(), &options).await.unwrap();
    let path = staged.path.clone();

    staged.clone().remove().await.unwrap();
    assert!(!path.exists());
    // Already gone is fine
    staged.remove().await.unwrap();
}

#[tokio::test]
async fn test_read_staged_rows_missing_file() {
    let err = read_staged_rows("/nonexistent/batch_x.csv", 1)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::FileNotFound { .. }));
}

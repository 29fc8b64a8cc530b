//! Integration tests for the staging pipeline
//!
//! Tests the full flow: JSON Schema + NDJSON records → staged file → upload →
//! load statement → archive

use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use pretty_assertions::assert_eq;
use serde_json::json;
use solidafy_stage::archive::{archive_staged_file, ArchiveMetadata};
use solidafy_stage::output::{read_staged_rows, write_batch, Batch, WriteOptions};
use solidafy_stage::schema::Schema;
use solidafy_stage::sql::{build_copy_statement, build_merge_statement, build_primary_key_condition};
use solidafy_stage::storage::{self, S3Config, S3StorageClient, StorageClient};
use solidafy_stage::StagingConfig;
use std::sync::Arc;

fn users_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "id": {"type": "integer"},
            "name": {"type": ["null", "string"]},
            "active": {"type": "boolean"},
            "address": {
                "type": ["null", "object"],
                "properties": {
                    "city": {"type": "string"},
                    "zip": {"type": "string"}
                }
            },
            "tags": {"type": ["null", "array"], "items": {"type": "string"}},
            "updated_at": {"type": "string", "format": "date-time"}
        }
    })
}

const USERS: &str = r#"{"id": 2, "name": "Bob", "active": false, "address": {"city": "Oslo"}, "tags": []}
{"id": 1, "name": "O'Brien \"Q\"", "active": true, "address": {"city": "Bergen", "zip": "5003"}, "updated_at": "2024-05-01T10:30:00Z"}
{"id": 3, "name": null, "active": true, "tags": ["a", "b"]}
"#;

// ============================================================================
// Local Backend End-to-End
// ============================================================================

#[tokio::test]
async fn test_stage_load_and_archive_with_local_backend() {
    let root = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let yaml = format!(
        r"
stage: MY_DB.PUBLIC.STAGE
file_format: MY_DB.PUBLIC.CSV_FMT
data_flattening_max_level: 1
compression: true
temp_dir: {scratch}
storage:
  backend: local
  root: {root}
  container: staging
  key_prefix: loads/
archive:
  container: archive
",
        scratch = scratch.path().display(),
        root = root.path().display(),
    );
    let config = StagingConfig::from_yaml_str(&yaml).unwrap();

    let schema = Schema::from_json_value(&users_schema(), config.data_flattening_max_level).unwrap();
    assert_eq!(
        schema.names().collect::<Vec<_>>(),
        vec!["active", "address__city", "address__zip", "id", "name", "tags", "updated_at"]
    );

    let batch = Batch::from_ndjson(USERS, &["id"]).unwrap();
    let staged = write_batch(&batch, &schema, &config.write_options())
        .await
        .unwrap();
    assert!(staged.path.starts_with(scratch.path()));
    assert!(staged.compressed);
    assert_eq!(staged.row_count, 3);

    let client = storage::from_config(&config.storage).unwrap();
    let key = client.upload(&staged.path, "public-users").await.unwrap();
    assert!(key.as_str().starts_with("loads/public-users_"));
    assert!(key.as_str().ends_with(&staged.file_name()));
    staged.clone().remove().await.unwrap();

    // Uploaded file decodes to the expected rows, ordered by id
    let uploaded = root.path().join("staging").join(key.as_str());
    let rows = read_staged_rows(&uploaded, schema.len()).await.unwrap();
    let text = |s: &str| Some(s.to_string());
    assert_eq!(
        rows,
        vec![
            vec![
                text("true"),
                text("Bergen"),
                text("5003"),
                text("1"),
                text("O'Brien \"Q\""),
                None,
                text("2024-05-01T10:30:00Z"),
            ],
            vec![
                text("false"),
                text("Oslo"),
                None,
                text("2"),
                text("Bob"),
                text("[]"),
                None,
            ],
            vec![
                text("true"),
                None,
                None,
                text("3"),
                None,
                text("[\"a\",\"b\"]"),
                None,
            ],
        ]
    );

    let merge = build_merge_statement(
        "USERS",
        &config.stage,
        key.as_str(),
        &staged.file_format,
        schema.columns(),
        &build_primary_key_condition(&["id"]),
    );
    assert!(merge.contains(&format!("FROM '@MY_DB.PUBLIC.STAGE/{key}'")));
    assert!(merge.contains("(FILE_FORMAT => 'MY_DB.PUBLIC.CSV_FMT')"));
    assert!(merge.contains("parse_json($6) \"TAGS\""));
    assert!(merge.contains("ON s.\"ID\" = t.\"ID\""));

    let archive_config = config.archive.as_ref().unwrap();
    let archived = archive_staged_file(
        client.as_ref(),
        &key,
        "public-users",
        archive_config,
        &ArchiveMetadata::new("tap-postgres", "public", "users"),
    )
    .await
    .unwrap();

    assert_eq!(
        archived.as_str(),
        format!("archive/tap-postgres/users/{}", key.basename())
    );
    assert!(root.path().join("archive").join(archived.as_str()).is_file());
    assert!(!uploaded.exists());
}

// ============================================================================
// Object Store Backend
// ============================================================================

#[tokio::test]
async fn test_copy_statement_references_uploaded_key() {
    let scratch = tempfile::tempdir().unwrap();
    let store = Arc::new(InMemory::new());
    let client = S3StorageClient::with_store(S3Config::new("stage-bucket"), store.clone());

    let schema = Schema::from_names(&["id", "name", "active"]).unwrap();
    let batch = Batch::from_ndjson::<&str>(
        "{\"id\": 1, \"name\": \"O'Brien \\\"Q\\\"\", \"active\": false}\n{\"id\": 1, \"active\": false}\n",
        &[],
    )
    .unwrap();
    let staged = write_batch(
        &batch,
        &schema,
        &WriteOptions::new().with_dest_dir(scratch.path()),
    )
    .await
    .unwrap();

    let key = client.upload(&staged.path, "users").await.unwrap();
    let data = store
        .get(&ObjectPath::from(key.as_str()))
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    assert_eq!(
        std::str::from_utf8(&data).unwrap(),
        "\"1\",\"O'Brien \\\"Q\\\"\",\"false\"\n\"1\",,\"false\"\n"
    );

    let copy = build_copy_statement("USERS", "STAGE", key.as_str(), "CSV", schema.columns());
    assert_eq!(
        copy,
        format!(
            "COPY INTO USERS (\"ID\", \"NAME\", \"ACTIVE\") FROM '@STAGE/{key}' \
             FILE_FORMAT = (format_name='CSV')"
        )
    );
}

#[tokio::test]
async fn test_independent_streams_stage_concurrently() {
    let scratch = tempfile::tempdir().unwrap();
    let shared_dir = scratch.path().join("tmp");
    let store = Arc::new(InMemory::new());
    let client: Arc<dyn StorageClient> = Arc::new(S3StorageClient::with_store(
        S3Config::new("stage-bucket"),
        store.clone(),
    ));

    let tasks = (0..6).map(|i| {
        let client = Arc::clone(&client);
        let options = WriteOptions::new()
            .with_dest_dir(&shared_dir)
            .with_compression(i % 2 == 0);
        tokio::spawn(async move {
            let schema = Schema::from_names(&["id", "stream"]).unwrap();
            let stream = format!("stream-{i}");
            let batch: Batch = (0..50)
                .map(|n| (format!("{n:04}"), json!({"id": n, "stream": stream})))
                .collect();
            let staged = write_batch(&batch, &schema, &options).await.unwrap();
            let key = client.upload(&staged.path, &stream).await.unwrap();
            staged.remove().await.unwrap();
            key
        })
    });

    let mut keys = Vec::new();
    for handle in futures::future::join_all(tasks).await {
        keys.push(handle.unwrap());
    }

    for (i, key) in keys.iter().enumerate() {
        assert!(key.as_str().starts_with(&format!("stream-{i}_")));
        assert!(store.head(&ObjectPath::from(key.as_str())).await.is_ok());
    }
    // All local staged files were cleaned up
    assert_eq!(std::fs::read_dir(&shared_dir).unwrap().count(), 0);
}

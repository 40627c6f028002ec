use std::fs;
use std::sync::Arc;

use crate::utils::{fixture_request, fixture_tables, test_config};
use arrow::array::{ArrayRef, Int64Array};
use arrow::datatypes::{DataType, Field, Schema};
use referral_forecast::utils::io::{read_parquet_table, write_record_batch};
use referral_forecast::{
    Pipeline, PipelineError, RecordBatch, TableName, load_tables, load_tables_from_dir,
    tables_from_export,
};
use serde_json::json;
use tempfile::TempDir;

/// Zero-row stand-in for a table with no columns, which Parquet cannot hold
fn placeholder_batch() -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Int64, true)]));
    RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(Vec::<i64>::new())) as ArrayRef])
        .unwrap()
}

#[test]
fn test_parquet_directory_matches_json_request() -> referral_forecast::Result<()> {
    let dir = TempDir::new()?;
    let tables = fixture_tables();
    for table in TableName::ALL {
        let batch = tables.get(table).unwrap();
        let batch = if batch.num_columns() == 0 {
            placeholder_batch()
        } else {
            batch.clone()
        };
        write_record_batch(&dir.path().join(format!("{table}.parquet")), &batch)?;
    }

    let referral = read_parquet_table(&dir.path().join("referral.parquet"))?;
    assert_eq!(referral.num_rows(), 7);

    let mut from_json = Pipeline::new(&test_config());
    let mut from_parquet = Pipeline::new(&test_config());
    let expected = from_json.fit_transform(fixture_tables())?;
    let actual = from_parquet.fit_transform(load_tables_from_dir(dir.path())?)?;

    assert_eq!(actual.features, expected.features);
    assert_eq!(actual.target, expected.target);
    Ok(())
}

#[test]
fn test_load_tables_reads_a_request_file() -> referral_forecast::Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("request.json");
    fs::write(&path, serde_json::to_vec(&fixture_request())?)?;

    let mut pipeline = Pipeline::new(&test_config());
    let output = pipeline.fit_transform(load_tables(&path, None)?)?;
    assert_eq!(output.features.num_rows(), 7);
    Ok(())
}

#[test]
fn test_export_entries_build_one_table_set() -> referral_forecast::Result<()> {
    let first = fixture_request();
    let second = json!({
        "Referral": [
            {"ReferralInstanceId": 401, "ClientId": 4, "ReferralTakenDate": "2019-09-01",
             "ReferralAgencyId": 4, "ReferralNotes": null, "StatusId": 1}
        ],
        "Client": [
            {"ClientId": 4, "ClientDateOfBirth": "1970-01-01", "AddressSinceDate": "2019-01-01",
             "ClientIsMale": false, "PartnerId": null, "ClientCountryId": 2,
             "ClientAddressTypeId": 1, "AddressPostcode": "EF3", "AddressLocalityId": 12,
             "ClientResidencyId": 1}
        ],
        "ReferralIssue": [{"ReferralInstanceId": 401, "ClientIssueId": 6}]
    });
    let export = json!([first, second]);

    let dir = TempDir::new()?;
    let path = dir.path().join("export.json");
    fs::write(&path, serde_json::to_vec(&export)?)?;

    let mut pipeline = Pipeline::new(&test_config());
    let both = pipeline.fit_transform(load_tables(&path, None)?)?;
    assert_eq!(both.features.num_rows(), 8);
    assert_eq!(both.side.referral_ids.last(), Some(&401));
    assert!(both.features.feature_by_name("referralissue_6_current").is_some());

    let mut pipeline = Pipeline::new(&test_config());
    let limited = pipeline.fit_transform(tables_from_export(&export, Some(1))?)?;
    assert_eq!(limited.features.num_rows(), 7);
    assert!(limited.features.feature_by_name("referralissue_6_current").is_none());
    Ok(())
}

#[test]
fn test_missing_input_is_an_io_error() {
    let dir = TempDir::new().unwrap();
    assert!(matches!(
        load_tables(&dir.path().join("absent.json"), None),
        Err(PipelineError::Io(_))
    ));
    assert!(matches!(
        load_tables_from_dir(dir.path()),
        Err(PipelineError::MissingTable { .. })
    ));
}

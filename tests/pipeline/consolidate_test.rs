use crate::utils::{
    client_feature, fixture_request, fixture_tables, fixture_with, fixture_without, reference_date,
    test_config,
};
use referral_forecast::transform::TableConsolidator;
use referral_forecast::{Pipeline, PipelineConfig, PipelineError, tables_from_request};
use serde_json::json;

#[test]
fn test_absent_table_is_a_missing_table_error() {
    let mut pipeline = Pipeline::new(&test_config());
    match pipeline.fit_transform(fixture_without("ReferralReason")) {
        Err(PipelineError::MissingTable { table }) => assert_eq!(table, "referralreason"),
        other => panic!("expected MissingTable, got {other:?}"),
    }
}

#[test]
fn test_empty_required_tables_are_rejected() {
    for table in ["Referral", "Client"] {
        let mut pipeline = Pipeline::new(&test_config());
        let result = pipeline.fit_transform(fixture_with(table, json!([])));
        assert!(
            matches!(result, Err(PipelineError::EmptyRequiredTable { .. })),
            "{table} should be required, got {result:?}"
        );
    }
}

#[test]
fn test_empty_child_tables_contribute_nothing() -> referral_forecast::Result<()> {
    let mut pipeline = Pipeline::new(&test_config());
    let output = pipeline.fit_transform(fixture_with("ClientIssue", json!(null)))?;

    assert!(
        !output
            .features
            .schema()
            .iter()
            .any(|name| name.starts_with("clientissue_"))
    );
    assert_eq!(output.features.num_rows(), 7);
    Ok(())
}

#[test]
fn test_malformed_taken_date_is_fatal() {
    let mut request = fixture_request();
    request["Referral"][0]["ReferralTakenDate"] = json!("next tuesday");
    let tables = tables_from_request(&request).unwrap();

    match Pipeline::new(&test_config()).fit_transform(tables) {
        Err(PipelineError::DateParse { column, value }) => {
            assert_eq!(column, "referraltakendate");
            assert_eq!(value, "next tuesday");
        }
        other => panic!("expected DateParse, got {other:?}"),
    }
}

#[test]
fn test_duplicate_referral_ids_are_fatal() {
    let mut request = fixture_request();
    request["Referral"][1]["ReferralInstanceId"] = json!(101);
    let tables = tables_from_request(&request).unwrap();

    assert!(matches!(
        Pipeline::new(&test_config()).fit_transform(tables),
        Err(PipelineError::DuplicateKey { key: 101, .. })
    ));
}

#[test]
fn test_two_digit_birth_years_are_corrected() -> referral_forecast::Result<()> {
    let mut pipeline = Pipeline::new(&test_config());
    let output = pipeline.fit_transform(fixture_tables())?;

    // "01/02/55" parses as 2055-02-01, a negative age moved back a century
    let born = chrono::NaiveDate::from_ymd_opt(2055, 2, 1).unwrap();
    let expected = (reference_date() - born).num_days() as f64 / 365.0 + 100.0;
    for age in client_feature(&output, 2, "client_age") {
        assert!((age - expected).abs() < 1e-9);
        assert!(age > 0.0 && age < 100.0);
    }

    let born = chrono::NaiveDate::from_ymd_opt(1980, 5, 1).unwrap();
    let expected = (reference_date() - born).num_days() as f64 / 365.0;
    assert!((client_feature(&output, 1, "client_age")[0] - expected).abs() < 1e-9);
    Ok(())
}

#[test]
fn test_client_flags_and_dummies() -> referral_forecast::Result<()> {
    let mut pipeline = Pipeline::new(&test_config());
    let output = pipeline.fit_transform(fixture_tables())?;

    assert_eq!(client_feature(&output, 1, "client_knownpartner"), vec![1.0; 4]);
    assert_eq!(client_feature(&output, 2, "client_knownpartner"), vec![0.0; 2]);
    assert_eq!(client_feature(&output, 1, "client_clientismale"), vec![1.0; 4]);
    assert_eq!(client_feature(&output, 2, "client_clientismale"), vec![0.0; 2]);

    // Null localities become the "nan" category
    assert_eq!(client_feature(&output, 2, "client_addresslocalityid_nan"), vec![1.0; 2]);
    assert_eq!(client_feature(&output, 3, "client_addresslocalityid_10"), vec![1.0]);
    assert_eq!(client_feature(&output, 3, "client_addresspostcode_AB1"), vec![1.0]);
    // Missing address start gives a zero-filled tenure
    assert_eq!(client_feature(&output, 3, "client_addresslength"), vec![0.0]);

    let names = output.features.schema().names();
    let countries: Vec<&str> = names
        .iter()
        .map(String::as_str)
        .filter(|name| name.starts_with("client_clientcountryid_"))
        .collect();
    assert_eq!(
        countries,
        vec!["client_clientcountryid_1", "client_clientcountryid_2"]
    );
    Ok(())
}

#[test]
fn test_duplicate_clients_keep_the_first_row() -> referral_forecast::Result<()> {
    let mut request = fixture_request();
    let mut duplicate = request["Client"][0].clone();
    duplicate["ClientIsMale"] = json!(false);
    request["Client"].as_array_mut().unwrap().push(duplicate);

    let mut pipeline = Pipeline::new(&test_config());
    let output = pipeline.fit_transform(tables_from_request(&request)?)?;
    assert_eq!(client_feature(&output, 1, "client_clientismale"), vec![1.0; 4]);
    Ok(())
}

#[test]
fn test_count_encodings_are_learned_once() -> referral_forecast::Result<()> {
    let config = PipelineConfig {
        count_encode: true,
        ..test_config()
    };
    let mut consolidator = TableConsolidator::new(&config);
    assert!(matches!(
        consolidator.transform(fixture_tables()),
        Err(PipelineError::NotFitted { .. })
    ));

    consolidator.fit_transform(fixture_tables())?;
    let learned = consolidator.encodings().unwrap().clone();
    // Country 1 appears twice, country 2 once
    let countries = &learned.categories["clientcountryid"];
    assert_eq!(countries["1"], 2);
    assert_eq!(countries["2"], 1);

    let mut request = fixture_request();
    request["Client"][0]["ClientCountryId"] = json!(99);
    let master = consolidator.transform(tables_from_request(&request)?)?;
    assert_eq!(consolidator.encodings(), Some(&learned));

    // Country 99 was never counted, so client 1 has no indicator set
    let rows: Vec<usize> = master
        .client_ids()
        .iter()
        .enumerate()
        .filter(|&(_, &id)| id == 1)
        .map(|(row, _)| row)
        .collect();
    for name in ["client_clientcountryid_1", "client_clientcountryid_2"] {
        let column = master.column(name).unwrap().values.as_numeric().unwrap();
        assert!(rows.iter().all(|&row| column[row] == Some(0.0)));
    }
    Ok(())
}

#[test]
fn test_count_encoded_pipeline_keeps_its_schema() -> referral_forecast::Result<()> {
    let config = PipelineConfig {
        count_encode: true,
        ..test_config()
    };
    let mut pipeline = Pipeline::new(&config);
    let fitted = pipeline.fit_transform(fixture_tables())?;

    // Issue 3 occurs three times, issues 4 and 5 once each
    let names = fitted.features.schema().names();
    assert!(names.iter().any(|name| name == "referralissue_3_current"));
    assert!(names.iter().any(|name| name == "referralissue_1_current"));
    assert!(!names.iter().any(|name| name == "referralissue_4_current"));

    let served = pipeline.transform(fixture_tables())?;
    assert_eq!(served.features, fitted.features);
    Ok(())
}

#[test]
fn test_degenerate_windows_fail_the_fit() {
    let configs = [
        PipelineConfig {
            rolling_windows: vec![0],
            ..test_config()
        },
        PipelineConfig {
            window_days: 0,
            ..test_config()
        },
    ];
    for config in configs {
        let mut pipeline = Pipeline::new(&config);
        let result = pipeline.fit_transform(fixture_tables());
        assert!(
            matches!(result, Err(PipelineError::InvalidValue { .. })),
            "expected InvalidValue, got {result:?}"
        );
        assert!(!pipeline.is_fitted());
    }
}

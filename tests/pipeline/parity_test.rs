use crate::utils::{client_feature, fixture_tables, fixture_with, side_numeric, test_config};
use referral_forecast::transform::look_ahead::{FUTURE_COUNT, FUTURE_GAPS};
use referral_forecast::transform::time_features::BURST_NUMBER;
use referral_forecast::{Pipeline, PipelineConfig};
use serde_json::json;

#[test]
fn test_transform_reproduces_fit_output() -> referral_forecast::Result<()> {
    let mut pipeline = Pipeline::new(&test_config());
    let fitted = pipeline.fit_transform(fixture_tables())?;
    let served = pipeline.transform(fixture_tables())?;

    assert_eq!(fitted.features.schema(), served.features.schema());
    assert_eq!(fitted.features, served.features);
    assert_eq!(fitted.target, served.target);
    assert_eq!(fitted.side, served.side);
    Ok(())
}

#[test]
fn test_independent_fits_are_identical() -> referral_forecast::Result<()> {
    let mut first = Pipeline::new(&test_config());
    let mut second = Pipeline::new(&test_config());
    let a = first.fit_transform(fixture_tables())?;
    let b = second.fit_transform(fixture_tables())?;

    assert_eq!(a.features, b.features);
    assert_eq!(a.target, b.target);
    assert_eq!(
        serde_json::to_string(&first)?,
        serde_json::to_string(&second)?
    );
    Ok(())
}

#[test]
fn test_rows_sorted_by_date_then_id() -> referral_forecast::Result<()> {
    let mut pipeline = Pipeline::new(&test_config());
    let output = pipeline.fit_transform(fixture_tables())?;

    assert_eq!(
        output.features.referral_ids(),
        &[101, 102, 201, 202, 103, 301, 104]
    );
    assert_eq!(output.side.referral_ids, output.features.referral_ids());
    assert_eq!(output.side.client_ids, vec![1, 1, 2, 2, 1, 3, 1]);
    Ok(())
}

#[test]
fn test_look_ahead_never_sees_the_past() -> referral_forecast::Result<()> {
    let mut pipeline = Pipeline::new(&test_config());
    let output = pipeline.fit_transform(fixture_tables())?;

    // Client 1 at days 0, 19, 90 and 516; client 2 twice on one day
    assert_eq!(
        side_numeric(&output, FUTURE_COUNT),
        vec![2.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0]
    );
    assert_eq!(
        side_numeric(&output, FUTURE_GAPS),
        vec![1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0]
    );

    let weeks = 365.0 / 7.0;
    let expected = [1.0 / weeks, 0.0, 1.0 / weeks, 1.0 / weeks, 0.0, 0.0, 0.0];
    for (actual, expected) in output.target.values().iter().zip(expected) {
        assert!((actual - expected).abs() < 1e-12);
    }
    Ok(())
}

#[test]
fn test_bursts_restart_after_long_gaps() -> referral_forecast::Result<()> {
    let mut pipeline = Pipeline::new(&test_config());
    let output = pipeline.fit_transform(fixture_tables())?;

    assert_eq!(
        side_numeric(&output, BURST_NUMBER),
        vec![1.0, 1.0, 1.0, 1.0, 2.0, 1.0, 3.0]
    );
    assert_eq!(
        client_feature(&output, 1, "timefeature_startofburst"),
        vec![0.0, 0.0, 1.0, 1.0]
    );
    assert_eq!(
        client_feature(&output, 1, "timefeature_dayssincelastreferral"),
        vec![0.0, 19.0, 71.0, 426.0]
    );
    Ok(())
}

#[test]
fn test_ever_columns_never_decrease() -> referral_forecast::Result<()> {
    let mut pipeline = Pipeline::new(&test_config());
    let output = pipeline.fit_transform(fixture_tables())?;

    assert_eq!(
        client_feature(&output, 1, "referralissue_3_ever"),
        vec![1.0, 1.0, 1.0, 1.0]
    );
    assert_eq!(
        client_feature(&output, 1, "referralissue_4_ever"),
        vec![0.0, 1.0, 1.0, 1.0]
    );
    assert_eq!(
        client_feature(&output, 1, "referralissue_4_current"),
        vec![0.0, 1.0, 0.0, 0.0]
    );
    assert_eq!(
        client_feature(&output, 1, "referralissue_3_current"),
        vec![2.0, 0.0, 0.0, 0.0]
    );

    let schema = output.features.schema();
    for (index, name) in schema.iter().enumerate() {
        if !name.ends_with("_ever") {
            continue;
        }
        for client in [1, 2, 3] {
            let history = client_feature(&output, client, name);
            assert!(
                history.windows(2).all(|pair| pair[0] <= pair[1]),
                "{name} (feature {index}) decreases for client {client}"
            );
        }
    }
    Ok(())
}

#[test]
fn test_split_groups_replace_their_originals() -> referral_forecast::Result<()> {
    let mut pipeline = Pipeline::new(&test_config());
    let output = pipeline.fit_transform(fixture_tables())?;
    let names = output.features.schema().names();

    assert!(!names.iter().any(|name| name == "referralissue_3"));
    // Client issues are not split by default
    assert!(names.iter().any(|name| name == "clientissue_11"));
    assert!(names.iter().any(|name| name == "referraldomesticcircumstances_9_current"));
    // Current columns come before ever columns
    let last_current = names.iter().rposition(|name| name.ends_with("_current")).unwrap();
    let first_ever = names.iter().position(|name| name.ends_with("_ever")).unwrap();
    assert!(last_current < first_ever);
    Ok(())
}

#[test]
fn test_missing_serve_categories_are_zero_filled() -> referral_forecast::Result<()> {
    let mut pipeline = Pipeline::new(&test_config());
    let fitted = pipeline.fit_transform(fixture_tables())?;
    assert!(fitted.features.feature_by_name("referralbenefit_1_current").is_some());

    let served = pipeline.transform(fixture_with("ReferralBenefit", json!([])))?;
    assert_eq!(served.features.schema(), fitted.features.schema());
    assert!(
        served
            .features
            .feature_by_name("referralbenefit_1_current")
            .unwrap()
            .iter()
            .all(|&value| value == 0.0)
    );
    Ok(())
}

#[test]
fn test_unseen_serve_categories_are_dropped() -> referral_forecast::Result<()> {
    let mut pipeline = Pipeline::new(&test_config());
    let fitted = pipeline.fit_transform(fixture_tables())?;

    let served = pipeline.transform(fixture_with(
        "ReferralReason",
        json!([{"ReferralInstanceId": 102, "ReferralReasonId": 99}]),
    ))?;
    assert_eq!(served.features.num_features(), fitted.features.num_features());
    assert!(served.features.feature_by_name("referralreason_99_current").is_none());
    assert!(served.side.column("referralreason_99_current").is_some());
    Ok(())
}

#[test]
fn test_rolling_windows_when_configured() -> referral_forecast::Result<()> {
    let config = PipelineConfig {
        rolling_windows: vec![4],
        ..test_config()
    };
    let mut pipeline = Pipeline::new(&config);
    let output = pipeline.fit_transform(fixture_tables())?;

    assert_eq!(client_feature(&output, 2, "window_count_4"), vec![2.0, 2.0]);
    assert_eq!(
        client_feature(&output, 1, "window_count_4"),
        vec![1.0, 2.0, 1.0, 1.0]
    );
    assert!(output.features.feature_by_name("weeks").is_none());
    Ok(())
}

#[test]
fn test_fitted_pipeline_survives_serialisation() -> referral_forecast::Result<()> {
    let mut pipeline = Pipeline::new(&test_config());
    let fitted = pipeline.fit_transform(fixture_tables())?;

    let restored: Pipeline = serde_json::from_str(&serde_json::to_string(&pipeline)?)?;
    assert!(restored.is_fitted());
    assert_eq!(restored.transform(fixture_tables())?.features, fitted.features);
    Ok(())
}

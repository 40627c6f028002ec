use crate::utils::{synthetic_request, test_config};
use referral_forecast::{
    ForestConfig, PipelineError, TrainedModel, TrainingConfig, tables_from_request, train,
};

fn small_training(seed: u64) -> TrainingConfig {
    TrainingConfig {
        forest: ForestConfig {
            n_estimators: 8,
            seed,
            ..ForestConfig::default()
        },
        ..TrainingConfig::default()
    }
}

#[test]
fn test_train_fits_on_observed_rows() -> referral_forecast::Result<()> {
    let tables = tables_from_request(&synthetic_request(40))?;
    let outcome = train(tables, &test_config(), &small_training(7))?;

    assert!(outcome.rows > 0);
    assert!(outcome.model.pipeline.is_fitted());
    assert_eq!(outcome.model.regressor.num_trees(), 8);
    if let Some(report) = &outcome.evaluation {
        assert!(report.weeks > 0);
        assert!((-1.0..=1.0).contains(&report.spearman));
        assert!((0.0..=1.0).contains(&report.overlap));
    }
    Ok(())
}

#[test]
fn test_trained_model_scores_every_referral() -> referral_forecast::Result<()> {
    let request = synthetic_request(40);
    let outcome = train(tables_from_request(&request)?, &test_config(), &small_training(7))?;

    let predictions = outcome.model.predict(tables_from_request(&request)?)?;
    let referrals = request["referral"].as_array().unwrap().len();
    assert_eq!(predictions.len(), referrals);
    assert!(predictions.iter().all(|p| p.score.is_finite() && p.score >= 0.0));
    assert!(
        predictions
            .windows(2)
            .all(|pair| (pair[0].taken_date, pair[0].referral_id)
                <= (pair[1].taken_date, pair[1].referral_id))
    );
    Ok(())
}

#[test]
fn test_training_is_deterministic_per_seed() -> referral_forecast::Result<()> {
    let request = synthetic_request(30);
    let first = train(tables_from_request(&request)?, &test_config(), &small_training(3))?;
    let second = train(tables_from_request(&request)?, &test_config(), &small_training(3))?;

    assert_eq!(first.model, second.model);
    assert_eq!(first.evaluation, second.evaluation);
    Ok(())
}

#[test]
fn test_model_bytes_round_trip() -> referral_forecast::Result<()> {
    let request = synthetic_request(25);
    let outcome = train(tables_from_request(&request)?, &test_config(), &small_training(1))?;

    let restored: TrainedModel = TrainedModel::from_json_bytes(&outcome.model.to_json_bytes()?)?;
    assert_eq!(
        restored.predict(tables_from_request(&request)?)?,
        outcome.model.predict(tables_from_request(&request)?)?
    );
    Ok(())
}

#[test]
fn test_too_short_history_cannot_train() {
    let tables = tables_from_request(&synthetic_request(3)).unwrap();
    let config = TrainingConfig {
        observation_window_days: 5000,
        ..small_training(0)
    };
    assert!(matches!(
        train(tables, &test_config(), &config),
        Err(PipelineError::Model(_))
    ));
}

use chrono::{Duration, NaiveDate};
use referral_forecast::transform::PipelineOutput;
use referral_forecast::{PipelineConfig, RawTables, tables_from_request};
use serde_json::{Value, json};

/// Reference date every fixture config uses for ages and tenures
#[must_use]
pub fn reference_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()
}

/// Pipeline configuration with a fixed reference date
#[must_use]
pub fn test_config() -> PipelineConfig {
    PipelineConfig {
        reference_date: Some(reference_date()),
        ..PipelineConfig::default()
    }
}

/// A small request body covering every table
///
/// Sorted by (taken date, referral id) the referrals are
/// 101, 102, 201, 202, 103, 301, 104.
#[must_use]
pub fn fixture_request() -> Value {
    json!({
        "Referral": [
            {"ReferralInstanceId": 101, "ClientId": 1, "ReferralTakenDate": "2018-01-01",
             "ReferralAgencyId": 4, "ReferralNotes": "first visit", "StatusId": 1},
            {"ReferralInstanceId": 102, "ClientId": 1, "ReferralTakenDate": "2018-01-20",
             "ReferralAgencyId": 4, "ReferralNotes": null, "StatusId": 1},
            {"ReferralInstanceId": 103, "ClientId": 1, "ReferralTakenDate": "2018-04-01",
             "ReferralAgencyId": 6, "ReferralNotes": "moved", "StatusId": 2},
            {"ReferralInstanceId": 104, "ClientId": 1, "ReferralTakenDate": "2019-06-01",
             "ReferralAgencyId": 6, "ReferralNotes": null, "StatusId": 2},
            {"ReferralInstanceId": 201, "ClientId": 2, "ReferralTakenDate": "2018-02-05",
             "ReferralAgencyId": 4, "ReferralNotes": null, "StatusId": 1},
            {"ReferralInstanceId": 202, "ClientId": 2, "ReferralTakenDate": "2018-02-05T10:30:00",
             "ReferralAgencyId": 5, "ReferralNotes": "same day", "StatusId": 1},
            {"ReferralInstanceId": 301, "ClientId": 3, "ReferralTakenDate": "2019-03-10",
             "ReferralAgencyId": 5, "ReferralNotes": null, "StatusId": 1}
        ],
        "Client": [
            {"ClientId": 1, "ClientDateOfBirth": "1980-05-01", "AddressSinceDate": "2015-01-01",
             "ClientIsMale": true, "PartnerId": 55, "ClientCountryId": 1,
             "ClientAddressTypeId": 2, "AddressPostcode": "AB1", "AddressLocalityId": 10,
             "ClientResidencyId": 1},
            {"ClientId": 2, "ClientDateOfBirth": "01/02/55", "AddressSinceDate": "2017-06-01",
             "ClientIsMale": false, "PartnerId": null, "ClientCountryId": 2,
             "ClientAddressTypeId": 2, "AddressPostcode": "CD2", "AddressLocalityId": null,
             "ClientResidencyId": 1},
            {"ClientId": 3, "ClientDateOfBirth": "1990-07-15", "AddressSinceDate": null,
             "ClientIsMale": true, "PartnerId": null, "ClientCountryId": 1,
             "ClientAddressTypeId": 3, "AddressPostcode": "AB1", "AddressLocalityId": 10,
             "ClientResidencyId": 2}
        ],
        "ReferralIssue": [
            {"ReferralInstanceId": 101, "ClientIssueId": 3},
            {"ReferralInstanceId": 101, "ClientIssueId": 3},
            {"ReferralInstanceId": 102, "ClientIssueId": 4},
            {"ReferralInstanceId": 201, "ClientIssueId": 3},
            {"ReferralInstanceId": 301, "ClientIssueId": 5}
        ],
        "ReferralBenefit": [
            {"ReferralInstanceId": 101, "BenefitTypeId": 1},
            {"ReferralInstanceId": 104, "BenefitTypeId": 2}
        ],
        "ReferralReason": [
            {"ReferralInstanceId": 102, "ReferralReasonId": 7}
        ],
        "ReferralDietaryRequirements": [],
        "ReferralDomesticCircumstances": [
            {"ReferralInstanceId": 103, "DomesticCircumstancesId": 9}
        ],
        "ReferralDocument": null,
        "ClientIssue": [
            {"ClientId": 1, "ClientIssueId": 11},
            {"ClientId": 2, "ClientIssueId": 12}
        ]
    })
}

/// The fixture request as raw tables
#[must_use]
pub fn fixture_tables() -> RawTables {
    tables_from_request(&fixture_request()).unwrap()
}

/// The fixture request with one table replaced
#[must_use]
pub fn fixture_with(table: &str, records: Value) -> RawTables {
    let mut request = fixture_request();
    request[table] = records;
    tables_from_request(&request).unwrap()
}

/// The fixture request with one table removed entirely
#[must_use]
pub fn fixture_without(table: &str) -> RawTables {
    let mut request = fixture_request();
    request.as_object_mut().unwrap().remove(table);
    tables_from_request(&request).unwrap()
}

/// A deterministic history of `clients` clients over roughly three years
///
/// Client `c` gets `2 + c % 6` referrals spaced `5 + 17 * (c % 4)` days
/// apart, each with one or two issues.
#[must_use]
pub fn synthetic_request(clients: i64) -> Value {
    let origin = NaiveDate::from_ymd_opt(2016, 1, 4).unwrap();
    let mut referrals = Vec::new();
    let mut issues = Vec::new();
    let mut client_rows = Vec::new();
    let mut next_id = 1;

    for client in 1..=clients {
        let first = origin + Duration::days(client * 7 % 900);
        let spacing = 5 + 17 * (client % 4);
        for visit in 0..(2 + client % 6) {
            let taken = first + Duration::days(visit * spacing);
            referrals.push(json!({
                "referralinstanceid": next_id,
                "clientid": client,
                "referraltakendate": taken.format("%Y-%m-%d").to_string(),
                "referralagencyid": client % 3
            }));
            issues.push(json!({"referralinstanceid": next_id, "clientissueid": (client + visit) % 4}));
            if visit % 2 == 1 {
                issues.push(json!({"referralinstanceid": next_id, "clientissueid": 9}));
            }
            next_id += 1;
        }
        client_rows.push(json!({
            "clientid": client,
            "clientdateofbirth": format!("19{}-03-15", 50 + client % 40),
            "addresssincedate": "2012-09-01",
            "clientismale": client % 2 == 0,
            "partnerid": if client % 3 == 0 { Value::from(client * 10) } else { Value::Null },
            "clientcountryid": client % 2,
            "clientaddresstypeid": 1,
            "addresspostcode": format!("P{}", client % 5),
            "addresslocalityid": client % 7,
            "clientresidencyid": 1
        }));
    }

    json!({
        "referral": referrals,
        "client": client_rows,
        "referralissue": issues,
        "referralbenefit": [],
        "referralreason": [],
        "referraldietaryrequirements": [],
        "referraldomesticcircumstances": [],
        "referraldocument": [],
        "clientissue": []
    })
}

/// Feature values of the rows belonging to one client, in time order
#[must_use]
pub fn client_feature(output: &PipelineOutput, client: i64, feature: &str) -> Vec<f64> {
    let values = output.features.feature_by_name(feature).unwrap();
    output
        .side
        .client_ids
        .iter()
        .zip(values)
        .filter(|&(&id, _)| id == client)
        .map(|(_, &value)| value)
        .collect()
}

/// Numeric side-table values in row order, nulls as NaN
#[must_use]
pub fn side_numeric(output: &PipelineOutput, column: &str) -> Vec<f64> {
    output
        .side
        .column(column)
        .unwrap()
        .values
        .as_numeric()
        .unwrap()
        .iter()
        .map(|value| value.unwrap_or(f64::NAN))
        .collect()
}

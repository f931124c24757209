#![allow(unused)]
//! Batch ingestion over HTTP: path selection, partial failures and input rejection.

mod support;

use axum::http::{Method, StatusCode};
use riskwatch::config::QueueBackend;
use serde_json::json;
use std::sync::Arc;
use support::*;

fn synchronous(config: &mut riskwatch::config::Config) {
    config.queue.backend = QueueBackend::Disabled;
}

#[tokio::test]
async fn row_missing_identity_is_counted_and_skipped() -> anyhow::Result<()> {
    with_test_app_with_config(synchronous, |app| {
        Box::pin(async move {
            let csv = "patient_id,name,age,risk_factors\n\
                M-1,Ada,30,anemia\n\
                ,Bea,31,anemia\n\
                M-3,Cleo,32,anemia\n";

            let (status, body) = app.upload_csv("maternal", csv).await?;
            assert_status(status, StatusCode::OK, "sync ingest");
            assert_eq!(
                body,
                json!({
                    "recordsProcessed": 3,
                    "recordsSuccess": 2,
                    "recordsFailed": 1,
                    "errors": ["Missing required fields for patient unknown"]
                })
            );

            let (_, page) = app.get_json("/api/patients/maternal").await?;
            assert_eq!(page["pagination"]["total"], 2);
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn implausible_age_fails_its_row_in_a_batch_and_a_singleton_write() -> anyhow::Result<()> {
    with_test_app_with_config(synchronous, |app| {
        Box::pin(async move {
            let csv = "patient_id,name,age,risk_factors\n\
                M-1,Ada,30,anemia\n\
                M-2,Bea,999,anemia\n\
                \x20\x20\x20\n\
                M-3,Cleo,32,anemia\n";

            let (status, body) = app.upload_csv("maternal", csv).await?;
            assert_status(status, StatusCode::OK, "sync ingest");
            assert_eq!(body["recordsProcessed"], 3);
            assert_eq!(body["recordsSuccess"], 2);
            assert_eq!(
                body["errors"],
                json!(["Out of range value for patient M-2: age 999 is outside 10-65"])
            );

            let input = json!({ "name": "Bea", "age": 999, "riskFactors": ["anemia"] });
            let (status, _headers, _body) = app
                .request(
                    Method::PUT,
                    "/api/patients/maternal/M-2",
                    Some(to_json_body(&input)?),
                )
                .await?;
            assert_status(status, StatusCode::BAD_REQUEST, "out of range singleton");
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn failing_scorer_falls_back_for_every_row() -> anyhow::Result<()> {
    let scorer = FailingScorer::new();
    let options = TestAppOptions {
        scorer: Some(scorer.clone()),
        ..Default::default()
    };

    with_test_app_with_options(synchronous, options, |app| {
        Box::pin(async move {
            let csv = "patient_id,name,age,risk_factors\n\
                M-1,A,22,anemia\n\
                M-2,B,38,hypertension\n\
                M-3,C,41,diabetes;obesity\n\
                M-4,D,17,none\n\
                M-5,E,29,preeclampsia\n";

            let (status, body) = app.upload_csv("maternal", csv).await?;
            assert_status(status, StatusCode::OK, "sync ingest");
            assert_eq!(body["recordsSuccess"], 5);
            assert_eq!(body["recordsFailed"], 0);
            assert_eq!(scorer.calls(), 5);
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn explicit_scores_bypass_the_scorer() -> anyhow::Result<()> {
    let scorer = CountingScorer::new(10);
    let options = TestAppOptions {
        scorer: Some(scorer.clone()),
        ..Default::default()
    };

    with_test_app_with_options(synchronous, options, |app| {
        Box::pin(async move {
            let csv = "patient_id,name,age,risk_factors,risk_score,risk_level\n\
                M-1,Ada,30,anemia,88,critical\n\
                M-2,Bea,31,anemia,,\n";

            let (status, body) = app.upload_csv("maternal", csv).await?;
            assert_status(status, StatusCode::OK, "sync ingest");
            assert_eq!(body["recordsSuccess"], 2);
            assert_eq!(scorer.calls(), 1);

            let (_, explicit) = app.get_json("/api/patients/maternal/M-1").await?;
            assert_eq!(explicit["riskScore"], 88);
            assert_eq!(explicit["riskLevel"], "critical");

            let (_, scored) = app.get_json("/api/patients/maternal/M-2").await?;
            assert_eq!(scored["riskScore"], 10);
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn disabled_queue_answers_with_a_summary() -> anyhow::Result<()> {
    with_test_app_with_config(synchronous, |app| {
        Box::pin(async move {
            let (status, body) = app.upload_csv("pediatric", PEDIATRIC_CSV).await?;
            assert_status(status, StatusCode::OK, "sync ingest");
            assert!(body.get("jobId").is_none());
            assert_eq!(body["recordsProcessed"], 2);
            assert_eq!(app.scratch_file_count(), 0);
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn queue_down_at_submission_processes_synchronously() -> anyhow::Result<()> {
    let options = TestAppOptions {
        queue: Some(Arc::new(DownQueue)),
        ..Default::default()
    };

    with_test_app_with_options(
        |config| config.workers.enabled = false,
        options,
        |app| {
            Box::pin(async move {
                let (status, body) = app.upload_csv("maternal", MATERNAL_CSV).await?;
                assert_status(status, StatusCode::OK, "fallback ingest");
                assert!(body.get("jobId").is_none(), "expected a summary: {}", body);
                assert_eq!(body["recordsSuccess"], 3);
                assert_eq!(app.scratch_file_count(), 0);
                Ok(())
            })
        },
    )
    .await
}

#[tokio::test]
async fn reingesting_the_same_file_is_idempotent() -> anyhow::Result<()> {
    with_test_app_with_config(synchronous, |app| {
        Box::pin(async move {
            let (_, first) = app.upload_csv("maternal", MATERNAL_CSV).await?;
            let (_, second) = app.upload_csv("maternal", MATERNAL_CSV).await?;

            assert_eq!(first["recordsSuccess"], second["recordsSuccess"]);
            let (_, page) = app.get_json("/api/patients/maternal").await?;
            assert_eq!(page["pagination"]["total"], 3);
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn error_list_is_capped_but_counts_are_exact() -> anyhow::Result<()> {
    with_test_app_with_config(synchronous, |app| {
        Box::pin(async move {
            let mut csv = String::from("patient_id,name,age,risk_factors\n");
            for i in 0..15 {
                csv.push_str(&format!("M-{},,30,anemia\n", i));
            }
            csv.push_str("M-ok,Ada,30,anemia\n");

            let (status, body) = app.upload_csv("maternal", &csv).await?;
            assert_status(status, StatusCode::OK, "sync ingest");
            assert_eq!(body["recordsProcessed"], 16);
            assert_eq!(body["recordsSuccess"], 1);
            assert_eq!(body["recordsFailed"], 15);
            assert_eq!(body["errors"].as_array().map(Vec::len), Some(10));
            assert_eq!(body["errors"][0], "Missing required fields for patient M-0");
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn malformed_uploads_are_rejected_with_400() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let (status, _) = app
                .upload("maternal", Some("application/json"), b"{}".to_vec())
                .await?;
            assert_status(status, StatusCode::BAD_REQUEST, "disallowed content type");

            let (status, _) = app
                .upload("maternal", None, MATERNAL_CSV.as_bytes().to_vec())
                .await?;
            assert_status(status, StatusCode::BAD_REQUEST, "missing content type");

            let (status, body) = app
                .upload_csv("maternal", "patient_id,name,age\nM-1,Ada,30,extra\n")
                .await?;
            assert_status(status, StatusCode::BAD_REQUEST, "ragged file");
            assert!(body["error"].as_str().unwrap_or("").contains("parse"));

            let (status, _) = app.upload_csv("maternal", "").await?;
            assert_status(status, StatusCode::BAD_REQUEST, "empty body");

            let (status, _) = app.upload_csv("geriatric", MATERNAL_CSV).await?;
            assert_status(status, StatusCode::BAD_REQUEST, "unknown record type");

            // Nothing was queued or left behind
            assert_eq!(app.scratch_file_count(), 0);
            let (_, jobs) = app.get_json("/api/jobs").await?;
            assert_eq!(jobs["total"], 0);
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn content_type_parameters_are_ignored() -> anyhow::Result<()> {
    with_test_app_with_config(synchronous, |app| {
        Box::pin(async move {
            let (status, body) = app
                .upload(
                    "maternal",
                    Some("text/csv; charset=utf-8"),
                    MATERNAL_CSV.as_bytes().to_vec(),
                )
                .await?;
            assert_status(status, StatusCode::OK, "csv with charset");
            assert_eq!(body["recordsSuccess"], 3);
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn error_details_are_hidden_in_production() -> anyhow::Result<()> {
    with_test_app_with_config(
        |config| config.logging.deployment_environment = "production".to_string(),
        |app| {
            Box::pin(async move {
                let (status, body) = app
                    .upload("maternal", Some("application/pdf"), b"%PDF".to_vec())
                    .await?;
                assert_status(status, StatusCode::BAD_REQUEST, "pdf upload");
                assert!(body.get("details").is_none());
                assert!(body["error"].is_string());
                Ok(())
            })
        },
    )
    .await
}

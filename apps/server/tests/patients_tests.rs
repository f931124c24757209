#![allow(unused)]
//! Singleton patient API and read-side caching.

mod support;

use axum::http::{Method, StatusCode};
use riskwatch::config::QueueBackend;
use serde_json::json;
use support::*;

#[tokio::test]
async fn put_get_delete_round() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let input = json!({
                "name": "Ada Obi",
                "age": 36,
                "riskFactors": ["anemia", "hypertension"]
            });

            let (status, _headers, body) = app
                .request(
                    Method::PUT,
                    "/api/patients/maternal/M-100",
                    Some(to_json_body(&input)?),
                )
                .await?;
            assert_status(status, StatusCode::CREATED, "create");
            let created: serde_json::Value = serde_json::from_slice(&body)?;
            assert_eq!(created["patientId"], "M-100");
            assert_eq!(created["recordType"], "maternal");

            let (status, _headers, _body) = app
                .request(
                    Method::PUT,
                    "/api/patients/maternal/M-100",
                    Some(to_json_body(&input)?),
                )
                .await?;
            assert_status(status, StatusCode::OK, "replace");

            let (status, fetched) = app.get_json("/api/patients/maternal/M-100").await?;
            assert_status(status, StatusCode::OK, "get");
            assert_eq!(fetched["name"], "Ada Obi");

            let (status, _headers, _body) = app
                .request(Method::DELETE, "/api/patients/maternal/M-100", None)
                .await?;
            assert_status(status, StatusCode::NO_CONTENT, "delete");

            let (status, _) = app.get_json("/api/patients/maternal/M-100").await?;
            assert_status(status, StatusCode::NOT_FOUND, "get after delete");

            let (status, _headers, _body) = app
                .request(Method::DELETE, "/api/patients/maternal/M-100", None)
                .await?;
            assert_status(status, StatusCode::NOT_FOUND, "second delete");
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn invalid_singleton_writes_are_rejected() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            // Pediatric records need birth data
            let input = json!({ "name": "Eve", "age": 30, "riskFactors": ["jaundice"] });
            let (status, _headers, _body) = app
                .request(
                    Method::PUT,
                    "/api/patients/pediatric/C-9",
                    Some(to_json_body(&input)?),
                )
                .await?;
            assert_status(status, StatusCode::BAD_REQUEST, "missing birth data");

            let input = json!({ "name": "Ada", "age": 30, "riskFactors": [] });
            let (status, _headers, _body) = app
                .request(
                    Method::PUT,
                    "/api/patients/maternal/M-9",
                    Some(to_json_body(&input)?),
                )
                .await?;
            assert_status(status, StatusCode::BAD_REQUEST, "no risk factors");
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn list_is_paginated_and_filtered_by_level() -> anyhow::Result<()> {
    with_test_app_with_config(
        |config| config.queue.backend = QueueBackend::Disabled,
        |app| {
            Box::pin(async move {
                let mut csv = String::from("patient_id,name,age,risk_factors,risk_score,risk_level\n");
                for i in 0..25 {
                    let (score, level) = if i % 5 == 0 { (90, "critical") } else { (10, "low") };
                    csv.push_str(&format!("M-{:02},P{},30,anemia,{},{}\n", i, i, score, level));
                }
                let (status, _) = app.upload_csv("maternal", &csv).await?;
                assert_status(status, StatusCode::OK, "seed");

                let (_, page) = app.get_json("/api/patients/maternal?page=2&limit=10").await?;
                assert_eq!(page["pagination"]["total"], 25);
                assert_eq!(page["pagination"]["totalPages"], 3);
                assert_eq!(page["data"].as_array().map(Vec::len), Some(10));
                assert_eq!(page["data"][0]["patientId"], "M-10");

                let (_, critical) = app
                    .get_json("/api/patients/maternal?riskLevel=critical")
                    .await?;
                assert_eq!(critical["pagination"]["total"], 5);

                let (_, pediatric) = app.get_json("/api/patients/pediatric").await?;
                assert_eq!(pediatric["pagination"]["total"], 0);
                Ok(())
            })
        },
    )
    .await
}

#[tokio::test]
async fn cached_list_reflects_a_completed_batch() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            // Prime the cache with an empty page
            let (_, empty) = app.get_json("/api/patients/maternal").await?;
            assert_eq!(empty["pagination"]["total"], 0);
            let (_, stats) = app.get_json("/api/dashboard/stats").await?;
            assert_eq!(stats["totalPatients"], 0);

            let (_, body) = app.upload_csv("maternal", MATERNAL_CSV).await?;
            app.wait_for_job(body["jobId"].as_str().unwrap_or_default())
                .await?;

            let (_, page) = app.get_json("/api/patients/maternal").await?;
            assert_eq!(page["pagination"]["total"], 3);
            let (_, stats) = app.get_json("/api/dashboard/stats").await?;
            assert_eq!(stats["totalPatients"], 3);
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn unknown_record_type_in_path_is_400() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let (status, _) = app.get_json("/api/patients/geriatric").await?;
            assert_status(status, StatusCode::BAD_REQUEST, "unknown type");
            Ok(())
        })
    })
    .await
}

#![allow(unused)]
//! Queued ingestion and job tracking.

mod support;

use axum::http::{Method, StatusCode};
use riskwatch::config::QueueBackend;
use support::*;

#[tokio::test]
async fn queued_batch_completes_and_cleans_up() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let (status, body) = app.upload_csv("maternal", MATERNAL_CSV).await?;
            assert_status(status, StatusCode::OK, "queued ingest");
            assert_eq!(body["status"], "queued");
            let job_id = body["jobId"].as_str().unwrap_or_default().to_string();
            assert!(!job_id.is_empty(), "expected a job id: {}", body);

            let job = app.wait_for_job(&job_id).await?;
            assert_eq!(job["status"], "completed");
            assert_eq!(job["progress"], 100);
            assert_eq!(job["attempts"], 1);
            assert_eq!(job["result"]["recordsSuccess"], 3);
            assert!(job.get("filePath").is_none());

            let (_, page) = app.get_json("/api/patients/maternal").await?;
            assert_eq!(page["pagination"]["total"], 3);
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn queued_and_synchronous_paths_agree() -> anyhow::Result<()> {
    let csv = "patient_id,name,age,risk_factors\n\
        M-1,Ada,30,anemia\n\
        M-2,,31,anemia\n\
        M-3,Cleo,abc,anemia\n\
        M-4,Dee,44,diabetes\n";

    let expected = {
        let (tx, rx) = tokio::sync::oneshot::channel();
        with_test_app_with_config(
            |config| config.queue.backend = QueueBackend::Disabled,
            |app| {
                Box::pin(async move {
                    let (_, summary) = app.upload_csv("maternal", csv).await?;
                    let _ = tx.send(summary);
                    Ok(())
                })
            },
        )
        .await?;
        rx.await?
    };

    with_test_app(|app| {
        Box::pin(async move {
            let (_, body) = app.upload_csv("maternal", csv).await?;
            let job_id = body["jobId"].as_str().unwrap_or_default().to_string();
            let job = app.wait_for_job(&job_id).await?;

            assert_eq!(job["result"], expected);
            assert_eq!(expected["recordsSuccess"], 2);
            assert_eq!(expected["recordsFailed"], 2);
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn jobs_can_be_listed_and_filtered() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let (_, first) = app.upload_csv("maternal", MATERNAL_CSV).await?;
            let (_, second) = app.upload_csv("pediatric", PEDIATRIC_CSV).await?;
            for body in [&first, &second] {
                app.wait_for_job(body["jobId"].as_str().unwrap_or_default())
                    .await?;
            }

            let (status, all) = app.get_json("/api/jobs").await?;
            assert_status(status, StatusCode::OK, "list jobs");
            assert_eq!(all["total"], 2);

            let (_, pediatric) = app.get_json("/api/jobs?recordType=pediatric").await?;
            assert_eq!(pediatric["total"], 1);
            assert_eq!(pediatric["jobs"][0]["id"], second["jobId"]);

            let (_, failed) = app.get_json("/api/jobs?status=failed").await?;
            assert_eq!(failed["total"], 0);

            let (status, _) = app.get_json("/api/jobs?status=exploded").await?;
            assert_status(status, StatusCode::BAD_REQUEST, "unknown status filter");
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn unknown_job_is_404() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let (status, _) = app
                .get_json("/api/jobs/00000000-0000-0000-0000-000000000000")
                .await?;
            assert_status(status, StatusCode::NOT_FOUND, "missing job");
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn queue_health_and_cleanup() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let (_, body) = app.upload_csv("maternal", MATERNAL_CSV).await?;
            app.wait_for_job(body["jobId"].as_str().unwrap_or_default())
                .await?;

            let (status, health) = app.get_json("/api/jobs/health").await?;
            assert_status(status, StatusCode::OK, "queue health");
            assert_eq!(health["jobs"]["completed"], 1);

            // Still inside the retention window
            let (status, _headers, body) = app
                .request(Method::POST, "/api/jobs/cleanup", None)
                .await?;
            assert_status(status, StatusCode::OK, "cleanup");
            let cleanup: serde_json::Value = serde_json::from_slice(&body)?;
            assert_eq!(cleanup["deleted"], 0);
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn job_endpoints_report_unavailable_without_a_queue() -> anyhow::Result<()> {
    with_test_app_with_config(
        |config| config.queue.backend = QueueBackend::Disabled,
        |app| {
            Box::pin(async move {
                let (status, _) = app.get_json("/api/jobs").await?;
                assert_status(status, StatusCode::SERVICE_UNAVAILABLE, "list jobs");

                let (status, health) = app.get_json("/health").await?;
                assert_status(status, StatusCode::OK, "health");
                assert_eq!(health["queue"]["mode"], "synchronous");
                Ok(())
            })
        },
    )
    .await
}

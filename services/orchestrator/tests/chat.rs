mod common;

use std::sync::Arc;
use std::time::Duration;

use analytics_orchestrator::{PipelineError, ASSISTANT_UNAVAILABLE};
use common::*;
use datastore::{Classification, HistoryStore, NewTurn};
use insights::{ChartDescriptor, ChartType};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[tokio::test]
async fn sales_trend_request_yields_line_chart() {
    let model = ScriptedModel::replying(&[]);
    let h = harness(model.clone());
    let tenant = Uuid::new_v4();
    h.active_dataset(tenant, "sales.csv", SALES_CSV).await;

    let reply = h
        .pipeline
        .chat(tenant, "show me a sales trend", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(reply.classification, Classification::Chart);
    let chart = reply.payload.expect("chart payload");
    assert_eq!(chart.chart_type, ChartType::Line);
    assert!(!chart.data.is_empty());
    assert!(reply.response.contains("line chart"));
    assert_eq!(model.calls(), 0);

    let logged = h.history.list(tenant, 10).await.unwrap();
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0].classification, Classification::Chart);
    let stored = logged[0].payload.clone().expect("stored payload");
    assert_eq!(stored["type"], "line");
    assert_eq!(serde_json::from_value::<ChartDescriptor>(stored).unwrap(), chart);
}

#[tokio::test]
async fn chart_request_without_data_falls_through() {
    let model = ScriptedModel::replying(&["No data yet, upload a file first."]);
    let h = harness(model.clone());
    let tenant = Uuid::new_v4();

    let reply = h
        .pipeline
        .chat(tenant, "show me a sales trend", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(reply.classification, Classification::General);
    assert!(reply.payload.is_none());
    assert_eq!(model.calls(), 1);
}

#[tokio::test]
async fn database_complaint_gets_guide_without_store_access() {
    let h = harness(ScriptedModel::replying(&[]));
    let tenant = Uuid::new_v4();

    let reply = h
        .pipeline
        .chat(tenant, "my database is broken", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(reply.classification, Classification::Troubleshooting);
    assert!(reply.response.starts_with("**Database Issues:**"));
    assert_eq!(h.datasets.calls(), 0);
    assert_eq!(h.history.list(tenant, 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn analytics_explains_active_dataset() {
    let h = harness(ScriptedModel::replying(&[]));
    let tenant = Uuid::new_v4();
    h.active_dataset(tenant, "orders.csv", TWO_ROW_CSV).await;

    let reply = h
        .pipeline
        .chat(tenant, "walk me through my metrics", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(reply.classification, Classification::Analytics);
    assert!(reply.response.contains("$30.00"), "{}", reply.response);
    assert!(reply.response.contains("$15.00"), "{}", reply.response);
}

#[tokio::test]
async fn analytics_without_active_dataset_says_so() {
    let h = harness(ScriptedModel::replying(&[]));
    let reply = h
        .pipeline
        .chat(Uuid::new_v4(), "analytics overview please", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(reply.classification, Classification::Analytics);
    assert_eq!(reply.response, analytics_orchestrator::analytics::NO_ACTIVE_DATASET);
}

#[tokio::test]
async fn general_prompt_carries_last_three_turns() {
    let model = ScriptedModel::replying(&["Margins depend on your cost base."]);
    let h = harness(model.clone());
    let tenant = Uuid::new_v4();
    for n in 1..=5 {
        h.history
            .append(
                tenant,
                NewTurn {
                    message: format!("earlier-{n}"),
                    response: format!("reply-{n}"),
                    classification: Classification::General,
                    payload: None,
                },
            )
            .await
            .unwrap();
    }

    let reply = h
        .pipeline
        .chat(tenant, "what is a good margin?", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(reply.classification, Classification::General);
    assert_eq!(reply.response, "Margins depend on your cost base.");

    let prompt = model.last_prompt();
    assert!(!prompt.contains("earlier-2"));
    let positions: Vec<_> = ["earlier-3", "earlier-4", "earlier-5", "what is a good margin?"]
        .iter()
        .map(|s| prompt.find(s).unwrap())
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));

    let latest = h.history.list(tenant, 1).await.unwrap();
    assert_eq!(latest[0].message, "what is a good margin?");
}

#[tokio::test]
async fn model_failure_fails_the_turn_and_logs_nothing() {
    let h = harness(Arc::new(FailingModel));
    let tenant = Uuid::new_v4();

    let err = h
        .pipeline
        .chat(tenant, "tell me a joke", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::ExternalService(_)));
    assert_eq!(err.user_message(), ASSISTANT_UNAVAILABLE);
    assert!(!err.user_message().contains("secret-internal-detail"));
    assert!(h.history.list(tenant, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn model_timeout_is_an_external_failure() {
    let h = harness_with(Arc::new(PendingModel), |cfg| cfg.llm_timeout = Duration::from_millis(50));
    let tenant = Uuid::new_v4();

    let err = h
        .pipeline
        .chat(tenant, "tell me a joke", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::ExternalService(_)));
    assert!(h.history.list(tenant, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn cancelled_turn_is_never_logged() {
    let h = Arc::new(harness(Arc::new(PendingModel)));
    let tenant = Uuid::new_v4();
    let cancel = CancellationToken::new();

    let task = {
        let h = h.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { h.pipeline.chat(tenant, "tell me a joke", &cancel).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    cancel.cancel();

    let err = task.await.unwrap().unwrap_err();
    assert!(matches!(err, PipelineError::Cancelled));
    assert!(h.history.list(tenant, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn blank_message_is_rejected() {
    let h = harness(ScriptedModel::replying(&[]));
    let err = h
        .pipeline
        .chat(Uuid::new_v4(), "   ", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidInput(_)));
}

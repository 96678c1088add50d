use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use datastore::{DatasetMetadata, DatasetPatch};
use insights::Bucket;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::PipelineError;
use crate::pipeline::{ActiveKpis, DatasetDetail, DeleteReport, Upload};
use crate::state::SharedState;
use crate::tenant::Tenant;

fn bad_multipart(e: impl std::fmt::Display) -> PipelineError {
    PipelineError::InvalidInput(format!("invalid multipart body: {e}"))
}

pub async fn post_dataset(
    State(state): State<SharedState>,
    Tenant(tenant): Tenant,
    mut mp: Multipart,
) -> Result<(StatusCode, Json<DatasetMetadata>), PipelineError> {
    let mut name: Option<String> = None;
    let mut description: Option<String> = None;
    let mut file: Option<(String, Option<String>, bytes::Bytes)> = None;

    while let Some(field) = mp.next_field().await.map_err(bad_multipart)? {
        match field.name() {
            Some("name") => name = Some(field.text().await.map_err(bad_multipart)?),
            Some("description") => description = Some(field.text().await.map_err(bad_multipart)?),
            Some("file") => {
                let file_name = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| PipelineError::InvalidInput("file part has no file name".into()))?;
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(bad_multipart)?;
                file = Some((file_name, content_type, bytes));
            }
            _ => {}
        }
    }

    let (file_name, content_type, bytes) =
        file.ok_or_else(|| PipelineError::InvalidInput("Missing file".into()))?;

    let meta = state
        .pipeline
        .upload_dataset(
            tenant,
            Upload {
                file_name,
                content_type,
                bytes,
                name,
                description,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(meta)))
}

pub async fn list_datasets(
    State(state): State<SharedState>,
    Tenant(tenant): Tenant,
) -> Result<Json<Vec<DatasetMetadata>>, PipelineError> {
    Ok(Json(state.pipeline.list_datasets(tenant).await?))
}

pub async fn get_dataset(
    State(state): State<SharedState>,
    Tenant(tenant): Tenant,
    Path(id): Path<Uuid>,
) -> Result<Json<DatasetDetail>, PipelineError> {
    Ok(Json(state.pipeline.get_dataset(tenant, id).await?))
}

pub async fn patch_dataset(
    State(state): State<SharedState>,
    Tenant(tenant): Tenant,
    Path(id): Path<Uuid>,
    Json(patch): Json<DatasetPatch>,
) -> Result<Json<DatasetMetadata>, PipelineError> {
    Ok(Json(state.pipeline.update_dataset(tenant, id, patch).await?))
}

pub async fn delete_dataset(
    State(state): State<SharedState>,
    Tenant(tenant): Tenant,
    Path(id): Path<Uuid>,
) -> Result<Json<DeleteReport>, PipelineError> {
    Ok(Json(state.pipeline.delete_dataset(tenant, id).await?))
}

pub async fn activate_dataset(
    State(state): State<SharedState>,
    Tenant(tenant): Tenant,
    Path(id): Path<Uuid>,
) -> Result<Json<DatasetMetadata>, PipelineError> {
    Ok(Json(state.pipeline.activate_dataset(tenant, id).await?))
}

pub async fn favorite_dataset(
    State(state): State<SharedState>,
    Tenant(tenant): Tenant,
    Path(id): Path<Uuid>,
) -> Result<Json<DatasetMetadata>, PipelineError> {
    Ok(Json(state.pipeline.toggle_favorite(tenant, id).await?))
}

#[derive(Deserialize)]
pub struct KpiQuery {
    pub bucket: Option<String>,
}

pub async fn active_kpis(
    State(state): State<SharedState>,
    Tenant(tenant): Tenant,
    Query(q): Query<KpiQuery>,
) -> Result<Json<ActiveKpis>, PipelineError> {
    let bucket = match q.bucket.as_deref() {
        Some(raw) => raw.parse::<Bucket>().map_err(PipelineError::InvalidInput)?,
        None => Bucket::default(),
    };
    Ok(Json(state.pipeline.active_kpis(tenant, bucket).await?))
}

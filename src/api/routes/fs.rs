//! Filesystem operation routes. Every handler resolves a
//! `root` path segment into a `NodeKey`, runs one `FsOps` method against
//! it, and returns either the new root (mutations) or the read value
//! (stat/read), mapping `CoreError` straight through its `IntoResponse`
//! impl (common/error.rs).

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::api::middleware::{validate_content_type, ActingDelegate};
use crate::api::server::SharedAppState;
use crate::auth::proof::{parse_proof_header, ProofMap};
use crate::codec::NodeKey;
use crate::common::error::{CoreError, Result};
use crate::fs::{RewriteSpec, StatResult};
use crate::ids::NodeKey as IdNodeKey;

pub fn router() -> Router<SharedAppState> {
    Router::new()
        .route("/v1/fs/:root/stat", axum::routing::get(stat))
        .route("/v1/fs/:root/read", axum::routing::get(read))
        .route("/v1/fs/:root/write", axum::routing::post(write))
        .route("/v1/fs/:root/mkdir", axum::routing::post(mkdir))
        .route("/v1/fs/:root/rm", axum::routing::post(rm))
        .route("/v1/fs/:root/mv", axum::routing::post(mv))
        .route("/v1/fs/:root/cp", axum::routing::post(cp))
        .route("/v1/fs/:root/rewrite", axum::routing::post(rewrite))
}

#[derive(Debug, Deserialize)]
struct PathQuery {
    path: Option<String>,
    #[serde(rename = "indexPath")]
    index_path: Option<String>,
}

fn parse_root(root: &str) -> Result<NodeKey> {
    root.parse::<IdNodeKey>()
}

#[derive(Serialize)]
struct StatResponse {
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    child_count: Option<usize>,
}

async fn stat(
    State(state): State<SharedAppState>,
    Path(root): Path<String>,
    Query(q): Query<PathQuery>,
) -> Result<Json<StatResponse>> {
    let root = parse_root(&root)?;
    let target = crate::fs::FsOps::parse_path_or_index(q.path.as_deref(), q.index_path.as_deref())?;
    let resolved = state.fs.stat(root, &target).await?;
    let body = match resolved {
        StatResult::File { size, content_type } => {
            StatResponse { kind: "file", size: Some(size), content_type: Some(content_type), child_count: None }
        }
        StatResult::Dir { child_count } => StatResponse { kind: "dir", size: None, content_type: None, child_count: Some(child_count) },
    };
    Ok(Json(body))
}

async fn read(
    State(state): State<SharedAppState>,
    Path(root): Path<String>,
    Query(q): Query<PathQuery>,
) -> Result<axum::response::Response> {
    use axum::response::IntoResponse;

    let root = parse_root(&root)?;
    let target = crate::fs::FsOps::parse_path_or_index(q.path.as_deref(), q.index_path.as_deref())?;
    let (bytes, content_type, _size) = state.fs.read(root, &target).await?;
    Ok(([(axum::http::header::CONTENT_TYPE, content_type)], bytes).into_response())
}

#[derive(Serialize)]
struct WriteResponse {
    new_root: String,
    created: bool,
}

async fn write(
    State(state): State<SharedAppState>,
    Path(root): Path<String>,
    Query(q): Query<PathQuery>,
    headers: HeaderMap,
    ActingDelegate(delegate): ActingDelegate,
    body: axum::body::Bytes,
) -> Result<Json<WriteResponse>> {
    let root = parse_root(&root)?;
    let target = crate::fs::FsOps::parse_path_or_index(q.path.as_deref(), q.index_path.as_deref())?;

    let content_type = headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream");
    if !validate_content_type(content_type).is_valid {
        return Err(CoreError::validation("FAIL_BAD_FILEINFO", "invalid Content-Type for a CAS file node"));
    }

    let outcome = state.fs.write(root, &target, body.to_vec(), content_type, &delegate).await?;
    Ok(Json(WriteResponse { new_root: outcome.new_root.to_string(), created: outcome.created }))
}

#[derive(Deserialize)]
struct MkdirQuery {
    path: String,
}

#[derive(Serialize)]
struct MkdirResponse {
    new_root: String,
    created: bool,
}

async fn mkdir(
    State(state): State<SharedAppState>,
    Path(root): Path<String>,
    Query(q): Query<MkdirQuery>,
) -> Result<Json<MkdirResponse>> {
    let root = parse_root(&root)?;
    let (new_root, created) = state.fs.mkdir(root, &q.path).await?;
    Ok(Json(MkdirResponse { new_root: new_root.to_string(), created }))
}

#[derive(Serialize)]
struct RmResponse {
    new_root: String,
    removed_kind: &'static str,
    removed_key: String,
}

async fn rm(
    State(state): State<SharedAppState>,
    Path(root): Path<String>,
    Query(q): Query<PathQuery>,
) -> Result<Json<RmResponse>> {
    let root = parse_root(&root)?;
    let target = crate::fs::FsOps::parse_path_or_index(q.path.as_deref(), q.index_path.as_deref())?;
    let (new_root, removed) = state.fs.rm(root, &target).await?;
    let kind = match removed.kind {
        crate::codec::NodeKind::FNode => "file",
        crate::codec::NodeKind::SNode => "file_chunk",
        crate::codec::NodeKind::DNode => "dir",
        crate::codec::NodeKind::SetNode => "set",
    };
    Ok(Json(RmResponse { new_root: new_root.to_string(), removed_kind: kind, removed_key: removed.key.to_string() }))
}

#[derive(Deserialize)]
struct MvCpRequest {
    from: String,
    to: String,
}

#[derive(Serialize)]
struct RootResponse {
    new_root: String,
}

async fn mv(State(state): State<SharedAppState>, Path(root): Path<String>, Json(req): Json<MvCpRequest>) -> Result<Json<RootResponse>> {
    let root = parse_root(&root)?;
    let new_root = state.fs.mv(root, &req.from, &req.to).await?;
    Ok(Json(RootResponse { new_root: new_root.to_string() }))
}

async fn cp(State(state): State<SharedAppState>, Path(root): Path<String>, Json(req): Json<MvCpRequest>) -> Result<Json<RootResponse>> {
    let root = parse_root(&root)?;
    let new_root = state.fs.cp(root, &req.from, &req.to).await?;
    Ok(Json(RootResponse { new_root: new_root.to_string() }))
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RewriteSpecWire {
    From { from: String },
    Dir,
    Link {
        link: String,
        #[serde(default)]
        proof: Option<String>,
    },
}

#[derive(Deserialize)]
struct RewriteRequest {
    entries: HashMap<String, RewriteSpecWire>,
    #[serde(default)]
    deletes: Vec<String>,
}

async fn rewrite(
    State(state): State<SharedAppState>,
    Path(root): Path<String>,
    headers: HeaderMap,
    ActingDelegate(delegate): ActingDelegate,
    Json(req): Json<RewriteRequest>,
) -> Result<Json<RootResponse>> {
    let root = parse_root(&root)?;

    let proof_header = headers.get("x-cas-proof").and_then(|v| v.to_str().ok()).unwrap_or("{}");
    let proof: ProofMap = parse_proof_header(proof_header)?;

    let mut entries = HashMap::with_capacity(req.entries.len());
    for (path, spec) in req.entries {
        let spec = match spec {
            RewriteSpecWire::From { from } => RewriteSpec::From(from),
            RewriteSpecWire::Dir => RewriteSpec::Dir,
            RewriteSpecWire::Link { link, .. } => RewriteSpec::Link(link.parse::<IdNodeKey>()?),
        };
        entries.insert(path, spec);
    }

    let new_root = state.fs.rewrite(root, &entries, &req.deletes, &delegate, &proof).await?;
    Ok(Json(RootResponse { new_root: new_root.to_string() }))
}

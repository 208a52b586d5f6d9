use actix_web::web;
use actix_web::HttpResponse;
use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::admin_ops::AdminOps;
use crate::auth::AuthenticatedKey;
use crate::error::OutboxError;
use crate::repos::Message;
use crate::submitter::AttachmentInput;
use crate::submitter::SubmitRequest;
use crate::submitter::Submitter;

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 200;

#[derive(Deserialize)]
pub struct SubmitBody {
    from_address: String,
    to: Vec<String>,
    cc: Option<Vec<String>>,
    bcc: Option<Vec<String>>,
    #[serde(default)]
    subject: String,
    #[serde(default)]
    body: String,
    #[serde(default = "default_body_type")]
    body_type: String,
    #[serde(default = "default_delivery_type")]
    delivery_type: String,
    source_app: Option<String>,
    #[serde(default)]
    attachments: Vec<AttachmentInput>,
}

fn default_body_type() -> String { "plain".to_string() }
fn default_delivery_type() -> String { "email".to_string() }

#[derive(Serialize)]
struct SubmitResponse {
    uuid: String,
    status: String,
    created_at: DateTime<Utc>,
}

/// Projection returned by `GET /api/v1/messages/{uuid}` (spec §6.1).
#[derive(Serialize)]
struct MessageProjection {
    uuid: String,
    status: String,
    delivery_type: String,
    from_address: String,
    to: Vec<String>,
    cc: Vec<String>,
    bcc: Vec<String>,
    subject: String,
    body_type: String,
    retries_remaining: i64,
    last_error: Option<String>,
    source_app: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    sent_at: Option<DateTime<Utc>>,
}

impl From<&Message> for MessageProjection {
    fn from(m: &Message) -> Self {
        Self {
            uuid: m.uuid.clone(),
            status: m.status.clone(),
            delivery_type: m.delivery_type.clone(),
            from_address: m.from_address.clone(),
            to: m.to_list(),
            cc: m.cc_list(),
            bcc: m.bcc_list(),
            subject: m.subject.clone(),
            body_type: m.body_type.clone(),
            retries_remaining: m.retries_remaining,
            last_error: m.last_error.clone(),
            source_app: m.source_app.clone(),
            created_at: m.created_at,
            updated_at: m.updated_at,
            sent_at: m.sent_at,
        }
    }
}

#[derive(Serialize)]
struct StatusResponse {
    uuid: String,
    status: String,
}

impl From<&Message> for StatusResponse {
    fn from(m: &Message) -> Self { Self { uuid: m.uuid.clone(), status: m.status.clone() } }
}

pub async fn submit(
    _auth: AuthenticatedKey,
    body: web::Json<SubmitBody>,
    submitter: web::Data<Submitter>,
) -> Result<HttpResponse, OutboxError> {
    let body = body.into_inner();
    let req = SubmitRequest {
        from_address: body.from_address,
        to: body.to,
        cc: body.cc,
        bcc: body.bcc,
        subject: body.subject,
        body: body.body,
        body_type: body.body_type,
        delivery_type: body.delivery_type,
        source_app: body.source_app,
        source_api_key_id: Some(_auth.0.id),
        attachments: body.attachments,
    };

    let msg = submitter.submit(req).await?;
    Ok(HttpResponse::Created().json(SubmitResponse {
        uuid: msg.uuid,
        status: msg.status,
        created_at: msg.created_at,
    }))
}

pub async fn get(
    _auth: AuthenticatedKey,
    path: web::Path<String>,
    admin: web::Data<AdminOps>,
) -> Result<HttpResponse, OutboxError> {
    let msg = admin.get(&path.into_inner()).await?.ok_or(OutboxError::NotFound)?;
    Ok(HttpResponse::Ok().json(MessageProjection::from(&msg)))
}

#[derive(Deserialize)]
pub struct ListQuery {
    status: Option<String>,
    search: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Serialize)]
struct ListResponse {
    messages: Vec<MessageProjection>,
    total: i64,
    limit: i64,
    offset: i64,
}

pub async fn list(
    _auth: AuthenticatedKey,
    query: web::Query<ListQuery>,
    admin: web::Data<AdminOps>,
) -> Result<HttpResponse, OutboxError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = query.offset.unwrap_or(0).max(0);

    let messages =
        admin.list(query.status.as_deref(), query.search.as_deref(), limit, offset).await?;
    let total = admin.count(query.status.as_deref()).await?;

    Ok(HttpResponse::Ok().json(ListResponse {
        messages: messages.iter().map(MessageProjection::from).collect(),
        total,
        limit,
        offset,
    }))
}

pub async fn retry(
    _auth: AuthenticatedKey,
    path: web::Path<String>,
    admin: web::Data<AdminOps>,
) -> Result<HttpResponse, OutboxError> {
    let msg = admin.retry(&path.into_inner(), "api").await?;
    Ok(HttpResponse::Ok().json(StatusResponse::from(&msg)))
}

pub async fn cancel(
    _auth: AuthenticatedKey,
    path: web::Path<String>,
    admin: web::Data<AdminOps>,
) -> Result<HttpResponse, OutboxError> {
    let msg = admin.cancel(&path.into_inner(), "api").await?;
    Ok(HttpResponse::Ok().json(StatusResponse::from(&msg)))
}

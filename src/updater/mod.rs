//! The aggregate update pipeline.
//!
//! Every nested-collection endpoint funnels through [`AmbulanceUpdater::run`]:
//! load the ambulance, hand it to a mutation function, persist the result if
//! the mutation asked for it, and answer the request. Error mapping, store
//! latency metrics, the waiting-list gauge and the tracing span all live here
//! so mutation functions only deal with their own collection.

mod error;

pub use error::ApiError;

use std::sync::Arc;
use std::time::Instant;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::{debug, field, info_span, Instrument, Span};

use crate::model::{generate_id, Ambulance, NEW_ID};
use crate::observability::{self, WaitingListGauges};
use crate::store::{DocumentStore, StoreError};

pub type SharedStore = Arc<dyn DocumentStore<Ambulance>>;

/// Status and optional JSON body of a successful request.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply<T> {
    status: StatusCode,
    body: Option<T>,
}

impl<T> Reply<T> {
    /// 200 with a body.
    pub fn ok(body: T) -> Self {
        Self::with_status(StatusCode::OK, body)
    }

    pub fn with_status(status: StatusCode, body: T) -> Self {
        Self {
            status,
            body: Some(body),
        }
    }

    /// 204 with an empty body.
    pub fn no_content() -> Self {
        Self {
            status: StatusCode::NO_CONTENT,
            body: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> Option<&T> {
        self.body.as_ref()
    }

    pub fn into_body(self) -> Option<T> {
        self.body
    }
}

impl<T: Serialize> IntoResponse for Reply<T> {
    fn into_response(self) -> Response {
        match self.body {
            Some(body) => (self.status, Json(body)).into_response(),
            None => self.status.into_response(),
        }
    }
}

/// What a mutation function decided.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation<T> {
    /// Nothing to store; answer with the reply.
    ReadOnly(Reply<T>),
    /// Write the whole ambulance back, then answer with the reply.
    Persist(Ambulance, Reply<T>),
}

impl<T> Mutation<T> {
    pub fn reply(&self) -> &Reply<T> {
        match self {
            Mutation::ReadOnly(reply) | Mutation::Persist(_, reply) => reply,
        }
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self, Mutation::ReadOnly(_))
    }
}

/// Mark the current span failed and log the store error.
fn store_failed(operation: &str, err: &StoreError) {
    Span::current().record("otel.status_code", "ERROR");
    tracing::error!("{operation} failed: {err}");
}

pub struct AmbulanceUpdater {
    store: SharedStore,
    gauges: Arc<WaitingListGauges>,
}

impl AmbulanceUpdater {
    pub fn new(store: SharedStore, gauges: Arc<WaitingListGauges>) -> Self {
        observability::describe_db_metrics();
        Self { store, gauges }
    }

    pub fn gauges(&self) -> &Arc<WaitingListGauges> {
        &self.gauges
    }

    /// Load → mutate → persist if asked → reply.
    ///
    /// `operation` labels the span and the request counter. The mutation
    /// receives the freshly loaded ambulance by value; returning
    /// [`Mutation::Persist`] writes it back as a whole.
    pub async fn run<T, F>(
        &self,
        operation: &'static str,
        ambulance_id: &str,
        mutate: F,
    ) -> Result<Reply<T>, ApiError>
    where
        T: Send,
        F: FnOnce(Ambulance) -> Result<Mutation<T>, ApiError> + Send,
    {
        let span = info_span!(
            "update_ambulance",
            operation,
            ambulance_id,
            otel.status_code = field::Empty
        );
        let result = self.execute(ambulance_id, mutate).instrument(span).await;

        let status = match &result {
            Ok(reply) => reply.status(),
            Err(err) => err.status(),
        };
        metrics::counter!(
            observability::REQUESTS_TOTAL,
            "operation" => operation,
            "status" => status.as_str().to_owned()
        )
        .increment(1);
        result
    }

    async fn execute<T, F>(&self, ambulance_id: &str, mutate: F) -> Result<Reply<T>, ApiError>
    where
        F: FnOnce(Ambulance) -> Result<Mutation<T>, ApiError>,
    {
        debug!("finding document in database");
        let start = Instant::now();
        let found = self.store.find(ambulance_id).await;
        let name = found.as_ref().map(|a| a.name.clone()).unwrap_or_default();
        observability::record_db_time("find", ambulance_id, &name, start.elapsed());

        let ambulance = match found {
            Ok(ambulance) => ambulance,
            Err(err) => {
                store_failed("find", &err);
                return Err(if err.is_not_found() {
                    ApiError::missing_document("Ambulance not found", &err)
                } else {
                    ApiError::upstream("Failed to load ambulance from database", &err)
                });
            }
        };

        let (updated, reply) = match mutate(ambulance)? {
            Mutation::ReadOnly(reply) => return Ok(reply),
            Mutation::Persist(updated, reply) => (updated, reply),
        };

        debug!("updating ambulance in database");
        let start = Instant::now();
        let saved = self.store.update(ambulance_id, &updated).await;
        observability::record_db_time("update", ambulance_id, &name, start.elapsed());

        match saved {
            Ok(()) => {
                self.gauges.record(ambulance_id, updated.waiting_list.len());
                Ok(reply)
            }
            Err(err) => {
                store_failed("update", &err);
                Err(if err.is_not_found() {
                    ApiError::missing_document(
                        "Ambulance was deleted while processing the request",
                        &err,
                    )
                } else {
                    ApiError::upstream("Failed to update ambulance in database", &err)
                })
            }
        }
    }

    /// Store a new ambulance. An empty or `@new` id is replaced with a fresh one.
    pub async fn create_ambulance(&self, mut ambulance: Ambulance) -> Result<Reply<Ambulance>, ApiError> {
        if ambulance.id.is_empty() || ambulance.id == NEW_ID {
            ambulance.id = generate_id();
        }
        let span = info_span!(
            "create_ambulance",
            ambulance_id = %ambulance.id,
            otel.status_code = field::Empty
        );
        async move {
            let start = Instant::now();
            let created = self.store.create(&ambulance.id, &ambulance).await;
            observability::record_db_time("create", &ambulance.id, &ambulance.name, start.elapsed());
            match created {
                Ok(()) => {
                    self.gauges.record(&ambulance.id, ambulance.waiting_list.len());
                    Ok(Reply::with_status(StatusCode::CREATED, ambulance))
                }
                Err(StoreError::AlreadyExists) => Err(ApiError::conflict("Ambulance already exists")),
                Err(err) => {
                    store_failed("create", &err);
                    Err(ApiError::upstream("Failed to create ambulance in database", &err))
                }
            }
        }
        .instrument(span)
        .await
    }

    pub async fn delete_ambulance(&self, ambulance_id: &str) -> Result<Reply<()>, ApiError> {
        let span = info_span!(
            "delete_ambulance",
            ambulance_id,
            otel.status_code = field::Empty
        );
        async move {
            let start = Instant::now();
            let deleted = self.store.delete(ambulance_id).await;
            observability::record_db_time("delete", ambulance_id, "", start.elapsed());
            match deleted {
                Ok(()) => {
                    self.gauges.forget(ambulance_id);
                    Ok(Reply::no_content())
                }
                Err(err) if err.is_not_found() => {
                    Err(ApiError::missing_document("Ambulance not found", &err))
                }
                Err(err) => {
                    store_failed("delete", &err);
                    Err(ApiError::upstream("Failed to delete ambulance from database", &err))
                }
            }
        }
        .instrument(span)
        .await
    }
}

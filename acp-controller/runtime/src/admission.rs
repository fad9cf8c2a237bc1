use crate::{
    metrics::{AdmissionMetrics, ReviewOutcome},
    review::{Dispatcher, Operation, ReviewRequest},
};
use futures::future;
use http_body_util::BodyExt;
use hyper::{http, Request, Response};
use kube::core::{admission, DynamicObject};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

#[derive(Clone)]
pub struct Admission {
    dispatcher: Arc<Dispatcher>,
    metrics: AdmissionMetrics,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read request body: {0}")]
    Request(#[from] hyper::Error),

    #[error("failed to encode json response: {0}")]
    Json(#[from] serde_json::Error),
}

type Review = admission::AdmissionReview<DynamicObject>;
type AdmissionRequest = admission::AdmissionRequest<DynamicObject>;
type AdmissionResponse = admission::AdmissionResponse;

type Body = http_body_util::Full<bytes::Bytes>;

// === impl Admission ===

impl tower::Service<Request<hyper::body::Incoming>> for Admission {
    type Response = Response<Body>;
    type Error = Error;
    type Future = future::BoxFuture<'static, Result<Response<Body>, Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::result::Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<hyper::body::Incoming>) -> Self::Future {
        trace!(?req);
        if req.method() != http::Method::POST || req.uri().path() != "/" {
            return Box::pin(future::ok(
                Response::builder()
                    .status(http::StatusCode::NOT_FOUND)
                    .body(Body::default())
                    .expect("not found response must be valid"),
            ));
        }

        let admission = self.clone();
        Box::pin(async move {
            let bytes = req.into_body().collect().await?.to_bytes();
            json_response(admission.handle(&bytes).await)
        })
    }
}

impl Admission {
    pub fn new(dispatcher: Arc<Dispatcher>, metrics: AdmissionMetrics) -> Self {
        Self {
            dispatcher,
            metrics,
        }
    }

    /// Answers an encoded `AdmissionReview`.
    async fn handle(self, body: &[u8]) -> Review {
        let review: Review = match serde_json::from_slice(body) {
            Ok(review) => review,
            Err(error) => {
                warn!(%error, "Failed to parse request body");
                return AdmissionResponse::invalid(error).into_review();
            }
        };
        trace!(?review);

        let rsp = match review.try_into() {
            Ok(req) => {
                debug!(?req);
                self.admit(req).await
            }
            Err(error) => {
                warn!(%error, "Invalid admission request");
                AdmissionResponse::invalid(error)
            }
        };
        debug!(?rsp);
        rsp.into_review()
    }

    async fn admit(self, req: AdmissionRequest) -> AdmissionResponse {
        let rsp = AdmissionResponse::from(&req);
        let kind = req.kind.kind.clone();
        let ns = req.namespace.clone().unwrap_or_default();
        let name = req.name.clone();

        let review = match review_request(req) {
            Ok(review) => review,
            Err(error) => {
                info!(%error, %ns, %name, %kind, "Failed to decode object");
                self.metrics.observe(None, ReviewOutcome::Denied);
                return rsp.deny(error);
            }
        };

        let reviewer = match self.dispatcher.reviewer(&review) {
            Ok(Some(reviewer)) => reviewer,
            Ok(None) => {
                debug!(%ns, %name, %kind, "Skipped");
                self.metrics.observe(None, ReviewOutcome::Skipped);
                return rsp;
            }
            Err(error) => {
                info!(%error, %ns, %name, %kind, "Denied");
                self.metrics.observe(None, ReviewOutcome::Denied);
                return rsp.deny(error);
            }
        };

        let patch = match reviewer.review(&review).await {
            Ok(patch) => patch,
            Err(error) => {
                info!(%error, %ns, %name, %kind, reviewer = reviewer.name(), "Denied");
                self.metrics
                    .observe(Some(reviewer.name()), ReviewOutcome::Denied);
                return rsp.deny(error);
            }
        };

        let Some(patch) = patch else {
            debug!(%ns, %name, %kind, reviewer = reviewer.name(), "Unchanged");
            self.metrics
                .observe(Some(reviewer.name()), ReviewOutcome::Unchanged);
            return rsp;
        };

        // The response is needed again if the patch cannot be encoded.
        match rsp.clone().with_patch(patch) {
            Ok(rsp) => {
                info!(%ns, %name, %kind, reviewer = reviewer.name(), "Patched");
                self.metrics
                    .observe(Some(reviewer.name()), ReviewOutcome::Patched);
                rsp
            }
            Err(error) => {
                info!(%error, %ns, %name, %kind, reviewer = reviewer.name(), "Denied");
                self.metrics
                    .observe(Some(reviewer.name()), ReviewOutcome::Denied);
                rsp.deny(error)
            }
        }
    }
}

/// Extracts the fields reviewers act on from an admission request.
fn review_request(req: AdmissionRequest) -> Result<ReviewRequest, serde_json::Error> {
    let operation = match req.operation {
        admission::Operation::Create => Operation::Create,
        admission::Operation::Update => Operation::Update,
        admission::Operation::Delete => Operation::Delete,
        admission::Operation::Connect => Operation::Connect,
    };
    Ok(ReviewRequest {
        kind: req.kind,
        operation,
        namespace: req.namespace,
        name: req.name,
        object: req.object.map(serde_json::to_value).transpose()?,
        old_object: req.old_object.map(serde_json::to_value).transpose()?,
    })
}

fn json_response(rsp: Review) -> Result<Response<Body>, Error> {
    let bytes = serde_json::to_vec(&rsp)?;
    Ok(Response::builder()
        .status(http::StatusCode::OK)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(bytes))
        .expect("admission review response must be valid"))
}

#[cfg(test)]
impl Admission {
    pub(crate) async fn handle_json(self, review: serde_json::Value) -> serde_json::Value {
        let body = serde_json::to_vec(&review).expect("review must encode");
        serde_json::to_value(self.handle(&body).await).expect("review must encode")
    }
}

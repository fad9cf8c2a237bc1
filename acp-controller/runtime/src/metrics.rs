use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};

#[derive(Clone, Debug)]
pub(crate) struct AdmissionMetrics {
    reviews: Family<ReviewLabels, Counter>,
}

#[derive(Clone, Debug)]
pub(crate) struct AuthMetrics {
    requests: Family<AuthLabels, Counter>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum ReviewOutcome {
    Patched,
    Unchanged,
    Skipped,
    Denied,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum AuthOutcome {
    Accepted,
    Rejected,
    NotFound,
    Error,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct ReviewLabels {
    reviewer: &'static str,
    outcome: &'static str,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct AuthLabels {
    outcome: &'static str,
}

// === impl AdmissionMetrics ===

impl AdmissionMetrics {
    pub(crate) fn register(reg: &mut Registry) -> Self {
        let reviews = Family::<ReviewLabels, Counter>::default();
        reg.register(
            "admission_reviews",
            "Total number of admission reviews by reviewer and outcome",
            reviews.clone(),
        );
        Self { reviews }
    }

    /// Records a review. Requests no reviewer claimed are recorded with an
    /// empty reviewer label.
    pub(crate) fn observe(&self, reviewer: Option<&'static str>, outcome: ReviewOutcome) {
        self.reviews
            .get_or_create(&ReviewLabels {
                reviewer: reviewer.unwrap_or_default(),
                outcome: outcome.as_str(),
            })
            .inc();
    }
}

// === impl AuthMetrics ===

impl AuthMetrics {
    pub(crate) fn register(reg: &mut Registry) -> Self {
        let requests = Family::<AuthLabels, Counter>::default();
        reg.register(
            "acp_auth_requests",
            "Total number of requests handled by the ACP auth server by outcome",
            requests.clone(),
        );
        Self { requests }
    }

    pub(crate) fn observe(&self, outcome: AuthOutcome) {
        self.requests
            .get_or_create(&AuthLabels {
                outcome: outcome.as_str(),
            })
            .inc();
    }
}

// === impl ReviewOutcome ===

impl ReviewOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Patched => "patched",
            Self::Unchanged => "unchanged",
            Self::Skipped => "skipped",
            Self::Denied => "denied",
        }
    }
}

// === impl AuthOutcome ===

impl AuthOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::NotFound => "not_found",
            Self::Error => "error",
        }
    }
}

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use acp_controller_admission as review;
pub use acp_controller_core as core;
pub use acp_controller_k8s_api as k8s;
pub use acp_controller_k8s_index as index;

mod admission;
mod args;
mod auth;
mod metrics;
mod store;


pub use self::args::Args;

use self::core::PolicyGetter;
use std::sync::Arc;

/// Serves ingress class lookups from the cluster-wide class index.
#[derive(Clone, Debug)]
struct IngressClassIndex(index::ingress_class::SharedIndex);

/// Serves policy lookups from the policy index.
#[derive(Clone, Debug)]
struct PolicyIndex(index::policy::SharedIndex);

// === impl IngressClassIndex ===

impl IngressClassIndex {
    pub fn new(index: index::ingress_class::SharedIndex) -> Self {
        Self(index)
    }
}

impl core::IngressClasses for IngressClassIndex {
    fn get_controller(&self, class_name: &str) -> Option<core::Controller> {
        self.0.read().controller(class_name)
    }

    fn get_default_controller(&self) -> Result<Option<core::Controller>, core::IngressClassError> {
        self.0.read().default_controller()
    }
}

// === impl PolicyIndex ===

impl PolicyIndex {
    pub fn new(index: index::policy::SharedIndex) -> Self {
        Self(index)
    }

    /// Returns the request handler of the named policy, if the auth server
    /// can evaluate it.
    fn handler(&self, canonical_name: &str) -> Option<Arc<core::apikey::Handler>> {
        self.0.read().get(canonical_name)?.handler.clone()
    }
}

impl PolicyGetter for PolicyIndex {
    fn get_config(
        &self,
        canonical_name: &str,
    ) -> Result<Arc<core::PolicyConfig>, core::PolicyError> {
        self.0.read().get_config(canonical_name)
    }
}

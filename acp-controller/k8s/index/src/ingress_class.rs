use acp_controller_core::{Controller, IngressClassError};
use acp_controller_k8s_api::{IngressClass, ResourceExt};
use ahash::AHashMap as HashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::info_span;

/// Marks the cluster's default ingress class.
pub const ANNOTATION_DEFAULT_CLASS: &str = "ingressclass.kubernetes.io/is-default-class";

pub type SharedIndex = Arc<RwLock<Index>>;

#[derive(Debug, Default)]
pub struct Index {
    by_name: HashMap<String, Class>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Class {
    /// The raw `spec.controller` value.
    controller: String,
    is_default: bool,
}

// === impl Index ===

impl Index {
    pub fn shared() -> SharedIndex {
        Arc::new(RwLock::new(Self::default()))
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn controller(&self, name: &str) -> Option<Controller> {
        self.by_name
            .get(name)
            .and_then(|class| Controller::from_class_controller(&class.controller))
    }

    /// Returns the controller of the default ingress class.
    ///
    /// Several classes may be marked as default as long as they share the
    /// same controller.
    pub fn default_controller(&self) -> Result<Option<Controller>, IngressClassError> {
        let mut defaults = self
            .by_name
            .iter()
            .filter(|(_, class)| class.is_default)
            .collect::<Vec<_>>();
        defaults.sort_by(|(a, _), (b, _)| a.cmp(b));

        let Some(((first_name, first), rest)) = defaults.split_first() else {
            return Ok(None);
        };
        if let Some((name, _)) = rest
            .iter()
            .find(|(_, class)| class.controller != first.controller)
        {
            return Err(IngressClassError::ConflictingDefaults(
                first_name.to_string(),
                name.to_string(),
            ));
        }

        Ok(Controller::from_class_controller(&first.controller))
    }
}

impl kubert::index::IndexClusterResource<IngressClass> for Index {
    fn apply(&mut self, class: IngressClass) {
        let name = class.name_unchecked();
        let _span = info_span!("apply", %name).entered();

        let is_default = class
            .annotations()
            .get(ANNOTATION_DEFAULT_CLASS)
            .is_some_and(|v| v == "true");
        let controller = class
            .spec
            .and_then(|spec| spec.controller)
            .unwrap_or_default();

        if Controller::from_class_controller(&controller).is_none() {
            tracing::debug!(%controller, "Unsupported ingress controller");
        }

        tracing::debug!(%controller, is_default, "Indexing IngressClass");
        self.by_name.insert(
            name,
            Class {
                controller,
                is_default,
            },
        );
    }

    fn delete(&mut self, name: String) {
        let _span = info_span!("delete", %name).entered();
        if self.by_name.remove(&name).is_some() {
            tracing::debug!("Deleted IngressClass");
        }
    }
}

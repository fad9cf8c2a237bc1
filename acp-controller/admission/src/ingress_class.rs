use crate::{Error, ReviewRequest};
use acp_controller_core::{Controller, IngressClasses};
use serde::Deserialize;

/// Legacy annotation naming the ingress class of an `Ingress`.
pub const ANNOTATION_INGRESS_CLASS: &str = "kubernetes.io/ingress.class";

/// Legacy class name implicitly handled by the community Nginx controller,
/// whether or not a matching `IngressClass` exists.
const LEGACY_NGINX_CLASS: &str = "nginx";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IngressSpec {
    ingress_class_name: Option<String>,
}

/// Determines the controller responsible for the `Ingress` under review.
///
/// The class is taken from `spec.ingressClassName`, then from the legacy
/// annotation, and falls back to the cluster's default class. Returns `None`
/// when the class is unknown or implemented by an unsupported controller.
pub fn resolve(
    classes: &dyn IngressClasses,
    req: &ReviewRequest,
) -> Result<Option<Controller>, Error> {
    let ingress = req.parse::<IngressSpec>()?;

    let class_name = ingress
        .spec
        .and_then(|spec| spec.ingress_class_name)
        .filter(|name| !name.is_empty());
    if let Some(name) = class_name {
        return Ok(classes.get_controller(&name));
    }

    let annotated = ingress
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(ANNOTATION_INGRESS_CLASS))
        .filter(|name| !name.is_empty());
    if let Some(name) = annotated {
        if name == LEGACY_NGINX_CLASS {
            return Ok(Some(Controller::NginxCommunity));
        }
        return Ok(classes.get_controller(name));
    }

    Ok(classes.get_default_controller()?)
}

use super::*;
use crate::ingress_class::Index;
use acp_controller_core::{Controller, IngressClassError};
use kubert::index::IndexClusterResource;

#[test]
fn resolves_supported_controllers() {
    let _tracing = init_tracing();
    let mut index = Index::default();
    index.apply(mk_ingress_class("nginx", Controller::NGINX_COMMUNITY, false));
    index.apply(mk_ingress_class("nginx-plus", Controller::NGINX_OFFICIAL, false));
    index.apply(mk_ingress_class("traefik", Controller::TRAEFIK, false));
    index.apply(mk_ingress_class("haproxy", "haproxy.org/ingress-controller", false));

    assert_eq!(index.len(), 4);
    assert_eq!(index.controller("nginx"), Some(Controller::NginxCommunity));
    assert_eq!(index.controller("nginx-plus"), Some(Controller::NginxOfficial));
    assert_eq!(index.controller("traefik"), Some(Controller::Traefik));
    assert_eq!(index.controller("haproxy"), None);
    assert_eq!(index.controller("missing"), None);
    assert_eq!(index.default_controller(), Ok(None));
}

#[test]
fn tracks_default_class() {
    let _tracing = init_tracing();
    let mut index = Index::default();
    index.apply(mk_ingress_class("nginx", Controller::NGINX_COMMUNITY, false));
    index.apply(mk_ingress_class("traefik", Controller::TRAEFIK, true));
    assert_eq!(index.default_controller(), Ok(Some(Controller::Traefik)));

    // Updating the class drops its default marker.
    index.apply(mk_ingress_class("traefik", Controller::TRAEFIK, false));
    assert_eq!(index.default_controller(), Ok(None));

    index.apply(mk_ingress_class("traefik", Controller::TRAEFIK, true));
    index.delete("traefik".to_string());
    assert_eq!(index.default_controller(), Ok(None));
}

#[test]
fn defaults_must_agree() {
    let _tracing = init_tracing();
    let mut index = Index::default();
    index.apply(mk_ingress_class("traefik-a", Controller::TRAEFIK, true));
    index.apply(mk_ingress_class("traefik-b", Controller::TRAEFIK, true));
    assert_eq!(index.default_controller(), Ok(Some(Controller::Traefik)));

    index.apply(mk_ingress_class("nginx", Controller::NGINX_COMMUNITY, true));
    assert_eq!(
        index.default_controller(),
        Err(IngressClassError::ConflictingDefaults(
            "nginx".to_string(),
            "traefik-a".to_string()
        ))
    );
}

#[test]
fn ignores_other_annotation_values() {
    let mut class = mk_ingress_class("traefik", Controller::TRAEFIK, true);
    class.metadata.annotations = Some(btreemap! {
        crate::ingress_class::ANNOTATION_DEFAULT_CLASS.to_string() => "True".to_string(),
    });

    let mut index = Index::default();
    index.apply(class);
    assert_eq!(index.default_controller(), Ok(None));
}

use super::*;
use crate::policy::{Index, InvalidPolicy, Policy};
use acp_controller_core::{apikey, PolicyConfig, PolicyError, PolicyGetter};
use kubert::index::{IndexClusterResource, IndexNamespacedResource};

#[test]
fn indexes_by_canonical_name() {
    let _tracing = init_tracing();
    let mut index = Index::default();
    index.apply(mk_policy("ns-0", "my-policy", api_key_spec()));

    let config = index.get_config("my-policy@ns-0").expect("policy must exist");
    assert!(matches!(*config, PolicyConfig::ApiKey(_)));
    assert_eq!(
        index.get_config("my-policy@ns-1"),
        Err(PolicyError::NotFound("my-policy@ns-1".to_string()))
    );

    let handler = index
        .get("my-policy@ns-0")
        .and_then(|p| p.handler.clone())
        .expect("API key policies must have a handler");
    assert_eq!(handler.name(), "my-policy@ns-0");

    index.delete("ns-0".to_string(), "my-policy".to_string());
    assert!(index.is_empty());
}

#[test]
fn handlers_authenticate() {
    let mut index = Index::default();
    index.apply(mk_policy("ns-0", "my-policy", api_key_spec()));
    let handler = index
        .get("my-policy@ns-0")
        .and_then(|p| p.handler.clone())
        .expect("handler must exist");

    let mut headers = http::HeaderMap::new();
    headers.insert("api-key", "secret".parse().unwrap());
    match handler.authenticate(&headers).unwrap() {
        apikey::Outcome::Accepted(forwarded) => {
            assert_eq!(forwarded.get("x-group").unwrap(), "dev");
        }
        apikey::Outcome::Rejected => panic!("key must be accepted"),
    }
}

#[test]
fn other_schemes_have_no_handler() {
    let mut index = Index::default();
    index.apply(mk_policy(
        "ns-0",
        "basic",
        AccessControlPolicySpec {
            basic_auth: Some(k8s::policy::BasicAuth {
                users: vec!["user:hash".to_string()],
                forward_username_header: Some("X-User".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        },
    ));

    let policy = index.get("basic@ns-0").expect("policy must exist");
    assert!(policy.handler.is_none());
    assert_eq!(policy.config.forwarded_headers().into_vec(), vec!["X-User"]);
}

#[test]
fn invalid_policies_are_dropped() {
    let _tracing = init_tracing();
    let mut index = Index::default();
    index.apply(mk_policy("ns-0", "my-policy", api_key_spec()));
    assert_eq!(index.len(), 1);

    // An update that invalidates the policy removes it.
    index.apply(mk_policy("ns-0", "my-policy", AccessControlPolicySpec::default()));
    assert!(index.get("my-policy@ns-0").is_none());

    let mut spec = api_key_spec();
    spec.jwt = Some(Default::default());
    index.apply(mk_policy("ns-0", "ambiguous", spec));
    assert!(index.get("ambiguous@ns-0").is_none());

    let mut spec = api_key_spec();
    if let Some(api_key) = spec.api_key.as_mut() {
        let dup = api_key.keys[0].clone();
        api_key.keys.push(dup);
    }
    index.apply(mk_policy("ns-0", "duplicated", spec));
    assert!(index.is_empty());
}

#[test]
fn build_errors() {
    assert_eq!(
        Policy::build("p@ns", AccessControlPolicySpec::default()).unwrap_err(),
        InvalidPolicy::Empty
    );

    let mut spec = api_key_spec();
    spec.basic_auth = Some(Default::default());
    spec.digest_auth = Some(Default::default());
    assert_eq!(
        Policy::build("p@ns", spec).unwrap_err(),
        InvalidPolicy::Ambiguous(3)
    );

    let mut spec = api_key_spec();
    if let Some(api_key) = spec.api_key.as_mut() {
        api_key.header = None;
    }
    assert_eq!(
        Policy::build("p@ns", spec).unwrap_err(),
        InvalidPolicy::ApiKey(apikey::Error::NoLocation)
    );
}

#[test]
fn forwarded_header_names_must_be_tokens() {
    let _tracing = init_tracing();
    let injected = "X-A $x; } location /admin { return 200";

    let mut spec = api_key_spec();
    if let Some(api_key) = spec.api_key.as_mut() {
        api_key
            .forward_headers
            .insert(injected.to_string(), "group".to_string());
    }
    assert_eq!(
        Policy::build("p@ns", spec.clone()).unwrap_err(),
        InvalidPolicy::HeaderName(injected.to_string())
    );

    let basic = AccessControlPolicySpec {
        basic_auth: Some(k8s::policy::BasicAuth {
            forward_username_header: Some("X-User\nX-Other".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    };
    assert!(matches!(
        Policy::build("p@ns", basic).unwrap_err(),
        InvalidPolicy::HeaderName(_)
    ));

    let mut index = Index::default();
    index.apply(mk_policy("ns-0", "my-policy", spec));
    assert!(index.get("my-policy@ns-0").is_none());
}

#[test]
fn metrics_report_index_sizes() {
    let classes = crate::ingress_class::Index::shared();
    let policies = Index::shared();
    policies
        .write()
        .apply(mk_policy("ns-0", "my-policy", api_key_spec()));
    classes.write().apply(mk_ingress_class(
        "traefik",
        acp_controller_core::Controller::TRAEFIK,
        true,
    ));

    let mut registry = prometheus_client::registry::Registry::default();
    crate::metrics::register(&mut registry, classes, policies);

    let mut text = String::new();
    prometheus_client::encoding::text::encode(&mut text, &registry).unwrap();
    assert!(text.contains("ingress_class_index_size 1"), "{text}");
    assert!(
        text.contains("access_control_policy_index_size{kind=\"APIKey\"} 1"),
        "{text}"
    );
}

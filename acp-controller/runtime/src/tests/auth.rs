use super::*;
use crate::{auth::AuthServer, metrics::AuthMetrics, PolicyIndex};
use http::{Request, StatusCode};

fn mk_server(cluster: &Cluster, reg: &mut Registry) -> AuthServer {
    AuthServer::new(
        PolicyIndex::new(cluster.policies.clone()),
        AuthMetrics::register(reg),
    )
}

fn get(path: &str, key: Option<&str>) -> Request<()> {
    let mut req = Request::get(path);
    if let Some(key) = key {
        req = req.header("api-key", key);
    }
    req.body(()).unwrap()
}

#[test]
fn accepts_known_keys() {
    let cluster = Cluster::new().with_policy("test", "my-policy", api_key_spec());
    let mut reg = Registry::default();
    let server = mk_server(&cluster, &mut reg);

    let rsp = server.authenticate(&get("/my-policy@test", Some("secret")));
    assert_eq!(rsp.status(), StatusCode::OK);
    assert_eq!(rsp.headers().get("x-group").unwrap(), "dev");
    assert_eq!(rsp.headers().get("x-key-id").unwrap(), "key-1");
}

#[test]
fn rejects_unknown_or_missing_keys() {
    let cluster = Cluster::new().with_policy("test", "my-policy", api_key_spec());
    let mut reg = Registry::default();
    let server = mk_server(&cluster, &mut reg);

    let rsp = server.authenticate(&get("/my-policy@test", Some("other")));
    assert_eq!(rsp.status(), StatusCode::UNAUTHORIZED);
    assert!(rsp.headers().is_empty());

    let rsp = server.authenticate(&get("/my-policy@test", None));
    assert_eq!(rsp.status(), StatusCode::UNAUTHORIZED);
}

#[test]
fn unknown_policies_are_not_found() {
    let cluster = Cluster::new()
        .with_policy("test", "my-policy", api_key_spec())
        .with_policy("test", "my-jwt", jwt_spec());
    let mut reg = Registry::default();
    let server = mk_server(&cluster, &mut reg);

    for path in [
        "/",
        "/other@test",
        "/my-policy@other",
        "/my-policy@test/sub",
        // Policies the auth server cannot evaluate.
        "/my-jwt@test",
    ] {
        let rsp = server.authenticate(&get(path, Some("secret")));
        assert_eq!(rsp.status(), StatusCode::NOT_FOUND, "{path}");
    }
}

#[test]
fn deleted_policies_stop_being_served() {
    let cluster = Cluster::new().with_policy("test", "my-policy", api_key_spec());
    let mut reg = Registry::default();
    let server = mk_server(&cluster, &mut reg);

    let rsp = server.authenticate(&get("/my-policy@test", Some("secret")));
    assert_eq!(rsp.status(), StatusCode::OK);

    cluster
        .policies
        .write()
        .delete("test".to_string(), "my-policy".to_string());
    let rsp = server.authenticate(&get("/my-policy@test", Some("secret")));
    assert_eq!(rsp.status(), StatusCode::NOT_FOUND);
}

#[test]
fn requests_are_counted_by_outcome() {
    let cluster = Cluster::new().with_policy("test", "my-policy", api_key_spec());
    let mut reg = Registry::default();
    let server = mk_server(&cluster, &mut reg);

    server.authenticate(&get("/my-policy@test", Some("secret")));
    server.authenticate(&get("/my-policy@test", Some("secret")));
    server.authenticate(&get("/my-policy@test", None));
    server.authenticate(&get("/other@test", None));

    let metrics = encode(&reg);
    assert!(
        metrics.contains("acp_auth_requests_total{outcome=\"accepted\"} 2"),
        "{metrics}"
    );
    assert!(
        metrics.contains("acp_auth_requests_total{outcome=\"rejected\"} 1"),
        "{metrics}"
    );
    assert!(
        metrics.contains("acp_auth_requests_total{outcome=\"not_found\"} 1"),
        "{metrics}"
    );
}

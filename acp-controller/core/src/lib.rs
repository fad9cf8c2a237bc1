#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod apikey;
pub mod controller;
pub mod headers;
pub mod policy;

pub use self::{
    controller::{Controller, IngressClassError, IngressClasses},
    headers::HeaderNames,
    policy::{canonical_name, PolicyConfig, PolicyError, PolicyGetter},
};

/// Annotation carrying the name of the ACP protecting an ingress resource.
pub const ANNOTATION_ACP: &str = "hub.traefik.io/access-control-policy";

pub const CONTROLLER_NAME: &str = "acp-controller";

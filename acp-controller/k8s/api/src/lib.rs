#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod policy;
pub mod traefik;

pub use self::policy::{AccessControlPolicy, AccessControlPolicySpec};
pub use k8s_openapi::api::networking::v1::{Ingress, IngressClass, IngressClassSpec};
pub use kube::{
    api::{ObjectMeta, Resource, ResourceExt},
    Client,
};

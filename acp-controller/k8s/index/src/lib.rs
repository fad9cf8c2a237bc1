//! ACP Controller Indexes
//!
//! The admission webhook and the ACP auth server serve from two indexes fed by
//! cluster watches:
//!
//! - The ingress class index maps `IngressClass` names to the controller
//!   implementing them and tracks the cluster's default class.
//! - The policy index holds the configuration of every `AccessControlPolicy`
//!   by canonical `name@namespace`, along with the request handlers built from
//!   them.
//!
//! Both are shared as `Arc<RwLock<_>>`. Watch tasks hold the write lock only to
//! apply an update; readers never wait on the network.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod ingress_class;
pub mod metrics;
pub mod policy;

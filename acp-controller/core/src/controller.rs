use std::fmt;

/// The ingress controller implementation governing an ingress resource.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Controller {
    /// kubernetes/ingress-nginx.
    NginxCommunity,
    /// nginxinc/kubernetes-ingress.
    NginxOfficial,
    Traefik,
}

/// Reads the cluster's ingress classes.
///
/// Implementations must serve from already-cached state.
pub trait IngressClasses {
    /// Returns the controller of the named ingress class, if the class exists
    /// and its controller is supported.
    fn get_controller(&self, class_name: &str) -> Option<Controller>;

    /// Returns the controller of the cluster's default ingress class.
    fn get_default_controller(&self) -> Result<Option<Controller>, IngressClassError>;
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IngressClassError {
    #[error("conflicting default ingress classes: {0} and {1}")]
    ConflictingDefaults(String, String),
}

// === impl Controller ===

impl Controller {
    pub const NGINX_COMMUNITY: &'static str = "k8s.io/ingress-nginx";
    pub const NGINX_OFFICIAL: &'static str = "nginx.org/ingress-controller";
    pub const TRAEFIK: &'static str = "traefik.io/ingress-controller";

    /// Parses the `spec.controller` value of an `IngressClass`.
    pub fn from_class_controller(controller: &str) -> Option<Self> {
        match controller {
            Self::NGINX_COMMUNITY => Some(Self::NginxCommunity),
            Self::NGINX_OFFICIAL => Some(Self::NginxOfficial),
            Self::TRAEFIK => Some(Self::Traefik),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NginxCommunity => "nginx-community",
            Self::NginxOfficial => "nginx-official",
            Self::Traefik => "traefik",
        }
    }
}

impl fmt::Display for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//! Kinds of cluster objects managed by the controller.

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod, Secret, Service, ServiceAccount};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use kube::api::ApiResource;
use kube::core::GroupVersionKind;

/// Every object kind the controller reads or writes besides the workspace itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Deployment,
    Service,
    Ingress,
    /// OpenShift `route.openshift.io/v1` Route
    Route,
    ServiceAccount,
    Secret,
    PersistentVolumeClaim,
    Role,
    RoleBinding,
    Pod,
    /// OpenShift `oauth.openshift.io/v1` OAuthClient (cluster scoped)
    OAuthClient,
}

impl ResourceKind {
    /// API resource used to build dynamic `Api` handles
    pub fn api_resource(self) -> ApiResource {
        match self {
            ResourceKind::Deployment => ApiResource::erase::<Deployment>(&()),
            ResourceKind::Service => ApiResource::erase::<Service>(&()),
            ResourceKind::Ingress => ApiResource::erase::<Ingress>(&()),
            ResourceKind::ServiceAccount => ApiResource::erase::<ServiceAccount>(&()),
            ResourceKind::Secret => ApiResource::erase::<Secret>(&()),
            ResourceKind::PersistentVolumeClaim => ApiResource::erase::<PersistentVolumeClaim>(&()),
            ResourceKind::Role => ApiResource::erase::<Role>(&()),
            ResourceKind::RoleBinding => ApiResource::erase::<RoleBinding>(&()),
            ResourceKind::Pod => ApiResource::erase::<Pod>(&()),
            ResourceKind::Route => ApiResource::from_gvk_with_plural(
                &GroupVersionKind::gvk("route.openshift.io", "v1", "Route"),
                "routes",
            ),
            ResourceKind::OAuthClient => ApiResource::from_gvk_with_plural(
                &GroupVersionKind::gvk("oauth.openshift.io", "v1", "OAuthClient"),
                "oauthclients",
            ),
        }
    }

    /// Cluster-scoped kinds ignore the namespace argument
    pub fn is_namespaced(self) -> bool {
        !matches!(self, ResourceKind::OAuthClient)
    }

    /// Kind name as it appears in `kind:`
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Deployment => "Deployment",
            ResourceKind::Service => "Service",
            ResourceKind::Ingress => "Ingress",
            ResourceKind::Route => "Route",
            ResourceKind::ServiceAccount => "ServiceAccount",
            ResourceKind::Secret => "Secret",
            ResourceKind::PersistentVolumeClaim => "PersistentVolumeClaim",
            ResourceKind::Role => "Role",
            ResourceKind::RoleBinding => "RoleBinding",
            ResourceKind::Pod => "Pod",
            ResourceKind::OAuthClient => "OAuthClient",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openshift_kinds_use_their_groups() {
        let route = ResourceKind::Route.api_resource();
        assert_eq!(route.group, "route.openshift.io");
        assert_eq!(route.plural, "routes");

        let oauth = ResourceKind::OAuthClient.api_resource();
        assert_eq!(oauth.api_version, "oauth.openshift.io/v1");
        assert!(!ResourceKind::OAuthClient.is_namespaced());
    }

    #[test]
    fn test_core_kinds_erase_to_core_group() {
        let service = ResourceKind::Service.api_resource();
        assert_eq!(service.group, "");
        assert_eq!(service.kind, "Service");
        assert_eq!(ResourceKind::Deployment.api_resource().group, "apps");
    }
}

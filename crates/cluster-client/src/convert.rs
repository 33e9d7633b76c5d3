//! Conversion between typed k8s-openapi objects and `DynamicObject`.

use crate::error::ClusterError;
use kube::api::DynamicObject;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Convert a typed object (which must serialize `apiVersion` and `kind`) into a dynamic one
pub fn to_dynamic<T: Serialize>(object: &T) -> Result<DynamicObject, ClusterError> {
    Ok(serde_json::from_value(serde_json::to_value(object)?)?)
}

/// Convert a dynamic object back into a typed one
pub fn from_dynamic<T: DeserializeOwned>(object: &DynamicObject) -> Result<T, ClusterError> {
    Ok(serde_json::from_value(serde_json::to_value(object)?)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
    use kube::api::ObjectMeta;

    #[test]
    fn test_typed_service_keeps_type_meta() {
        let service = Service {
            metadata: ObjectMeta {
                name: Some("svc".to_string()),
                namespace: Some("ns".to_string()),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                ports: Some(vec![ServicePort {
                    port: 8080,
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            status: None,
        };

        let dynamic = to_dynamic(&service).unwrap();
        let types = dynamic.types.clone().unwrap();
        assert_eq!(types.kind, "Service");
        assert_eq!(types.api_version, "v1");
        assert_eq!(dynamic.data["spec"]["ports"][0]["port"], 8080);

        let back: Service = from_dynamic(&dynamic).unwrap();
        assert_eq!(back, service);
    }
}

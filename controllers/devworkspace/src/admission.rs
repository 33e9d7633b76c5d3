//! Admission webhooks for DevWorkspaces.
//!
//! The mutating hook records who created a workspace and who last changed its spec;
//! the validating hook keeps those records honest and rejects routing classes the
//! cluster cannot serve before the controller ever sees them.
//!
//! The creator label always names the requesting user on create. A label supplied by
//! the caller is overwritten, and a create that still carries someone else's uid is
//! denied.
//!
//! Only spec changes count as modifications. Metadata-only updates (finalizers,
//! annotations written by the controller itself) are neither stamped nor restricted.

use crate::server::ServerState;
use axum::{Json, extract::State};
use crds::{CREATOR_LABEL, DevWorkspace, LAST_MODIFIED_BY_ANNOTATION};
use json_patch::{AddOperation, PatchOperation};
use jsonptr::PointerBuf;
use kube::ResourceExt;
use kube::api::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
use routing::SolverRegistry;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

/// Handle mutating admission reviews
pub async fn mutate_handler(
    State(_state): State<ServerState>,
    Json(body): Json<AdmissionReview<DevWorkspace>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let req: AdmissionRequest<DevWorkspace> = match body.try_into() {
        Ok(req) => req,
        Err(e) => {
            error!(error = %e, "Failed to parse admission request");
            return Json(AdmissionResponse::invalid(e.to_string()).into_review());
        }
    };
    Json(mutate(&req).into_review())
}

/// Handle validating admission reviews
pub async fn validate_handler(
    State(state): State<ServerState>,
    Json(body): Json<AdmissionReview<DevWorkspace>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let req: AdmissionRequest<DevWorkspace> = match body.try_into() {
        Ok(req) => req,
        Err(e) => {
            error!(error = %e, "Failed to parse admission request");
            return Json(AdmissionResponse::invalid(e.to_string()).into_review());
        }
    };
    Json(validate(&state.registry, &req).into_review())
}

fn spec_changed(old: Option<&DevWorkspace>, new: &DevWorkspace) -> bool {
    old.is_none_or(|old| old.spec != new.spec)
}

/// Patch that sets `key` in the label or annotation map at `field`
fn set_metadata_entry(
    existing: Option<&BTreeMap<String, String>>,
    field: &str,
    key: &str,
    value: &str,
) -> PatchOperation {
    match existing {
        Some(_) => PatchOperation::Add(AddOperation {
            path: PointerBuf::from_tokens(["metadata", field, key]),
            value: Value::String(value.to_string()),
        }),
        None => PatchOperation::Add(AddOperation {
            path: PointerBuf::from_tokens(["metadata", field]),
            value: json!({ key: value }),
        }),
    }
}

/// Patch operations the mutating hook applies for a caller with `user_uid`
pub fn mutation_patch(
    operation: &Operation,
    old: Option<&DevWorkspace>,
    workspace: &DevWorkspace,
    user_uid: &str,
) -> Vec<PatchOperation> {
    let mut ops = Vec::new();
    match operation {
        Operation::Create => {
            if workspace.creator() != Some(user_uid) {
                ops.push(set_metadata_entry(
                    workspace.metadata.labels.as_ref(),
                    "labels",
                    CREATOR_LABEL,
                    user_uid,
                ));
            }
        }
        Operation::Update => {
            if spec_changed(old, workspace) && workspace.last_modified_by() != Some(user_uid) {
                ops.push(set_metadata_entry(
                    workspace.metadata.annotations.as_ref(),
                    "annotations",
                    LAST_MODIFIED_BY_ANNOTATION,
                    user_uid,
                ));
            }
        }
        _ => {}
    }
    ops
}

/// Mutating decision for one request
pub fn mutate(request: &AdmissionRequest<DevWorkspace>) -> AdmissionResponse {
    let response = AdmissionResponse::from(request);
    let Some(workspace) = request.object.as_ref() else {
        return response;
    };
    let Some(user_uid) = request.user_info.uid.as_deref() else {
        warn!(uid = %request.uid, "Admission request carries no user uid, allowing unchanged");
        return response;
    };

    let ops = mutation_patch(&request.operation, request.old_object.as_ref(), workspace, user_uid);
    if ops.is_empty() {
        return response;
    }
    debug!(
        uid = %request.uid,
        workspace = %workspace.name_any(),
        patch_ops = ops.len(),
        "Stamping DevWorkspace identity"
    );
    match AdmissionResponse::from(request).with_patch(json_patch::Patch(ops)) {
        Ok(response) => response,
        Err(e) => {
            error!(uid = %request.uid, error = %e, "Failed to serialize patch");
            AdmissionResponse::from(request).deny(format!("patch serialization error: {e}"))
        }
    }
}

/// Reason to reject a create or update, if any
pub fn validation_error(
    registry: &SolverRegistry,
    operation: &Operation,
    old: Option<&DevWorkspace>,
    workspace: &DevWorkspace,
    user_uid: Option<&str>,
) -> Option<String> {
    if !matches!(operation, Operation::Create | Operation::Update) {
        return None;
    }

    match (operation, old) {
        (Operation::Create, _) => {
            if user_uid.is_some() && workspace.creator() != user_uid {
                return Some(format!("label '{CREATOR_LABEL}' must match the creating user"));
            }
        }
        (_, Some(old)) => {
            if old.creator().is_some() && old.creator() != workspace.creator() {
                return Some(format!(
                    "label '{CREATOR_LABEL}' is assigned once and cannot be changed"
                ));
            }
        }
        _ => {}
    }

    if let Err(e) = registry.resolve_class(workspace.routing_class()) {
        return Some(e.to_string());
    }

    if let Some(old) = old {
        let restricted = old.is_restricted_access() || workspace.is_restricted_access();
        if restricted && spec_changed(Some(old), workspace) && user_uid != old.creator() {
            return Some(
                "DevWorkspace has restricted access; only its creator may modify it".to_string(),
            );
        }
    }
    None
}

/// Validating decision for one request
pub fn validate(
    registry: &SolverRegistry,
    request: &AdmissionRequest<DevWorkspace>,
) -> AdmissionResponse {
    let Some(workspace) = request.object.as_ref() else {
        return AdmissionResponse::from(request);
    };
    match validation_error(
        registry,
        &request.operation,
        request.old_object.as_ref(),
        workspace,
        request.user_info.uid.as_deref(),
    ) {
        Some(reason) => {
            info!(
                uid = %request.uid,
                workspace = %workspace.name_any(),
                reason = %reason,
                "Rejecting DevWorkspace"
            );
            AdmissionResponse::from(request).deny(reason)
        }
        None => AdmissionResponse::from(request),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{TEST_CREATOR, container_component, test_workspace};
    use crds::RESTRICTED_ACCESS_ANNOTATION;
    use routing::{RoutingClass, SolverConfig};

    fn registry(is_openshift: bool) -> SolverRegistry {
        SolverRegistry::new(
            RoutingClass::Basic,
            SolverConfig {
                is_openshift,
                oauth_proxy_image: "proxy:latest".to_string(),
            },
        )
    }

    fn request(
        operation: &str,
        old: Option<&DevWorkspace>,
        object: &DevWorkspace,
        user_uid: &str,
    ) -> AdmissionRequest<DevWorkspace> {
        let review: AdmissionReview<DevWorkspace> = serde_json::from_value(json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {
                "uid": "705ab4f5-6393-11e8-b7cc-42010a800002",
                "kind": {
                    "group": "workspace.devfile.io",
                    "version": "v1alpha2",
                    "kind": "DevWorkspace"
                },
                "resource": {
                    "group": "workspace.devfile.io",
                    "version": "v1alpha2",
                    "resource": "devworkspaces"
                },
                "name": object.name_any(),
                "namespace": "dev",
                "operation": operation,
                "userInfo": {"username": "someone", "uid": user_uid},
                "object": object,
                "oldObject": old,
                "dryRun": false
            }
        }))
        .unwrap();
        review.try_into().unwrap()
    }

    fn create_error(
        registry: &SolverRegistry,
        workspace: &DevWorkspace,
        uid: &str,
    ) -> Option<String> {
        validation_error(registry, &Operation::Create, None, workspace, Some(uid))
    }

    fn update_error(
        registry: &SolverRegistry,
        old: &DevWorkspace,
        new: &DevWorkspace,
        uid: &str,
    ) -> Option<String> {
        validation_error(registry, &Operation::Update, Some(old), new, Some(uid))
    }

    fn unlabelled_workspace() -> DevWorkspace {
        let mut workspace = test_workspace("ws", "dev");
        workspace.metadata.labels = None;
        workspace
    }

    fn restricted(mut workspace: DevWorkspace) -> DevWorkspace {
        workspace
            .annotations_mut()
            .insert(RESTRICTED_ACCESS_ANNOTATION.to_string(), "true".to_string());
        workspace
    }

    #[test]
    fn test_create_stamps_creator() {
        let workspace = unlabelled_workspace();
        let ops = mutation_patch(&Operation::Create, None, &workspace, "user-1");
        assert_eq!(ops.len(), 1);
        let PatchOperation::Add(add) = &ops[0] else {
            panic!("expected add operation");
        };
        assert_eq!(add.path, PointerBuf::from_tokens(["metadata", "labels"]));
        assert_eq!(add.value, json!({CREATOR_LABEL: "user-1"}));

        let mut document = serde_json::to_value(&workspace).unwrap();
        json_patch::patch(&mut document, &ops).unwrap();
        assert_eq!(document["metadata"]["labels"][CREATOR_LABEL], "user-1");
    }

    #[test]
    fn test_create_overwrites_caller_supplied_creator() {
        let mut workspace = test_workspace("ws", "dev");
        workspace.labels_mut().insert(CREATOR_LABEL.to_string(), "someone-else".to_string());

        let ops = mutation_patch(&Operation::Create, None, &workspace, "user-1");
        assert_eq!(ops.len(), 1);
        let mut document = serde_json::to_value(&workspace).unwrap();
        json_patch::patch(&mut document, &ops).unwrap();
        assert_eq!(document["metadata"]["labels"][CREATOR_LABEL], "user-1");
    }

    #[test]
    fn test_create_by_labelled_creator_is_not_patched() {
        let workspace = test_workspace("ws", "dev");
        assert!(mutation_patch(&Operation::Create, None, &workspace, TEST_CREATOR).is_empty());
    }

    #[test]
    fn test_create_with_foreign_creator_is_denied() {
        let registry = registry(false);
        let workspace = test_workspace("ws", "dev");

        let reason = create_error(&registry, &workspace, "user-1");
        assert!(reason.unwrap().contains(CREATOR_LABEL));
        assert!(create_error(&registry, &workspace, TEST_CREATOR).is_none());

        let response = validate(&registry, &request("CREATE", None, &workspace, "user-1"));
        assert!(!response.allowed);
    }

    #[test]
    fn test_update_stamps_last_modified_by_on_spec_change() {
        let old = test_workspace("ws", "dev");
        let mut new = old.clone();
        new.spec.started = false;

        let ops = mutation_patch(&Operation::Update, Some(&old), &new, "user-2");
        let mut document = serde_json::to_value(&new).unwrap();
        json_patch::patch(&mut document, &ops).unwrap();
        assert_eq!(document["metadata"]["annotations"][LAST_MODIFIED_BY_ANNOTATION], "user-2");
    }

    #[test]
    fn test_metadata_only_update_is_not_stamped() {
        let old = test_workspace("ws", "dev");
        let mut new = old.clone();
        new.metadata.finalizers = Some(vec!["controller.devfile.io/routing".to_string()]);
        assert!(mutation_patch(&Operation::Update, Some(&old), &new, "controller-sa").is_empty());
    }

    #[test]
    fn test_mutate_response_carries_patch() {
        let workspace = unlabelled_workspace();
        let response = mutate(&request("CREATE", None, &workspace, "user-1"));
        assert!(response.allowed);
        assert!(response.patch.is_some());

        let labelled = test_workspace("ws", "dev");
        let response = mutate(&request("CREATE", None, &labelled, TEST_CREATOR));
        assert!(response.allowed);
        assert!(response.patch.is_none());

        let response = mutate(&request("CREATE", None, &labelled, "user-1"));
        assert!(response.allowed);
        assert!(response.patch.is_some());
    }

    #[test]
    fn test_creator_label_cannot_change() {
        let old = test_workspace("ws", "dev");
        let mut new = old.clone();
        new.labels_mut().insert(CREATOR_LABEL.to_string(), "intruder".to_string());

        let reason = update_error(&registry(false), &old, &new, TEST_CREATOR);
        assert!(reason.unwrap().contains(CREATOR_LABEL));
    }

    #[test]
    fn test_routing_class_checked_at_admission() {
        let registry = registry(false);
        let mut workspace = test_workspace("ws", "dev");

        workspace.spec.routing_class = Some("unknown".to_string());
        let reason = create_error(&registry, &workspace, TEST_CREATOR).unwrap();
        assert!(reason.contains("unknown"));

        workspace.spec.routing_class = Some("openshift-oauth".to_string());
        assert!(create_error(&registry, &workspace, TEST_CREATOR).is_some());

        workspace.spec.routing_class = Some("cluster".to_string());
        assert!(create_error(&registry, &workspace, TEST_CREATOR).is_none());
    }

    #[test]
    fn test_restricted_workspace_only_modified_by_creator() {
        let registry = registry(false);
        let old = restricted(test_workspace("ws", "dev"));
        let mut new = old.clone();
        new.spec.template.components = vec![container_component("tools", &[])];

        assert!(update_error(&registry, &old, &new, "someone-else").is_some());
        assert!(update_error(&registry, &old, &new, TEST_CREATOR).is_none());

        // The controller may still edit metadata
        let mut finalized = old.clone();
        finalized.metadata.finalizers = Some(Vec::new());
        assert!(update_error(&registry, &old, &finalized, "controller-sa").is_none());
    }

    #[test]
    fn test_validate_denies_with_reason() {
        let mut workspace = test_workspace("ws", "dev");
        workspace.spec.routing_class = Some("unknown".to_string());

        let review = request("CREATE", None, &workspace, TEST_CREATOR);
        let response = validate(&registry(false), &review);
        assert!(!response.allowed);
        assert!(response.result.message.contains("unknown"));

        workspace.spec.routing_class = None;
        let review = request("CREATE", None, &workspace, TEST_CREATOR);
        let response = validate(&registry(false), &review);
        assert!(response.allowed);
    }
}

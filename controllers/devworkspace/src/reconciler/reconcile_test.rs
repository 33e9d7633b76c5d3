//! Unit tests for the DevWorkspace reconciler

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::test_utils::*;
    use cluster_client::{MockClusterClient, ResourceKind};
    use crds::{
        Component, DevWorkspaceStatus, LAST_MODIFIED_BY_ANNOTATION, PluginComponent,
        RESTRICTED_ACCESS_ANNOTATION, ROUTING_FINALIZER,
    };
    use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
    use serde_json::json;

    fn test_config() -> ControllerConfig {
        ControllerConfig {
            routing_suffix: Some(TEST_ROUTING_SUFFIX.to_string()),
            readiness_poll_interval: Duration::ZERO,
            ..Default::default()
        }
    }

    fn reconciler_with(
        client: &MockClusterClient,
        config: ControllerConfig,
        probe: Arc<StaticProbe>,
    ) -> Reconciler {
        Reconciler::new(client.clone(), Arc::new(config), probe, Arc::new(Metrics::new().unwrap()))
    }

    fn reconciler(client: &MockClusterClient) -> Reconciler {
        reconciler_with(client, test_config(), Arc::new(StaticProbe::new(true)))
    }

    /// Workspace whose id has already been persisted
    fn seeded_workspace() -> DevWorkspace {
        let mut workspace = test_workspace("ws", "dev");
        workspace.spec.template.components =
            vec![container_component("tools", &[("web", 8080, true)])];
        workspace.status = Some(DevWorkspaceStatus {
            workspace_id: Some(TEST_WORKSPACE_ID.to_string()),
            ..Default::default()
        });
        workspace
    }

    fn stored_status(client: &MockClusterClient) -> DevWorkspaceStatus {
        client.workspace("dev", "ws").unwrap().status.unwrap_or_default()
    }

    fn deletion_time() -> Time {
        serde_json::from_value(json!("2026-01-01T00:00:00Z")).unwrap()
    }

    fn main_url() -> String {
        format!("http://{TEST_WORKSPACE_ID}-web-8080.{TEST_ROUTING_SUFFIX}/")
    }

    /// Run passes until the deployment exists, then mark routing and the deployment ready
    async fn provision_until_available(client: &MockClusterClient, reconciler: &Reconciler) {
        let outcome = reconciler.reconcile_workspace("dev", "ws").await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Requeue, "ingress has no address yet");
        assert_eq!(stored_status(client).phase, Some(WorkspacePhase::Starting));
        let routing_ready = stored_status(client).condition(ConditionType::RoutingReady).cloned();
        assert_eq!(routing_ready.unwrap().status, "False");

        let ingress = client.objects_of_kind(ResourceKind::Ingress).remove(0);
        client
            .set_object_status(
                ResourceKind::Ingress,
                Some("dev"),
                &ingress.name_any(),
                json!({"loadBalancer": {"ingress": [{"ip": "10.0.0.1"}]}}),
            )
            .unwrap();

        let outcome = reconciler.reconcile_workspace("dev", "ws").await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Requeue, "deployment is not available yet");
        assert_eq!(stored_status(client).main_url, Some(main_url()));

        client
            .set_object_status(
                ResourceKind::Deployment,
                Some("dev"),
                TEST_WORKSPACE_ID,
                json!({"availableReplicas": 1}),
            )
            .unwrap();
    }

    #[test]
    fn test_workspace_id_is_derived_from_uid() {
        assert_eq!(workspace_id(TEST_UID).unwrap(), TEST_WORKSPACE_ID);
        assert_eq!(workspace_id(TEST_UID).unwrap(), workspace_id(TEST_UID).unwrap());
        assert!(matches!(workspace_id("not-a-uid"), Err(ControllerError::InvalidWorkspace(_))));
    }

    #[test]
    fn test_outcome_to_action() {
        let interval = Duration::from_secs(5);
        assert_eq!(ReconcileOutcome::Done.to_action(interval), Action::await_change());
        assert_eq!(ReconcileOutcome::Requeue.to_action(interval), Action::requeue(interval));
        assert_eq!(
            ReconcileOutcome::RequeueNow.to_action(interval),
            Action::requeue(Duration::ZERO)
        );
    }

    #[tokio::test]
    async fn test_missing_workspace_is_done() {
        let client = MockClusterClient::new();
        let outcome = reconciler(&client).reconcile_workspace("dev", "gone").await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Done);
    }

    #[tokio::test]
    async fn test_first_pass_persists_workspace_id() {
        let client = MockClusterClient::new();
        client.add_workspace(test_workspace("ws", "dev"));

        let outcome = reconciler(&client).reconcile_workspace("dev", "ws").await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::RequeueNow);
        assert_eq!(stored_status(&client).workspace_id.as_deref(), Some(TEST_WORKSPACE_ID));
        assert_eq!(client.write_count(), 0, "nothing is provisioned before the id exists");
    }

    #[tokio::test]
    async fn test_full_pass_reaches_running_and_is_idempotent() {
        let client = MockClusterClient::new();
        client.add_workspace(seeded_workspace());
        let probe = Arc::new(StaticProbe::new(true));
        let reconciler = reconciler_with(&client, test_config(), probe.clone());

        provision_until_available(&client, &reconciler).await;

        let outcome = reconciler.reconcile_workspace("dev", "ws").await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Done);
        let status = stored_status(&client);
        assert_eq!(status.phase, Some(WorkspacePhase::Running));
        for condition in [
            ConditionType::ComponentsReady,
            ConditionType::StorageReady,
            ConditionType::RoutingReady,
            ConditionType::ServiceAccountReady,
            ConditionType::DeploymentReady,
        ] {
            assert_eq!(status.condition(condition).unwrap().status, "True", "{condition:?}");
        }
        assert_eq!(probe.probed(), vec![main_url()]);
        assert_eq!(reconciler.metrics.phase_transition_count(WorkspacePhase::Running), 1);

        client.clear_writes();
        let outcome = reconciler.reconcile_workspace("dev", "ws").await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Done);
        assert_eq!(client.write_count(), 0);
        assert_eq!(client.status_write_count(), 0);
    }

    #[tokio::test]
    async fn test_startup_timing_recorded_then_cleared_on_stop() {
        let client = MockClusterClient::new();
        client.add_workspace(seeded_workspace());
        let config = ControllerConfig {
            timing_enabled: true,
            ..test_config()
        };
        let reconciler = reconciler_with(&client, config, Arc::new(StaticProbe::new(true)));

        provision_until_available(&client, &reconciler).await;
        let stored = client.workspace("dev", "ws").unwrap();
        let annotations = stored.annotations();
        assert!(annotations.contains_key(Stage::RoutingCreated.annotation()));
        assert!(!annotations.contains_key(Stage::WorkspaceReady.annotation()));
        let started = annotations[Stage::WorkspaceStarted.annotation()].clone();

        let outcome = reconciler.reconcile_workspace("dev", "ws").await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Done);
        let stored = client.workspace("dev", "ws").unwrap();
        let annotations = stored.annotations();
        assert_eq!(annotations[Stage::WorkspaceStarted.annotation()], started);
        assert!(annotations.contains_key(Stage::WorkspaceReady.annotation()));
        assert!(annotations.contains_key(timing::WORKSPACE_TOTAL_ANNOTATION));

        let version = stored.metadata.resource_version.clone();
        reconciler.reconcile_workspace("dev", "ws").await.unwrap();
        let unchanged = client.workspace("dev", "ws").unwrap();
        assert_eq!(unchanged.metadata.resource_version, version, "settled timing is not rewritten");

        let mut stopped = unchanged;
        stopped.spec.started = false;
        client.replace_workspace(&stopped).await.unwrap();
        let outcome = reconciler.reconcile_workspace("dev", "ws").await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Requeue);
        let stored = client.workspace("dev", "ws").unwrap();
        assert!(Stage::ALL.iter().all(|s| !stored.annotations().contains_key(s.annotation())));
        assert!(!stored.annotations().contains_key(timing::WORKSPACE_TOTAL_ANNOTATION));
    }

    #[tokio::test]
    async fn test_unready_server_is_polled_then_requeued() {
        let client = MockClusterClient::new();
        client.add_workspace(seeded_workspace());
        let probe = Arc::new(StaticProbe::new(false));
        let reconciler = reconciler_with(&client, test_config(), probe.clone());

        provision_until_available(&client, &reconciler).await;

        let outcome = reconciler.reconcile_workspace("dev", "ws").await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::RequeueAfter(Duration::from_secs(1)));
        assert_eq!(probe.probed().len(), 3);
        assert_eq!(stored_status(&client).phase, Some(WorkspacePhase::Starting));
    }

    #[tokio::test]
    async fn test_stopping_running_workspace() {
        let client = MockClusterClient::new();
        let mut workspace = seeded_workspace();
        workspace.spec.started = false;
        if let Some(status) = workspace.status.as_mut() {
            status.phase = Some(WorkspacePhase::Running);
            status.main_url = Some(main_url());
        }
        client.add_workspace(workspace);
        client
            .add_object(
                ResourceKind::Deployment,
                &Deployment {
                    metadata: ObjectMeta {
                        name: Some(TEST_WORKSPACE_ID.to_string()),
                        namespace: Some("dev".to_string()),
                        ..Default::default()
                    },
                    spec: Some(DeploymentSpec {
                        replicas: Some(2),
                        ..Default::default()
                    }),
                    status: None,
                },
            )
            .unwrap();
        client
            .set_object_status(
                ResourceKind::Deployment,
                Some("dev"),
                TEST_WORKSPACE_ID,
                json!({"replicas": 2}),
            )
            .unwrap();
        let reconciler = reconciler(&client);

        let outcome = reconciler.reconcile_workspace("dev", "ws").await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Requeue);
        assert_eq!(stored_status(&client).phase, Some(WorkspacePhase::Stopping));
        assert_eq!(client.write_count(), 1, "replicas patched to zero exactly once");

        client
            .set_object_status(
                ResourceKind::Deployment,
                Some("dev"),
                TEST_WORKSPACE_ID,
                json!({"replicas": 0}),
            )
            .unwrap();
        let outcome = reconciler.reconcile_workspace("dev", "ws").await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Done);
        let status = stored_status(&client);
        assert_eq!(status.phase, Some(WorkspacePhase::Stopped));
        assert!(status.conditions.is_empty());
        assert_eq!(status.main_url, Some(main_url()));
        assert_eq!(client.write_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_creator_fails_workspace() {
        let client = MockClusterClient::new();
        let mut workspace = seeded_workspace();
        workspace.metadata.labels = None;
        client.add_workspace(workspace);

        let outcome = reconciler(&client).reconcile_workspace("dev", "ws").await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Done);
        assert_eq!(stored_status(&client).phase, Some(WorkspacePhase::Failed));
        assert_eq!(client.write_count(), 0);
    }

    #[tokio::test]
    async fn test_restricted_access_requires_webhooks() {
        let client = MockClusterClient::new();
        let mut workspace = seeded_workspace();
        workspace
            .annotations_mut()
            .insert(RESTRICTED_ACCESS_ANNOTATION.to_string(), "true".to_string());
        client.add_workspace(workspace);

        reconciler(&client).reconcile_workspace("dev", "ws").await.unwrap();
        let status = stored_status(&client);
        assert_eq!(status.phase, Some(WorkspacePhase::Failed));
        assert!(status.message.unwrap().contains("webhooks"));
    }

    #[tokio::test]
    async fn test_restricted_access_rejects_other_modifier() {
        let client = MockClusterClient::new();
        let mut workspace = seeded_workspace();
        let annotations = workspace.annotations_mut();
        annotations.insert(RESTRICTED_ACCESS_ANNOTATION.to_string(), "true".to_string());
        annotations.insert(LAST_MODIFIED_BY_ANNOTATION.to_string(), "someone-else".to_string());
        client.add_workspace(workspace);
        let config = ControllerConfig {
            webhooks_enabled: true,
            ..test_config()
        };

        reconciler_with(&client, config, Arc::new(StaticProbe::new(true)))
            .reconcile_workspace("dev", "ws")
            .await
            .unwrap();
        assert_eq!(stored_status(&client).phase, Some(WorkspacePhase::Failed));
    }

    #[tokio::test]
    async fn test_failed_workspace_is_left_alone() {
        let client = MockClusterClient::new();
        let mut workspace = seeded_workspace();
        if let Some(status) = workspace.status.as_mut() {
            status.phase = Some(WorkspacePhase::Failed);
        }
        client.add_workspace(workspace);

        let outcome = reconciler(&client).reconcile_workspace("dev", "ws").await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Done);
        assert_eq!(client.write_count(), 0);
        assert_eq!(client.status_write_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_plugin_fails_workspace() {
        let client = MockClusterClient::new();
        let mut workspace = seeded_workspace();
        workspace.spec.template.components = vec![Component {
            name: "ide".to_string(),
            plugin: Some(PluginComponent {
                id: "eclipse/theia/next".to_string(),
            }),
            ..Default::default()
        }];
        client.add_workspace(workspace);

        let outcome = reconciler(&client).reconcile_workspace("dev", "ws").await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Done);
        let status = stored_status(&client);
        assert_eq!(status.phase, Some(WorkspacePhase::Failed));
        assert_eq!(status.condition(ConditionType::ComponentsReady).unwrap().status, "False");
        assert!(
            status
                .condition(ConditionType::FailedStart)
                .and_then(|c| c.message.clone())
                .unwrap()
                .contains("could not find plugin")
        );
    }

    #[tokio::test]
    async fn test_stopped_by_annotation_is_cleared() {
        let client = MockClusterClient::new();
        let mut workspace = seeded_workspace();
        workspace
            .annotations_mut()
            .insert(STOPPED_BY_ANNOTATION.to_string(), "inactivity".to_string());
        client.add_workspace(workspace);

        let outcome = reconciler(&client).reconcile_workspace("dev", "ws").await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::RequeueNow);
        let stored = client.workspace("dev", "ws").unwrap();
        assert!(stored.stopped_by().is_none());
        assert_eq!(client.write_count(), 0);
    }

    #[tokio::test]
    async fn test_conflict_requeues_without_failing() {
        let client = MockClusterClient::new();
        client.add_workspace(seeded_workspace());
        client.inject_conflict(ResourceKind::Role);

        let outcome = reconciler(&client).reconcile_workspace("dev", "ws").await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Requeue);
        assert_eq!(stored_status(&client).phase, Some(WorkspacePhase::Starting));
    }

    #[tokio::test]
    async fn test_unavailable_cluster_is_an_error() {
        let client = MockClusterClient::new();
        client.add_workspace(seeded_workspace());
        client.set_unavailable(true);

        let reconciler = reconciler(&client);
        let result = reconciler.reconcile_workspace("dev", "ws").await;
        assert!(matches!(result, Err(ControllerError::Cluster(_))));
        assert_eq!(reconciler.metrics.reconcile_count(RESULT_ERROR), 1);
    }

    struct PanickingResolver;

    impl PluginResolver for PanickingResolver {
        fn resolve(&self, _id: &str) -> Option<crds::ContainerComponent> {
            panic!("plugin registry exploded")
        }
    }

    #[tokio::test]
    async fn test_panic_is_reported_after_status_write() {
        let client = MockClusterClient::new();
        let mut workspace = seeded_workspace();
        workspace.spec.template.components = vec![Component {
            name: "ide".to_string(),
            plugin: Some(PluginComponent {
                id: "any".to_string(),
            }),
            ..Default::default()
        }];
        client.add_workspace(workspace);
        let mut reconciler = reconciler(&client);
        reconciler.plugins = Box::new(PanickingResolver);

        let result = reconciler.reconcile_workspace("dev", "ws").await;
        match result {
            Err(ControllerError::Panicked(message)) => assert!(message.contains("exploded")),
            other => panic!("expected panic error, got {other:?}"),
        }
        assert_eq!(client.status_write_count(), 1);
        assert_eq!(stored_status(&client).phase, Some(WorkspacePhase::Starting));
    }

    #[tokio::test]
    async fn test_deletion_runs_solver_cleanup() {
        let client = MockClusterClient::openshift();
        let mut workspace = seeded_workspace();
        workspace.spec.routing_class = Some("openshift-oauth".to_string());
        workspace.metadata.finalizers = Some(vec![ROUTING_FINALIZER.to_string()]);
        workspace.metadata.deletion_timestamp = Some(deletion_time());
        client.add_workspace(workspace.clone());

        let meta = workspace_meta(&workspace);
        let oauth_client = routing::openshift::oauth_client(&meta, "secret", Vec::new());
        client.add_object(ResourceKind::OAuthClient, &oauth_client).unwrap();

        let config = ControllerConfig {
            is_openshift: true,
            ..test_config()
        };
        let outcome = reconciler_with(&client, config, Arc::new(StaticProbe::new(true)))
            .reconcile_workspace("dev", "ws")
            .await
            .unwrap();

        assert_eq!(outcome, ReconcileOutcome::Done);
        assert!(client.objects_of_kind(ResourceKind::OAuthClient).is_empty());
        assert!(client.workspace("dev", "ws").unwrap().finalizers().is_empty());
    }

    #[tokio::test]
    async fn test_deletion_without_finalizer_is_skipped() {
        let client = MockClusterClient::new();
        let mut workspace = seeded_workspace();
        workspace.metadata.deletion_timestamp = Some(deletion_time());
        client.add_workspace(workspace);

        let outcome = reconciler(&client).reconcile_workspace("dev", "ws").await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Done);
        assert_eq!(client.write_count(), 0);
        assert_eq!(client.status_write_count(), 0);
    }

    #[test]
    fn test_backoff_grows_and_resets() {
        let client = MockClusterClient::new();
        let reconciler = reconciler(&client);
        let key = "dev/ws";

        let secs = Duration::from_secs;
        reconciler.increment_error(key);
        assert_eq!(reconciler.get_backoff_for_resource(key), (secs(1), 1));
        reconciler.increment_error(key);
        assert_eq!(reconciler.get_backoff_for_resource(key), (secs(1), 2));
        assert_eq!(reconciler.get_backoff_for_resource(key).0, secs(2));

        reconciler.reset_error(key);
        assert_eq!(reconciler.get_backoff_for_resource(key), (secs(1), 0));
    }
}

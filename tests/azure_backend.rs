//! Resource Manager client behaviour against a loopback stub.

#[path = "common/stub_server.rs"]
mod stub_server;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use axum::extract::{Form, Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use esmos_monitor::test_support::RecordingReporter;
use esmos_monitor::{
    AzureBackend, AzureBackendError, AzureConfig, ControlPlane, JobRef, JobTrigger,
    ManagedIdentityConfig, PowerState, TriggerOutcome, TriggerTarget, VmRef,
};
use rstest::rstest;
use serde_json::json;

const TENANT: &str = "tenant-id";
const SUBSCRIPTION: &str = "00000000-1111-2222-3333-444444444444";
const OPERATION_URL: &str = "https://management.azure.com/operations/abc?api-version=2024-03-01";

#[derive(Debug, Default)]
struct Recorded {
    token_forms: Vec<HashMap<String, String>>,
    authorizations: Vec<String>,
    api_versions: Vec<String>,
    start_bodies: Vec<String>,
}

#[derive(Clone, Debug, Default)]
struct Stub {
    recorded: Arc<Mutex<Recorded>>,
}

impl Stub {
    fn record(&self, f: impl FnOnce(&mut Recorded)) {
        f(&mut self.recorded.lock().unwrap_or_else(PoisonError::into_inner));
    }

    fn snapshot<T>(&self, f: impl FnOnce(&Recorded) -> T) -> T {
        f(&self.recorded.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn request_headers(&self, headers: &HeaderMap, query: &HashMap<String, String>) {
        let authorization = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_owned();
        let api_version = query.get("api-version").cloned().unwrap_or_default();
        self.record(|recorded| {
            recorded.authorizations.push(authorization);
            recorded.api_versions.push(api_version);
        });
    }
}

async fn token(
    State(stub): State<Stub>,
    Form(form): Form<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    stub.record(|recorded| recorded.token_forms.push(form));
    Json(json!({
        "token_type": "Bearer",
        "expires_in": 3599,
        "access_token": "arm-token"
    }))
}

async fn instance_view(
    State(stub): State<Stub>,
    Path((_subscription, _group, vm)): Path<(String, String, String)>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    stub.request_headers(&headers, &query);
    match vm.as_str() {
        "vm-missing" => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": {"code": "ResourceNotFound", "message": "vm-missing not found"}})),
        )
            .into_response(),
        "vm-throttled" => (
            StatusCode::TOO_MANY_REQUESTS,
            [(header::RETRY_AFTER, "17")],
            "slow down",
        )
            .into_response(),
        "vm-forbidden" => (
            StatusCode::FORBIDDEN,
            Json(json!({"error": {"code": "AuthorizationFailed", "message": "no access"}})),
        )
            .into_response(),
        "vm-broken" => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": {"code": "InternalError", "message": "boom"}})),
        )
            .into_response(),
        _ => Json(json!({
            "computerName": vm,
            "statuses": [
                {"code": "ProvisioningState/succeeded", "level": "Info", "displayStatus": "Provisioning succeeded"},
                {"code": "PowerState/running", "level": "Info", "displayStatus": "VM running"}
            ]
        }))
        .into_response(),
    }
}

async fn start_job(
    State(stub): State<Stub>,
    Path((_subscription, _group, job)): Path<(String, String, String)>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    stub.request_headers(&headers, &query);
    stub.record(|recorded| recorded.start_bodies.push(body));
    (
        StatusCode::ACCEPTED,
        [("azure-asyncoperation", OPERATION_URL)],
        Json(json!({"id": format!("/jobs/{job}/executions/{job}-abc12"), "name": format!("{job}-abc12")})),
    )
        .into_response()
}

async fn start_stub() -> (Stub, String) {
    let stub = Stub::default();
    let router = Router::new()
        .route(&format!("/{TENANT}/oauth2/v2.0/token"), post(token))
        .route(
            "/subscriptions/{subscription}/resourceGroups/{group}/providers/Microsoft.Compute/virtualMachines/{vm}/instanceView",
            get(instance_view),
        )
        .route(
            "/subscriptions/{subscription}/resourceGroups/{group}/providers/Microsoft.App/jobs/{job}/start",
            post(start_job),
        )
        .with_state(stub.clone());
    let base = stub_server::spawn(router).await;
    (stub, base)
}

fn config(base: &str, tenant: &str) -> AzureConfig {
    AzureConfig {
        subscription_id: String::from(SUBSCRIPTION),
        vm_resource_group: String::from("rg-esmos-prod"),
        aca_resource_group: String::from("rg-esmos-tests"),
        vm_name: String::from("vm-esmos"),
        aca_job_name: String::from("job-e2e"),
        tenant_id: Some(tenant.to_owned()),
        client_id: Some(String::from("client-id")),
        client_secret: Some(String::from("client-secret")),
        management_endpoint: base.to_owned(),
        authority_host: base.to_owned(),
    }
}

fn backend(base: &str) -> AzureBackend {
    AzureBackend::new(&config(base, TENANT), &ManagedIdentityConfig::default())
        .unwrap_or_else(|err| panic!("backend should build: {err}"))
}

#[tokio::test]
async fn instance_view_sends_bearer_token_and_reads_power_state() {
    let (stub, base) = start_stub().await;
    let backend = backend(&base);

    let view = backend
        .instance_view(&VmRef::new("rg-esmos-prod", "vm-esmos"))
        .await
        .expect("instance view");

    let power = view.power_status().expect("power state present");
    assert_eq!(power.state, PowerState::Running);
    assert_eq!(power.label(), "VM running");
    stub.snapshot(|recorded| {
        assert_eq!(recorded.authorizations, vec![String::from("Bearer arm-token")]);
        assert_eq!(recorded.api_versions, vec![String::from("2024-07-01")]);
        let form = recorded.token_forms.first().expect("token request");
        assert_eq!(form.get("grant_type").map(String::as_str), Some("client_credentials"));
        assert_eq!(
            form.get("scope").map(String::as_str),
            Some("https://management.azure.com/.default")
        );
        assert_eq!(form.get("client_id").map(String::as_str), Some("client-id"));
    });
}

#[tokio::test]
async fn token_is_reused_until_close_to_expiry() {
    let (stub, base) = start_stub().await;
    let backend = backend(&base);
    let vm = VmRef::new("rg-esmos-prod", "vm-esmos");

    backend.instance_view(&vm).await.expect("first view");
    backend.instance_view(&vm).await.expect("second view");
    backend
        .start_job(&JobRef::new("rg-esmos-tests", "job-e2e"))
        .await
        .expect("start");

    assert_eq!(stub.snapshot(|recorded| recorded.token_forms.len()), 1);
    assert_eq!(stub.snapshot(|recorded| recorded.authorizations.len()), 3);
}

#[tokio::test]
async fn start_job_returns_receipt_with_operation_url() {
    let (stub, base) = start_stub().await;
    let backend = backend(&base);

    let receipt = backend
        .start_job(&JobRef::new("rg-esmos-tests", "job-e2e"))
        .await
        .expect("start accepted");

    assert_eq!(receipt.status, 202);
    assert_eq!(receipt.operation_url.as_deref(), Some(OPERATION_URL));
    assert_eq!(receipt.execution_name.as_deref(), Some("job-e2e-abc12"));
    stub.snapshot(|recorded| {
        assert_eq!(recorded.api_versions, vec![String::from("2024-03-01")]);
        assert_eq!(recorded.start_bodies, vec![String::from("{}")]);
    });
}

#[rstest]
#[case::not_found("vm-missing", |err: &AzureBackendError| matches!(
    err,
    AzureBackendError::NotFound { message, .. } if message == "vm-missing not found"
))]
#[case::throttled("vm-throttled", |err: &AzureBackendError| matches!(
    err,
    AzureBackendError::Throttled { retry_after_secs: Some(17), .. }
))]
#[case::forbidden("vm-forbidden", |err: &AzureBackendError| matches!(
    err,
    AzureBackendError::Unauthorized { code, .. } if code == "AuthorizationFailed"
))]
#[case::server_error("vm-broken", |err: &AzureBackendError| matches!(
    err,
    AzureBackendError::Api { status: 500, code, .. } if code == "InternalError"
))]
#[tokio::test]
async fn error_responses_map_to_typed_errors(
    #[case] vm_name: &str,
    #[case] predicate: fn(&AzureBackendError) -> bool,
) {
    let (_stub, base) = start_stub().await;
    let backend = backend(&base);

    let err = backend
        .instance_view(&VmRef::new("rg-esmos-prod", vm_name))
        .await
        .expect_err("stub returns an error");

    assert!(predicate(&err), "unexpected error for {vm_name}: {err:?}");
    assert!(err.to_string().contains(vm_name), "error should name the VM: {err}");
}

#[tokio::test]
async fn token_endpoint_failure_is_a_credential_error() {
    let (_stub, base) = start_stub().await;
    let backend = AzureBackend::new(
        &config(&base, "unknown-tenant"),
        &ManagedIdentityConfig::default(),
    )
    .expect("backend should build");

    let err = backend
        .instance_view(&VmRef::new("rg-esmos-prod", "vm-esmos"))
        .await
        .expect_err("token request fails");

    assert!(
        matches!(err, AzureBackendError::Credential { ref source_name, .. } if source_name == "client secret"),
        "got {err:?}"
    );
}

#[tokio::test]
async fn trigger_starts_job_through_resource_manager() {
    let (stub, base) = start_stub().await;
    let azure = config(&base, TENANT);
    let reporter = RecordingReporter::new();
    let trigger = JobTrigger::new(backend(&base), reporter.clone(), TriggerTarget::from_config(&azure));

    let outcome = trigger.invoke().await.expect("invocation succeeds");

    assert!(matches!(outcome, TriggerOutcome::Started { .. }), "got {outcome:?}");
    assert!(reporter.captured().is_empty());
    assert_eq!(
        stub.snapshot(|recorded| recorded.api_versions.clone()),
        vec![String::from("2024-07-01"), String::from("2024-03-01")]
    );
}

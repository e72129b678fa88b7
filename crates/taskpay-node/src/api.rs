use crate::api_payments;
use crate::metrics::Metrics;
use crate::node::TaskPayNode;
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use taskpay_ledger::{
    EligibilityReport, SignupRequest, Tier, UserProfile, WithdrawalMethod, WithdrawalOutcome,
    WithdrawalRequest,
};
use taskpay_payments::{format_kes, UpgradeOutcome};
use taskpay_tasks::{Answer, InstanceStatus, StartOutcome, TaskDefinition, TaskInstance};
use taskpay_types::{TaskPayError, UsdAmount, UserId};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub node: TaskPayNode,
    pub metrics: Metrics,
    /// Live upgrade polls, cancellable per user.
    upgrade_cancels: Arc<Mutex<HashMap<UserId, watch::Sender<bool>>>>,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn error_response(e: TaskPayError) -> ApiError {
    let status = match &e {
        TaskPayError::Validation(_)
        | TaskPayError::MissingAnswers { .. }
        | TaskPayError::InvalidTransition(_) => StatusCode::BAD_REQUEST,
        TaskPayError::NotFound(_) => StatusCode::NOT_FOUND,
        TaskPayError::QuotaExhausted => StatusCode::CONFLICT,
        TaskPayError::Eligibility(_) => StatusCode::UNPROCESSABLE_ENTITY,
        TaskPayError::Payment(_) => StatusCode::BAD_GATEWAY,
        TaskPayError::Storage(_) | TaskPayError::Serialization(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
}

pub fn start_api_server(node: TaskPayNode, metrics: Metrics) -> anyhow::Result<JoinHandle<()>> {
    let addr = format!("{}:{}", node.config.api.host, node.config.api.port);

    let origin: HeaderValue = node.config.api.allowed_origin.parse()?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    let state = AppState {
        node,
        metrics,
        upgrade_cancels: Arc::new(Mutex::new(HashMap::new())),
    };

    let app = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(get_metrics))
        .route("/api/v1/users", post(signup))
        .route("/api/v1/users/:id", get(get_profile))
        .route("/api/v1/users/:id/tasks", get(list_tasks))
        .route("/api/v1/users/:id/tasks/:task_id/start", post(start_task))
        .route("/api/v1/instances/:id/answers", post(record_answer))
        .route("/api/v1/instances/:id/submit", post(submit_instance))
        .route(
            "/api/v1/users/:id/withdrawals",
            get(withdrawal_history).post(submit_withdrawal),
        )
        .route(
            "/api/v1/users/:id/withdrawals/eligibility",
            get(withdrawal_eligibility),
        )
        .route("/api/v1/users/:id/upgrade", post(initiate_upgrade))
        .route("/api/v1/users/:id/upgrade/cancel", post(cancel_upgrade))
        .route("/api/payments/push", post(api_payments::push_payment))
        .route("/api/payments/status", get(api_payments::payment_status))
        .layer(cors)
        .with_state(Arc::new(state));

    info!("📡 Starting API server on {}", addr);

    let handle = tokio::spawn(async move {
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind API server");
        axum::serve(listener, app).await.expect("API server failed");
    });
    Ok(handle)
}

async fn health() -> &'static str {
    "OK"
}

async fn get_metrics(State(state): State<Arc<AppState>>) -> String {
    state.metrics.gather()
}

#[derive(Deserialize)]
struct SignupBody {
    name: String,
    email: String,
    phone: String,
    referral_code: Option<String>,
}

#[derive(Serialize)]
struct ProfileView {
    #[serde(flatten)]
    profile: UserProfile,
    balance_kes_display: String,
}

impl ProfileView {
    fn new(profile: UserProfile, rate: f64) -> Self {
        let balance_kes_display = format_kes(profile.balance, rate);
        Self {
            profile,
            balance_kes_display,
        }
    }
}

async fn signup(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SignupBody>,
) -> Result<Json<ProfileView>, ApiError> {
    let profile = state
        .node
        .ledger
        .signup(
            SignupRequest {
                name: body.name,
                email: body.email,
                phone: body.phone,
                referred_by: body.referral_code,
            },
            Utc::now(),
        )
        .await
        .map_err(error_response)?;
    Ok(Json(ProfileView::new(
        profile,
        state.node.rate.current_rate(),
    )))
}

async fn get_profile(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ProfileView>, ApiError> {
    let profile = state
        .node
        .ledger
        .wallet
        .get_profile(&UserId::new(id))
        .await
        .map_err(error_response)?;
    Ok(Json(ProfileView::new(
        profile,
        state.node.rate.current_rate(),
    )))
}

#[derive(Deserialize)]
struct TaskListQuery {
    category: Option<String>,
}

#[derive(Serialize)]
struct TaskView {
    #[serde(flatten)]
    task: TaskDefinition,
    status: Option<InstanceStatus>,
    instance_id: Option<String>,
}

#[derive(Serialize)]
struct TaskListResponse {
    tasks: Vec<TaskView>,
    categories: Vec<String>,
    daily_tasks_remaining: u32,
}

async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<TaskListQuery>,
) -> Result<Json<TaskListResponse>, ApiError> {
    let user = UserId::new(id);
    let today = Utc::now().date_naive();
    let profile = state
        .node
        .ledger
        .wallet
        .ensure_daily_reset(&user, today)
        .await
        .map_err(error_response)?;

    let instances = state
        .node
        .tracker
        .history(&user)
        .await
        .map_err(error_response)?;
    // Latest attempt per catalog task drives the card state
    let mut latest: HashMap<&str, &TaskInstance> = HashMap::new();
    for instance in &instances {
        latest.insert(instance.task_id.as_str(), instance);
    }

    let tasks = state
        .node
        .catalog
        .visible_for(&profile, query.category.as_deref())
        .into_iter()
        .map(|task| {
            let attempt = latest.get(task.id.as_str());
            TaskView {
                task: task.clone(),
                status: attempt.map(|i| i.status),
                instance_id: attempt.map(|i| i.instance_id.clone()),
            }
        })
        .collect();

    Ok(Json(TaskListResponse {
        tasks,
        categories: state.node.catalog.categories(),
        daily_tasks_remaining: profile.daily_tasks_remaining,
    }))
}

async fn start_task(
    State(state): State<Arc<AppState>>,
    Path((id, task_id)): Path<(String, String)>,
) -> Result<Json<StartOutcome>, ApiError> {
    let outcome = state
        .node
        .tracker
        .start_task(&UserId::new(id), &task_id, Utc::now())
        .await
        .map_err(error_response)?;

    match &outcome {
        StartOutcome::Started(_) => state.metrics.tasks_started.inc(),
        StartOutcome::QuotaExhausted { .. } => state.metrics.quota_rejections.inc(),
        StartOutcome::Resumed(_) => {}
    }
    Ok(Json(outcome))
}

#[derive(Deserialize)]
struct AnswerBody {
    question_id: String,
    answer: Answer,
}

#[derive(Serialize)]
struct ProgressView {
    instance: TaskInstance,
    answered: usize,
    total: usize,
}

async fn record_answer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<AnswerBody>,
) -> Result<Json<ProgressView>, ApiError> {
    let instance = state
        .node
        .tracker
        .record_answer(&id, &body.question_id, body.answer)
        .await
        .map_err(error_response)?;

    let task = state
        .node
        .catalog
        .get(&instance.task_id)
        .ok_or_else(|| error_response(TaskPayError::NotFound(instance.task_id.clone())))?;
    let answered = instance.answered_count(task);
    let total = task.questions.len();
    Ok(Json(ProgressView {
        instance,
        answered,
        total,
    }))
}

async fn submit_instance(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TaskInstance>, ApiError> {
    let instance = state
        .node
        .tracker
        .submit(&id, Utc::now())
        .await
        .map_err(error_response)?;
    state.metrics.tasks_submitted.inc();
    Ok(Json(instance))
}

async fn withdrawal_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<WithdrawalRequest>>, ApiError> {
    let history = state
        .node
        .ledger
        .withdrawals
        .history(&UserId::new(id))
        .await
        .map_err(error_response)?;
    Ok(Json(history))
}

#[derive(Deserialize)]
struct EligibilityQuery {
    amount: f64,
}

async fn withdrawal_eligibility(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<EligibilityQuery>,
) -> Result<Json<EligibilityReport>, ApiError> {
    let profile = state
        .node
        .ledger
        .wallet
        .get_profile(&UserId::new(id))
        .await
        .map_err(error_response)?;
    let report = state
        .node
        .ledger
        .withdrawals
        .check_eligibility(&profile, UsdAmount::from_usd(query.amount));
    Ok(Json(report))
}

#[derive(Deserialize)]
struct WithdrawBody {
    amount: f64,
    #[serde(flatten)]
    method: WithdrawalMethod,
}

async fn submit_withdrawal(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<WithdrawBody>,
) -> Result<Json<WithdrawalOutcome>, ApiError> {
    let outcome = state
        .node
        .ledger
        .withdrawals
        .submit(
            &UserId::new(id),
            UsdAmount::from_usd(body.amount),
            body.method,
            Utc::now(),
        )
        .await
        .map_err(error_response)?;

    if matches!(outcome, WithdrawalOutcome::Ineligible(_)) {
        state.metrics.withdrawals_blocked.inc();
    }
    Ok(Json(outcome))
}

#[derive(Deserialize)]
struct UpgradeBody {
    tier: Tier,
    phone: String,
}

async fn initiate_upgrade(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<UpgradeBody>,
) -> Result<Json<UpgradeOutcome>, ApiError> {
    let user = UserId::new(id);

    let (cancel_tx, cancel_rx) = watch::channel(false);
    {
        let mut cancels = state.upgrade_cancels.lock().await;
        if cancels.contains_key(&user) {
            return Err(error_response(TaskPayError::Validation(
                "An upgrade is already in progress for this account".to_string(),
            )));
        }
        cancels.insert(user.clone(), cancel_tx);
    }
    state.metrics.payments_initiated.inc();

    let outcome = state
        .node
        .upgrade
        .initiate(&user, body.tier, &body.phone, cancel_rx)
        .await;

    state.upgrade_cancels.lock().await.remove(&user);
    outcome.map(Json).map_err(error_response)
}

async fn cancel_upgrade(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let user = UserId::new(id);
    let cancels = state.upgrade_cancels.lock().await;
    match cancels.get(&user) {
        Some(sender) => {
            let _ = sender.send(true);
            Ok(StatusCode::ACCEPTED)
        }
        None => Err(error_response(TaskPayError::NotFound(format!(
            "no upgrade in progress for {}",
            user
        )))),
    }
}

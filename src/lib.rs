use axum::{
    Router,
    extract::{FromRef, Request},
    http::{HeaderName, HeaderValue},
    middleware::{self, Next},
    response::Response,
};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Modules ---

// Auth, persistence and the HTTP handlers.
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod memory;
pub mod models;
pub mod password;
pub mod repository;
pub mod token;

// Routers grouped by the privilege they require.
pub mod routes;
use auth::{AdminUser, AuthUser};
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::AppError;
pub use memory::InMemoryRepository;
pub use repository::{PostgresRepository, Repository, RepositoryState};
pub use token::TokenService;

/// ApiDoc
///
/// The OpenAPI document for every endpoint and schema, served at `/api-docs/openapi.json`
/// and browsable under `/swagger-ui`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::root, handlers::register_user, handlers::login, handlers::get_me,
        handlers::list_sweets, handlers::search_sweets, handlers::create_sweet,
        handlers::update_sweet, handlers::delete_sweet, handlers::purchase_sweet,
        handlers::restock_sweet
    ),
    components(
        schemas(
            models::Sweet, models::SweetPayload, models::StockChangeRequest,
            models::RegisterUserRequest, models::LoginForm, models::UserOut,
            models::UserProfile, models::TokenResponse, error::ErrorResponse,
            handlers::Welcome,
        )
    ),
    modifiers(&BearerSecurity),
    tags(
        (name = "sweet-shop", description = "Sweet Shop inventory API")
    )
)]
pub struct ApiDoc;

/// Declares the `bearer_auth` scheme referenced by the protected paths.
struct BearerSecurity;

impl Modify for BearerSecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        let mut scheme = Http::new(HttpAuthScheme::Bearer);
        scheme.bearer_format = Some("JWT".to_string());
        components.add_security_scheme("bearer_auth", SecurityScheme::Http(scheme));
    }
}

/// AppState
///
/// The single, cheaply clonable container shared by every request. Everything in it is
/// read-only after startup: the store handle, the token keys and the configuration.
#[derive(Clone)]
pub struct AppState {
    /// Persistence layer: Postgres in production, in-memory in tests.
    pub repo: RepositoryState,
    /// Bearer token issuing and validation.
    pub tokens: TokenService,
    /// The loaded, immutable environment configuration.
    pub config: AppConfig,
}

impl AppState {
    pub fn new(repo: RepositoryState, config: AppConfig) -> Self {
        Self {
            repo,
            tokens: TokenService::from_config(&config),
            config,
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

// Let extractors pull individual components out of the shared AppState.

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for TokenService {
    fn from_ref(app_state: &AppState) -> TokenService {
        app_state.tokens.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Route layer for `authenticated_routes`: the `AuthUser` extractor rejects with 401 before
/// the handler runs when the bearer token does not resolve to a stored user. The resolved
/// identity is stored in the request extensions for the handler's own extractor.
async fn auth_middleware(auth_user: AuthUser, mut request: Request, next: Next) -> Response {
    request.extensions_mut().insert(auth_user);
    next.run(request).await
}

/// admin_middleware
///
/// Route layer for `admin_routes`: 401 without a valid identity, 403 for non-admins.
async fn admin_middleware(
    AdminUser(admin): AdminUser,
    mut request: Request,
    next: Next,
) -> Response {
    request.extensions_mut().insert(admin);
    next.run(request).await
}

/// create_router
///
/// Assembles the routing table, applies the scoped auth layers and the global
/// observability and CORS layers, and registers the application state.
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_origins);

    // Correlates log lines and responses for one request.
    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        .merge(
            admin::admin_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                admin_middleware,
            )),
        )
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// Builds the CORS layer from the configured origins. A lone `*` allows any origin;
/// origins that are not valid header values are skipped with a warning.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    layer.allow_origin(AllowOrigin::list(parsed))
}

/// trace_span_logger
///
/// Span factory for `TraceLayer`: every log line of a request carries its method, URI and
/// `x-request-id`.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}

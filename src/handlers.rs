use crate::{
    AppState,
    auth::{AdminUser, AuthUser},
    error::{AppError, ErrorResponse, INCORRECT_LOGIN},
    models::{
        LoginForm, RegisterUserRequest, StockChangeRequest, Sweet, SweetPayload, SweetSearch,
        TokenResponse, UserOut, UserProfile,
    },
    password,
};
use axum::{
    Form, Json,
    extract::{
        Path, Query, State,
        rejection::{FormRejection, JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
};
use serde::{Deserialize, Serialize};

// Extractor results are taken as `Result` so malformed input surfaces as a
// `validation` error instead of axum's plain-text rejection.
type JsonInput<T> = Result<Json<T>, JsonRejection>;
type PathId = Result<Path<i64>, PathRejection>;

/// Welcome
///
/// Body of the root endpoint.
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Welcome {
    pub message: String,
}

/// Runs CPU-bound password work off the async executor.
async fn blocking<T, F>(work: F) -> Result<T, AppError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| AppError::Internal(format!("password task failed: {e}")))
}

// --- Handlers ---

/// root
///
/// [Public Route] Service banner.
#[utoipa::path(
    get,
    path = "/",
    responses((status = 200, description = "Welcome message", body = Welcome))
)]
pub async fn root() -> Json<Welcome> {
    Json(Welcome {
        message: "Welcome to the Sweet Shop API!".to_string(),
    })
}

/// register_user
///
/// [Public Route] Creates a regular (non-admin) account.
///
/// *Flow*: reject if the email is already registered, otherwise hash the password and store
/// the record. A registration racing past the pre-check still fails with `Conflict` through
/// the store's uniqueness guarantee, and the original record is never touched.
#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterUserRequest,
    responses(
        (status = 200, description = "Registered", body = UserOut),
        (status = 409, description = "Email already registered", body = ErrorResponse),
        (status = 422, description = "Invalid input", body = ErrorResponse)
    )
)]
pub async fn register_user(
    State(state): State<AppState>,
    payload: JsonInput<RegisterUserRequest>,
) -> Result<Json<UserOut>, AppError> {
    let Json(payload) = payload?;
    payload.validate()?;
    let RegisterUserRequest {
        email,
        password: plaintext,
    } = payload;

    if state.repo.find_user_by_email(&email).await?.is_some() {
        return Err(AppError::Conflict("Email already registered".to_string()));
    }

    let hashed = blocking(move || password::hash_password(&plaintext)).await??;
    let user = state.repo.create_user(&email, &hashed, false).await?;

    tracing::info!(user_id = user.id, "user registered");
    Ok(Json(UserOut::from(user)))
}

/// login
///
/// [Public Route] Exchanges form-encoded credentials for a bearer token.
///
/// An unknown email and a wrong password produce the identical `Unauthenticated` error, and
/// both pay for one Argon2 verification.
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body(content = LoginForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Token issued", body = TokenResponse),
        (status = 401, description = "Incorrect email or password", body = ErrorResponse)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    form: Result<Form<LoginForm>, FormRejection>,
) -> Result<Json<TokenResponse>, AppError> {
    let Form(form) = form?;

    let user = state.repo.find_user_by_email(&form.username).await?;
    let stored_hash = user.as_ref().map(|user| user.hashed_password.clone());
    let verified =
        blocking(move || password::verify_login(&form.password, stored_hash.as_deref())).await?;

    let Some(user) = user.filter(|_| verified) else {
        tracing::warn!("login rejected");
        return Err(AppError::Unauthenticated(INCORRECT_LOGIN.to_string()));
    };

    let token = state.tokens.issue(&user.email)?;
    tracing::info!(user_id = user.id, "token issued");
    Ok(Json(TokenResponse::bearer(token)))
}

/// get_me
///
/// [Authenticated Route] The identity the presented token resolves to.
#[utoipa::path(
    get,
    path = "/api/auth/me",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Profile", body = UserProfile),
        (status = 401, description = "Unauthenticated", body = ErrorResponse)
    )
)]
pub async fn get_me(user: AuthUser) -> Json<UserProfile> {
    Json(UserProfile {
        id: user.id,
        email: user.email,
        is_admin: user.is_admin,
    })
}

/// list_sweets
///
/// [Authenticated Route] Every catalog item, ordered by id, without filtering.
#[utoipa::path(
    get,
    path = "/api/sweets",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "All sweets", body = [Sweet]))
)]
pub async fn list_sweets(
    _user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Sweet>>, AppError> {
    Ok(Json(state.repo.list_sweets().await?))
}

/// search_sweets
///
/// [Authenticated Route] Conjunctive search over name, category and a price range.
#[utoipa::path(
    get,
    path = "/api/sweets/search",
    params(SweetSearch),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Matching sweets", body = [Sweet]),
        (status = 422, description = "Non-numeric price bound", body = ErrorResponse)
    )
)]
pub async fn search_sweets(
    _user: AuthUser,
    State(state): State<AppState>,
    filter: Result<Query<SweetSearch>, QueryRejection>,
) -> Result<Json<Vec<Sweet>>, AppError> {
    let Query(filter) = filter?;
    Ok(Json(state.repo.search_sweets(&filter).await?))
}

/// create_sweet
///
/// [Authenticated Route] Adds a catalog item; the store assigns its id.
#[utoipa::path(
    post,
    path = "/api/sweets",
    request_body = SweetPayload,
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "Created", body = Sweet),
        (status = 422, description = "Invalid input", body = ErrorResponse)
    )
)]
pub async fn create_sweet(
    _user: AuthUser,
    State(state): State<AppState>,
    payload: JsonInput<SweetPayload>,
) -> Result<(StatusCode, Json<Sweet>), AppError> {
    let Json(payload) = payload?;
    payload.validate()?;

    let sweet = state.repo.create_sweet(&payload).await?;
    tracing::info!(sweet_id = sweet.id, "sweet created");
    Ok((StatusCode::CREATED, Json(sweet)))
}

/// update_sweet
///
/// [Authenticated Route] Full replace of a sweet's mutable fields.
#[utoipa::path(
    put,
    path = "/api/sweets/{id}",
    params(("id" = i64, Path, description = "Sweet ID")),
    request_body = SweetPayload,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Updated", body = Sweet),
        (status = 404, description = "Not Found", body = ErrorResponse)
    )
)]
pub async fn update_sweet(
    _user: AuthUser,
    State(state): State<AppState>,
    id: PathId,
    payload: JsonInput<SweetPayload>,
) -> Result<Json<Sweet>, AppError> {
    let Path(id) = id?;
    let Json(payload) = payload?;
    payload.validate()?;

    Ok(Json(state.repo.update_sweet(id, &payload).await?))
}

/// delete_sweet
///
/// [Admin Route] Removes a sweet from the catalog.
#[utoipa::path(
    delete,
    path = "/api/sweets/{id}",
    params(("id" = i64, Path, description = "Sweet ID")),
    security(("bearer_auth" = [])),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not an admin", body = ErrorResponse),
        (status = 404, description = "Not Found", body = ErrorResponse)
    )
)]
pub async fn delete_sweet(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    id: PathId,
) -> Result<StatusCode, AppError> {
    let Path(id) = id?;
    state.repo.delete_sweet(id).await?;

    tracing::info!(sweet_id = id, admin_id = admin.id, "sweet deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// purchase_sweet
///
/// [Authenticated Route] Takes `amount` units out of stock.
///
/// The check and the decrement are one atomic store operation: a purchase that would drive
/// the quantity negative fails with `InsufficientStock` and changes nothing.
#[utoipa::path(
    post,
    path = "/api/sweets/{id}/purchase",
    params(("id" = i64, Path, description = "Sweet ID")),
    request_body = StockChangeRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Purchased", body = Sweet),
        (status = 400, description = "Insufficient stock", body = ErrorResponse),
        (status = 404, description = "Not Found", body = ErrorResponse)
    )
)]
pub async fn purchase_sweet(
    user: AuthUser,
    State(state): State<AppState>,
    id: PathId,
    payload: JsonInput<StockChangeRequest>,
) -> Result<Json<Sweet>, AppError> {
    let Path(id) = id?;
    let Json(StockChangeRequest { amount }) = payload?;

    let sweet = state.repo.purchase_sweet(id, amount).await?;
    tracing::info!(
        sweet_id = id,
        user_id = user.id,
        amount,
        remaining = sweet.quantity,
        "sweet purchased"
    );
    Ok(Json(sweet))
}

/// restock_sweet
///
/// [Admin Route] Adds `amount` units to stock.
#[utoipa::path(
    post,
    path = "/api/sweets/{id}/restock",
    params(("id" = i64, Path, description = "Sweet ID")),
    request_body = StockChangeRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Restocked", body = Sweet),
        (status = 403, description = "Not an admin", body = ErrorResponse),
        (status = 404, description = "Not Found", body = ErrorResponse)
    )
)]
pub async fn restock_sweet(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    id: PathId,
    payload: JsonInput<StockChangeRequest>,
) -> Result<Json<Sweet>, AppError> {
    let Path(id) = id?;
    let Json(StockChangeRequest { amount }) = payload?;

    let sweet = state.repo.restock_sweet(id, amount).await?;
    tracing::info!(
        sweet_id = id,
        admin_id = admin.id,
        amount,
        quantity = sweet.quantity,
        "sweet restocked"
    );
    Ok(Json(sweet))
}

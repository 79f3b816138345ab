//! api-server: HTTP JSON API for users, products and orders.
//!
//! Routes:
//! - `/users`, `/users/:id`: list, get, create, full replace, delete.
//! - `/products`, `/products/:id`: same operations for products.
//! - `/orders`, `/orders/:id`: list, get, create.
//! - `/orders/:id/add_product/:product_id` (PUT), `/orders/:id/remove_product/:product_id`
//!   (DELETE): manage the products of an order.
//! - `/orders/user/:user_id`, `/orders/:id/products`: relationship listings.
//!
//! Storage: SQLite (default, `sqlite` feature) or in-memory.
//!
//! Run:
//! ```bash
//! # pretty logs (default); PORT optional
//! DB_CONN_STR=sqlite://./data/shop.db cargo run -p api-server
//!
//! # throwaway storage, JSON logs
//! STORAGE_PROVIDER=memory LOG_FORMAT=json cargo run -p api-server
//! ```
//!
//! Configuration: See `config.rs` for all environment variables.

mod config;
mod error;

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::HeaderValue;
use axum::{
    extract::{FromRequest, FromRequestParts, Path, Request, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, put},
    Json, Router,
};
use domain::adapters::memory_repo::InMemoryRepo;
use domain::service::{AddProductOutcome, ShopService};
use domain::{
    CoreError, NewOrder, NewProduct, NewUser, Order, OrderRepository, Product,
    ProductRepository, User, UserRepository,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{debug, error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::ApiError;

// Local repo abstraction supporting memory or sqlite (feature-gated).
enum RepoKind {
    Memory(InMemoryRepo),
    #[cfg(feature = "sqlite")]
    Sqlite(sqlite_adapter::SqliteRepo),
}

#[derive(Clone)]
struct AnyRepo {
    kind: Arc<RepoKind>,
}

impl AnyRepo {
    fn memory() -> Self {
        Self {
            kind: Arc::new(RepoKind::Memory(InMemoryRepo::new())),
        }
    }

    #[cfg(feature = "sqlite")]
    fn sqlite(conn_str: &str) -> Result<Self, CoreError> {
        Ok(Self {
            kind: Arc::new(RepoKind::Sqlite(sqlite_adapter::SqliteRepo::from_conn_str(
                conn_str,
            )?)),
        })
    }
}

// Forward each port method to whichever backend is active.
macro_rules! dispatch {
    ($self:ident, $r:ident => $call:expr) => {
        match &*$self.kind {
            RepoKind::Memory($r) => $call,
            #[cfg(feature = "sqlite")]
            RepoKind::Sqlite($r) => $call,
        }
    };
}

impl UserRepository for AnyRepo {
    fn list_users(&self) -> Result<Vec<User>, CoreError> {
        dispatch!(self, r => r.list_users())
    }

    fn get_user(&self, id: i64) -> Result<Option<User>, CoreError> {
        dispatch!(self, r => r.get_user(id))
    }

    fn insert_user(&self, user: NewUser) -> Result<User, CoreError> {
        dispatch!(self, r => r.insert_user(user))
    }

    fn update_user(&self, id: i64, user: NewUser) -> Result<User, CoreError> {
        dispatch!(self, r => r.update_user(id, user))
    }

    fn delete_user(&self, id: i64) -> Result<(), CoreError> {
        dispatch!(self, r => r.delete_user(id))
    }
}

impl ProductRepository for AnyRepo {
    fn list_products(&self) -> Result<Vec<Product>, CoreError> {
        dispatch!(self, r => r.list_products())
    }

    fn get_product(&self, id: i64) -> Result<Option<Product>, CoreError> {
        dispatch!(self, r => r.get_product(id))
    }

    fn insert_product(&self, product: NewProduct) -> Result<Product, CoreError> {
        dispatch!(self, r => r.insert_product(product))
    }

    fn update_product(&self, id: i64, product: NewProduct) -> Result<Product, CoreError> {
        dispatch!(self, r => r.update_product(id, product))
    }

    fn delete_product(&self, id: i64) -> Result<(), CoreError> {
        dispatch!(self, r => r.delete_product(id))
    }
}

impl OrderRepository for AnyRepo {
    fn list_orders(&self) -> Result<Vec<Order>, CoreError> {
        dispatch!(self, r => r.list_orders())
    }

    fn get_order(&self, id: i64) -> Result<Option<Order>, CoreError> {
        dispatch!(self, r => r.get_order(id))
    }

    fn insert_order(&self, order: NewOrder) -> Result<Order, CoreError> {
        dispatch!(self, r => r.insert_order(order))
    }

    fn list_orders_for_user(&self, user_id: i64) -> Result<Vec<Order>, CoreError> {
        dispatch!(self, r => r.list_orders_for_user(user_id))
    }

    fn list_order_products(&self, order_id: i64) -> Result<Vec<Product>, CoreError> {
        dispatch!(self, r => r.list_order_products(order_id))
    }

    fn attach_product(&self, order_id: i64, product_id: i64) -> Result<bool, CoreError> {
        dispatch!(self, r => r.attach_product(order_id, product_id))
    }

    fn detach_product(&self, order_id: i64, product_id: i64) -> Result<bool, CoreError> {
        dispatch!(self, r => r.detach_product(order_id, product_id))
    }
}

#[derive(Clone)]
struct AppState {
    shop: Arc<ShopService<AnyRepo>>,
}

impl AppState {
    fn new(repo: AnyRepo) -> Self {
        Self {
            shop: Arc::new(ShopService::new(repo)),
        }
    }
}

#[tokio::main]
async fn main() {
    // Load and validate config first (fail fast on misconfiguration)
    let cfg = match config::Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    init_tracing(&cfg);
    cfg.warn_if_ephemeral();

    let repo = match build_repo(&cfg) {
        Ok(r) => r,
        Err(e) => {
            error!(err = %e, "failed to open storage");
            std::process::exit(1);
        }
    };

    // Request ID header name
    let x_request_id = axum::http::HeaderName::from_static("x-request-id");

    let mut app = app(AppState::new(repo))
        .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }),
        )
        .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid));

    // CORS - already validated in Config::from_env()
    let cors = if cfg.cors_allow_origin == HeaderValue::from_static("*") {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::list([cfg.cors_allow_origin.clone()]))
            .allow_methods([
                axum::http::Method::GET,
                axum::http::Method::POST,
                axum::http::Method::PUT,
                axum::http::Method::DELETE,
                axum::http::Method::OPTIONS,
            ])
            .allow_headers([axum::http::header::CONTENT_TYPE])
    };
    app = app.layer(cors);

    let addr: SocketAddr = ([0, 0, 0, 0], cfg.port).into();
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(%addr, err = %e, "bind failed");
            std::process::exit(1);
        }
    };
    info!(%addr, version = %domain::about(), "api-server listening");
    if let Err(e) = axum::serve(listener, app).await {
        error!(err = %e, "server error");
        std::process::exit(1);
    }
}

fn init_tracing(cfg: &config::Config) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    match cfg.log_format {
        config::LogFormat::Json => {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_timer(fmt::time::SystemTime)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
        config::LogFormat::Pretty => {
            registry
                .with(
                    fmt::layer()
                        .pretty()
                        .with_target(true)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
    }
}

// Construct a repository instance based on config and feature flags.
fn build_repo(cfg: &config::Config) -> Result<AnyRepo, CoreError> {
    match cfg.storage_provider {
        #[cfg(feature = "sqlite")]
        config::StorageProvider::Sqlite => {
            info!(db = %cfg.db_conn_str, "using sqlite storage");
            AnyRepo::sqlite(&cfg.db_conn_str)
        }
        #[cfg(not(feature = "sqlite"))]
        config::StorageProvider::Sqlite => {
            tracing::warn!("built without the sqlite feature; falling back to memory storage");
            Ok(AnyRepo::memory())
        }
        config::StorageProvider::Memory => Ok(AnyRepo::memory()),
    }
}

fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/:id",
            get(get_user).put(replace_user).delete(delete_user),
        )
        .route("/products", get(list_products).post(create_product))
        .route(
            "/products/:id",
            get(get_product).put(replace_product).delete(delete_product),
        )
        .route("/orders", get(list_orders).post(create_order))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/products", get(list_order_products))
        .route(
            "/orders/:id/add_product/:product_id",
            put(add_product_to_order),
        )
        .route(
            "/orders/:id/remove_product/:product_id",
            delete(remove_product_from_order),
        )
        .route("/orders/user/:user_id", get(list_orders_for_user))
        .with_state(state)
}

// ============================================================================
// Request / response shapes
// ============================================================================

/// Request body parsed as raw JSON; field checks happen in `domain::validate`.
/// A body that is not JSON arrives as `null`, which validation reports as a
/// `_schema` error after the handler has checked the path ids.
struct Payload(Value);

#[axum::async_trait]
impl<S> FromRequest<S> for Payload
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<Value>::from_request(req, state).await {
            Ok(Json(v)) => Ok(Payload(v)),
            Err(rejection) => {
                debug!(%rejection, "unreadable json body");
                Ok(Payload(Value::Null))
            }
        }
    }
}

/// Path ids. A segment that is not an `i64` matches no resource, so it is a
/// JSON 404 rather than axum's plain-text 400.
struct Ids<T>(T);

#[axum::async_trait]
impl<S, T> FromRequestParts<S> for Ids<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<T>::from_request_parts(parts, state).await {
            Ok(Path(v)) => Ok(Ids(v)),
            Err(rejection) => {
                debug!(%rejection, uri = %parts.uri, "unparseable path id");
                Err(ApiError::NotFound("Invalid ID".into()))
            }
        }
    }
}

#[derive(Serialize)]
struct UserOut {
    id: i64,
    name: String,
    email: String,
    address: Option<String>,
}

impl From<User> for UserOut {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            name: u.name,
            email: u.email,
            address: u.address,
        }
    }
}

#[derive(Serialize)]
struct ProductOut {
    id: i64,
    product_name: String,
    price: f64,
}

impl From<Product> for ProductOut {
    fn from(p: Product) -> Self {
        Self {
            id: p.id,
            product_name: p.product_name,
            price: p.price,
        }
    }
}

#[derive(Serialize)]
struct OrderOut {
    id: i64,
    order_date_time: String,
    user_id: i64,
}

impl From<Order> for OrderOut {
    fn from(o: Order) -> Self {
        Self {
            id: o.id,
            order_date_time: http_common::format_naive_datetime(o.order_date_time),
            user_id: o.user_id,
        }
    }
}

fn many<T, O: From<T>>(items: Vec<T>) -> Json<Vec<O>> {
    Json(items.into_iter().map(O::from).collect())
}

fn message(status: StatusCode, msg: &str) -> Response {
    (status, Json(http_common::json_message(msg))).into_response()
}

type ApiResult<T> = Result<T, ApiError>;

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ============================================================================
// Users
// ============================================================================

async fn list_users(State(state): State<AppState>) -> ApiResult<Json<Vec<UserOut>>> {
    Ok(many(state.shop.list_users()?))
}

async fn get_user(
    State(state): State<AppState>,
    Ids(id): Ids<i64>,
) -> ApiResult<Json<UserOut>> {
    let user = state.shop.get_user(id).map_err(ApiError::without_id)?;
    Ok(Json(user.into()))
}

async fn create_user(
    State(state): State<AppState>,
    Payload(body): Payload,
) -> ApiResult<impl IntoResponse> {
    let user = state.shop.create_user(&body)?;
    info!(user_id = user.id, "user created");
    Ok((StatusCode::CREATED, Json(UserOut::from(user))))
}

async fn replace_user(
    State(state): State<AppState>,
    Ids(id): Ids<i64>,
    Payload(body): Payload,
) -> ApiResult<Json<UserOut>> {
    let user = state
        .shop
        .replace_user(id, &body)
        .map_err(ApiError::without_id)?;
    info!(user_id = id, "user replaced");
    Ok(Json(user.into()))
}

async fn delete_user(State(state): State<AppState>, Ids(id): Ids<i64>) -> ApiResult<Response> {
    state.shop.delete_user(id).map_err(ApiError::without_id)?;
    info!(user_id = id, "user deleted");
    Ok(message(
        StatusCode::OK,
        &http_common::deleted_message("user", id),
    ))
}

// ============================================================================
// Products
// ============================================================================

async fn list_products(State(state): State<AppState>) -> ApiResult<Json<Vec<ProductOut>>> {
    Ok(many(state.shop.list_products()?))
}

async fn get_product(
    State(state): State<AppState>,
    Ids(id): Ids<i64>,
) -> ApiResult<Json<ProductOut>> {
    Ok(Json(state.shop.get_product(id)?.into()))
}

async fn create_product(
    State(state): State<AppState>,
    Payload(body): Payload,
) -> ApiResult<impl IntoResponse> {
    let product = state.shop.create_product(&body)?;
    info!(product_id = product.id, "product created");
    Ok((StatusCode::CREATED, Json(ProductOut::from(product))))
}

async fn replace_product(
    State(state): State<AppState>,
    Ids(id): Ids<i64>,
    Payload(body): Payload,
) -> ApiResult<Json<ProductOut>> {
    let product = state.shop.replace_product(id, &body)?;
    info!(product_id = id, "product replaced");
    Ok(Json(product.into()))
}

async fn delete_product(
    State(state): State<AppState>,
    Ids(id): Ids<i64>,
) -> ApiResult<Response> {
    state.shop.delete_product(id)?;
    info!(product_id = id, "product deleted");
    Ok(message(
        StatusCode::OK,
        &http_common::deleted_message("product", id),
    ))
}

// ============================================================================
// Orders
// ============================================================================

async fn list_orders(State(state): State<AppState>) -> ApiResult<Json<Vec<OrderOut>>> {
    Ok(many(state.shop.list_orders()?))
}

async fn get_order(
    State(state): State<AppState>,
    Ids(id): Ids<i64>,
) -> ApiResult<Json<OrderOut>> {
    Ok(Json(state.shop.get_order(id)?.into()))
}

async fn create_order(
    State(state): State<AppState>,
    Payload(body): Payload,
) -> ApiResult<impl IntoResponse> {
    let order = state.shop.create_order(&body)?;
    info!(order_id = order.id, user_id = order.user_id, "order created");
    Ok((StatusCode::CREATED, Json(OrderOut::from(order))))
}

async fn add_product_to_order(
    State(state): State<AppState>,
    Ids((order_id, product_id)): Ids<(i64, i64)>,
) -> ApiResult<Response> {
    match state.shop.add_product_to_order(order_id, product_id)? {
        AddProductOutcome::Added(order) => {
            info!(order_id, product_id, "product added to order");
            Ok((StatusCode::OK, Json(OrderOut::from(order))).into_response())
        }
        AddProductOutcome::AlreadyPresent => {
            debug!(order_id, product_id, "product already in order");
            Ok(message(
                StatusCode::OK,
                &format!(
                    "Product ID: {} already in order ID: {}",
                    product_id, order_id
                ),
            ))
        }
    }
}

async fn remove_product_from_order(
    State(state): State<AppState>,
    Ids((order_id, product_id)): Ids<(i64, i64)>,
) -> ApiResult<Response> {
    state
        .shop
        .remove_product_from_order(order_id, product_id)?;
    info!(order_id, product_id, "product removed from order");
    Ok(message(
        StatusCode::OK,
        &format!("Removed product {} from order {}", product_id, order_id),
    ))
}

async fn list_orders_for_user(
    State(state): State<AppState>,
    Ids(user_id): Ids<i64>,
) -> ApiResult<Json<Vec<OrderOut>>> {
    Ok(many(state.shop.orders_for_user(user_id)?))
}

async fn list_order_products(
    State(state): State<AppState>,
    Ids(order_id): Ids<i64>,
) -> ApiResult<Json<Vec<ProductOut>>> {
    Ok(many(state.shop.products_for_order(order_id)?))
}

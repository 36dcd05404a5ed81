use std::path::{Path, PathBuf};

use actix_cors::Cors;
use actix_files::{Files, NamedFile};
use actix_web::{http::StatusCode, web, HttpResponse, ResponseError};
use restaurant_finder::{
    data::{Envelope, Filters},
    db as db_api,
};

const NO_RESTAURANTS: &str = "No restaurants found!!";
const NO_RESTAURANT: &str = "No restaurant found!!";
const NO_DISHES: &str = "No dishes found!!";

pub(super) struct ApiState {
    db_pool: sqlx::SqlitePool,
    landing_page: PathBuf,
}

impl ApiState {
    pub(super) fn new(db_pool: sqlx::SqlitePool, landing_page: PathBuf) -> Self {
        Self {
            db_pool,
            landing_page,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub(super) enum ApiError {
    #[error("{0}")]
    NotFound(&'static str),
    #[error("{0:#}")]
    Operation(#[from] anyhow::Error),
}

#[derive(serde::Serialize)]
struct NotFoundJsonResp {
    message: &'static str,
}

#[derive(serde::Serialize)]
struct ErrJsonResp {
    error: String,
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Operation(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            Self::NotFound(message) => HttpResponse::NotFound().json(NotFoundJsonResp {
                message: *message,
            }),
            Self::Operation(_) => {
                let error = self.to_string();
                tracing::error!("request failed: {error}");
                HttpResponse::InternalServerError().json(ErrJsonResp { error })
            }
        }
    }
}

/// 200 with the envelope as is, or 404 when it holds nothing.
fn respond<T: Envelope>(
    result: anyhow::Result<T>,
    not_found: &'static str,
) -> Result<HttpResponse, ApiError> {
    let envelope = result?;
    if envelope.is_empty() {
        return Err(ApiError::NotFound(not_found));
    }
    Ok(HttpResponse::Ok().json(envelope))
}

const RESTAURANT_FILTER_KEYS: [&str; 3] = ["isVeg", "hasOutdoorSeating", "isLuxury"];
const DISH_FILTER_KEYS: [&str; 1] = ["isVeg"];

/// Pick the allow-listed keys out of a raw query string. A repeated key joins
/// its values with commas, so it only matches a field holding that exact text.
/// Keys left with an empty value are dropped.
fn collect_filters(pairs: &[(String, String)], allowed: &[&str]) -> Filters {
    let mut filters = Filters::new();
    for key in allowed {
        let values: Vec<&str> = pairs
            .iter()
            .filter(|(name, _)| name.as_str() == *key)
            .map(|(_, value)| value.as_str())
            .collect();
        let value = values.join(",");
        if !value.is_empty() {
            filters.push((key.to_string(), value));
        }
    }
    filters
}

#[derive(serde::Deserialize)]
pub(super) struct DetailsPath {
    id: String,
}

#[derive(serde::Deserialize)]
pub(super) struct CuisinePath {
    cuisine: String,
}

type RawQuery = web::Query<Vec<(String, String)>>;

#[actix_web::get("/")]
pub(super) async fn index(data: web::Data<ApiState>) -> actix_web::Result<NamedFile> {
    Ok(NamedFile::open_async(&data.landing_page).await?)
}

#[actix_web::get("/restaurants")]
pub(super) async fn restaurants(data: web::Data<ApiState>) -> Result<HttpResponse, ApiError> {
    respond(
        db_api::fetch_all_restaurants(&data.db_pool).await,
        NO_RESTAURANTS,
    )
}

#[actix_web::get("/restaurants/details/{id}")]
pub(super) async fn restaurant_details(
    data: web::Data<ApiState>,
    path: web::Path<DetailsPath>,
) -> Result<HttpResponse, ApiError> {
    respond(
        db_api::fetch_restaurant_by_id(&data.db_pool, &path.id).await,
        NO_RESTAURANT,
    )
}

#[actix_web::get("/restaurants/cuisine/{cuisine}")]
pub(super) async fn restaurants_by_cuisine(
    data: web::Data<ApiState>,
    path: web::Path<CuisinePath>,
) -> Result<HttpResponse, ApiError> {
    respond(
        db_api::fetch_restaurants_by_cuisine(&data.db_pool, &path.cuisine).await,
        NO_RESTAURANTS,
    )
}

#[actix_web::get("/restaurants/filter")]
pub(super) async fn filtered_restaurants(
    data: web::Data<ApiState>,
    query: RawQuery,
) -> Result<HttpResponse, ApiError> {
    let filters = collect_filters(&query, &RESTAURANT_FILTER_KEYS);
    tracing::debug!("filtering restaurants by {filters:?}");
    respond(
        db_api::fetch_filtered_restaurants(&data.db_pool, &filters).await,
        NO_RESTAURANTS,
    )
}

#[actix_web::get("/restaurants/sort-by-rating")]
pub(super) async fn restaurants_by_rating(
    data: web::Data<ApiState>,
) -> Result<HttpResponse, ApiError> {
    respond(
        db_api::fetch_restaurants_sorted_by_rating(&data.db_pool).await,
        NO_RESTAURANTS,
    )
}

#[actix_web::get("/dishes")]
pub(super) async fn dishes(data: web::Data<ApiState>) -> Result<HttpResponse, ApiError> {
    respond(db_api::fetch_all_dishes(&data.db_pool).await, NO_DISHES)
}

#[actix_web::get("/dishes/details/{id}")]
pub(super) async fn dish_details(
    data: web::Data<ApiState>,
    path: web::Path<DetailsPath>,
) -> Result<HttpResponse, ApiError> {
    respond(
        db_api::fetch_dish_by_id(&data.db_pool, &path.id).await,
        NO_DISHES,
    )
}

#[actix_web::get("/dishes/filter")]
pub(super) async fn filtered_dishes(
    data: web::Data<ApiState>,
    query: RawQuery,
) -> Result<HttpResponse, ApiError> {
    let filters = collect_filters(&query, &DISH_FILTER_KEYS);
    tracing::debug!("filtering dishes by {filters:?}");
    respond(
        db_api::fetch_filtered_dishes(&data.db_pool, &filters).await,
        NO_DISHES,
    )
}

#[actix_web::get("/dishes/sort-by-price")]
pub(super) async fn dishes_by_price(data: web::Data<ApiState>) -> Result<HttpResponse, ApiError> {
    respond(
        db_api::fetch_dishes_sorted_by_price(&data.db_pool).await,
        NO_DISHES,
    )
}

/// Permissive CORS: any origin, method and header.
pub(super) fn cors() -> Cors {
    Cors::default()
        .allow_any_origin()
        .allow_any_method()
        .allow_any_header()
}

pub(super) fn configure(cfg: &mut web::ServiceConfig) {
    // a query string that cannot be read still answers in the json error shape
    cfg.app_data(web::QueryConfig::default().error_handler(|err, _req| {
        ApiError::Operation(anyhow::Error::new(err).context("fail to read query string"))
            .into()
    }));
    cfg.service(index)
        .service(restaurants)
        .service(restaurant_details)
        .service(restaurants_by_cuisine)
        .service(filtered_restaurants)
        .service(restaurants_by_rating)
        .service(dishes)
        .service(dish_details)
        .service(filtered_dishes)
        .service(dishes_by_price);
}

/// Serve `dir` for anything the api routes did not match. Must be registered
/// after [`configure`].
pub(super) fn static_files(cfg: &mut web::ServiceConfig, dir: &Path) {
    if dir.is_dir() {
        cfg.service(Files::new("/", dir));
    }
}

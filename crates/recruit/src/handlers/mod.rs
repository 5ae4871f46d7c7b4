pub mod passkey;

use actix_web::{
    cookie::{time::Duration as CookieDuration, Cookie, SameSite},
    http::{header, StatusCode},
    web, HttpRequest, HttpResponse,
};
use recruit_passkey::{
    AuthenticationError, CeremonyError, Identity, InFlightGuard, RegistrationError,
};

use crate::{app_state::AppState, crypto, models::ErrorResponse};

pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

/// Request body limit for ceremony payloads. Binary fields travel as JSON
/// arrays of numbers, roughly four bytes of JSON per byte of data.
const JSON_LIMIT: usize = 256 * 1024;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().limit(JSON_LIMIT))
        .service(
            web::scope("/api/v1/passkey")
                .route("/register/start", web::post().to(passkey::register_start))
                .route("/register/finish", web::post().to(passkey::register_finish))
                .route("/login/start", web::post().to(passkey::login_start))
                .route("/login/finish", web::post().to(passkey::login_finish))
                .route("/test/start", web::post().to(passkey::test_start))
                .route("/test/finish", web::post().to(passkey::test_finish)),
        );
}

pub fn error_response(status: StatusCode, error: &str, message: impl Into<String>) -> HttpResponse {
    HttpResponse::build(status).json(ErrorResponse {
        error: error.to_string(),
        message: message.into(),
    })
}

pub fn ceremony_error(err: &CeremonyError) -> HttpResponse {
    let status = match err {
        CeremonyError::Unauthorized => StatusCode::UNAUTHORIZED,
        CeremonyError::ChallengeMismatch
        | CeremonyError::InvalidData(_)
        | CeremonyError::UnsupportedDevice(_) => StatusCode::BAD_REQUEST,
        CeremonyError::ServerError(detail) => {
            log::error!("Passkey ceremony failed on the server: {}", detail);
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                err.code(),
                "Internal server error",
            );
        }
    };
    error_response(status, err.code(), err.to_string())
}

pub fn registration_error(err: &RegistrationError) -> HttpResponse {
    match err {
        RegistrationError::Ceremony(inner) => ceremony_error(inner),
        RegistrationError::PasskeyExists => {
            error_response(StatusCode::CONFLICT, err.code(), err.to_string())
        }
    }
}

pub fn authentication_error(err: &AuthenticationError) -> HttpResponse {
    match err {
        AuthenticationError::Ceremony(inner) => ceremony_error(inner),
        AuthenticationError::PasskeyNotFound => {
            error_response(StatusCode::NOT_FOUND, err.code(), err.to_string())
        }
        AuthenticationError::VerificationFailed => {
            error_response(StatusCode::UNAUTHORIZED, err.code(), err.to_string())
        }
    }
}

/// Helper function to extract user ID from session cookie
pub fn extract_session_user(req: &HttpRequest, app_state: &AppState) -> Option<i32> {
    let access_token = req.cookie(ACCESS_TOKEN_COOKIE)?;

    match crypto::verify_access_token(&app_state.jwt, access_token.value()) {
        Ok(user_id) => Some(user_id),
        Err(e) => {
            log::warn!("Ignoring session cookie: {}", e);
            None
        }
    }
}

/// Resolves the signed-in caller, if any.
pub async fn session_identity(
    req: &HttpRequest,
    app_state: &AppState,
) -> Result<Option<Identity>, HttpResponse> {
    let Some(user_id) = extract_session_user(req, app_state) else {
        return Ok(None);
    };

    app_state.directory.find_by_id(user_id).await.map_err(|e| {
        log::error!("Failed to load session user {}: {}", user_id, e);
        error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "server_error",
            "Database error occurred",
        )
    })
}

/// The origin the browser declared, falling back to the production origin.
pub fn declared_origin(req: &HttpRequest, app_state: &AppState) -> String {
    req.headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| app_state.engine.relying_party().production_origin.clone())
}

/// Claims the in-flight slot for `key` or answers 409.
pub fn begin_ceremony(app_state: &AppState, key: String) -> Result<InFlightGuard, HttpResponse> {
    app_state.in_flight.try_begin(key.clone()).ok_or_else(|| {
        log::warn!("Rejecting concurrent ceremony request for {}", key);
        error_response(
            StatusCode::CONFLICT,
            "ceremony_in_progress",
            "Another request for this ceremony is still being processed",
        )
    })
}

pub fn session_cookie(app_state: &AppState, access_token: String) -> Cookie<'static> {
    Cookie::build(ACCESS_TOKEN_COOKIE, access_token)
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .max_age(CookieDuration::seconds(app_state.access_token_expiration))
        .finish()
}

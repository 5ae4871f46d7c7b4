use actix_web::{http::StatusCode, web, HttpRequest, HttpResponse, Responder};
use recruit_passkey::{AuthenticationResponse, RegistrationResponse};

use crate::{
    app_state::AppState,
    crypto,
    handlers::{
        authentication_error, begin_ceremony, declared_origin, error_response,
        registration_error, session_cookie, session_identity,
    },
    models::{LoginResponse, PasskeyInfo, TestStartPayload},
};

/// POST /api/v1/passkey/register/start
/// Issue creation options for the signed-in user
pub async fn register_start(app_state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let caller = match session_identity(&req, &app_state).await {
        Ok(caller) => caller,
        Err(resp) => return resp,
    };
    let origin = declared_origin(&req, &app_state);

    match app_state
        .engine
        .start_registration(caller.as_ref(), &origin)
        .await
    {
        Ok(options) => HttpResponse::Ok().json(options),
        Err(e) => {
            log::warn!("Passkey registration start rejected: {}", e);
            registration_error(&e)
        }
    }
}

/// POST /api/v1/passkey/register/finish
/// Verify the attestation and store the new passkey
pub async fn register_finish(
    app_state: web::Data<AppState>,
    req: HttpRequest,
    payload: web::Json<RegistrationResponse>,
) -> impl Responder {
    // 1. Session
    let caller = match session_identity(&req, &app_state).await {
        Ok(caller) => caller,
        Err(resp) => return resp,
    };

    // 2. One finish per user at a time
    let _guard = match caller.as_ref() {
        Some(identity) => match begin_ceremony(&app_state, format!("register:{}", identity.user_id)) {
            Ok(guard) => Some(guard),
            Err(resp) => return resp,
        },
        None => None,
    };

    // 3. Ceremony
    let origin = declared_origin(&req, &app_state);
    match app_state
        .engine
        .finish_registration(caller.as_ref(), &origin, &payload)
        .await
    {
        Ok(record) => {
            log::info!("Passkey registered for user {}", record.user_id);
            HttpResponse::Ok().json(PasskeyInfo::from(&record))
        }
        Err(e) => {
            log::warn!("Passkey registration rejected ({}): {}", e.code(), e);
            registration_error(&e)
        }
    }
}

/// POST /api/v1/passkey/login/start
/// Issue request options for a discoverable-credential login
pub async fn login_start(app_state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let origin = declared_origin(&req, &app_state);

    match app_state.engine.start_login(&origin).await {
        Ok(options) => HttpResponse::Ok().json(options),
        Err(e) => {
            log::warn!("Passkey login start failed: {}", e);
            authentication_error(&e)
        }
    }
}

/// POST /api/v1/passkey/login/finish
/// Verify the assertion and set the session cookie
pub async fn login_finish(
    app_state: web::Data<AppState>,
    req: HttpRequest,
    payload: web::Json<AuthenticationResponse>,
) -> impl Responder {
    let _guard = match begin_ceremony(&app_state, format!("login:{}", payload.challenge_id)) {
        Ok(guard) => guard,
        Err(resp) => return resp,
    };

    let origin = declared_origin(&req, &app_state);
    let authenticated = match app_state.engine.finish_login(&origin, &payload).await {
        Ok(authenticated) => authenticated,
        Err(e) => {
            log::warn!("Passkey login rejected ({}): {}", e.code(), e);
            return authentication_error(&e);
        }
    };

    let access_token = match crypto::create_access_token(
        &app_state.jwt,
        authenticated.user_id,
        app_state.access_token_expiration,
    ) {
        Ok(token) => token,
        Err(e) => {
            log::error!("Failed to create session: {}", e);
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "server_error",
                "Failed to create session",
            );
        }
    };

    log::info!("Passkey login successful for user {}", authenticated.user_id);

    HttpResponse::Ok()
        .cookie(session_cookie(&app_state, access_token))
        .json(LoginResponse {
            user_id: authenticated.user_id,
        })
}

/// POST /api/v1/passkey/test/start
/// Issue request options limited to one of the caller's passkeys
pub async fn test_start(
    app_state: web::Data<AppState>,
    req: HttpRequest,
    payload: web::Json<TestStartPayload>,
) -> impl Responder {
    let caller = match session_identity(&req, &app_state).await {
        Ok(caller) => caller,
        Err(resp) => return resp,
    };
    let origin = declared_origin(&req, &app_state);

    match app_state
        .engine
        .start_test(caller.as_ref(), &origin, &payload.credential_id)
        .await
    {
        Ok(options) => HttpResponse::Ok().json(options),
        Err(e) => {
            log::warn!("Passkey test start rejected: {}", e);
            authentication_error(&e)
        }
    }
}

/// POST /api/v1/passkey/test/finish
/// Confirm the caller's passkey signs
pub async fn test_finish(
    app_state: web::Data<AppState>,
    req: HttpRequest,
    payload: web::Json<AuthenticationResponse>,
) -> impl Responder {
    let caller = match session_identity(&req, &app_state).await {
        Ok(caller) => caller,
        Err(resp) => return resp,
    };

    let _guard = match caller.as_ref() {
        Some(identity) => match begin_ceremony(&app_state, format!("test:{}", identity.user_id)) {
            Ok(guard) => Some(guard),
            Err(resp) => return resp,
        },
        None => None,
    };

    let origin = declared_origin(&req, &app_state);
    match app_state
        .engine
        .finish_test(caller.as_ref(), &origin, &payload)
        .await
    {
        Ok(authenticated) => HttpResponse::Ok().json(PasskeyInfo::from(&authenticated.credential)),
        Err(e) => {
            log::warn!("Passkey test rejected ({}): {}", e.code(), e);
            authentication_error(&e)
        }
    }
}

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Extension, extract::State, http::StatusCode, response::IntoResponse};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::info;
use uuid::Uuid;

use agora_db::models::{MemberWrite, NewMember};
use agora_types::api::{
    Claims, DetailResponse, LoginRequest, LoginResponse, MemberResponse, RefreshRequest,
    RefreshResponse, RegisterRequest, RegisterResponse, TokenKind,
};
use agora_types::models::PresenceKind;

use crate::error::ApiError;
use crate::extract::Json;
use crate::{AppState, run_db};

const USERNAME_MAX: usize = 150;
const PASSWORD_MIN: usize = 8;
const PASSWORD_MAX: usize = 128;

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_username(&req.username)?;
    validate_email(&req.email)?;
    let password_len = req.password.chars().count();
    if !(PASSWORD_MIN..=PASSWORD_MAX).contains(&password_len) {
        return Err(ApiError::validation(format!(
            "Password must be between {PASSWORD_MIN} and {PASSWORD_MAX} characters"
        )));
    }
    if let Some(confirm) = &req.password_confirm {
        if confirm != &req.password {
            return Err(ApiError::validation("Passwords do not match"));
        }
    }

    let member_id = Uuid::new_v4();
    let member = run_db(&state, move |db| {
        // Hash password with Argon2id
        let password_hash = hash_password(&req.password)?;

        let outcome = db.create_member(&NewMember {
            id: member_id,
            username: &req.username,
            email: &req.email,
            password_hash: &password_hash,
            first_name: req.first_name.trim(),
            last_name: req.last_name.trim(),
            date_joined: Utc::now(),
        })?;
        match outcome {
            MemberWrite::Done => {}
            MemberWrite::UsernameTaken => return Err(ApiError::validation("Username already exists")),
            MemberWrite::EmailTaken => return Err(ApiError::validation("Email already exists")),
        }

        let row = db.get_member(member_id)?.ok_or(ApiError::NotFound("Member"))?;
        Ok(MemberResponse::from(row))
    })
    .await?;

    let access = create_token(&state.jwt_secret, member_id, &member.username, TokenKind::Access, state.access_ttl)?;
    let refresh = create_token(&state.jwt_secret, member_id, &member.username, TokenKind::Refresh, state.refresh_ttl)?;

    info!("Member {} registered", member.username);
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            member,
            access,
            refresh,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let credentials = run_db(&state, move |db| {
        let user = db
            .get_credentials(&req.username)?
            .ok_or(ApiError::Unauthorized("Invalid credentials"))?;

        // Verify password
        let parsed_hash = PasswordHash::new(&user.password)
            .map_err(|e| anyhow::anyhow!("stored password hash is unreadable: {}", e))?;
        Argon2::default()
            .verify_password(req.password.as_bytes(), &parsed_hash)
            .map_err(|_| ApiError::Unauthorized("Invalid credentials"))?;

        db.record_presence(user.id, PresenceKind::Login, Utc::now())?;
        Ok(user)
    })
    .await?;

    let access = create_token(
        &state.jwt_secret,
        credentials.id,
        &credentials.username,
        TokenKind::Access,
        state.access_ttl,
    )?;
    let refresh = create_token(
        &state.jwt_secret,
        credentials.id,
        &credentials.username,
        TokenKind::Refresh,
        state.refresh_ttl,
    )?;

    Ok(Json(LoginResponse {
        member_id: credentials.id,
        username: credentials.username,
        access,
        refresh,
    }))
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let claims = decode_token(&state.jwt_secret, &req.refresh, TokenKind::Refresh)?;

    let member_id = claims.sub;
    let exists = run_db(&state, move |db| Ok(db.member_exists(member_id)?)).await?;
    if !exists {
        return Err(ApiError::Unauthorized("User not found"));
    }

    let access = create_token(&state.jwt_secret, claims.sub, &claims.username, TokenKind::Access, state.access_ttl)?;
    Ok(Json(RefreshResponse { access }))
}

/// Record the logout. Tokens stay valid until they expire.
pub async fn logout(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let member_id = claims.sub;
    run_db(&state, move |db| {
        db.record_presence(member_id, PresenceKind::Logout, Utc::now())?;
        Ok(())
    })
    .await?;

    Ok(Json(DetailResponse {
        detail: "Successfully logged out".into(),
    }))
}

pub(crate) fn create_token(
    secret: &str,
    member_id: Uuid,
    username: &str,
    kind: TokenKind,
    ttl: Duration,
) -> anyhow::Result<String> {
    let claims = Claims {
        sub: member_id,
        username: username.to_string(),
        exp: (Utc::now() + ttl).timestamp() as usize,
        kind,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// Decode and validate a token, insisting on the expected kind.
pub(crate) fn decode_token(secret: &str, token: &str, expected: TokenKind) -> Result<Claims, ApiError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ApiError::Unauthorized("Given token not valid for any token type"))?;

    if token_data.claims.kind != expected {
        return Err(ApiError::Unauthorized("Given token not valid for any token type"));
    }
    Ok(token_data.claims)
}

fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?;
    Ok(hash.to_string())
}

pub(crate) fn validate_username(username: &str) -> Result<(), ApiError> {
    let len = username.chars().count();
    if !(3..=USERNAME_MAX).contains(&len) {
        return Err(ApiError::validation(format!(
            "Username must be between 3 and {USERNAME_MAX} characters"
        )));
    }
    // Letters, digits and @/./+/-/_ only
    if !username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'))
    {
        return Err(ApiError::validation(
            "Username may contain only letters, digits and @/./+/-/_",
        ));
    }
    Ok(())
}

pub(crate) fn validate_email(email: &str) -> Result<(), ApiError> {
    let valid = email.len() <= 254
        && match email.split_once('@') {
            Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.contains('@'),
            None => false,
        };
    if valid {
        Ok(())
    } else {
        Err(ApiError::validation("Enter a valid email address"))
    }
}

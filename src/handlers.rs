use crate::app::AppState;
use crate::auth::{self, session_cookie, SESSION_COOKIE};
use crate::db;
use crate::error::{AppError, Result};
use crate::import::{self, EXPORT_COLUMNS};
use crate::models::{CurrentUser, FileChanges, FileRecord, NewFile};
use crate::pages::{self, set_flash, take_flash, Flash};
use crate::recycle::{self, PurgeOutcome};
use crate::records;
use crate::spreadsheet;
use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    Form, Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use chrono::Utc;
use minijinja::context;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};

const EXPORT_FILENAME: &str = "exported_files.xlsx";

/// 302 redirect, the status the login flow and form posts answer with.
pub fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

fn found_with(jar: CookieJar, flash: Flash, location: &str) -> Response {
    (set_flash(jar, flash), found(location)).into_response()
}

fn render_page(
    jar: CookieJar,
    name: &str,
    ctx: minijinja::Value,
) -> Result<(CookieJar, Html<String>)> {
    let (jar, flash) = take_flash(jar);
    Ok((jar, pages::render(name, flash, ctx)?))
}

#[derive(Deserialize)]
pub struct LoginForm {
    username: String,
    password: String,
}

#[derive(Deserialize)]
pub struct UsernameForm {
    username: String,
}

#[derive(Deserialize)]
pub struct PasswordForm {
    password: String,
}

#[derive(Deserialize)]
pub struct FileCodeRequest {
    file_code: String,
}

#[derive(Deserialize)]
pub struct PurgeRequest {
    #[serde(default)]
    file_code: Option<String>,
}

#[derive(Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    q: String,
}

#[derive(Serialize)]
pub struct SearchHit {
    filename: String,
    file_code: String,
    tags: String,
    location: String,
}

impl From<FileRecord> for SearchHit {
    fn from(record: FileRecord) -> Self {
        let location = record.location();
        SearchHit {
            filename: record.filename,
            file_code: record.file_code,
            tags: record.tags,
            location,
        }
    }
}

#[derive(Serialize)]
pub struct RecycleBinEntry {
    file_code: String,
    filename: String,
    deleted_at: String,
}

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let platform = state.config.platform;
    let timestamp = Utc::now().to_rfc3339();

    match db::ping(&state.db).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "database": "connected",
                "platform": platform,
                "timestamp": timestamp,
            })),
        ),
        Err(e) => {
            warn!("health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "database": "disconnected",
                    "error": e.to_string(),
                    "platform": platform,
                    "timestamp": timestamp,
                })),
            )
        }
    }
}

pub async fn login_page(jar: CookieJar) -> Result<impl IntoResponse> {
    render_page(jar, "login.html", context! {})
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<Response> {
    let Some(user) = auth::authenticate(&state.db, &form.username, &form.password).await? else {
        return Ok(found_with(jar, Flash::LoginFailed, "/login"));
    };

    let token = auth::create_session(&state.db, user.id).await?;
    info!(user_id = user.id, username = %user.username, "user logged in");
    let jar = jar.add(session_cookie(token, state.config.secure_cookies()));
    Ok(found_with(jar, Flash::LoginSucceeded, "/"))
}

pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> Result<Response> {
    if let Some(token) = jar.get(SESSION_COOKIE).map(|c| c.value().to_string()) {
        auth::end_session(&state.db, &token).await?;
    }
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/").build());
    Ok(found_with(jar, Flash::LoggedOut, "/login"))
}

pub async fn forgot_password_page(jar: CookieJar) -> Result<impl IntoResponse> {
    render_page(jar, "forgot_password.html", context! {})
}

pub async fn forgot_password(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<UsernameForm>,
) -> Result<Response> {
    match auth::issue_reset_token(&state.db, form.username.trim()).await? {
        Some(token) => {
            // No mail delivery; the link goes to the operator log.
            info!(username = %form.username, "[RESET LINK] /reset-password/{}", token);
            Ok(found_with(jar, Flash::ResetLinkSent, "/login"))
        }
        None => Ok(found_with(jar, Flash::UnknownUsername, "/forgot-password")),
    }
}

pub async fn reset_password_page(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(token): Path<String>,
) -> Result<Response> {
    match auth::check_reset_token(&state.db, &token).await? {
        Some(username) => Ok(render_page(
            jar,
            "reset_password.html",
            context! { reset_user => username, token => token },
        )?
        .into_response()),
        None => Ok(found_with(jar, Flash::ResetLinkInvalid, "/login")),
    }
}

pub async fn reset_password(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(token): Path<String>,
    Form(form): Form<PasswordForm>,
) -> Result<Response> {
    if auth::reset_password(&state.db, &token, &form.password).await? {
        info!("password reset completed");
        Ok(found_with(jar, Flash::PasswordUpdated, "/login"))
    } else {
        Ok(found_with(jar, Flash::ResetLinkInvalid, "/login"))
    }
}

pub async fn home(user: CurrentUser, jar: CookieJar) -> Result<impl IntoResponse> {
    render_page(jar, "add_file.html", context! { username => user.username })
}

pub async fn search_page(user: CurrentUser, jar: CookieJar) -> Result<impl IntoResponse> {
    render_page(jar, "search_file.html", context! { username => user.username })
}

pub async fn add_file(
    State(state): State<AppState>,
    user: CurrentUser,
    jar: CookieJar,
    Form(new_file): Form<NewFile>,
) -> Result<Response> {
    let conn = state.db.lock().await;
    let flash = match records::create(&conn, &new_file, user.id) {
        Ok(_) => Flash::FileAdded,
        Err(AppError::DuplicateCode(_)) => Flash::DuplicateCode,
        Err(AppError::Validation(_)) => Flash::MissingField,
        Err(e) => return Err(e),
    };
    Ok(found_with(jar, flash, "/"))
}

pub async fn edit_file_page(
    State(state): State<AppState>,
    user: CurrentUser,
    jar: CookieJar,
    Path(file_code): Path<String>,
) -> Result<impl IntoResponse> {
    let record = {
        let conn = state.db.lock().await;
        records::find(&conn, &file_code)?
    };
    render_page(
        jar,
        "edit_file.html",
        context! { username => user.username, file => record },
    )
}

pub async fn edit_file(
    State(state): State<AppState>,
    _user: CurrentUser,
    jar: CookieJar,
    Path(file_code): Path<String>,
    Form(changes): Form<FileChanges>,
) -> Result<Response> {
    let conn = state.db.lock().await;
    records::update(&conn, &file_code, &changes)?;
    Ok(found_with(jar, Flash::FileUpdated, "/search"))
}

pub async fn search_files(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<SearchHit>>> {
    let conn = state.db.lock().await;
    let hits = records::search(&conn, params.q.trim())?;
    Ok(Json(hits.into_iter().map(SearchHit::from).collect()))
}

pub async fn export_excel(
    State(state): State<AppState>,
    _user: CurrentUser,
    jar: CookieJar,
) -> Result<Response> {
    let rows = {
        let conn = state.db.lock().await;
        import::export_rows(&conn)?
    };

    match spreadsheet::write_workbook(&EXPORT_COLUMNS, &rows) {
        Ok(bytes) => {
            info!(rows = rows.len(), "exported records");
            let mime = mime_guess::from_path(EXPORT_FILENAME)
                .first_raw()
                .unwrap_or(spreadsheet::XLSX_CONTENT_TYPE);
            Ok((
                [
                    (header::CONTENT_TYPE, mime.to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{EXPORT_FILENAME}\""),
                    ),
                ],
                bytes,
            )
                .into_response())
        }
        Err(e) => {
            error!("Export error: {}", e);
            Ok(found_with(jar, Flash::ExportFailed, "/"))
        }
    }
}

pub async fn import_excel(
    State(state): State<AppState>,
    user: CurrentUser,
    jar: CookieJar,
    mut multipart: Multipart,
) -> Result<Response> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidUpload(e.to_string()))?
    {
        if field.name() != Some("excel_file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::InvalidUpload(e.to_string()))?;
        upload = Some((filename, data));
        break;
    }

    let Some((filename, data)) = upload else {
        return Ok(found_with(jar, Flash::InvalidUpload, "/"));
    };
    if spreadsheet::ensure_xlsx_filename(&filename).is_err() {
        return Ok(found_with(jar, Flash::InvalidUpload, "/"));
    }

    let outcome = spreadsheet::read_workbook(&data).and_then(|sheet| {
        import::check_schema(&sheet)?;
        Ok(sheet)
    });
    let sheet = match outcome {
        Ok(sheet) => sheet,
        Err(AppError::Schema(missing)) => {
            let missing = missing.into_iter().map(str::to_string).collect();
            return Ok(found_with(jar, Flash::MissingColumns(missing), "/"));
        }
        Err(e) => {
            error!("[IMPORT ERROR] {}", e);
            return Ok(found_with(jar, Flash::ImportFailed, "/"));
        }
    };

    let mut conn = state.db.lock().await;
    let summary = import::import_rows(&mut conn, &sheet, user.id)?;
    Ok(found_with(jar, Flash::Imported(summary.inserted), "/"))
}

pub async fn delete_file(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<FileCodeRequest>,
) -> Result<impl IntoResponse> {
    let mut conn = state.db.lock().await;
    let recycled = recycle::delete(&mut conn, &request.file_code, user.id)?;
    Ok(Json(json!({
        "message": format!("File \"{}\" moved to Recycle Bin", recycled.filename)
    })))
}

pub async fn get_recycle_bin(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Vec<RecycleBinEntry>>> {
    let conn = state.db.lock().await;
    let entries = recycle::list(&conn, user.id)?
        .into_iter()
        .map(|item| RecycleBinEntry {
            file_code: item.file_code,
            filename: item.filename,
            deleted_at: item.deleted_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        })
        .collect();
    Ok(Json(entries))
}

pub async fn restore_file(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<FileCodeRequest>,
) -> Result<impl IntoResponse> {
    let mut conn = state.db.lock().await;
    let restored = recycle::restore(&mut conn, &request.file_code, user.id)?;
    Ok(Json(json!({
        "message": format!("File \"{}\" restored successfully", restored.filename)
    })))
}

pub async fn empty_recycle_bin(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<PurgeRequest>,
) -> Result<impl IntoResponse> {
    let conn = state.db.lock().await;
    let code = request.file_code.as_deref().map(str::trim).filter(|c| !c.is_empty());
    let message = match recycle::purge(&conn, code, user.id)? {
        PurgeOutcome::Code(0) => "File not found.".to_string(),
        PurgeOutcome::Code(_) => format!("File \"{}\" permanently deleted.", code.unwrap_or_default()),
        PurgeOutcome::All(_) => "Recycle Bin emptied successfully.".to_string(),
    };
    Ok(Json(json!({ "message": message })))
}

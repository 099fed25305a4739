//! HTML pages and one-shot flash messages.
//!
//! Templates are compiled into the binary and rendered with minijinja, which
//! autoescapes anything ending in `.html`.

use crate::error::Result;
use axum::response::Html;
use axum_extra::extract::cookie::{Cookie, CookieJar};
use minijinja::{context, Environment, Value};
use std::sync::OnceLock;

const FLASH_COOKIE: &str = "flash";

static TEMPLATES: OnceLock<Environment<'static>> = OnceLock::new();

fn templates() -> &'static Environment<'static> {
    TEMPLATES.get_or_init(|| {
        let mut env = Environment::new();
        for (name, source) in [
            ("base.html", include_str!("../templates/base.html")),
            ("login.html", include_str!("../templates/login.html")),
            ("forgot_password.html", include_str!("../templates/forgot_password.html")),
            ("reset_password.html", include_str!("../templates/reset_password.html")),
            ("add_file.html", include_str!("../templates/add_file.html")),
            ("search_file.html", include_str!("../templates/search_file.html")),
            ("edit_file.html", include_str!("../templates/edit_file.html")),
        ] {
            if let Err(e) = env.add_template(name, source) {
                tracing::error!("failed to compile template {}: {}", name, e);
            }
        }
        env
    })
}

pub fn render(name: &str, flash: Option<Flash>, ctx: Value) -> Result<Html<String>> {
    let flash = flash.map(|f| context! { category => f.category(), message => f.message() });
    let page = templates()
        .get_template(name)?
        .render(context! { flash => flash, ..ctx })?;
    Ok(Html(page))
}

/// Status messages shown once on the next rendered page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flash {
    LoginSucceeded,
    LoginFailed,
    LoggedOut,
    UnknownUsername,
    ResetLinkSent,
    ResetLinkInvalid,
    PasswordUpdated,
    FileAdded,
    DuplicateCode,
    MissingField,
    FileUpdated,
    InvalidUpload,
    Imported(usize),
    MissingColumns(Vec<String>),
    ImportFailed,
    ExportFailed,
}

impl Flash {
    pub fn category(&self) -> &'static str {
        match self {
            Flash::LoginSucceeded | Flash::LoginFailed => "login",
            Flash::LoggedOut | Flash::ResetLinkSent => "info",
            Flash::PasswordUpdated
            | Flash::FileAdded
            | Flash::FileUpdated
            | Flash::Imported(_) => "success",
            _ => "danger",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Flash::LoginSucceeded => "Login successful!".into(),
            Flash::LoginFailed => "Invalid credentials. Try again.".into(),
            Flash::LoggedOut => "Logged out successfully.".into(),
            Flash::UnknownUsername => "Username doesn't exist".into(),
            Flash::ResetLinkSent => "Reset link sent! Check the server log (dev mode).".into(),
            Flash::ResetLinkInvalid => "Invalid or expired link".into(),
            Flash::PasswordUpdated => "Password updated! Please log in.".into(),
            Flash::FileAdded => "File added successfully!".into(),
            Flash::DuplicateCode => "Duplicate file code.".into(),
            Flash::MissingField => "File code and filename are required.".into(),
            Flash::FileUpdated => "File updated successfully!".into(),
            Flash::InvalidUpload => "Invalid file type. Please upload a .xlsx Excel file.".into(),
            Flash::Imported(n) => format!("Imported {n} new files successfully!"),
            Flash::MissingColumns(cols) => {
                format!("Excel must contain columns: {}", cols.join(", "))
            }
            Flash::ImportFailed => {
                "Error processing Excel file. Check the file format and try again.".into()
            }
            Flash::ExportFailed => "Error exporting files. Please try again.".into(),
        }
    }

    /// Cookie-safe encoding: a key plus an optional `.`-separated payload.
    fn encode(&self) -> String {
        let key = match self {
            Flash::LoginSucceeded => "login-ok",
            Flash::LoginFailed => "login-failed",
            Flash::LoggedOut => "logged-out",
            Flash::UnknownUsername => "unknown-user",
            Flash::ResetLinkSent => "reset-sent",
            Flash::ResetLinkInvalid => "reset-invalid",
            Flash::PasswordUpdated => "password-updated",
            Flash::FileAdded => "file-added",
            Flash::DuplicateCode => "duplicate-code",
            Flash::MissingField => "missing-field",
            Flash::FileUpdated => "file-updated",
            Flash::InvalidUpload => "invalid-upload",
            Flash::Imported(n) => return format!("imported.{n}"),
            Flash::MissingColumns(cols) => return format!("missing-columns.{}", cols.join(".")),
            Flash::ImportFailed => "import-failed",
            Flash::ExportFailed => "export-failed",
        };
        key.to_string()
    }

    fn decode(raw: &str) -> Option<Self> {
        let (key, payload) = raw.split_once('.').unwrap_or((raw, ""));
        let flash = match key {
            "login-ok" => Flash::LoginSucceeded,
            "login-failed" => Flash::LoginFailed,
            "logged-out" => Flash::LoggedOut,
            "unknown-user" => Flash::UnknownUsername,
            "reset-sent" => Flash::ResetLinkSent,
            "reset-invalid" => Flash::ResetLinkInvalid,
            "password-updated" => Flash::PasswordUpdated,
            "file-added" => Flash::FileAdded,
            "duplicate-code" => Flash::DuplicateCode,
            "missing-field" => Flash::MissingField,
            "file-updated" => Flash::FileUpdated,
            "invalid-upload" => Flash::InvalidUpload,
            "imported" => Flash::Imported(payload.parse().ok()?),
            "missing-columns" => {
                Flash::MissingColumns(payload.split('.').map(str::to_string).collect())
            }
            "import-failed" => Flash::ImportFailed,
            "export-failed" => Flash::ExportFailed,
            _ => return None,
        };
        Some(flash)
    }
}

pub fn set_flash(jar: CookieJar, flash: Flash) -> CookieJar {
    jar.add(Cookie::build((FLASH_COOKIE, flash.encode())).path("/").build())
}

/// Reads the pending flash and clears it.
pub fn take_flash(jar: CookieJar) -> (CookieJar, Option<Flash>) {
    let Some(raw) = jar.get(FLASH_COOKIE).map(|c| c.value().to_string()) else {
        return (jar, None);
    };
    let jar = jar.remove(Cookie::build(FLASH_COOKIE).path("/").build());
    (jar, Flash::decode(&raw))
}

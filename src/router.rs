//! Request routing: static files under `src_dir`, plus the two built-in
//! form endpoints (`/login`, `/register`) backed by the session pool.
//!
//! Grounded on the original's `HttpRequest::ParsePath_`/`DEFAULT_HTML`
//! table and its `POST /` login/register branch in `httprequest.cpp`,
//! generalized into an explicit method+path table so resolving a route
//! doesn't require re-parsing the URL on every request.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::conn::HttpConn;
use crate::http::{HttpRequest, Method};
use crate::pool::db;
use crate::server::ServerContext;

#[derive(Debug, Clone)]
pub enum HandlerKind {
    StaticFile(PathBuf),
    Login,
    Register,
    NotFound,
}

pub enum HandlerResult {
    Done,
    NeedMore,
    Fail,
}

pub struct Router {
    table: HashMap<(Method, String), HandlerKind>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    pub fn new() -> Self {
        let mut table = HashMap::new();
        table.insert((Method::Post, "/login".to_string()), HandlerKind::Login);
        table.insert(
            (Method::Post, "/register".to_string()),
            HandlerKind::Register,
        );
        Self { table }
    }

    /// Looks up the fixed table first, then falls back to a filesystem
    /// probe for `GET`. Never touches the filesystem for a path containing
    /// a `..` segment (spec.md §9's path-traversal resolution).
    pub fn resolve(&self, request: &HttpRequest, src_dir: &Path) -> HandlerKind {
        if let Some(kind) = self.table.get(&(request.method, request.url.clone())) {
            return kind.clone();
        }
        if request.method == Method::Get {
            if let Some(path) = resolve_static_path(src_dir, &request.url) {
                if path.is_file() {
                    return HandlerKind::StaticFile(path);
                }
            }
        }
        HandlerKind::NotFound
    }

    pub fn dispatch(
        &self,
        kind: HandlerKind,
        conn: &mut HttpConn,
        ctx: &ServerContext,
    ) -> HandlerResult {
        match kind {
            HandlerKind::StaticFile(path) => static_file_handler(conn, &path),
            HandlerKind::Login => login_handler(conn, ctx, false),
            HandlerKind::Register => login_handler(conn, ctx, true),
            HandlerKind::NotFound => {
                not_found_handler(conn, ctx);
                HandlerResult::Done
            }
        }
    }
}

fn resolve_static_path(src_dir: &Path, url: &str) -> Option<PathBuf> {
    if url.split('/').any(|segment| segment == "..") {
        return None;
    }
    let rel = url.trim_start_matches('/');
    let rel = if rel.is_empty() { "index.html" } else { rel };
    Some(src_dir.join(rel))
}

fn static_file_handler(conn: &mut HttpConn, path: &Path) -> HandlerResult {
    if conn.response.set_file_body(path) {
        conn.response.set_status(200);
    } else {
        conn.response.set_status(404);
    }
    HandlerResult::Done
}

fn not_found_handler(conn: &mut HttpConn, ctx: &ServerContext) {
    let path = ctx.src_dir.join("404.html");
    if !conn.response.set_file_body(&path) {
        conn.response
            .set_body(b"404 Not Found".to_vec(), "text/plain");
    }
    conn.response.set_status(404);
}

/// Decodes the urlencoded body, looks the user up (or creates it, for
/// `/register`), and serves `welcome.html`/`error.html` accordingly. A
/// failed login answers `200` + `error.html`, not `401`. The original's
/// (surprising) behavior, preserved per spec.md §9.
fn login_handler(conn: &mut HttpConn, ctx: &ServerContext, register: bool) -> HandlerResult {
    {
        let request = &mut conn.request;
        let read_buf = &mut conn.read_buf;
        if !request.parse_urlencoded(read_buf) {
            return match request.state {
                crate::http::ParsingState::Invalid => HandlerResult::Fail,
                _ => HandlerResult::NeedMore,
            };
        }
    }

    let username = conn
        .request
        .post
        .get("username")
        .cloned()
        .unwrap_or_default();
    let password = conn
        .request
        .post
        .get("password")
        .cloned()
        .unwrap_or_default();

    let Some(pool) = &ctx.db_pool else {
        serve_outcome(conn, ctx, false);
        return HandlerResult::Done;
    };

    let mut session = pool.acquire();
    let ok = if register {
        db::create_user(&mut session, &username, &password).unwrap_or(false)
    } else {
        db::find_user(&mut session, &username)
            .ok()
            .flatten()
            .is_some_and(|row| row.password == password)
    };
    drop(session);

    serve_outcome(conn, ctx, ok);
    HandlerResult::Done
}

fn serve_outcome(conn: &mut HttpConn, ctx: &ServerContext, success: bool) {
    let name = if success { "welcome.html" } else { "error.html" };
    let path = ctx.src_dir.join(name);
    if !conn.response.set_file_body(&path) {
        let body = if success { "welcome" } else { "error" };
        conn.response
            .set_body(body.as_bytes().to_vec(), "text/plain");
    }
    conn.response.set_status(200);
}

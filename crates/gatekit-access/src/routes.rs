//! Routing directives.
//!
//! The engine never navigates. It hands the routing layer a [`RouteDirective`]
//! and the routing layer decides how to carry it out.

use serde::Serialize;

use crate::{AccessReason, AccessVerdict};

pub const LOGIN_PATH: &str = "/login";
pub const PROFILE_PATH: &str = "/profile";

pub const DEFAULT_PUBLIC_ROUTES: &[&str] = &[
    "/",
    "/login",
    "/signup",
    "/verify-email",
    "/reset-password",
    "/update-password",
];

pub const DEFAULT_GATED_ROUTES: &[&str] = &["/dashboard"];

/// What the routing layer should do with a visit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "directive", content = "location", rename_all = "snake_case")]
pub enum RouteDirective {
    Render,

    /// Auth or subscription state is still resolving
    Pending,

    Redirect(String),
}

/// Login URL that returns the visitor to `path` after signing in
pub fn login_redirect(path: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(path.as_bytes()).collect();
    format!("{}?redirect={}", LOGIN_PATH, encoded)
}

fn strip_query(path: &str) -> &str {
    path.split(['?', '#']).next().unwrap_or(path)
}

/// Classifies routes as public, authenticated or gated.
///
/// Public routes match exactly. Gated routes match themselves and anything
/// below them (`/dashboard` covers `/dashboard/settings`).
#[derive(Debug, Clone)]
pub struct RouteGuard {
    public_routes: Vec<String>,
    gated_routes: Vec<String>,
}

impl RouteGuard {
    pub fn new<P, G>(public_routes: P, gated_routes: G) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        G: IntoIterator,
        G::Item: Into<String>,
    {
        Self {
            public_routes: public_routes.into_iter().map(Into::into).collect(),
            gated_routes: gated_routes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_public(&self, path: &str) -> bool {
        let path = strip_query(path);
        self.public_routes.iter().any(|r| r == path)
    }

    pub fn is_gated(&self, path: &str) -> bool {
        let path = strip_query(path);
        self.gated_routes.iter().any(|r| {
            path == r
                || path
                    .strip_prefix(r.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }

    /// Authentication check applied to every route.
    pub fn guard(&self, path: &str, auth_loading: bool, signed_in: bool) -> RouteDirective {
        if auth_loading {
            return RouteDirective::Pending;
        }
        if signed_in || self.is_public(path) {
            return RouteDirective::Render;
        }
        RouteDirective::Redirect(login_redirect(path))
    }

    /// Subscription check for gated surfaces; other routes always render.
    pub fn gate(&self, path: &str, verdict: &AccessVerdict) -> RouteDirective {
        if !self.is_gated(path) || verdict.allowed {
            return RouteDirective::Render;
        }
        match verdict.reason {
            AccessReason::Unauthenticated => RouteDirective::Redirect(login_redirect(path)),
            _ => RouteDirective::Redirect(PROFILE_PATH.to_string()),
        }
    }
}

impl Default for RouteGuard {
    fn default() -> Self {
        Self::new(
            DEFAULT_PUBLIC_ROUTES.iter().copied(),
            DEFAULT_GATED_ROUTES.iter().copied(),
        )
    }
}

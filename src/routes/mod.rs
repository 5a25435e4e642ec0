//! Router Module Index
//!
//! Splits the routing table by the minimum privilege each endpoint needs. The split is
//! enforced twice: a route layer on the authenticated and admin routers, and the
//! `AuthUser` / `AdminUser` extractor each handler takes.

/// Routes accessible to anonymous clients: banner, health, registration, login.
pub mod public;

/// Routes for any authenticated account.
pub mod authenticated;

/// Routes restricted to admin accounts.
pub mod admin;

//! Automated course-evaluation client for the university portal.
//!
//! Reproduces the portal's SSO handshake to obtain an authenticated session,
//! then discovers pending evaluation forms, fills them favorably, saves each
//! one, and finalizes every category.

pub mod app;
pub mod cli;
pub mod config;
pub mod logging;
pub mod portal;
pub mod utils;

//! MeshMart - a marketplace for 3D-printable models
//!
//! The server side covers accounts, model uploads, purchases, print requests
//! and admin moderation. The `client` module is the catalog fetch layer used
//! by consumers of the HTTP API.

pub mod api;
pub mod cache;
pub mod client;
pub mod config;
pub mod db;
pub mod models;
pub mod services;

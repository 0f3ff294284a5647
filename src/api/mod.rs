//! API Module
//!
//! HTTP handlers and routing for the cache server REST API.
//!
//! # Endpoints
//! - `PUT /set` - Store a value under a category
//! - `GET /get/:category/:key` - Retrieve a value
//! - `POST /mget` - Retrieve many values
//! - `DELETE /del/:category/:key` - Delete a key
//! - `DELETE /invalidate/:pattern` - Pattern invalidation
//! - `POST /warmup` - Bulk load
//! - `DELETE /clear` - Empty both tiers
//! - `GET /stats`, `POST /stats/reset` - Statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;

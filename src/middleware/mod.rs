/*
 * Responsibility
 * - middleware entry points (re-export)
 * - http::apply (request id, trace, limits), auth::publisher::apply (publish gate)
 */
pub mod auth;
pub mod http;

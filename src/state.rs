/*
 * Responsibility
 * - Shared context attached to the Router (AppState)
 *   - gateway: publish gate (issuer allow-list + key set cache + verifier)
 *   - store: upload root writer
 * - Cheap to clone (Arc inside)
 */
use std::sync::Arc;

use crate::services::{auth::Gateway, storage::UploadStore};

#[derive(Clone, Debug)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub store: Arc<UploadStore>,
}

impl AppState {
    pub fn new(gateway: Arc<Gateway>, store: Arc<UploadStore>) -> Self {
        Self { gateway, store }
    }
}

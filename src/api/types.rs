//! Shared types for the HTTP layer.

use std::sync::Arc;

use crate::core_state::CoreState;

/// Header carrying the authenticated caller's id.
pub const OWNER_HEADER: &str = "X-Owner-Id";

// ═══════════════════════════════════════════════════════════
// API context: shared state for the router
// ═══════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct ApiContext {
    pub core: Arc<CoreState>,
}

impl ApiContext {
    pub fn new(core: Arc<CoreState>) -> Self {
        Self { core }
    }
}

// ═══════════════════════════════════════════════════════════
// Owner context, injected by the owner middleware
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct OwnerContext {
    pub owner_id: String,
}

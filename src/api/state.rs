//! API state.
//!
//! Shared by every handler: the eligibility service and the accepted tokens.

use crate::auth::TokenAuth;
use crate::service::EligibilityService;
use std::sync::Arc;

pub struct ApiState {
    pub service: Arc<EligibilityService>,
    pub auth: TokenAuth,
}

impl ApiState {
    pub fn new(service: Arc<EligibilityService>, auth: TokenAuth) -> Self {
        Self { service, auth }
    }
}

use serde::{Deserialize, Serialize};

use crate::models::{Role, Viewer};

// -- JWT Claims --

/// Session claims issued by the external auth service and verified by the
/// gateway before a messaging surface is opened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub name: String,
    pub role: Role,
    pub exp: usize,
}

impl Claims {
    pub fn viewer(&self) -> Viewer {
        Viewer {
            uid: self.sub.clone(),
            role: self.role,
            display_name: self.name.clone(),
        }
    }
}

// -- Gateway upgrade --

#[derive(Debug, Deserialize)]
pub struct GatewayQuery {
    pub token: String,
}

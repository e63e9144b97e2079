use serde::{Deserialize, Serialize};

use super::Id;
use crate::error::{GraphError, Result};

/// Tenant boundary. Every row key starts with the application id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApplicationScope {
    application: Id,
}

impl ApplicationScope {
    pub fn new(application: Id) -> Result<Self> {
        let scope = Self { application };
        scope.validate()?;
        Ok(scope)
    }

    pub fn application(&self) -> &Id {
        &self.application
    }

    pub fn validate(&self) -> Result<()> {
        self.application
            .validate()
            .map_err(|e| GraphError::Validation(format!("invalid application scope: {}", e)))
    }
}

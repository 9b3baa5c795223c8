//! Model switching for a live session.

use std::sync::Arc;

use tracing::warn;

use super::{Session, SessionPhase};
use crate::error::ChatError;
use crate::provider::ConnectionFactory;

/// Replaces a session's connection with one built by a [`ConnectionFactory`].
#[derive(Clone)]
pub struct ModelSwitcher {
    factory: Arc<dyn ConnectionFactory>,
}

impl std::fmt::Debug for ModelSwitcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSwitcher").finish_non_exhaustive()
    }
}

impl ModelSwitcher {
    pub fn new(factory: Arc<dyn ConnectionFactory>) -> Self {
        Self { factory }
    }

    /// Switch `session` to `model_id`.
    ///
    /// On failure the previous connection stays active, an `Error` unit is
    /// appended, and [`ChatError::ModelSwitch`] is returned. Must be called
    /// inside a tokio runtime (tool registration is restarted).
    pub fn switch(&self, session: &mut Session, model_id: &str) -> Result<(), ChatError> {
        if session.phase() != SessionPhase::Idle {
            return Err(ChatError::InvalidState(format!(
                "cannot switch model while {}",
                session.phase()
            )));
        }

        match self.factory.connect(model_id) {
            Ok(connection) => {
                session.replace_connection(connection);
                Ok(())
            }
            Err(e) => {
                let err = ChatError::ModelSwitch {
                    model: model_id.to_string(),
                    message: e.to_string(),
                };
                warn!(model = %model_id, error = %e, "model switch failed; keeping current model");
                session.record_error(err.to_string());
                Err(err)
            }
        }
    }
}

use serde::Serialize;
use std::sync::Mutex;
use tracing::{error, info, warn};

use crate::cache::PollingCache;
use crate::client::ResourceClient;
use crate::error::TriggerError;
use crate::resource::{ResourceKey, PIPELINE_RUN_PATH};
use crate::types::PipelineStatus;

/// Guards the "run pipeline" command.
///
/// The backend's 409 is what actually prevents a second run; the cached
/// `pipeline-status` flag only disables the control. Submissions from this
/// process go out one at a time.
pub struct PipelineTrigger {
    client: ResourceClient,
    cache: PollingCache,
    submit: tokio::sync::Mutex<()>,
    last_error: Mutex<Option<TriggerError>>,
}

/// What the run control should show.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunControl {
    pub running: bool,
    pub enabled: bool,
    pub error: Option<String>,
}

impl PipelineTrigger {
    pub fn new(client: ResourceClient, cache: PollingCache) -> Self {
        Self {
            client,
            cache,
            submit: tokio::sync::Mutex::new(()),
            last_error: Mutex::new(None),
        }
    }

    pub async fn run_pipeline(&self) -> Result<(), TriggerError> {
        let _turn = self.submit.lock().await;

        let result = match self
            .client
            .post::<serde_json::Value>(PIPELINE_RUN_PATH, None)
            .await
        {
            Ok(_) => {
                info!("Pipeline run accepted");
                self.cache.invalidate(&ResourceKey::PipelineStatus);
                Ok(())
            }
            Err(e) if e.is_conflict() => {
                warn!("Pipeline run refused: already running");
                Err(TriggerError::AlreadyRunning)
            }
            Err(e) => {
                error!("Pipeline run failed: {e}");
                Err(TriggerError::StartFailed {
                    reason: e.to_string(),
                })
            }
        };

        self.set_error(result.as_ref().err().cloned());
        result
    }

    pub fn last_error(&self) -> Option<TriggerError> {
        self.last_error.lock().map(|e| e.clone()).unwrap_or(None)
    }

    /// Drop the inline error, e.g. when the view navigates away.
    pub fn dismiss_error(&self) {
        self.set_error(None);
    }

    /// Advisory: false while the backend reports a run in progress.
    pub fn can_run(status: Option<&PipelineStatus>) -> bool {
        !status.map_or(false, |s| s.running)
    }

    pub fn control(&self, status: Option<&PipelineStatus>) -> RunControl {
        RunControl {
            running: status.map_or(false, |s| s.running),
            enabled: Self::can_run(status),
            error: self.last_error().map(|e| e.to_string()),
        }
    }

    fn set_error(&self, value: Option<TriggerError>) {
        if let Ok(mut slot) = self.last_error.lock() {
            *slot = value;
        }
    }
}

use std::{fmt, sync::Arc};

use subscout_core::{ScanControlPlane, ScanRepository};

use crate::infra::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<dyn ScanRepository>,
    pub scan_control: Arc<ScanControlPlane>,
    pub config: Arc<Config>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("scan_control", &self.scan_control)
            .finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(
        repository: Arc<dyn ScanRepository>,
        scan_control: Arc<ScanControlPlane>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            repository,
            scan_control,
            config,
        }
    }

    pub fn repository(&self) -> &Arc<dyn ScanRepository> {
        &self.repository
    }

    pub fn scan_control(&self) -> &Arc<ScanControlPlane> {
        &self.scan_control
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }
}

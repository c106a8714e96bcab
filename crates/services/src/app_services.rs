use std::sync::Arc;

use storage::repository::Storage;

use crate::audio::AudioProvider;
use crate::auth::AuthProvider;
use crate::config::SessionConfig;
use crate::error::AppServicesError;
use crate::results_service::ResultsService;
use crate::sessions::SessionLauncher;
use crate::test_list_service::TestListService;
use crate::ticks::{IntervalTickSource, TickSource};
use crate::Clock;

/// Assembles app-facing services over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    storage: Storage,
    test_list: Arc<TestListService>,
    launcher: Arc<SessionLauncher>,
    results: Arc<ResultsService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage and wall-clock ticks.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        auth: Arc<dyn AuthProvider>,
        audio: Arc<dyn AudioProvider>,
        config: SessionConfig,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::from_storage(
            storage,
            clock,
            auth,
            audio,
            Arc::new(IntervalTickSource),
            config,
        ))
    }

    #[must_use]
    pub fn from_storage(
        storage: Storage,
        clock: Clock,
        auth: Arc<dyn AuthProvider>,
        audio: Arc<dyn AudioProvider>,
        ticks: Arc<dyn TickSource>,
        config: SessionConfig,
    ) -> Self {
        let test_list = Arc::new(TestListService::new(
            clock,
            Arc::clone(&auth),
            Arc::clone(&storage.tests),
        ));
        let launcher = Arc::new(
            SessionLauncher::new(clock, Arc::clone(&auth), storage.clone(), audio, ticks)
                .with_config(config),
        );
        let results = Arc::new(ResultsService::new(auth, Arc::clone(&storage.answers)));

        Self {
            storage,
            test_list,
            launcher,
            results,
        }
    }

    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    #[must_use]
    pub fn test_list(&self) -> Arc<TestListService> {
        Arc::clone(&self.test_list)
    }

    #[must_use]
    pub fn launcher(&self) -> Arc<SessionLauncher> {
        Arc::clone(&self.launcher)
    }

    #[must_use]
    pub fn results(&self) -> Arc<ResultsService> {
        Arc::clone(&self.results)
    }
}

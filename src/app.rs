//! Component wiring: store, services, dispatcher, scheduler.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use crate::api::ApiState;
use crate::config::AppConfig;
use crate::error::{ConfigError, Error};
use crate::scheduler::{CronSchedule, DiscoveryJob, Scheduler};
use crate::services::HttpServices;
use crate::store::LibSqlBackend;
use crate::worker::{LaneDeps, WorkerDispatcher, build_lanes, spawn_dispatcher};

/// The assembled process: whichever components the config enables.
pub struct App {
    pub config: AppConfig,
    pub store: Arc<LibSqlBackend>,
    pub dispatcher: Option<Arc<WorkerDispatcher>>,
    pub scheduler: Option<Arc<Scheduler>>,
    dispatcher_handle: Option<JoinHandle<()>>,
}

impl App {
    /// Open the store and construct the enabled components. Nothing runs yet.
    pub async fn build(config: AppConfig) -> Result<Self, Error> {
        let store = Arc::new(LibSqlBackend::new_local(&config.db_path).await?);
        Self::with_store(config, store)
    }

    pub fn with_store(config: AppConfig, store: Arc<LibSqlBackend>) -> Result<Self, Error> {
        let needs_services = config.components.worker || config.components.scheduler;
        let services = if needs_services {
            let url = config
                .service_url
                .as_deref()
                .ok_or_else(|| ConfigError::MissingEnvVar("PIPELINE_SERVICE_URL".into()))?;
            Some(Arc::new(
                HttpServices::new(url, config.service_token.clone())?.with_store(store.clone()),
            ))
        } else {
            None
        };

        let dispatcher = match (&services, config.components.worker) {
            (Some(services), true) => {
                let deps = LaneDeps {
                    items: store.clone(),
                    authors: store.clone(),
                    classifier: services.clone(),
                    comments: services.clone(),
                    fetcher: services.clone(),
                };
                let lanes = build_lanes(&config.worker, &config.lanes, &deps);
                Some(Arc::new(WorkerDispatcher::new(
                    lanes,
                    config.worker.poll_interval,
                )))
            }
            _ => None,
        };

        let scheduler = match (&services, config.components.scheduler) {
            (Some(services), true) => {
                let schedule = CronSchedule::parse(&config.scheduler.search_cron)?;
                let job = DiscoveryJob::new(
                    store.clone(),
                    services.clone(),
                    config.scheduler.search_channel.clone(),
                );
                Some(Arc::new(Scheduler::new(
                    "discovery",
                    schedule,
                    Arc::new(job),
                    config.scheduler.misfire_grace,
                )))
            }
            _ => None,
        };

        Ok(Self {
            config,
            store,
            dispatcher,
            scheduler,
            dispatcher_handle: None,
        })
    }

    /// Start the background components.
    pub fn start(&mut self) -> Result<(), Error> {
        if let Some(dispatcher) = &self.dispatcher {
            self.dispatcher_handle = Some(spawn_dispatcher(dispatcher.clone()));
        }
        if let Some(scheduler) = &self.scheduler {
            scheduler.start()?;
        }
        info!(
            worker = self.dispatcher.is_some(),
            scheduler = self.scheduler.is_some(),
            "Components started"
        );
        Ok(())
    }

    pub fn api_state(&self) -> ApiState {
        ApiState {
            dispatcher: self.dispatcher.clone(),
            scheduler: self.scheduler.clone(),
        }
    }

    /// Signal every component to stop.
    pub fn stop(&self) {
        if let Some(scheduler) = &self.scheduler {
            scheduler.stop();
        }
        if let Some(dispatcher) = &self.dispatcher {
            dispatcher.stop();
        }
    }

    /// Wait for the dispatcher loop and scheduler timer to exit.
    pub async fn join(&mut self) {
        if let Some(handle) = self.dispatcher_handle.take() {
            let _ = handle.await;
        }
        if let Some(scheduler) = &self.scheduler {
            scheduler.join().await;
        }
    }
}

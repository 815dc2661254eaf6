//! Service lifecycle: Running ⇄ Suspended → Stopped.
//!
//! One [`Service`] value owns the config and the current [`Engine`]; there
//! is no process-wide state. Suspension exists so an external tool (or the
//! test harness) can inspect the library database while the service holds
//! no handles to it: suspend waits for in-flight transactions to finish by
//! closing the pools, resume reopens them and rebuilds the derived state.

use crate::config::Config;
use crate::dispatch::{self, Params};
use crate::error::{ErrorKind, Result};
use cuemark_engine::Engine;
use cuemark_engine::error::{ErrorKind as OpErrorKind, Result as OpResult};
use exn::ResultExt;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug)]
enum State {
    Running(Arc<Engine>),
    Suspended,
    Stopped,
}

#[derive(Debug)]
pub struct Service {
    config: Config,
    state: RwLock<State>,
}

impl Service {
    /// Open both databases, build the derived state, enter Running.
    pub async fn start(config: Config) -> Result<Self> {
        let engine = Self::open(&config).await?;
        tracing::info!(library = %config.database_path.display(), "service running");
        Ok(Self { config, state: RwLock::new(State::Running(Arc::new(engine))) })
    }

    async fn open(config: &Config) -> Result<Engine> {
        let media_db = cuemark_media::Database::connect(&config.database_path).await.or_raise(|| ErrorKind::Startup)?;
        let actions_db = match config.backup_actions {
            true => Some(
                cuemark_actions::Database::connect(config.actions_db_path()).await.or_raise(|| ErrorKind::Startup)?,
            ),
            false => None,
        };
        let engine = Engine::new(media_db, actions_db, config.extended_marker_stats);
        engine.bootstrap().await.or_raise(|| ErrorKind::Startup)?;
        Ok(engine)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The running engine, or `Unavailable` while suspended or stopped.
    pub async fn engine(&self) -> OpResult<Arc<Engine>> {
        match &*self.state.read().await {
            State::Running(engine) => Ok(Arc::clone(engine)),
            State::Suspended | State::Stopped => exn::bail!(OpErrorKind::Unavailable),
        }
    }

    /// Close the database handles and refuse work until [`resume`](Self::resume).
    ///
    /// Closing the pools waits for checked-out connections to finish, so an
    /// operation already inside its transaction completes before the
    /// suspension takes effect. Idempotent.
    pub async fn suspend(&self) -> OpResult<()> {
        let mut state = self.state.write().await;
        match &*state {
            State::Running(engine) => {
                engine.close().await;
                *state = State::Suspended;
                tracing::info!("service suspended; database handles closed");
                Ok(())
            },
            State::Suspended => Ok(()),
            State::Stopped => exn::bail!(OpErrorKind::Unavailable),
        }
    }

    /// Reopen the databases and rebuild the cache and purged index.
    /// Idempotent while running.
    pub async fn resume(&self) -> OpResult<()> {
        let mut state = self.state.write().await;
        match &*state {
            State::Running(_) => Ok(()),
            State::Suspended => {
                let engine = Self::open(&self.config).await.or_raise(|| OpErrorKind::Unavailable)?;
                *state = State::Running(Arc::new(engine));
                tracing::info!("service resumed");
                Ok(())
            },
            State::Stopped => exn::bail!(OpErrorKind::Unavailable),
        }
    }

    /// Final shutdown; the service never comes back from this.
    pub async fn shutdown(&self) {
        let mut state = self.state.write().await;
        if let State::Running(engine) = &*state {
            engine.close().await;
        }
        *state = State::Stopped;
        tracing::info!("service stopped");
    }

    /// Dispatch one externally-named operation.
    pub async fn dispatch(&self, op: &str, params: &Params) -> OpResult<Value> {
        dispatch::dispatch(self, op, params).await
    }
}

//! Server configuration from flags and environment.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use callboard_core::{FileHistoryStore, HistoryStore, MemoryHistoryStore, StoreResult};
use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "callboard-server", about = "Callboard relay and history server")]
pub struct ServerConfig {
    /// Address to listen on.
    #[arg(long, env = "CALLBOARD_BIND", default_value = "0.0.0.0:3030")]
    pub bind: SocketAddr,

    /// Directory for per-room history files. History is kept in memory when unset.
    #[arg(long, env = "CALLBOARD_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Per-room broadcast buffer. Slow peers lagging further behind lose events.
    #[arg(long, env = "CALLBOARD_CHANNEL_CAPACITY", default_value_t = 256)]
    pub channel_capacity: usize,
}

impl ServerConfig {
    pub fn build_store(&self) -> StoreResult<Arc<dyn HistoryStore>> {
        match &self.data_dir {
            Some(dir) => {
                tracing::info!(path = %dir.display(), "persisting history to disk");
                Ok(Arc::new(FileHistoryStore::new(dir.clone())?))
            }
            None => {
                tracing::warn!("no data directory configured, history is kept in memory");
                Ok(Arc::new(MemoryHistoryStore::new()))
            }
        }
    }
}

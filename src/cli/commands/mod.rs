mod init;
mod run;
mod serve;

pub use init::execute_init;
pub use run::{execute_run, run_once};
pub use serve::execute_serve;

use anyhow::{Context, Result};

use crate::cli::config::StoreConfig;
use crate::store::{MemoryKv, RestKv};

/// In-memory backend sized from `[store] page_size`.
pub(crate) fn memory_kv(config: &StoreConfig) -> MemoryKv {
    MemoryKv::with_page_size(config.page_size)
}

/// REST KV backend. `CF_API_TOKEN` / `CF_ACCOUNT_ID` fill in what the file leaves out.
pub(crate) fn rest_kv(config: &StoreConfig) -> Result<RestKv> {
    let account_id = config
        .account_id
        .clone()
        .or_else(|| std::env::var("CF_ACCOUNT_ID").ok())
        .context("[store] account_id (or CF_ACCOUNT_ID) is required for the cloudflare backend")?;
    let namespace_id = config
        .namespace_id
        .as_deref()
        .context("[store] namespace_id is required for the cloudflare backend")?;
    let token = config
        .api_token
        .clone()
        .or_else(|| std::env::var("CF_API_TOKEN").ok())
        .context("[store] api_token (or CF_API_TOKEN) is required for the cloudflare backend")?;

    Ok(RestKv::new(&account_id, namespace_id, token)?)
}

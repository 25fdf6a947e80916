mod analyze;
mod history;
mod market;
mod overview;
mod peers;
mod quote;
mod quotes;
mod ratios;
mod sql;

pub(crate) use sql::format_sql_value;

use std::sync::Arc;
use std::time::Instant;

use ratiolens_core::{
    Engine, EngineConfig, ErrorDetail, PeerRequest, ProviderId, RouteFailure, WarehouseStore,
};
use ratiolens_warehouse::Warehouse;
use serde_json::Value;
use tracing::debug;

use crate::cli::{Cli, Command, PeerSelectionArgs};
use crate::error::CliError;

pub struct CommandResult {
    pub request_id: Option<String>,
    pub data: Value,
    pub warnings: Vec<String>,
    pub errors: Vec<ErrorDetail>,
    pub latency_ms: u64,
    pub source_chain: Vec<ProviderId>,
}

impl CommandResult {
    pub fn ok(data: Value, source_chain: Vec<ProviderId>) -> Self {
        Self {
            request_id: None,
            data,
            warnings: Vec::new(),
            errors: Vec::new(),
            latency_ms: 0,
            source_chain,
        }
    }

    /// Empty payload carrying the errors of a route where every provider failed.
    pub fn failed_route(failure: RouteFailure) -> Self {
        Self::ok(Value::Null, failure.source_chain).with_errors(failure.errors)
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn with_errors(mut self, errors: Vec<ErrorDetail>) -> Self {
        self.errors.extend(errors);
        self
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }
}

/// Engine plus the optional warehouse store, shared by every command.
pub struct Context {
    pub engine: Engine,
    pub store: Option<WarehouseStore>,
}

impl Context {
    fn build(config: EngineConfig, persist: bool) -> Result<Self, CliError> {
        let engine = Engine::from_config(config)?;
        if !persist {
            return Ok(Self {
                engine,
                store: None,
            });
        }

        let warehouse = Warehouse::open_default()?;
        debug!(db_path = %warehouse.db_path().display(), "warehouse attached");
        let store = WarehouseStore::new(warehouse);
        Ok(Self {
            engine: engine.with_store(Arc::new(store.clone())),
            store: Some(store),
        })
    }

    /// Store for commands that always need the warehouse.
    fn require_store(&self) -> Result<WarehouseStore, CliError> {
        match &self.store {
            Some(store) => Ok(store.clone()),
            None => Ok(WarehouseStore::new(Warehouse::open_default()?)),
        }
    }
}

pub async fn run(cli: &Cli) -> Result<CommandResult, CliError> {
    let config = EngineConfig::from_env()?;
    debug!(config = ?config, "engine configuration loaded");
    let started = Instant::now();

    let result = match &cli.command {
        Command::Market => market::run(&config)?,
        Command::Sql(args) => sql::run(args)?,
        Command::Analyze(args) => analyze::run(args, &Context::build(config, cli.persist)?).await?,
        Command::Ratios(args) => ratios::run(args, &Context::build(config, cli.persist)?).await?,
        Command::Peers(args) => peers::run(args, &Context::build(config, cli.persist)?).await?,
        Command::Quote(args) => quote::run(args, &Context::build(config, cli.persist)?).await?,
        Command::History(args) => history::run(args, &Context::build(config, cli.persist)?).await?,
        Command::Overview(args) => overview::run(args, &Context::build(config, cli.persist)?).await?,
        Command::Quotes(args) => quotes::run(args, &Context::build(config, cli.persist)?).await?,
    };

    Ok(if result.latency_ms == 0 {
        result.with_latency(elapsed_ms(started))
    } else {
        result
    })
}

pub(crate) fn peer_request(selection: &PeerSelectionArgs) -> PeerRequest {
    if selection.peers.is_empty() {
        PeerRequest::sector(selection.sector.clone(), selection.limit)
    } else {
        PeerRequest::explicit(selection.peers.iter().cloned(), selection.limit)
    }
}

pub(crate) fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

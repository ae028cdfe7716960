//! Serialized async host for one engine.
//!
//! Many tasks can hold a [`LedgerService`] handle; a single worker task
//! applies their commands to the engine in arrival order.

use alloy::primitives::{Address, U256};
use cdp_chain::PositionId;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::engine::CdpEngine;
use crate::error::{EngineError, EngineResult};
use crate::liquidation::LiquidationSummary;
use crate::staking_yield::SplitOutcome;

type Job = Box<dyn FnOnce(&CdpEngine) + Send>;

/// Cloneable handle to the worker.
#[derive(Clone)]
pub struct LedgerService {
    tx: mpsc::Sender<Job>,
}

impl LedgerService {
    /// Spawn the worker on the current runtime.
    ///
    /// The worker exits once every handle has been dropped.
    pub fn spawn(engine: Arc<CdpEngine>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<Job>(capacity.max(1));
        let handle = tokio::spawn(async move {
            info!("Ledger service started");
            let mut processed = 0u64;
            while let Some(job) = rx.recv().await {
                job(&engine);
                processed += 1;
            }
            info!(processed, "Ledger service stopped");
        });
        (Self { tx }, handle)
    }

    /// Run `f` on the worker and wait for its result.
    pub async fn call<T, F>(&self, f: F) -> EngineResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&CdpEngine) -> T + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move |engine| {
            // receiver may have gone away; nothing to do then
            let _ = reply_tx.send(f(engine));
        });
        self.tx
            .send(job)
            .await
            .map_err(|_| EngineError::ServiceStopped)?;
        reply_rx.await.map_err(|_| EngineError::ServiceStopped)
    }

    pub async fn open_position(
        &self,
        owner: Address,
        coll: U256,
        debt: U256,
    ) -> EngineResult<PositionId> {
        self.call(move |engine| engine.open_position(owner, coll, debt)).await?
    }

    pub async fn liquidate(
        &self,
        liquidator: Address,
        ids: Vec<PositionId>,
    ) -> EngineResult<LiquidationSummary> {
        self.call(move |engine| engine.liquidate(liquidator, &ids)).await?
    }

    pub async fn liquidate_lowest(
        &self,
        liquidator: Address,
        n: usize,
    ) -> EngineResult<LiquidationSummary> {
        debug!(n, "Queueing sequential liquidation");
        self.call(move |engine| engine.liquidate_lowest(liquidator, n)).await?
    }

    pub async fn claim_split(&self) -> EngineResult<Option<SplitOutcome>> {
        self.call(|engine| engine.claim_split()).await?
    }

    pub async fn claim_surplus(&self, owner: Address) -> EngineResult<U256> {
        self.call(move |engine| engine.claim_surplus(owner)).await?
    }

    pub async fn redeem(
        &self,
        redeemer: Address,
        id: PositionId,
        debt_amount: U256,
    ) -> EngineResult<U256> {
        self.call(move |engine| engine.redeem(redeemer, id, debt_amount)).await?
    }

    pub async fn get_tcr(&self) -> EngineResult<U256> {
        self.call(|engine| engine.get_tcr()).await?
    }
}

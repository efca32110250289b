//! Funding pre-flight: price, balance, top-up and confirmation.
//!
//! A top-up is a single ledger transfer for exactly the missing price. The
//! node is told about it, asked whether it credited it, and on confirmation
//! the balance is re-read a bounded number of times until it covers the price.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use permabundle_transport::{
    AccountService, Amount, CancellationToken, FundingReference, FundingStatus, Ledger,
    RemoteError,
};
use tracing::{debug, info, warn};

use crate::config::FundingConfig;
use crate::error::{ClientError, Result};

/// Result of making sure the account can pay for an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FundingOutcome {
    /// The balance already covered the price.
    Covered { price: Amount, balance: Amount },
    /// A top-up was submitted and the node confirmed it.
    Funded {
        reference: FundingReference,
        price: Amount,
        balance: Amount,
    },
    /// A top-up was submitted but the node has not credited it yet.
    Pending {
        reference: FundingReference,
        price: Amount,
        balance: Amount,
    },
}

impl FundingOutcome {
    pub fn is_ready(&self) -> bool {
        !matches!(self, FundingOutcome::Pending { .. })
    }

    pub fn price(&self) -> &Amount {
        match self {
            FundingOutcome::Covered { price, .. }
            | FundingOutcome::Funded { price, .. }
            | FundingOutcome::Pending { price, .. } => price,
        }
    }

    pub fn reference(&self) -> Option<&FundingReference> {
        match self {
            FundingOutcome::Covered { .. } => None,
            FundingOutcome::Funded { reference, .. } | FundingOutcome::Pending { reference, .. } => {
                Some(reference)
            }
        }
    }
}

/// Result of an explicit top-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopUpConfirmation {
    pub confirmed: bool,
    pub reference: FundingReference,
    /// Balance as last read from the node.
    pub balance: Amount,
}

/// Errors worth another balance read.
fn is_transient(error: &RemoteError) -> bool {
    matches!(error, RemoteError::Timeout | RemoteError::Transport(_))
}

/// Drives the funding pre-flight against an account service and a ledger.
pub struct FundingOrchestrator {
    account: Arc<dyn AccountService>,
    ledger: Arc<dyn Ledger>,
    config: FundingConfig,
    request_timeout: Duration,
}

impl FundingOrchestrator {
    pub fn new(
        account: Arc<dyn AccountService>,
        ledger: Arc<dyn Ledger>,
        config: FundingConfig,
        request_timeout: Duration,
    ) -> Self {
        Self {
            account,
            ledger,
            config,
            request_timeout,
        }
    }

    /// Make sure the account can pay for storing `bytes` bytes.
    pub async fn ensure_funded(
        &self,
        bytes: u64,
        cancel: &CancellationToken,
    ) -> Result<FundingOutcome> {
        let price = self.call("price", cancel, self.account.price(bytes)).await?;
        let balance = self.call("balance", cancel, self.account.balance()).await?;
        debug!(bytes, %price, %balance, "funding pre-flight");

        if balance >= price {
            return Ok(FundingOutcome::Covered { price, balance });
        }

        info!(%price, %balance, "balance short, submitting top-up");
        let (reference, status) = self.fund(&price, cancel).await?;

        match status {
            FundingStatus::Pending => {
                info!(%reference, "top-up pending");
                Ok(FundingOutcome::Pending {
                    reference,
                    price,
                    balance,
                })
            }
            FundingStatus::Confirmed => {
                let balance = self.refresh_balance(&price, cancel).await?;
                Ok(FundingOutcome::Funded {
                    reference,
                    price,
                    balance,
                })
            }
        }
    }

    /// Transfer `amount` to the node regardless of the current balance.
    pub async fn top_up(
        &self,
        amount: &Amount,
        cancel: &CancellationToken,
    ) -> Result<TopUpConfirmation> {
        let before = self.call("balance", cancel, self.account.balance()).await?;
        let (reference, status) = self.fund(amount, cancel).await?;

        let confirmed = status == FundingStatus::Confirmed;
        let balance = if confirmed {
            self.refresh_balance(&(&before + amount), cancel).await?
        } else {
            self.call("balance", cancel, self.account.balance()).await?
        };

        Ok(TopUpConfirmation {
            confirmed,
            reference,
            balance,
        })
    }

    /// Submit the ledger transfer, notify the node and ask for its status.
    async fn fund(
        &self,
        amount: &Amount,
        cancel: &CancellationToken,
    ) -> Result<(FundingReference, FundingStatus)> {
        let reference = self
            .call(
                "funding transaction",
                cancel,
                self.ledger.submit_funding_transaction(amount),
            )
            .await?;
        info!(%reference, %amount, "funding transaction submitted");

        self.call("funding notification", cancel, self.account.notify_funding(&reference))
            .await?;
        let status = self
            .call("funding status", cancel, self.account.funding_status(&reference))
            .await?;
        Ok((reference, status))
    }

    /// Re-read the balance until it reaches `target` or attempts run out.
    ///
    /// Running out is not an error: the node is the final judge and will
    /// reject the upload if the credit never lands.
    async fn refresh_balance(&self, target: &Amount, cancel: &CancellationToken) -> Result<Amount> {
        let attempts = self.config.balance_refresh_attempts.max(1);
        let mut last = None;

        for attempt in 1..=attempts {
            match self.call("balance", cancel, self.account.balance()).await {
                Ok(balance) if &balance >= target => return Ok(balance),
                Ok(balance) => {
                    debug!(attempt, %balance, %target, "balance not yet credited");
                    last = Some(balance);
                }
                Err(ClientError::Remote { source, .. }) if is_transient(&source) => {
                    warn!(attempt, error = %source, "balance refresh failed");
                }
                Err(e) => return Err(e),
            }

            if attempt < attempts {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        return Err(ClientError::Cancelled { operation: "balance" });
                    }
                    _ = tokio::time::sleep(self.config.balance_refresh_interval) => {}
                }
            }
        }

        warn!(%target, "balance still below target after top-up, proceeding");
        match last {
            Some(balance) => Ok(balance),
            None => self.call("balance", cancel, self.account.balance()).await,
        }
    }

    async fn call<T>(
        &self,
        operation: &'static str,
        cancel: &CancellationToken,
        call: impl Future<Output = std::result::Result<T, RemoteError>>,
    ) -> Result<T> {
        guarded(operation, self.request_timeout, cancel, call).await
    }
}

/// Run one remote call under a deadline, giving way to cancellation.
pub(crate) async fn guarded<T>(
    operation: &'static str,
    timeout: Duration,
    cancel: &CancellationToken,
    call: impl Future<Output = std::result::Result<T, RemoteError>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ClientError::Cancelled { operation }),
        outcome = tokio::time::timeout(timeout, call) => {
            let source = match outcome {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(source)) => source,
                Err(_) => RemoteError::Timeout,
            };
            Err(ClientError::Remote { operation, source })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use permabundle_transport::memory::{MemoryLedger, MemoryNode, NodeEvent};

    fn orchestrator(node: &Arc<MemoryNode>, ledger: &Arc<MemoryLedger>) -> FundingOrchestrator {
        FundingOrchestrator::new(
            node.clone(),
            ledger.clone(),
            FundingConfig {
                balance_refresh_attempts: 3,
                balance_refresh_interval: Duration::from_millis(5),
            },
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_covered_balance_submits_nothing() {
        let node = MemoryNode::new();
        let ledger = MemoryLedger::new(node.clone());
        node.set_pricing(Amount::from(50u64), Amount::zero()).await;
        node.set_balance(Amount::from(80u64)).await;

        let outcome = orchestrator(&node, &ledger)
            .ensure_funded(1000, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            outcome,
            FundingOutcome::Covered {
                price: Amount::from(50u64),
                balance: Amount::from(80u64),
            }
        );
        assert!(ledger.submissions().await.is_empty());
    }

    #[tokio::test]
    async fn test_tops_up_exactly_the_price() {
        let node = MemoryNode::new();
        let ledger = MemoryLedger::new(node.clone());
        node.set_pricing(Amount::from(100u64), Amount::zero()).await;

        let outcome = orchestrator(&node, &ledger)
            .ensure_funded(10, &CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.is_ready());
        assert!(matches!(outcome, FundingOutcome::Funded { ref balance, .. } if *balance == Amount::from(100u64)));
        assert_eq!(ledger.submissions().await, vec![Amount::from(100u64)]);
    }

    #[tokio::test]
    async fn test_pending_top_up() {
        let node = MemoryNode::new();
        let ledger = MemoryLedger::new(node.clone());
        node.set_pricing(Amount::from(100u64), Amount::zero()).await;
        node.set_confirms_funding(false).await;

        let outcome = orchestrator(&node, &ledger)
            .ensure_funded(10, &CancellationToken::new())
            .await
            .unwrap();

        assert!(!outcome.is_ready());
        assert!(outcome.reference().is_some());
        assert_eq!(outcome.price(), &Amount::from(100u64));
    }

    #[tokio::test]
    async fn test_refresh_waits_out_lagging_balance() {
        let node = MemoryNode::new();
        let ledger = MemoryLedger::new(node.clone());
        node.set_pricing(Amount::from(100u64), Amount::zero()).await;
        node.set_balance_lag(2).await;

        let outcome = orchestrator(&node, &ledger)
            .ensure_funded(10, &CancellationToken::new())
            .await
            .unwrap();

        assert!(matches!(outcome, FundingOutcome::Funded { ref balance, .. } if *balance == Amount::from(100u64)));
        let reads = node
            .events()
            .await
            .into_iter()
            .filter(|e| matches!(e, NodeEvent::BalanceQueried(_)))
            .count();
        // One pre-flight read, two stale reads, one fresh read.
        assert_eq!(reads, 4);
    }

    #[tokio::test]
    async fn test_refresh_gives_up_and_proceeds() {
        let node = MemoryNode::new();
        let ledger = MemoryLedger::new(node.clone());
        node.set_pricing(Amount::from(100u64), Amount::zero()).await;
        node.set_balance_lag(10).await;

        let outcome = orchestrator(&node, &ledger)
            .ensure_funded(10, &CancellationToken::new())
            .await
            .unwrap();

        assert!(matches!(outcome, FundingOutcome::Funded { ref balance, .. } if balance.is_zero()));
    }

    #[tokio::test]
    async fn test_refresh_retries_transient_errors() {
        let node = MemoryNode::new();
        let ledger = MemoryLedger::new(node.clone());
        node.set_pricing(Amount::from(100u64), Amount::zero()).await;
        let funder = orchestrator(&node, &ledger);
        let cancel = CancellationToken::new();

        // Pre-flight reads succeed; the first refresh read fails.
        let price = Amount::from(100u64);
        let (reference, status) = funder.fund(&price, &cancel).await.unwrap();
        assert_eq!(status, FundingStatus::Confirmed);
        assert!(reference.0.starts_with("0x"));

        node.script_balance_errors(vec![RemoteError::Timeout]).await;
        let balance = funder.refresh_balance(&price, &cancel).await.unwrap();
        assert_eq!(balance, price);
    }

    #[tokio::test]
    async fn test_refresh_stops_on_hard_error() {
        let node = MemoryNode::new();
        let ledger = MemoryLedger::new(node.clone());
        let funder = orchestrator(&node, &ledger);

        node.script_balance_errors(vec![RemoteError::Status {
            status: 500,
            message: "down".into(),
        }])
        .await;
        let err = funder
            .refresh_balance(&Amount::from(1u64), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Remote { operation: "balance", .. }));
    }

    #[tokio::test]
    async fn test_ledger_failure_surfaces() {
        let node = MemoryNode::new();
        let ledger = MemoryLedger::new(node.clone());
        node.set_pricing(Amount::from(100u64), Amount::zero()).await;
        ledger
            .fail_next(RemoteError::Transport("rpc unreachable".into()))
            .await;

        let err = orchestrator(&node, &ledger)
            .ensure_funded(10, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::Remote {
                operation: "funding transaction",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_top_up() {
        let node = MemoryNode::new();
        let ledger = MemoryLedger::new(node.clone());
        node.set_balance(Amount::from(7u64)).await;

        let confirmation = orchestrator(&node, &ledger)
            .top_up(&Amount::from(3u64), &CancellationToken::new())
            .await
            .unwrap();

        assert!(confirmation.confirmed);
        assert_eq!(confirmation.balance, Amount::from(10u64));
        assert_eq!(ledger.submissions().await, vec![Amount::from(3u64)]);
    }

    #[tokio::test]
    async fn test_cancelled() {
        let node = MemoryNode::new();
        let ledger = MemoryLedger::new(node.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = orchestrator(&node, &ledger)
            .ensure_funded(10, &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(node.events().await.is_empty());
    }
}

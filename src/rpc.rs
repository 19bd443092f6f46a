use crate::config::Config;
use crate::probe::{CallError, LedgerClient};
use alloy::providers::fillers::FillProvider;
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::{Filter, Log, TransactionRequest};
use alloy::transports::TransportError;
use alloy_primitives::{Address, Bytes};
use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::timeout;
use tokio_retry::Retry;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, info, warn};

const MAX_RESULTS_ERROR: &str = "exceeds max results";

type AlloyFullProvider = FillProvider<
    alloy::providers::fillers::JoinFill<
        alloy::providers::Identity,
        alloy::providers::fillers::JoinFill<
            alloy::providers::fillers::GasFiller,
            alloy::providers::fillers::JoinFill<
                alloy::providers::fillers::BlobGasFiller,
                alloy::providers::fillers::JoinFill<
                    alloy::providers::fillers::NonceFiller,
                    alloy::providers::fillers::ChainIdFiller,
                >,
            >,
        >,
    >,
    alloy::providers::RootProvider,
>;

#[derive(Clone)]
pub struct RpcClient {
    providers: Vec<AlloyFullProvider>,
    urls: Vec<String>,
    current_provider: Arc<AtomicUsize>,
    max_retries: usize,
    request_timeout: Duration,
}

impl RpcClient {
    pub fn new(rpc_urls: &[String], config: &Config) -> Result<Self> {
        if rpc_urls.is_empty() {
            return Err(anyhow::anyhow!("At least one RPC URL must be provided"));
        }

        let mut providers = Vec::new();
        for url in rpc_urls {
            let parsed_url = url
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid RPC URL: {}", url))?;
            let provider: AlloyFullProvider = ProviderBuilder::new().connect_http(parsed_url);
            providers.push(provider);
        }

        Ok(RpcClient {
            providers,
            urls: rpc_urls.to_vec(),
            current_provider: Arc::new(AtomicUsize::new(0)),
            max_retries: config.max_retries,
            request_timeout: config.request_timeout,
        })
    }

    fn get_provider(&self) -> &AlloyFullProvider {
        let index = self.current_provider.load(Ordering::Relaxed) % self.providers.len();
        &self.providers[index]
    }

    pub fn get_current_url(&self) -> &str {
        let index = self.current_provider.load(Ordering::Relaxed) % self.urls.len();
        &self.urls[index]
    }

    pub fn rotate_provider(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.providers.len();
        self.current_provider.store(next, Ordering::Relaxed);

        if self.providers.len() > 1 {
            debug!("Rotating to RPC provider #{}", next);
        }
    }

    fn get_retry_strategy(&self) -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(100)
            .factor(2)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.max_retries)
    }

    fn handle_error(&self, error_str: &str) {
        let current_url = self.get_current_url();
        warn!(
            "RPC error on {}: {}, rotating provider",
            current_url, error_str
        );
        self.rotate_provider();
    }

    fn handle_timeout(&self) -> anyhow::Error {
        let current_url = self.get_current_url();
        warn!(
            "Request timeout after {} seconds on {}, rotating provider",
            self.request_timeout.as_secs(),
            current_url
        );
        self.rotate_provider();
        anyhow::anyhow!(
            "Request timeout after {} seconds",
            self.request_timeout.as_secs()
        )
    }

    /// Runs `op` against the current provider with a timeout and backoff.
    /// Errors for which `is_final` holds stop the retries and come back in
    /// the inner result; anything else rotates the provider and tries again.
    async fn with_retry<T, F, Fut>(
        &self,
        op: F,
        is_final: fn(&TransportError) -> bool,
    ) -> Result<Result<T, TransportError>>
    where
        F: Fn(AlloyFullProvider) -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        Retry::spawn(self.get_retry_strategy(), || {
            let attempt = op(self.get_provider().clone());
            async move {
                match timeout(self.request_timeout, attempt).await {
                    Ok(Ok(value)) => Ok(Ok(value)),
                    Ok(Err(e)) if is_final(&e) => Ok(Err(e)),
                    Ok(Err(e)) => {
                        self.handle_error(&e.to_string());
                        Err(anyhow::anyhow!("{}", e))
                    }
                    Err(_) => Err(self.handle_timeout()),
                }
            }
        })
        .await
    }

    pub async fn get_latest_block(&self) -> Result<u64> {
        let block = self
            .with_retry(
                |provider| async move { provider.get_block_number().await },
                |_| false,
            )
            .await??;
        Ok(block)
    }

    /// `eth_call` against the latest block. A JSON-RPC error response is the
    /// node telling us the call failed (revert, invalid opcode), so it comes
    /// back as `Reverted` and is never retried.
    pub async fn call_contract(
        &self,
        contract_address: Address,
        data: Bytes,
    ) -> Result<Bytes, CallError> {
        let request = TransactionRequest::default()
            .to(contract_address)
            .input(data.into());

        let result = self
            .with_retry(
                |provider| {
                    let request = request.clone();
                    async move { provider.call(request).await }
                },
                |e| e.as_error_resp().is_some(),
            )
            .await;

        match result {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(CallError::Reverted(
                e.as_error_resp()
                    .map(|payload| payload.message.to_string())
                    .unwrap_or_else(|| e.to_string()),
            )),
            Err(e) => Err(CallError::Transport(e.to_string())),
        }
    }

    async fn get_logs_internal(
        &self,
        filter: &Filter,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Log>> {
        let filter = filter.clone().from_block(from_block).to_block(to_block);

        let logs = self
            .with_retry(
                |provider| {
                    let filter = filter.clone();
                    async move { provider.get_logs(&filter).await }
                },
                // the node wants a smaller range, the caller splits it
                |e| e.to_string().contains(MAX_RESULTS_ERROR),
            )
            .await??;
        Ok(logs)
    }

    fn parse_max_results_error(error_str: &str) -> Option<(u64, u64)> {
        let re = Regex::new(r"retry with the range (\d+)-(\d+)").ok()?;
        let captures = re.captures(error_str)?;

        let from = captures.get(1)?.as_str().parse().ok()?;
        let to = captures.get(2)?.as_str().parse().ok()?;

        Some((from, to))
    }

    /// Fetches logs matching `filter` in `[from_block, to_block]`, splitting
    /// the range when the node asks for a smaller one.
    pub async fn get_logs(&self, filter: &Filter, from_block: u64, to_block: u64) -> Result<Vec<Log>> {
        let mut all_logs = Vec::new();
        let mut current_from = from_block;

        while current_from <= to_block {
            match self.get_logs_internal(filter, current_from, to_block).await {
                Ok(logs) => {
                    all_logs.extend(logs);
                    break;
                }
                Err(e) => {
                    let error_str = e.to_string();

                    if !error_str.contains(MAX_RESULTS_ERROR) {
                        return Err(e);
                    }

                    let Some((suggested_from, suggested_to)) =
                        Self::parse_max_results_error(&error_str)
                    else {
                        return Err(e);
                    };

                    info!(
                        "Hit max results limit for blocks {}-{}, splitting at block {}",
                        current_from, to_block, suggested_to
                    );

                    let logs = self
                        .get_logs_internal(filter, suggested_from, suggested_to)
                        .await?;

                    all_logs.extend(logs);
                    current_from = suggested_to + 1;
                }
            }
        }

        Ok(all_logs)
    }
}

#[async_trait]
impl LedgerClient for RpcClient {
    async fn call(&self, contract_address: Address, data: Bytes) -> Result<Bytes, CallError> {
        self.call_contract(contract_address, data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_suggested_range_from_error() {
        let error = "query exceeds max results 10000, retry with the range 100-250";
        assert_eq!(RpcClient::parse_max_results_error(error), Some((100, 250)));
        assert_eq!(RpcClient::parse_max_results_error("rate limited"), None);
    }
}

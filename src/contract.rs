use std::{
    fmt,
    sync::{
        Arc,
        atomic::{
            AtomicU64,
            Ordering,
        },
    },
};

use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use serde::{
    Deserialize,
    Serialize,
    de::DeserializeOwned,
};
use serde_json::json;

use crate::model::GameState;

/// Handle to a mined guess transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: String,
}

/// Surface of the word-guessing contract as seen by the orchestrator.
///
/// `guess_word` must resolve only once the transaction is mined; a broadcast
/// that is later rejected or reverted is an error, not a receipt.
pub trait ContractClient {
    async fn guess_word(
        &self,
        word: &str,
        from: &str,
        stake: u64,
    ) -> Result<TxReceipt>;

    async fn game_state(&self) -> Result<GameState>;

    async fn owner(&self) -> Result<String>;
}

/// JSON-RPC 2.0 client for a node gateway that fronts the contract and holds
/// the signing account. Wallet confirmation and inclusion happen behind the
/// gateway; the call returns when the transaction is mined.
#[derive(Clone)]
pub struct RpcContractClient {
    rpc_url: String,
    contract_address: String,
    http: reqwest::Client,
    next_id: Arc<AtomicU64>,
}

impl RpcContractClient {
    pub fn new(
        rpc_url: impl Into<String>,
        contract_address: impl Into<String>,
    ) -> Result<Self> {
        let rpc_url = rpc_url.into().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder()
            .build()
            .wrap_err("failed to build HTTP client for contract gateway")?;
        Ok(Self {
            rpc_url,
            contract_address: contract_address.into(),
            http,
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    pub fn contract_address(&self) -> &str {
        &self.contract_address
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        let res = self
            .http
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .wrap_err("contract gateway request failed")?;
        let status = res.status();
        if !status.is_success() {
            let body = res
                .text()
                .await
                .unwrap_or_else(|_| "<unavailable body>".to_string());
            return Err(eyre!(
                "contract gateway responded with {status} for {method}: {body}"
            ));
        }
        let envelope: RpcResponse<T> = res
            .json()
            .await
            .wrap_err_with(|| format!("invalid gateway payload for {method}"))?;
        if let Some(err) = envelope.error {
            return Err(eyre!("gateway error {} for {method}: {}", err.code, err.message));
        }
        envelope
            .result
            .ok_or_else(|| eyre!("gateway returned neither result nor error for {method}"))
    }
}

impl ContractClient for RpcContractClient {
    async fn guess_word(
        &self,
        word: &str,
        from: &str,
        stake: u64,
    ) -> Result<TxReceipt> {
        let receipt: TxReceiptDto = self
            .call(
                "guess_word",
                json!({
                    "contract": self.contract_address,
                    "word": word,
                    "from": from,
                    "value": stake,
                }),
            )
            .await?;
        match receipt.status {
            TxStatusDto::Mined => Ok(TxReceipt {
                tx_hash: receipt.tx_hash,
            }),
            TxStatusDto::Reverted => {
                Err(eyre!("transaction {} reverted", receipt.tx_hash))
            }
        }
    }

    async fn game_state(&self) -> Result<GameState> {
        let dto: GameStateDto = self
            .call(
                "game_state",
                json!({ "contract": self.contract_address }),
            )
            .await?;
        Ok(GameState {
            prize_pool: dto.prize_pool,
            ended: dto.ended,
        })
    }

    async fn owner(&self) -> Result<String> {
        let dto: OwnerDto = self
            .call("owner", json!({ "contract": self.contract_address }))
            .await?;
        Ok(dto.owner)
    }
}

impl fmt::Display for RpcContractClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", self.contract_address, self.rpc_url)
    }
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorDto>,
}

#[derive(Deserialize)]
struct RpcErrorDto {
    code: i64,
    message: String,
}

#[derive(Serialize, Deserialize)]
struct TxReceiptDto {
    tx_hash: String,
    status: TxStatusDto,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum TxStatusDto {
    Mined,
    Reverted,
}

#[derive(Deserialize)]
struct GameStateDto {
    prize_pool: u64,
    ended: bool,
}

#[derive(Deserialize)]
struct OwnerDto {
    owner: String,
}

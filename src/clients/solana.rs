use reqwest::Client;
use serde_json::{json, Value};
use std::collections::HashSet;
use tokio::time::Duration;
use tracing::debug;

use super::{OwnershipSource, UpstreamError};

/// SPL token program id; all fungible and NFT token accounts live under it.
const TOKEN_PROGRAM_ID: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";

/// Ownership resolver backed by a Solana JSON-RPC node.
///
/// Uses `getTokenAccountsByOwner` with `jsonParsed` encoding and keeps every
/// mint held with a non-zero amount. NFT accounts hold amount 1 with 0
/// decimals, but a plain `amount > 0` check is what matters for ownership.
pub struct SolanaRpcClient {
    client: Client,
    rpc_url: String,
}

impl SolanaRpcClient {
    pub fn new(rpc_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            rpc_url: rpc_url.into(),
        }
    }

    fn parse_owned_mints(body: &Value) -> Result<HashSet<String>, UpstreamError> {
        if let Some(error) = body.get("error") {
            let message = error
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown RPC error");
            return Err(UpstreamError::Rpc(message.to_string()));
        }

        let accounts = body
            .pointer("/result/value")
            .and_then(|v| v.as_array())
            .ok_or_else(|| UpstreamError::Malformed("missing result.value array".to_string()))?;

        let mut mints = HashSet::new();
        for account in accounts {
            let Some(info) = account.pointer("/account/data/parsed/info") else {
                continue;
            };
            let Some(mint) = info.get("mint").and_then(|v| v.as_str()) else {
                continue;
            };
            let amount = info
                .pointer("/tokenAmount/amount")
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(0);

            if amount > 0 {
                mints.insert(mint.to_string());
            }
        }

        Ok(mints)
    }
}

#[async_trait::async_trait]
impl OwnershipSource for SolanaRpcClient {
    async fn fetch_owned_mints(&self, wallet_address: &str) -> Result<HashSet<String>, UpstreamError> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "getTokenAccountsByOwner",
            "params": [
                wallet_address,
                {"programId": TOKEN_PROGRAM_ID},
                {"encoding": "jsonParsed"}
            ]
        });

        debug!("Fetching token accounts for wallet {}", wallet_address);

        let response = self
            .client
            .post(&self.rpc_url)
            .timeout(Duration::from_secs(30))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status(status.as_u16()));
        }

        let body: Value = response.json().await?;
        Self::parse_owned_mints(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_account(mint: &str, amount: &str) -> Value {
        json!({
            "account": {
                "data": {
                    "parsed": {
                        "info": {
                            "mint": mint,
                            "tokenAmount": {"amount": amount, "decimals": 0}
                        }
                    }
                }
            }
        })
    }

    #[test]
    fn test_parse_owned_mints_keeps_nonzero_amounts() {
        let body = json!({
            "result": {
                "value": [
                    token_account("MintA", "1"),
                    token_account("MintB", "0"),
                    token_account("MintC", "250000")
                ]
            }
        });

        let mints = SolanaRpcClient::parse_owned_mints(&body).unwrap();
        assert_eq!(mints.len(), 2);
        assert!(mints.contains("MintA"));
        assert!(mints.contains("MintC"));
        assert!(!mints.contains("MintB"));
    }

    #[test]
    fn test_parse_owned_mints_empty_wallet() {
        let body = json!({"result": {"value": []}});
        let mints = SolanaRpcClient::parse_owned_mints(&body).unwrap();
        assert!(mints.is_empty());
    }

    #[test]
    fn test_parse_skips_unparseable_accounts() {
        let body = json!({
            "result": {
                "value": [
                    {"account": {"data": "base64blob"}},
                    token_account("MintA", "1")
                ]
            }
        });
        let mints = SolanaRpcClient::parse_owned_mints(&body).unwrap();
        assert_eq!(mints.len(), 1);
    }

    #[test]
    fn test_rpc_error_surfaces() {
        let body = json!({"error": {"code": -32602, "message": "Invalid param: WrongSize"}});
        let err = SolanaRpcClient::parse_owned_mints(&body).unwrap_err();
        assert!(matches!(err, UpstreamError::Rpc(_)));
        assert!(err.to_string().contains("WrongSize"));
    }

    #[test]
    fn test_missing_result_is_malformed() {
        let body = json!({"jsonrpc": "2.0", "id": 1});
        let err = SolanaRpcClient::parse_owned_mints(&body).unwrap_err();
        assert!(matches!(err, UpstreamError::Malformed(_)));
    }
}

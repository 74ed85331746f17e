use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use crate::blockchain::chain_client::{CallFrame, ChainClient, TransactionRecord};
use crate::error::{ChainQueryError, DecodeError};
use crate::logging::{LogContext, MetricsLogger, PerformanceMonitor};
use crate::models::{encode_uint64, Address, Hash, HexData, RawBlock};

/// Selection set for a single transaction, shaped after the node's GraphQL schema
pub const TRANSACTION_DETAIL_QUERY: &str = r#"query($hash: Bytes32!) {
  transaction(hash: $hash) {
    hash
    status
    block { number hash }
    index
    nonce
    from { address }
    to { address }
    value
    gas
    gasPrice
    gasUsed
    cumulativeGasUsed
    createdContract { address }
    inputData
    privateInputData
    isPrivate
    logs {
      index
      account { address }
      topics
      data
    }
  }
}"#;

#[derive(Debug, Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: Vec<Value>,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[allow(dead_code)]
    jsonrpc: String,
    result: Option<Value>,
    error: Option<JsonRpcError>,
    #[allow(dead_code)]
    id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Serialize)]
struct GraphQlRequest<'a> {
    query: &'a str,
    variables: Value,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

/// JSON-RPC and GraphQL client for a single chain node.
#[derive(Clone)]
pub struct RpcClient {
    client: Client,
    endpoint: String,
    graphql_endpoint: String,
    timeout_seconds: u64,
}

impl RpcClient {
    pub fn new(endpoint: String, graphql_endpoint: String) -> Result<Self, ChainQueryError> {
        Self::new_with_config(endpoint, graphql_endpoint, 30)
    }

    /// Client with request timeout and connection pooling
    pub fn new_with_config(
        endpoint: String,
        graphql_endpoint: String,
        timeout_seconds: u64,
    ) -> Result<Self, ChainQueryError> {
        let context = LogContext::new("rpc_client", "initialization")
            .with_metadata("endpoint", json!(endpoint))
            .with_metadata("graphql_endpoint", json!(graphql_endpoint))
            .with_metadata("timeout_seconds", json!(timeout_seconds));
        context.info("Initializing chain client");

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            graphql_endpoint,
            timeout_seconds,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn graphql_endpoint(&self) -> &str {
        &self.graphql_endpoint
    }

    fn classify_send_error(&self, e: reqwest::Error) -> ChainQueryError {
        if e.is_timeout() {
            ChainQueryError::Timeout {
                seconds: self.timeout_seconds,
            }
        } else if e.is_connect() {
            ChainQueryError::Connection(e.to_string())
        } else {
            ChainQueryError::Http(e)
        }
    }

    fn check_status(status: reqwest::StatusCode) -> Result<(), ChainQueryError> {
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ChainQueryError::RateLimit { seconds: 60 });
        }
        if !status.is_success() {
            return Err(ChainQueryError::Connection(format!(
                "HTTP error: {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }
        Ok(())
    }

    async fn post_json<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<R, ChainQueryError> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.classify_send_error(e))?;

        Self::check_status(response.status())?;

        response.json().await.map_err(|e| self.classify_send_error(e))
    }

    /// Raw JSON-RPC round trip. A JSON-RPC error object becomes `ChainQueryError::Method`.
    async fn make_request(&self, method: &str, params: Vec<Value>) -> Result<Value, ChainQueryError> {
        let monitor = PerformanceMonitor::new(&format!("rpc_{}", method));
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
            id: 1,
        };

        LogContext::new("rpc_client", "make_request")
            .with_metadata("method", json!(method))
            .trace(&format!("Sending RPC request: {}", method));

        let result = async {
            let rpc_response: JsonRpcResponse = self.post_json(&self.endpoint, &request).await?;
            if let Some(error) = rpc_response.error {
                return Err(match error.code {
                    -32700 => ChainQueryError::InvalidResponse("Parse error".to_string()),
                    -32600 => ChainQueryError::InvalidResponse("Invalid request".to_string()),
                    -32602 => ChainQueryError::InvalidResponse(format!("Invalid params: {}", error.message)),
                    code => ChainQueryError::Method {
                        code,
                        message: error.message,
                    },
                });
            }
            Ok(rpc_response.result.unwrap_or(Value::Null))
        }
        .await;

        let duration = monitor.finish_with_result(&result);
        MetricsLogger::log_rpc_call(method, duration, result.is_ok());
        result
    }

    /// GraphQL round trip returning the `data` object.
    async fn execute_graphql_query(&self, query: &str, variables: Value) -> Result<Value, ChainQueryError> {
        let monitor = PerformanceMonitor::new("graphql_query");
        let request = GraphQlRequest { query, variables };

        let result = async {
            let response: GraphQlResponse = self.post_json(&self.graphql_endpoint, &request).await?;
            if let Some(first) = response.errors.first() {
                return Err(ChainQueryError::GraphQl(first.message.clone()));
            }
            response
                .data
                .ok_or_else(|| ChainQueryError::InvalidResponse("GraphQL response has no data".to_string()))
        }
        .await;

        let duration = monitor.finish_with_result(&result);
        MetricsLogger::log_rpc_call("graphql", duration, result.is_ok());
        result
    }

    fn parse_hex_result(method: &str, value: Value) -> Result<HexData, ChainQueryError> {
        let text = value
            .as_str()
            .ok_or_else(|| DecodeError::UnexpectedShape {
                field: method.to_string(),
                reason: format!("expected a hex string, got {}", value),
            })?;
        Ok(HexData::parse(method, text)?)
    }
}

/// Deserialize a response payload, reporting shape mismatches as decode errors.
fn decode_value<T: DeserializeOwned>(field: &str, value: Value) -> Result<T, ChainQueryError> {
    serde_json::from_value(value).map_err(|e| DecodeError::from_serde(field, &e).into())
}

fn is_revert(code: i64, message: &str) -> bool {
    code == 3 || message.to_ascii_lowercase().contains("revert")
}

#[async_trait]
impl ChainClient for RpcClient {
    async fn call_contract(
        &self,
        address: Address,
        input: &[u8],
        block_number: u64,
    ) -> Result<HexData, ChainQueryError> {
        let call = json!({
            "to": address.to_string(),
            "data": HexData::from(input.to_vec()).to_string(),
        });
        let params = vec![call, json!(encode_uint64(block_number))];

        match self.make_request("eth_call", params).await {
            Ok(value) => Self::parse_hex_result("eth_call", value),
            Err(ChainQueryError::Method { code, message }) if is_revert(code, &message) => {
                LogContext::new("rpc_client", "call_contract")
                    .with_address(&address.to_string())
                    .with_block_number(block_number)
                    .debug(&format!("Call reverted: {}", message));
                Ok(HexData::default())
            }
            Err(e) => Err(e),
        }
    }

    async fn get_code(&self, address: Address, block_hash: Hash) -> Result<HexData, ChainQueryError> {
        let params = vec![
            json!(address.to_string()),
            json!({ "blockHash": block_hash.to_string() }),
        ];
        let value = self.make_request("eth_getCode", params).await?;
        Self::parse_hex_result("eth_getCode", value)
    }

    async fn query_transaction(&self, hash: Hash) -> Result<TransactionRecord, ChainQueryError> {
        let data = self
            .execute_graphql_query(TRANSACTION_DETAIL_QUERY, json!({ "hash": hash.to_string() }))
            .await?;

        match data.get("transaction") {
            Some(Value::Null) | None => Err(ChainQueryError::NotFound(format!("transaction {}", hash))),
            Some(tx) => decode_value("transaction", tx.clone()),
        }
    }

    async fn get_block_by_number(&self, number: u64) -> Result<RawBlock, ChainQueryError> {
        let params = vec![json!(encode_uint64(number)), json!(false)];
        let value = self.make_request("eth_getBlockByNumber", params).await?;
        if value.is_null() {
            return Err(ChainQueryError::NotFound(format!("block {}", number)));
        }

        let block: RawBlock = decode_value("block", value)?;
        LogContext::new("rpc_client", "get_block_by_number")
            .with_block_number(number)
            .with_metadata("transaction_count", json!(block.transactions.len()))
            .debug(&format!(
                "Retrieved block {} with {} transactions",
                number,
                block.transactions.len()
            ));
        Ok(block)
    }

    async fn trace_internal_calls(&self, hash: Hash) -> Result<CallFrame, ChainQueryError> {
        let params = vec![json!(hash.to_string()), json!({ "tracer": "callTracer" })];
        let value = self.make_request("debug_traceTransaction", params).await?;
        if value.is_null() {
            return Err(ChainQueryError::NotFound(format!("trace for {}", hash)));
        }
        decode_value("trace", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_client_creation() {
        let client = RpcClient::new_with_config(
            "http://localhost:22000".to_string(),
            "http://localhost:8547/graphql".to_string(),
            5,
        )
        .unwrap();
        assert_eq!(client.endpoint(), "http://localhost:22000");
        assert_eq!(client.graphql_endpoint(), "http://localhost:8547/graphql");
    }

    #[test]
    fn test_json_rpc_request_serialization() {
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            method: "eth_getCode".to_string(),
            params: vec![],
            id: 1,
        };

        let serialized = serde_json::to_string(&request).unwrap();
        let expected = r#"{"jsonrpc":"2.0","method":"eth_getCode","params":[],"id":1}"#;
        assert_eq!(serialized, expected);
    }

    #[test]
    fn test_json_rpc_response_deserialization_error() {
        let response_json = r#"{"jsonrpc":"2.0","error":{"code":3,"message":"execution reverted"},"id":1}"#;
        let response: JsonRpcResponse = serde_json::from_str(response_json).unwrap();

        assert!(response.result.is_none());
        let error = response.error.unwrap();
        assert_eq!(error.code, 3);
        assert!(is_revert(error.code, &error.message));
    }

    #[test]
    fn test_graphql_response_with_errors() {
        let response: GraphQlResponse =
            serde_json::from_str(r#"{"data":null,"errors":[{"message":"bad hash"}]}"#).unwrap();
        assert!(response.data.is_none());
        assert_eq!(response.errors[0].message, "bad hash");
    }

    #[test]
    fn test_is_revert() {
        assert!(is_revert(-32000, "VM Exception: Revert"));
        assert!(!is_revert(-32601, "Method not found"));
    }

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            RpcClient::check_status(reqwest::StatusCode::TOO_MANY_REQUESTS),
            Err(ChainQueryError::RateLimit { seconds: 60 })
        ));
        assert!(matches!(
            RpcClient::check_status(reqwest::StatusCode::BAD_GATEWAY),
            Err(ChainQueryError::Connection(_))
        ));
        assert!(RpcClient::check_status(reqwest::StatusCode::OK).is_ok());
    }

    #[test]
    fn test_parse_hex_result_rejects_non_string() {
        assert!(matches!(
            RpcClient::parse_hex_result("eth_call", json!(12)),
            Err(ChainQueryError::Malformed(DecodeError::UnexpectedShape { .. }))
        ));
        assert!(matches!(
            RpcClient::parse_hex_result("eth_getCode", json!("0x6080zz")),
            Err(ChainQueryError::Malformed(DecodeError::InvalidHex { .. }))
        ));
        assert_eq!(
            RpcClient::parse_hex_result("eth_call", json!("0x")).unwrap().len(),
            0
        );
    }

    #[test]
    fn test_decode_value_reports_missing_fields() {
        let result: Result<TransactionRecord, _> =
            decode_value("transaction", json!({ "hash": "0x00", "status": "0x1" }));
        match result {
            Err(ChainQueryError::Malformed(DecodeError::MissingField(field))) => {
                assert_eq!(field, "transaction.block")
            }
            other => panic!("expected missing field, got {:?}", other),
        }
    }
}

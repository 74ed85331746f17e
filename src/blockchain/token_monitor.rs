use futures::stream::{self, StreamExt, TryStreamExt};
use serde_json::json;
use std::collections::BTreeMap;

use crate::blockchain::chain_client::ChainClient;
use crate::error::Result;
use crate::logging::{LogContext, MetricsLogger, PerformanceMonitor};
use crate::models::token::{
    ERC165_INTERFACE_ID, INVALID_INTERFACE_ID, SUPPORTS_INTERFACE_SELECTOR,
};
use crate::models::{Address, Hash, Transaction, TokenStandard, KNOWN_STANDARDS};

/// How a contract's standard was established
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionStage {
    Eip165,
    Bytecode,
}

impl DetectionStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionStage::Eip165 => "eip165",
            DetectionStage::Bytecode => "bytecode",
        }
    }
}

/// `supportsInterface(bytes4)` calldata: selector followed by the id left-aligned in one word.
pub fn supports_interface_calldata(interface_id: [u8; 4]) -> [u8; 36] {
    let mut calldata = [0u8; 36];
    calldata[..4].copy_from_slice(&SUPPORTS_INTERFACE_SELECTOR);
    calldata[4..8].copy_from_slice(&interface_id);
    calldata
}

/// ABI-decode a `bool` return value. Anything other than a canonical `true`
/// word, including empty data from a revert, reads as false.
pub fn decode_bool(ret: &[u8]) -> bool {
    if ret.len() < 32 {
        return false;
    }
    let word = &ret[..32];
    word[31] == 1 && word[..31].iter().all(|b| *b == 0)
}

/// Classifies newly created contracts by token standard.
///
/// Each candidate is queried through ERC-165 first; if that is inconclusive the
/// deployed bytecode is scanned for the standard's selectors and event topics.
pub struct TokenMonitor<C> {
    client: C,
    concurrency: usize,
}

impl<C: ChainClient> TokenMonitor<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            concurrency: 4,
        }
    }

    /// Number of candidate addresses classified concurrently.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Addresses deployed by `tx`: the top-level created contract and the target
    /// of every `CREATE`/`CREATE2` internal call, deduplicated in first-seen order.
    pub fn candidate_addresses(tx: &Transaction) -> Vec<Address> {
        let top_level = Some(tx.created_contract).filter(|a| !a.is_zero());
        let internal = tx
            .internal_calls
            .iter()
            .filter(|call| call.call_type.is_creation())
            .map(|call| call.to);

        let mut seen = Vec::new();
        for address in top_level.into_iter().chain(internal) {
            if !seen.contains(&address) {
                seen.push(address);
            }
        }
        seen
    }

    /// Token standard of every contract created by `tx`.
    ///
    /// Contracts matching no known standard are absent from the map. The first
    /// chain error aborts the whole call.
    pub async fn classify(&self, tx: &Transaction) -> Result<BTreeMap<Address, TokenStandard>> {
        let candidates = Self::candidate_addresses(tx);
        if candidates.is_empty() {
            return Ok(BTreeMap::new());
        }

        let monitor = PerformanceMonitor::new("classify_contracts")
            .with_metadata("transaction_hash", json!(tx.hash.to_string()))
            .with_metadata("candidates", json!(candidates.len()));

        let result = stream::iter(candidates)
            .map(|address| async move {
                self.classify_address(address, tx.block_number, tx.block_hash)
                    .await
                    .map(|found| (address, found))
            })
            .buffered(self.concurrency)
            .try_collect::<Vec<_>>()
            .await;
        monitor.finish_with_result(&result);

        let mut standards = BTreeMap::new();
        for (address, found) in result? {
            if let Some((standard, stage)) = found {
                MetricsLogger::log_token_detected(
                    &address.to_string(),
                    standard.as_str(),
                    stage.as_str(),
                    &tx.hash.to_string(),
                );
                standards.insert(address, standard);
            } else {
                LogContext::new("token_monitor", "classify")
                    .with_address(&address.to_string())
                    .with_transaction_hash(&tx.hash.to_string())
                    .debug("Contract matches no known token standard");
            }
        }

        Ok(standards)
    }

    async fn classify_address(
        &self,
        address: Address,
        block_number: u64,
        block_hash: Hash,
    ) -> Result<Option<(TokenStandard, DetectionStage)>> {
        if let Some(standard) = self.check_eip165(address, block_number).await? {
            return Ok(Some((standard, DetectionStage::Eip165)));
        }

        Ok(self
            .check_bytecode(address, block_hash)
            .await?
            .map(|standard| (standard, DetectionStage::Bytecode)))
    }

    /// Query the live contract through `supportsInterface`.
    ///
    /// Returns `None` when the contract is not ERC-165 compliant or advertises
    /// no known token interface.
    pub async fn check_eip165(&self, address: Address, block_number: u64) -> Result<Option<TokenStandard>> {
        if !self.supports_interface(address, ERC165_INTERFACE_ID, block_number).await? {
            return Ok(None);
        }
        // Compliant implementations must reject 0xffffffff
        if self.supports_interface(address, INVALID_INTERFACE_ID, block_number).await? {
            LogContext::new("token_monitor", "check_eip165")
                .with_address(&address.to_string())
                .with_block_number(block_number)
                .debug("Contract accepts the invalid interface id, falling back to bytecode");
            return Ok(None);
        }

        for standard in KNOWN_STANDARDS {
            if self.supports_interface(address, standard.interface_id(), block_number).await? {
                return Ok(Some(standard));
            }
        }
        Ok(None)
    }

    /// Scan deployed bytecode for a standard's full signature table.
    pub async fn check_bytecode(&self, address: Address, block_hash: Hash) -> Result<Option<TokenStandard>> {
        let code = self.client.get_code(address, block_hash).await?;
        Ok(KNOWN_STANDARDS
            .into_iter()
            .find(|standard| standard.signatures().matches(code.as_bytes())))
    }

    async fn supports_interface(&self, address: Address, interface_id: [u8; 4], block_number: u64) -> Result<bool> {
        let calldata = supports_interface_calldata(interface_id);
        let ret = self.client.call_contract(address, &calldata, block_number).await?;
        Ok(decode_bool(ret.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::chain_client::{CallFrame, TransactionRecord};
    use crate::error::{ChainQueryError, IndexerError};
    use crate::models::token::{
        ERC20_EVENT_SIGNATURES, ERC20_INTERFACE_ID, ERC20_METHOD_SELECTORS, ERC721_EVENT_SIGNATURES,
        ERC721_INTERFACE_ID, ERC721_METHOD_SELECTORS,
    };
    use crate::models::{CallType, HexData, InternalCall, RawBlock};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn true_word() -> HexData {
        let mut word = vec![0u8; 32];
        word[31] = 1;
        HexData(word)
    }

    fn false_word() -> HexData {
        HexData(vec![0u8; 32])
    }

    fn bytecode_with(methods: &[&str], events: &[&str]) -> Vec<u8> {
        let mut code = vec![0x60, 0x80, 0x60, 0x40, 0x52];
        for m in methods {
            code.push(0x63);
            code.extend(hex::decode(m).unwrap());
        }
        for e in events {
            code.push(0x7f);
            code.extend(hex::decode(e).unwrap());
        }
        code
    }

    /// Chain client answering `supportsInterface` per (address, interface id) and
    /// serving fixed bytecode per address.
    #[derive(Default)]
    struct MockChainClient {
        interfaces: HashMap<(Address, [u8; 4]), bool>,
        code: HashMap<Address, Vec<u8>>,
        failing: Vec<Address>,
        calls: Mutex<Vec<(Address, Vec<u8>, u64)>>,
        code_requests: Mutex<Vec<(Address, Hash)>>,
    }

    impl MockChainClient {
        fn with_interface(mut self, address: Address, id: [u8; 4], supported: bool) -> Self {
            self.interfaces.insert((address, id), supported);
            self
        }

        fn with_code(mut self, address: Address, code: Vec<u8>) -> Self {
            self.code.insert(address, code);
            self
        }

        fn failing_for(mut self, address: Address) -> Self {
            self.failing.push(address);
            self
        }
    }

    #[async_trait]
    impl ChainClient for MockChainClient {
        async fn call_contract(
            &self,
            address: Address,
            input: &[u8],
            block_number: u64,
        ) -> std::result::Result<HexData, ChainQueryError> {
            self.calls.lock().unwrap().push((address, input.to_vec(), block_number));
            if self.failing.contains(&address) {
                return Err(ChainQueryError::Connection("node unreachable".to_string()));
            }

            let mut id = [0u8; 4];
            id.copy_from_slice(&input[4..8]);
            Ok(match self.interfaces.get(&(address, id)) {
                Some(true) => true_word(),
                Some(false) => false_word(),
                // No answer configured: behave like a contract without supportsInterface
                None => HexData::default(),
            })
        }

        async fn get_code(&self, address: Address, block_hash: Hash) -> std::result::Result<HexData, ChainQueryError> {
            self.code_requests.lock().unwrap().push((address, block_hash));
            Ok(HexData(self.code.get(&address).cloned().unwrap_or_default()))
        }

        async fn query_transaction(&self, hash: Hash) -> std::result::Result<TransactionRecord, ChainQueryError> {
            Err(ChainQueryError::NotFound(hash.to_string()))
        }

        async fn get_block_by_number(&self, number: u64) -> std::result::Result<RawBlock, ChainQueryError> {
            Err(ChainQueryError::NotFound(number.to_string()))
        }

        async fn trace_internal_calls(&self, hash: Hash) -> std::result::Result<CallFrame, ChainQueryError> {
            Err(ChainQueryError::NotFound(hash.to_string()))
        }
    }

    fn addr(byte: u8) -> Address {
        Address([byte; 20])
    }

    fn creation_tx(created: Address) -> Transaction {
        Transaction {
            hash: Hash([0x77; 32]),
            status: true,
            block_number: 42,
            block_hash: Hash([0x42; 32]),
            index: 0,
            nonce: 0,
            from: addr(0x01),
            to: Address::ZERO,
            value: 0,
            gas: 100_000,
            gas_price: 0,
            gas_used: 90_000,
            cumulative_gas_used: 90_000,
            created_contract: created,
            data: HexData::default(),
            private_data: HexData::default(),
            is_private: false,
            timestamp: 0,
            events: vec![],
            internal_calls: vec![],
        }
    }

    fn internal_call(to: Address, call_type: CallType) -> InternalCall {
        InternalCall {
            from: addr(0x02),
            to,
            gas: 0,
            gas_used: 0,
            value: 0,
            input: HexData::default(),
            output: HexData::default(),
            call_type,
        }
    }

    #[test]
    fn test_supports_interface_calldata_layout() {
        let calldata = supports_interface_calldata(ERC20_INTERFACE_ID);
        assert_eq!(
            hex::encode(calldata),
            format!("01ffc9a736372b07{}", "00".repeat(28))
        );
    }

    #[test]
    fn test_decode_bool() {
        assert!(decode_bool(true_word().as_bytes()));
        assert!(!decode_bool(false_word().as_bytes()));
        assert!(!decode_bool(&[]));
        assert!(!decode_bool(&[1]));

        let mut dirty = vec![0u8; 32];
        dirty[0] = 0xff;
        dirty[31] = 1;
        assert!(!decode_bool(&dirty));
    }

    #[test]
    fn test_candidate_addresses_dedup_in_first_seen_order() {
        let mut tx = creation_tx(addr(0xaa));
        tx.internal_calls = vec![
            internal_call(addr(0xcc), CallType::Call),
            internal_call(addr(0xbb), CallType::Create2),
            internal_call(addr(0xaa), CallType::Create),
            internal_call(addr(0xdd), CallType::Create),
        ];

        assert_eq!(
            TokenMonitor::<MockChainClient>::candidate_addresses(&tx),
            vec![addr(0xaa), addr(0xbb), addr(0xdd)]
        );
    }

    #[tokio::test]
    async fn test_plain_transaction_makes_no_calls() {
        let client = MockChainClient::default();
        let monitor = TokenMonitor::new(client);

        let result = monitor.classify(&creation_tx(Address::ZERO)).await.unwrap();
        assert!(result.is_empty());
        assert!(monitor.client.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_eip165_erc20_wins_regardless_of_bytecode() {
        let target = addr(0xaa);
        let client = MockChainClient::default()
            .with_interface(target, ERC165_INTERFACE_ID, true)
            .with_interface(target, INVALID_INTERFACE_ID, false)
            .with_interface(target, ERC20_INTERFACE_ID, true)
            .with_code(target, bytecode_with(ERC721_METHOD_SELECTORS, ERC721_EVENT_SIGNATURES));
        let monitor = TokenMonitor::new(client);

        let result = monitor.classify(&creation_tx(target)).await.unwrap();

        assert_eq!(result, BTreeMap::from([(target, TokenStandard::Erc20)]));
        assert!(monitor.client.code_requests.lock().unwrap().is_empty());

        let calls = monitor.client.calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|(_, _, block)| *block == 42));
    }

    #[tokio::test]
    async fn test_eip165_erc721() {
        let target = addr(0xaa);
        let client = MockChainClient::default()
            .with_interface(target, ERC165_INTERFACE_ID, true)
            .with_interface(target, INVALID_INTERFACE_ID, false)
            .with_interface(target, ERC20_INTERFACE_ID, false)
            .with_interface(target, ERC721_INTERFACE_ID, true);
        let monitor = TokenMonitor::new(client);

        let result = monitor.classify(&creation_tx(target)).await.unwrap();
        assert_eq!(result.get(&target), Some(&TokenStandard::Erc721));
    }

    #[tokio::test]
    async fn test_bytecode_fallback_erc721() {
        let target = addr(0xaa);
        let mut code = bytecode_with(ERC721_METHOD_SELECTORS, ERC721_EVENT_SIGNATURES);
        // Some ERC-20 selectors but not totalSupply
        code.extend(hex::decode("63a9059cbb63dd62ed3e").unwrap());
        let client = MockChainClient::default()
            .with_interface(target, ERC165_INTERFACE_ID, false)
            .with_code(target, code);
        let monitor = TokenMonitor::new(client);

        let tx = creation_tx(target);
        let result = monitor.classify(&tx).await.unwrap();

        assert_eq!(result, BTreeMap::from([(target, TokenStandard::Erc721)]));
        assert_eq!(
            *monitor.client.code_requests.lock().unwrap(),
            vec![(target, tx.block_hash)]
        );
    }

    #[tokio::test]
    async fn test_spoofing_contract_falls_back_to_bytecode() {
        let target = addr(0xaa);
        let client = MockChainClient::default()
            .with_interface(target, ERC165_INTERFACE_ID, true)
            .with_interface(target, INVALID_INTERFACE_ID, true)
            .with_interface(target, ERC721_INTERFACE_ID, true)
            .with_code(target, bytecode_with(ERC20_METHOD_SELECTORS, ERC20_EVENT_SIGNATURES));
        let monitor = TokenMonitor::new(client);

        let result = monitor.classify(&creation_tx(target)).await.unwrap();
        assert_eq!(result.get(&target), Some(&TokenStandard::Erc20));
    }

    #[tokio::test]
    async fn test_self_id_failure_equals_bytecode_only_outcome() {
        let target = addr(0xaa);
        let cases = vec![
            bytecode_with(ERC20_METHOD_SELECTORS, ERC20_EVENT_SIGNATURES),
            bytecode_with(ERC721_METHOD_SELECTORS, ERC721_EVENT_SIGNATURES),
            bytecode_with(&ERC20_METHOD_SELECTORS[1..], ERC20_EVENT_SIGNATURES),
            vec![],
        ];

        for code in cases {
            let expected = KNOWN_STANDARDS
                .into_iter()
                .find(|s| s.signatures().matches(&code));

            // Self-id answered false, but every token interface query would say yes
            let client = MockChainClient::default()
                .with_interface(target, ERC165_INTERFACE_ID, false)
                .with_interface(target, ERC20_INTERFACE_ID, true)
                .with_interface(target, ERC721_INTERFACE_ID, true)
                .with_code(target, code);
            let monitor = TokenMonitor::new(client);

            let result = monitor.classify(&creation_tx(target)).await.unwrap();
            assert_eq!(result.get(&target).copied(), expected);
        }
    }

    #[tokio::test]
    async fn test_internal_create2_without_match_yields_empty_map() {
        let target = addr(0xbb);
        let client = MockChainClient::default().with_code(target, vec![0x60, 0x80, 0x60, 0x40]);
        let monitor = TokenMonitor::new(client);

        let mut tx = creation_tx(Address::ZERO);
        tx.internal_calls = vec![internal_call(target, CallType::Create2)];

        let result = monitor.classify(&tx).await.unwrap();
        assert!(result.is_empty());
        assert_eq!(monitor.client.code_requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_multiple_candidates_classified_independently() {
        let erc20 = addr(0xaa);
        let erc721 = addr(0xbb);
        let plain = addr(0xcc);
        let client = MockChainClient::default()
            .with_interface(erc20, ERC165_INTERFACE_ID, true)
            .with_interface(erc20, INVALID_INTERFACE_ID, false)
            .with_interface(erc20, ERC20_INTERFACE_ID, true)
            .with_code(erc721, bytecode_with(ERC721_METHOD_SELECTORS, ERC721_EVENT_SIGNATURES));
        let monitor = TokenMonitor::new(client).with_concurrency(2);

        let mut tx = creation_tx(erc20);
        tx.internal_calls = vec![
            internal_call(erc721, CallType::Create),
            internal_call(plain, CallType::Create2),
        ];

        let result = monitor.classify(&tx).await.unwrap();
        assert_eq!(
            result,
            BTreeMap::from([(erc20, TokenStandard::Erc20), (erc721, TokenStandard::Erc721)])
        );
    }

    #[tokio::test]
    async fn test_chain_error_aborts_classification() {
        let good = addr(0xaa);
        let bad = addr(0xbb);
        let client = MockChainClient::default()
            .with_code(good, bytecode_with(ERC20_METHOD_SELECTORS, ERC20_EVENT_SIGNATURES))
            .failing_for(bad);
        let monitor = TokenMonitor::new(client);

        let mut tx = creation_tx(good);
        tx.internal_calls = vec![internal_call(bad, CallType::Create)];

        let err = monitor.classify(&tx).await.unwrap_err();
        assert!(matches!(
            err,
            IndexerError::ChainQuery(ChainQueryError::Connection(_))
        ));
    }

    #[test]
    fn test_concurrency_floor() {
        let monitor = TokenMonitor::new(MockChainClient::default()).with_concurrency(0);
        assert_eq!(monitor.concurrency(), 1);
    }
}

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::time::Duration;
use tempfile::TempDir;

use chain_report::blockchain::chain_client::{AccountRef, BlockRef, LogRecord, TransactionRecord};
use chain_report::blockchain::normalize_transaction;
use chain_report::database::{Database, TransactionStore};
use chain_report::models::token::{ERC20_EVENT_SIGNATURES, ERC20_METHOD_SELECTORS};
use chain_report::models::{Transaction, TokenStandard};

/// Filler bytecode of `size` bytes with the ERC-20 tables appended at the end,
/// the worst case for a linear scan.
fn erc20_bytecode(size: usize) -> Vec<u8> {
    let mut code: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
    for selector in ERC20_METHOD_SELECTORS {
        code.push(0x63);
        code.extend(hex::decode(selector).unwrap());
    }
    for topic in ERC20_EVENT_SIGNATURES {
        code.push(0x7f);
        code.extend(hex::decode(topic).unwrap());
    }
    code
}

fn create_record(id: u64, logs: usize) -> TransactionRecord {
    TransactionRecord {
        hash: format!("0x{:064x}", id),
        status: "0x1".to_string(),
        block: BlockRef {
            number: format!("{:#x}", 1000 + id),
            hash: format!("0x{:064x}", 0xb10c + id),
        },
        index: 0,
        nonce: format!("{:#x}", id),
        from: AccountRef {
            address: format!("0x{:040x}", id + 1),
        },
        to: Some(AccountRef {
            address: "0x5fbdb2315678afecb367f032d93f642f64180aa3".to_string(),
        }),
        value: "0x0".to_string(),
        gas: "0x47b760".to_string(),
        gas_price: "0x0".to_string(),
        gas_used: "0x5208".to_string(),
        cumulative_gas_used: "0x5208".to_string(),
        created_contract: None,
        input_data: format!("0xa9059cbb{}", "00".repeat(64)),
        private_input_data: "0x".to_string(),
        is_private: false,
        logs: (0..logs as u64)
            .map(|index| LogRecord {
                index,
                account: AccountRef {
                    address: "0x5fbdb2315678afecb367f032d93f642f64180aa3".to_string(),
                },
                topics: vec![format!("0x{}", ERC20_EVENT_SIGNATURES[0]), format!("0x{:064x}", index)],
                data: format!("0x{:064x}", index * 1000),
            })
            .collect(),
    }
}

fn create_transaction(id: u64, logs: usize) -> Transaction {
    normalize_transaction(create_record(id, logs), None, 1_700_000_000).unwrap()
}

fn bench_bytecode_matching(c: &mut Criterion) {
    let mut group = c.benchmark_group("bytecode_matching");

    for size in [1_024, 8_192, 24_576].iter() {
        let code = erc20_bytecode(*size);
        group.bench_with_input(BenchmarkId::new("erc20_match", size), &code, |b, code| {
            b.iter(|| TokenStandard::Erc20.signatures().matches(black_box(code)));
        });
        group.bench_with_input(BenchmarkId::new("erc721_miss", size), &code, |b, code| {
            b.iter(|| TokenStandard::Erc721.signatures().matches(black_box(code)));
        });
    }

    group.finish();
}

fn bench_normalization(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize_transaction");

    for logs in [0, 10, 100].iter() {
        group.bench_with_input(BenchmarkId::new("logs", logs), logs, |b, &logs| {
            b.iter_batched(
                || create_record(1, logs),
                |record| normalize_transaction(black_box(record), None, 1_700_000_000),
                criterion::BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn bench_store_writes(c: &mut Criterion) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let db_path = temp_dir.path().join("bench.db");
    let database = Database::new(db_path.to_str().unwrap()).expect("Failed to create database");

    let mut group = c.benchmark_group("store_write");

    for logs in [1, 10, 50].iter() {
        let tx = create_transaction(42, *logs);
        group.bench_with_input(BenchmarkId::new("write_transaction", logs), &tx, |b, tx| {
            b.iter(|| database.write_transaction(black_box(tx)));
        });
    }

    group.finish();
}

criterion_group!(
    name = benches;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(10))
        .sample_size(100);
    targets = bench_bytecode_matching, bench_normalization, bench_store_writes
);
criterion_main!(benches);

mod common;

use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use common::{PIN, TestBank, register_merchant, register_user, settle};
use predicates::prelude::*;
use rust_decimal_macros::dec;
use std::process::Command;

#[test]
fn test_help_lists_subcommands() {
    Command::new(cargo_bin!())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("chain"));
}

#[test]
fn test_serve_rejects_invalid_config() {
    Command::new(cargo_bin!())
        .args(["serve", "--listen", "127.0.0.1:0", "--max-frame-bytes", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_frame_bytes"));
}

#[test]
fn test_chain_fails_without_a_bank() {
    Command::new(cargo_bin!())
        .args(["chain", "--bank", "127.0.0.1:1", "--timeout-ms", "500"])
        .assert()
        .failure();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_chain_prints_and_verifies_ledger() {
    let bank = TestBank::start().await;
    let client = bank.client();
    let mmid = register_user(&client, "kate", "5550060", dec!(40)).await;
    let merchant_id = register_merchant(&client, "books", dec!(0)).await;
    for amount in [dec!(5), dec!(7)] {
        assert!(
            client
                .send(&settle(&mmid, &merchant_id, PIN, amount))
                .await
                .unwrap()
                .is_success()
        );
    }

    let addr = bank.addr.to_string();
    let assert = tokio::task::spawn_blocking(move || {
        Command::new(cargo_bin!())
            .args(["chain", "--bank", &addr])
            .assert()
    })
    .await
    .unwrap();

    assert
        .success()
        .stdout(predicate::str::contains("--- Block 0 ---"))
        .stdout(predicate::str::contains("--- Block 1 ---"))
        .stdout(predicate::str::contains(format!("mmid: {mmid}")))
        .stdout(predicate::str::contains("2 blocks, chain verified"));
}

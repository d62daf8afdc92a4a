//! Tests against the public XRP altnet. Network-bound, so everything that
//! talks to the node is `#[ignore]`d; run with `cargo test -- --ignored`.

use indexer_core::{ChainClient, IndexerError};
use xrp_indexer::{XrpClient, XrpConfig, XRP_TO_UNIX_EPOCH};

const ALTNET_URL: &str = "https://s.altnet.rippletest.net:51234";

const TEST_BLOCK: u64 = 1_725_668;
const TEST_BLOCK_CLOSE_TIME: u64 = 783_002_761;

fn altnet_client() -> XrpClient {
    XrpClient::from_config(&XrpConfig {
        url: ALTNET_URL.into(),
    })
    .unwrap()
}

#[test]
fn empty_url_is_rejected() {
    let err = XrpClient::from_config(&XrpConfig::default()).unwrap_err();
    assert!(matches!(err, IndexerError::Config(_)));
}

#[tokio::test]
async fn invalid_url_is_a_transport_error() {
    let client = XrpClient::from_config(&XrpConfig {
        // Out-of-range port: the request fails before any network traffic.
        url: "https://s.altnet.rippletest.net:512345".into(),
    })
    .unwrap();

    let err = client.get_latest_block_info().await.unwrap_err();
    assert!(matches!(err, IndexerError::Transport(_)));
}

#[tokio::test]
#[ignore = "requires network access to the XRP altnet"]
async fn latest_block_info_is_recent() {
    let info = altnet_client().get_latest_block_info().await.unwrap();

    let now = chrono::Utc::now().timestamp() as u64;
    assert!(now > info.timestamp - 10);
    assert!(info.timestamp + 60 > now);
    assert!(info.block_number > TEST_BLOCK);
}

#[tokio::test]
#[ignore = "requires network access to the XRP altnet"]
async fn block_timestamp_is_shifted_to_unix() {
    let timestamp = altnet_client()
        .get_block_timestamp(TEST_BLOCK)
        .await
        .unwrap();

    assert_eq!(timestamp, TEST_BLOCK_CLOSE_TIME + XRP_TO_UNIX_EPOCH);
}

#[tokio::test]
#[ignore = "requires network access to the XRP altnet"]
async fn block_result_matches_known_ledger() {
    let result = altnet_client().get_block_result(TEST_BLOCK).await.unwrap();

    assert_eq!(result.block.block_number, TEST_BLOCK);
    assert_eq!(
        result.block.timestamp,
        TEST_BLOCK_CLOSE_TIME + XRP_TO_UNIX_EPOCH
    );
    assert_eq!(result.block.transactions, 10);
    assert_eq!(
        result.block.hash,
        "e6ed42458de170a4d95544561c7df715c3a808ead9a3d1d669d187366fe568f6"
    );

    let first = &result.transactions[0];
    assert_eq!(
        first.hash,
        "1f572e746a69edde0c134824491567cc438cfb18a40aa0fd321e8143e70e9064"
    );
    assert_eq!(first.block_number, TEST_BLOCK);
    assert_eq!(first.timestamp, TEST_BLOCK_CLOSE_TIME + XRP_TO_UNIX_EPOCH);
    assert_eq!(first.payment_reference, "");
    assert!(first.is_native_payment);
    assert_eq!(
        first.source_addresses_root,
        "674fa9a46079864ce1744486bd1a7069794c8aade76b2d0424c4e716fba4f4ef"
    );
}

#[tokio::test]
#[ignore = "requires network access to the XRP altnet"]
async fn server_info_reports_build_and_state() {
    let server_info = altnet_client().get_server_info().await.unwrap();

    // "2.3.0_full" style: rippled version, underscore, server state.
    let (build_version, _state) = server_info.split_once('_').unwrap();
    assert!(build_version
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_digit()));
}

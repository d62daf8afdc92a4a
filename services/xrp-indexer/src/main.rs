use xrp_indexer::{XrpBlock, XrpClient, XrpConfig, XrpTransaction};

#[tokio::main]
async fn main() {
    let result = indexer_core::bootstrap::run::<XrpClient, XrpConfig, XrpBlock, XrpTransaction>(
        XrpClient::from_config,
    )
    .await;

    if let Err(err) = result {
        // The subscriber may not be up yet when configuration fails.
        eprintln!("fatal error in indexer: {err}");
        std::process::exit(1);
    }
}

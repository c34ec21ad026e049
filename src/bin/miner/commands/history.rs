//! History command - list recent claims

use crate::client::MinerClient;
use crate::style::*;
use anyhow::Result;

pub async fn run(server: &str, user_id: i64, limit: u32) -> Result<()> {
    print_header("Claim History");

    let client = MinerClient::new(server);
    let claims = client.claim_history(user_id, limit).await?;

    if claims.is_empty() {
        print_info("No claims yet");
        return Ok(());
    }

    println!(
        "{:<40} {:>14} {:<10} {}",
        style_dim("TRACKING ID"),
        style_dim("AMOUNT"),
        style_dim("TIER"),
        style_dim("STATUS")
    );
    for claim in &claims {
        println!(
            "{:<40} {:>14} {:<10} {}",
            claim.tracking_id,
            claim.amount,
            claim.processing_tier,
            style_status(&claim.status)
        );
    }
    Ok(())
}

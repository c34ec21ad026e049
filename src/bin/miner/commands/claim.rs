//! Claim command - submit a withdrawal

use crate::client::{MinerClient, SubmitClaimRequest};
use crate::style::*;
use anyhow::Result;

pub async fn run(
    server: &str,
    user_id: i64,
    amount: Option<String>,
    all: bool,
    wallet: String,
    network: String,
) -> Result<()> {
    let client = MinerClient::new(server);
    let request = SubmitClaimRequest {
        user_id,
        kind: if all { "bulk" } else { "manual" },
        amount: if all { None } else { amount },
        wallet_address: wallet,
        network,
    };

    let claim = client.submit_claim(&request).await?;

    print_success(&format!("Claim submitted: {}", style_bold(&claim.tracking_id)));
    println!("Amount:    {} (${:.2})", claim.amount, claim.usd_value);
    println!("Wallet:    {}", truncate_address(&claim.wallet_address));
    println!("Tier:      {}", style_cyan(&claim.processing_tier));
    println!("Status:    {}", style_status(&claim.status));
    if claim.status != "COMPLETED" {
        println!("Deadline:  {}", claim.processing_deadline);
    }
    for warning in &claim.warnings {
        print_warning(warning);
    }
    if let Some(reason) = &claim.failure_reason {
        print_error(&format!("Payout failed: {}", reason));
    }
    println!();
    println!("Track it with:");
    println!("  miner track {}", claim.tracking_id);
    Ok(())
}

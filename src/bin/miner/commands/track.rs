//! Track command - show one claim

use crate::client::MinerClient;
use crate::style::*;
use anyhow::Result;

pub async fn run(server: &str, tracking_id: &str) -> Result<()> {
    print_header(&format!("Claim {}", tracking_id));

    let client = MinerClient::new(server);
    let claim = client.claim(tracking_id).await?;

    println!("Status:       {}", style_status(&claim.status));
    println!("Amount:       {} (${:.2})", claim.amount, claim.usd_value);
    println!("Tier:         {}", style_cyan(&claim.processing_tier));
    println!("Submitted:    {}", style_dim(&claim.submitted_at));
    println!("Deadline:     {}", claim.processing_deadline);
    println!("Next step:    {}", claim.recommended_action);
    if claim.requires_verification {
        print_warning("Additional verification required");
    }
    if let Some(reason) = &claim.failure_reason {
        print_error(reason);
    }
    Ok(())
}

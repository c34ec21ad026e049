//! Balance command

use crate::client::MinerClient;
use crate::style::*;
use anyhow::Result;

pub async fn run(server: &str, user_id: i64) -> Result<()> {
    print_header("Balance");

    let client = MinerClient::new(server);
    let balance = client.balance(user_id).await?;

    println!("Accumulating:  {}", style_yellow(&balance.accumulating));
    println!("Claimable:     {}", style_green(&balance.claimable));
    println!("Claimed:       {}", style_dim(&balance.claimed));
    Ok(())
}

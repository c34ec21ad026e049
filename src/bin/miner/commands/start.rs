//! Start command - open a mining session

use crate::client::MinerClient;
use crate::style::*;
use anyhow::Result;

pub async fn run(server: &str, user_id: i64, extended: bool) -> Result<()> {
    let client = MinerClient::new(server);
    let session = client.start_session(user_id, extended).await?;

    print_success(&format!("Mining session #{} started", session.id));
    println!("Started:  {}", style_dim(&session.start_time));
    println!("Ends:     {}", style_cyan(&session.end_time));
    if extended {
        print_info("Extended session");
    }
    Ok(())
}

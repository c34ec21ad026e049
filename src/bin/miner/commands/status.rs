//! Status command - show the running session

use crate::client::MinerClient;
use crate::style::*;
use anyhow::Result;

pub async fn run(server: &str, user_id: i64) -> Result<()> {
    print_header("Mining Session");
    crate::print_version_line();
    println!();

    let client = MinerClient::new(server);
    match client.session_status(user_id).await {
        Ok(status) => {
            println!("Session:      #{} ({})", status.session.id, status.session.status);
            println!("Accumulated:  {}", style_green(&status.accumulated));
            println!("Daily rate:   {}/day", style_bold(&status.daily_rate));
            if status.session.multiplier_bps != 10_000 {
                println!(
                    "Multiplier:   {}",
                    style_cyan(&format!("{:.2}x", status.session.multiplier_bps as f64 / 10_000.0))
                );
            }
            if status.remaining_seconds > 0 {
                println!(
                    "Remaining:    {}",
                    style_cyan(&format_remaining(status.remaining_seconds))
                );
            } else {
                print_warning("Session finished, it will be settled shortly");
            }
        }
        Err(e) => {
            print_warning(&format!("{}", e));
            println!();
            println!("To start mining, run:");
            println!("  miner start");
        }
    }
    Ok(())
}

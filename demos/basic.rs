//! Basic example demonstrating Corrosion Rust SDK usage.

use corro_client::{ClientConfig, CorroClient, Event, Statement, SubscribeOptions};
use serde_json::json;
use std::time::Duration;

#[tokio::main]
async fn main() -> corro_client::Result<()> {
  // Connect to a Corrosion agent's API
  let client = CorroClient::new(ClientConfig::new("http://localhost:8080"))?;

  // Make sure the table exists
  client
    .update_schema(&[Statement::new(
      "CREATE TABLE IF NOT EXISTS users (id INTEGER NOT NULL PRIMARY KEY, name TEXT, active INTEGER)",
    )])
    .await?;

  // Insert a row
  let result = client
    .execute(&[Statement::with_params(
      "INSERT OR REPLACE INTO users (id, name, active) VALUES (?, ?, ?)",
      vec![json!(1), json!("Alice"), json!(1)],
    )])
    .await?;
  println!("Rows affected: {}", result.rows_affected());

  // Query rows
  let rows = client
    .query(&"SELECT id, name, active FROM users".into())
    .await?;
  println!("Columns: {:?}", rows.columns());
  while rows.advance() {
    let (mut id, mut name, mut active) = (0i64, String::new(), false);
    rows.scan(&mut [&mut id, &mut name, &mut active])?;
    println!("{} {} active={}", id, name, active);
  }

  // Subscribe to changes
  println!("\nSubscribing to user changes...");
  println!("(Insert/update/delete users from another client to see changes)");
  println!("Press Ctrl+C to exit.\n");

  let options = SubscribeOptions::new().with_retry(Duration::from_secs(2), 30);
  let mut sub = client
    .subscribe(&"SELECT id, name FROM users".into(), options)
    .await?;
  println!("Subscription {} (hash {})", sub.id(), sub.hash());

  loop {
    match sub.next().await? {
      Event::Columns(columns) => println!("Columns: {:?}", columns),
      Event::Row(row) => println!("Initial: {:?}", row.values()),
      Event::EndOfQuery(eoq) => println!("Initial rows done in {}s", eoq.time),
      Event::Change(change) => {
        println!(
          "{} #{}: {:?}",
          change.kind,
          change.change_id,
          change.row.values()
        );
      }
      Event::Error(message) => println!("Error: {}", message),
    }
  }
}

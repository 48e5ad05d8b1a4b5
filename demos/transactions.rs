//! Transaction handling example
//!
//! This example demonstrates the unit-of-work protocol:
//! - Commit and rollback decided by the closure's Outcome
//! - Automatic rollback when the closure fails
//! - Async transactions over a connection pool
//! - Streaming parameter binding inside a transaction
//!
//! Run with: cargo run --example transactions

use futures::{FutureExt, StreamExt};
use rowmap::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("=== rowmap - Transactions Example ===\n");

    println!("1. Creating pooled data source...");
    let ds = PooledSqliteDataSource::new("file:transactions_demo?mode=memory&cache=shared")?;
    let registry = MapperRegistry::new();
    println!("   ✓ Pool ready\n");

    println!("2. Setting up accounts...");
    ds.transaction(|session| {
        async move {
            session
                .execute(
                    &Query::new("CREATE TABLE accounts (owner TEXT NOT NULL, balance INTEGER NOT NULL)"),
                    &[],
                )
                .await?;
            session
                .execute_batch(
                    &Query::new("INSERT INTO accounts VALUES (?, ?)"),
                    &[
                        vec!["alice".into(), Value::Long(1000)],
                        vec!["bob".into(), Value::Long(500)],
                    ],
                )
                .await?;
            Ok(Outcome::commit(()))
        }
        .boxed()
    })
    .await?;
    println!("   ✓ Accounts created\n");

    println!("3. Transfer that commits...");
    ds.transaction(|session| {
        async move {
            session
                .execute(
                    &Query::new("UPDATE accounts SET balance = balance - ? WHERE owner = ?"),
                    &[Value::Long(200), "alice".into()],
                )
                .await?;
            session
                .execute(
                    &Query::new("UPDATE accounts SET balance = balance + ? WHERE owner = ?"),
                    &[Value::Long(200), "bob".into()],
                )
                .await?;
            Ok(Outcome::commit(()))
        }
        .boxed()
    })
    .await?;
    println!("   ✓ Transferred 200 from alice to bob\n");

    println!("4. Transfer that rolls back by outcome...");
    let outcome = ds
        .transaction(|session| {
            async move {
                session
                    .execute(
                        &Query::new("UPDATE accounts SET balance = balance - ? WHERE owner = ?"),
                        &[Value::Long(10_000), "alice".into()],
                    )
                    .await?;
                let balances: Vec<i64> = registry
                    .fetch_scalar_async(
                        session,
                        &Query::new("SELECT balance FROM accounts WHERE owner = ?"),
                        &["alice".into()],
                    )
                    .await?;
                if balances[0] < 0 {
                    println!("   Balance would go negative, requesting rollback");
                    return Ok(Outcome::Rollback);
                }
                Ok(Outcome::commit(()))
            }
            .boxed()
        })
        .await?;
    println!("   ✓ Outcome: rollback = {}\n", outcome.is_rollback());

    println!("5. Transfer that fails and rolls back...");
    let result = ds
        .transaction::<(), _>(|session| {
            async move {
                session
                    .execute(
                        &Query::new("UPDATE accounts SET balance = 0 WHERE owner = ?"),
                        &["alice".into()],
                    )
                    .await?;
                Err(Error::other("transfer rejected by fraud check"))
            }
            .boxed()
        })
        .await;
    println!("   ✓ Error surfaced: {}\n", result.unwrap_err());

    println!("6. Streaming insert of a statement batch...");
    ds.transaction(|session| {
        async move {
            let params = futures::stream::iter(
                (0..100i64).map(|i| Ok(vec![Value::Text(format!("batch-{}", i)), Value::Long(i)])),
            )
            .boxed();
            let job = session
                .execute_stream(&Query::new("INSERT INTO accounts VALUES (?, ?)"), params)
                .await?;
            let affected = job.join().await?;
            println!("   ✓ Streamed {} inserts", affected);
            Ok(Outcome::commit(()))
        }
        .boxed()
    })
    .await?;
    println!();

    println!("7. Final balances...");
    let rows = ds
        .transaction(|session| {
            async move {
                let mut rows = session
                    .query(
                        &Query::new(
                            "SELECT owner, balance FROM accounts WHERE owner IN ('alice', 'bob')",
                        ),
                        &[],
                    )
                    .await?;
                let mut collected = Vec::new();
                while let Some(row) = rows.next().await {
                    collected.push(row?);
                }
                Ok(Outcome::commit(collected))
            }
            .boxed()
        })
        .await?
        .into_committed()
        .unwrap_or_default();

    for row in &rows {
        println!(
            "   - {}: {}",
            row.get::<String>("owner")?,
            row.get::<i64>("balance")?
        );
    }

    println!("\n=== Example completed successfully! ===");
    Ok(())
}

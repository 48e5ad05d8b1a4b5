//! Basic mapping example
//!
//! This example demonstrates the core workflow:
//! - Opening a blocking SQLite data source
//! - Running statements inside a transaction
//! - Mapping result rows into record types
//! - Reading scalars with automatic conversions
//!
//! Run with: cargo run --example basic_usage

use rowmap::prelude::*;

mapped_record! {
    #[derive(Debug, PartialEq)]
    pub struct User {
        pub username: String,
        pub email: String,
        pub age: Option<i64>,
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("=== rowmap - Basic Usage Example ===\n");

    println!("1. Opening database...");
    let ds = SqliteDataSource::open_in_memory()?;
    let registry = MapperRegistry::new();
    println!("   ✓ Opened\n");

    println!("2. Creating table and inserting users...");
    ds.transaction(|session| {
        session.execute(
            &Query::new(
                "CREATE TABLE users (
                    username TEXT NOT NULL,
                    email TEXT NOT NULL,
                    age INTEGER
                )",
            ),
            &[],
        )?;
        let affected = session.execute_batch(
            &Query::new("INSERT INTO users (username, email, age) VALUES (?, ?, ?)"),
            &[
                vec!["alice".into(), "alice@example.com".into(), Value::Long(30)],
                vec!["bob".into(), "bob@example.com".into(), Value::Long(25)],
                vec!["charlie".into(), "charlie@example.com".into(), Value::Null],
            ],
        )?;
        println!("   ✓ Inserted {} row(s)", affected);
        Ok(Outcome::commit(()))
    })?;
    println!();

    println!("3. Mapping rows into records...");
    let users = ds
        .transaction(|session| {
            let users: Vec<User> = registry.fetch(
                session,
                &Query::new("SELECT username, email, age FROM users ORDER BY username"),
                &[],
            )?;
            Ok(Outcome::commit(users))
        })?
        .into_committed()
        .unwrap_or_default();

    for user in &users {
        match user.age {
            Some(age) => println!("   - {} ({}) - age {}", user.username, user.email, age),
            None => println!("   - {} ({}) - age unknown", user.username, user.email),
        }
    }
    println!();

    println!("4. Scalar reads with conversions...");
    let counts = ds
        .transaction(|session| {
            // COUNT(*) comes back as a long; the i32 read converts
            let counts: Vec<i32> =
                registry.fetch_scalar(session, &Query::new("SELECT COUNT(*) FROM users"), &[])?;
            Ok(Outcome::commit(counts))
        })?
        .into_committed()
        .unwrap_or_default();
    println!("   User count: {}\n", counts[0]);

    println!("5. Filtered query with parameters...");
    let adults = ds
        .transaction(|session| {
            let users: Vec<User> = registry.fetch(
                session,
                &Query::new("SELECT * FROM users WHERE age >= ? ORDER BY age DESC"),
                &[Value::Long(26)],
            )?;
            Ok(Outcome::commit(users))
        })?
        .into_committed()
        .unwrap_or_default();
    for user in &adults {
        println!("   - {}", user.username);
    }

    println!("\n=== Example completed successfully! ===");
    Ok(())
}

//! Event Persistence Example
//!
//! This example batches event writes to a (simulated) store:
//! - Store connection failures surface at construction time
//! - `save` calls made close together are written with one bulk insert
//! - A prefilter rejects events before they reach any batch
//! - `flush` drains the last window on shutdown
//!
//! Usage:
//!   RUST_LOG=resilience_batcher=debug cargo run --example event_persistence

use anyhow::Context;
use resilience_batcher::{Batcher, BatcherConfig, Error, ErrorContext};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
struct Server {
    host: String,
    port: u16,
    db: String,
}

#[derive(Debug, Clone)]
struct Auth {
    user: String,
    password: String,
}

#[derive(Debug, Clone)]
struct Event {
    table: String,
    user_agent: String,
}

/// In-memory stand-in for a bulk-insert capable store.
#[derive(Default)]
struct Store {
    rows: Mutex<Vec<(String, String)>>,
    inserts: Mutex<usize>,
}

impl Store {
    fn connect(server: &Server, auth: &Auth) -> resilience_batcher::Result<Arc<Self>> {
        if server.host.is_empty() || auth.user.is_empty() || auth.password.is_empty() {
            return Err(Error::configuration_with_context(
                "connection to the server failed",
                ErrorContext::new()
                    .with_details(format!("{}:{}/{}", server.host, server.port, server.db))
                    .with_source("store"),
            ));
        }
        Ok(Arc::new(Self::default()))
    }

    fn bulk_insert(&self, events: Vec<Event>) {
        *self.inserts.lock().unwrap() += 1;
        let mut rows = self.rows.lock().unwrap();
        rows.extend(events.into_iter().map(|e| (e.table, e.user_agent)));
    }
}

struct Persistence {
    prefix: String,
    batcher: Batcher<Event>,
}

impl Persistence {
    fn new(
        server: Server,
        auth: Auth,
        prefix: &str,
        config: BatcherConfig,
    ) -> resilience_batcher::Result<(Self, Arc<Store>)> {
        let store = Store::connect(&server, &auth)?;
        let writer = Arc::clone(&store);
        let batcher = Batcher::builder()
            .with_config(config)
            .with_work(move |events: Vec<Event>| {
                let writer = Arc::clone(&writer);
                async move {
                    writer.bulk_insert(events);
                    Ok(())
                }
            })
            .with_prefilter(|event: &Event| {
                if event.user_agent.is_empty() {
                    Err(Error::rejected("event without user agent"))
                } else {
                    Ok(())
                }
            })
            .build()?;
        Ok((
            Self {
                prefix: prefix.to_string(),
                batcher,
            },
            store,
        ))
    }

    async fn save(&self, user_agent: &str, table: &str) -> resilience_batcher::Result<()> {
        let table = if table.is_empty() {
            table.to_string()
        } else {
            format!("{}_{}", self.prefix, table)
        };
        self.batcher
            .run(Event {
                table,
                user_agent: user_agent.to_string(),
            })
            .await
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Event Persistence Demo ===\n");

    // Example 1: construction fails when the store is unreachable
    println!("--- Example 1: Connection failure ---\n");
    let bad = Persistence::new(
        Server {
            host: String::new(),
            port: 5432,
            db: "events".into(),
        },
        Auth {
            user: "demo".into(),
            password: "secret".into(),
        },
        "app",
        BatcherConfig::default(),
    );
    if let Err(e) = bad {
        println!("Construction failed as expected: {}\n", e);
    }

    // Example 2: concurrent saves share one bulk insert
    println!("--- Example 2: Batched saves ---\n");
    let config = BatcherConfig::from_yaml_str("timeout_ms: 25")
        .context("loading batcher config")?;
    let (persistence, store) = Persistence::new(
        Server {
            host: "localhost".into(),
            port: 5432,
            db: "events".into(),
        },
        Auth {
            user: "demo".into(),
            password: "secret".into(),
        },
        "app",
        config,
    )
    .context("connecting to store")?;
    let persistence = Arc::new(persistence);

    let agents = ["curl/8.0", "Mozilla/5.0", "", "okhttp/4.12"];
    let handles: Vec<_> = agents
        .iter()
        .map(|agent| {
            let p = Arc::clone(&persistence);
            let agent = agent.to_string();
            tokio::spawn(async move { (agent.clone(), p.save(&agent, "visits").await) })
        })
        .collect();

    for h in handles {
        let (agent, result) = h.await.context("save task panicked")?;
        match result {
            Ok(()) => println!("saved {:?}", agent),
            Err(e) => println!("rejected {:?}: {}", agent, e),
        }
    }

    // Example 3: flush on shutdown
    println!("\n--- Example 3: Flush on shutdown ---\n");
    let late = {
        let p = Arc::clone(&persistence);
        tokio::spawn(async move { p.save("wget/1.21", "").await })
    };
    tokio::time::sleep(Duration::from_millis(1)).await;
    persistence.batcher.flush().await;
    late.await.context("save task panicked")??;

    let snapshot = persistence.batcher.snapshot();
    println!(
        "rows={} bulk_inserts={} windows_opened={} failed={}",
        store.rows.lock().unwrap().len(),
        store.inserts.lock().unwrap(),
        snapshot.windows_opened,
        snapshot.batches_failed,
    );

    Ok(())
}

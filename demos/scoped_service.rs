//! Runs `mongod` for the duration of a task.
//!
//! ```text
//! cargo run --example scoped_service -- /usr/bin/mongod
//! ```

use std::sync::Arc;
use std::time::Duration;

use mongovisor::{
    Host, Installation, InstallationRegistry, LogWriter, ServiceConfig, Subscribe, Supervisor,
    SupervisorConfig,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mongod = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "mongod".to_string());

    let cfg = SupervisorConfig::default();
    let registry = Arc::new(InstallationRegistry::new(vec![
        Installation::new("local", mongod).with_parameters("--nounixsocket --quiet"),
    ]));
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::stdout(cfg.tag.clone()))];

    let sup = Supervisor::builder(cfg)
        .with_registry(registry)
        .with_subscribers(subs)
        .build();

    let workspace = tempfile::tempdir()?;
    let config = ServiceConfig::new("local")
        .with_port(27018)
        .with_start_timeout_ms(10_000);

    let readiness = sup
        .scoped(&config, &Host::local(workspace.path()), |info, token| async move {
            println!("service at {} is {:?}", info.address, info.readiness);
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(Duration::from_secs(2)) => {}
            }
            Ok::<_, Box<dyn std::error::Error>>(info.readiness)
        })
        .await?;

    sup.shutdown().await;
    println!("done, service was {readiness:?}");
    Ok(())
}

/*!
Scheduler-invoked entry point for snapshot rotation.

An external scheduler runs this binary once per trigger event, optionally
passing the raw event payload as the first argument. The payload is opaque:
it is logged and never interpreted. The exit status carries the binary
success/failure outcome of the run; the diagnostic trace goes to the log
stream.
*/

use serde_json::Value;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    init_logging();

    let event = std::env::args()
        .nth(1)
        .map(|raw| serde_json::from_str(&raw).unwrap_or(Value::String(raw)))
        .unwrap_or(Value::Null);

    match snapgen_core::handle_scheduled_event(&event).await {
        Ok(()) => {
            info!("rotation run succeeded");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "rotation run failed");
            Err(e.into())
        }
    }
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

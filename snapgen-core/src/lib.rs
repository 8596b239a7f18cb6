/*!
# Snapgen Core Engine

Generational snapshot retention for compute-instance storage volumes.

Each instance declares how many snapshot generations to keep through the
`Snapshot-Generation` tag. One run per trigger event:

- enumerates every instance carrying the declaration tag,
- creates one labeled snapshot per create-eligible instance, and
- prunes the oldest automation-owned snapshots beyond the declared count.

Snapshots created by hand never carry the managed-marker tag and are never
touched by the pruner. A run has no partial-success outcome: the first
failure at any phase aborts it and propagates to the invoking trigger.

## Architecture

The engine only talks to the control plane through the [`ComputeProvider`]
port. Adapters exist for the EC2 control plane (cargo feature `ec2`,
default) and for an in-memory fake used by the test-suite.

## Usage

```rust
use snapgen_core::{Instance, MemoryProvider, RotationConfig, RotationEngine};

# #[tokio::main(flavor = "current_thread")]
# async fn main() -> snapgen_core::Result<()> {
let provider = MemoryProvider::new();
provider.add_instance(
    Instance::new("i-0abc")
        .with_tag("Name", "web01")
        .with_tag("Snapshot-Generation", "3")
        .with_primary_volume("vol-0def"),
);

let engine = RotationEngine::new(provider, RotationConfig::default())?;
engine.run().await?;
# Ok(())
# }
```
*/

pub mod config;
pub mod creator;
pub mod error;
pub mod inventory;
pub mod model;
pub mod policy;
pub mod provider;
pub mod pruner;
pub mod run;

pub use config::RotationConfig;
pub use error::{Result, RotateError};
pub use model::{Instance, Snapshot};
pub use policy::{resolve, Disposition};
pub use provider::{ComputeProvider, MemoryProvider};
pub use run::RotationEngine;

#[cfg(feature = "ec2")]
pub use provider::Ec2Provider;
#[cfg(feature = "ec2")]
pub use run::handle_scheduled_event;

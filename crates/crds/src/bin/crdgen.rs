//! Prints the DevWorkspace CustomResourceDefinition as YAML.
//!
//! Usage: `cargo run -p crds --bin crdgen > config/crd/devworkspace.yaml`

use crds::DevWorkspace;
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    let crd = serde_yaml::to_string(&DevWorkspace::crd())?;
    print!("{crd}");
    Ok(())
}

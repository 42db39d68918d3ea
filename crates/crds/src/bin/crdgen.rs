//! Prints the GCPBuild CRD manifest as YAML.
//!
//! Usage: `cargo run --bin crdgen > config/crd/gcpbuilds.yaml`

use crds::GCPBuild;
use kube::CustomResourceExt;

fn main() -> Result<(), serde_yaml::Error> {
    print!("{}", serde_yaml::to_string(&GCPBuild::crd())?);
    Ok(())
}

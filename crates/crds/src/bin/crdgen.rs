//! Prints the CRD manifests owned by this repository as a multi-document YAML stream.

use crds::{Hardware, Template, TinkerbellCluster, TinkerbellMachine, Workflow};
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    let crds = [
        TinkerbellMachine::crd(),
        TinkerbellCluster::crd(),
        Hardware::crd(),
        Template::crd(),
        Workflow::crd(),
    ];

    for crd in crds {
        print!("---\n{}", serde_yaml::to_string(&crd)?);
    }

    Ok(())
}

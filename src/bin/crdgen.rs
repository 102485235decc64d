//! # CRD Generator
//!
//! Generates the CustomResourceDefinition YAML for `ServiceInstance` and
//! `ServiceBinding` from the Rust type definitions.
//!
//! ## Usage
//!
//! ```bash
//! # Generate CRD YAML
//! cargo run --bin crdgen > config/crd/service-broker.yaml
//!
//! # Generate and apply directly
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use kube::CustomResourceExt;
use service_broker_controller::crd::{ServiceBinding, ServiceInstance};

fn main() {
    for crd in [ServiceInstance::crd(), ServiceBinding::crd()] {
        match serde_yaml::to_string(&crd) {
            Ok(yaml) => {
                println!("---");
                print!("{yaml}");
            }
            Err(e) => {
                eprintln!("Failed to serialize CRD to YAML: {e}");
                std::process::exit(1);
            }
        }
    }
}

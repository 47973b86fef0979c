//! Check command implementation.
//!
//! Validates the configuration, resolves every provider's artifacts and
//! optionally probes the remote agents.

use jacoco_coverage_exporter::remote::RemoteClient;
use jacoco_coverage_exporter::resolver::ArtifactSpec;
use jacoco_coverage_exporter::runtime::{lookup_object, RUNTIME_OBJECT_NAME};
use jacoco_coverage_exporter::ArtifactResolver;

use crate::config::{validate_effective_config, Config};

/// Validates configuration, artifact locations and (with `connect`) agents.
pub fn command_check(
    connect: bool,
    verbose: bool,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 JaCoCo Coverage Exporter - Check");
    println!("===================================");

    let mut all_ok = true;

    println!("\n⚙️  Checking configuration...");
    match validate_effective_config(config) {
        Ok(_) => println!("   ✅ Configuration is valid"),
        Err(e) => {
            println!("   ❌ Configuration invalid: {}", e);
            all_ok = false;
        }
    }

    if config.providers.is_empty() {
        println!("   ⚠️  No providers configured");
    }

    let resolver = ArtifactResolver::new(None);
    for provider in &config.providers {
        println!("\n📦 Provider [{}]", provider.name);

        let spec = match ArtifactSpec::from_config(provider) {
            Ok(spec) => spec,
            Err(e) => {
                println!("   ❌ {}", e);
                all_ok = false;
                continue;
            }
        };

        for location in &provider.classes_locations {
            if location.exists() {
                println!("   ✅ {} exists", location.display());
            } else {
                println!("   ⚠️  {} does not exist", location.display());
            }
        }

        let artifacts = resolver.resolve(&spec);
        if artifacts.is_empty() {
            println!("   ⚠️  No artifacts matched the include patterns");
        } else {
            println!("   ✅ {} artifacts resolved", artifacts.len());
        }
        if verbose {
            for artifact in artifacts.iter() {
                println!("   ├─ {}", artifact.display());
            }
        }

        if provider.local {
            // Only an embedding process can register a runtime.
            if lookup_object(RUNTIME_OBJECT_NAME).is_some() {
                println!("   ✅ Local runtime registered");
            } else {
                println!("   ⚠️  Local mode: no runtime registered in this process");
            }
            continue;
        }

        if connect {
            if let Some(address) = provider.address() {
                let client = RemoteClient::new(address.clone(), provider.timeout());
                match client.fetch(false) {
                    Ok(data) => println!("   ✅ Agent at {} answered with {} bytes", address, data.len()),
                    Err(e) => {
                        println!("   ❌ Agent at {}: {}", address, e);
                        all_ok = false;
                    }
                }
            }
        }
    }

    println!("\n📋 Summary:");
    if all_ok {
        println!("   ✅ All checks passed");
        Ok(())
    } else {
        println!("   ❌ Some checks failed - please review the output above");
        std::process::exit(1);
    }
}

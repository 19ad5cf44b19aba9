//! `apphost plan` — Display the startup order and wiring of a manifest.

use apphost_common::constants;
use apphost_common::types::Endpoint;
use apphost_compose::manifest::load_manifest;
use apphost_compose::resolver::ResolvedConfiguration;
use clap::Args;

/// Arguments for the `plan` command.
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Path to the composition manifest.
    #[arg(default_value = constants::DEFAULT_MANIFEST)]
    pub manifest: String,
}

/// Executes the `plan` command.
///
/// Loads the manifest, builds the composition graph and prints each
/// resource in startup order with the endpoints it will be given.
///
/// # Errors
///
/// Returns an error if the manifest cannot be loaded or the graph is invalid.
pub fn execute(args: &PlanArgs) -> anyhow::Result<()> {
    let manifest = load_manifest(std::path::Path::new(&args.manifest))?;
    let graph = manifest.build_graph()?;
    let specs = manifest.launch_specs();
    let planned = |name: &str| {
        specs
            .get(name)
            .map(|s| Endpoint::new(&s.scheme, &s.host, s.port))
    };

    println!("Startup plan for: {}", args.manifest);
    println!("{}", "\u{2550}".repeat(35));
    println!();

    for (position, (handle, resource)) in graph.startup_sequence().enumerate() {
        println!("  {}. {} ({})", position + 1, resource.name(), resource.kind());
        if let Some(endpoint) = planned(resource.name()) {
            println!("      endpoint: {endpoint}");
        }

        let mut config = ResolvedConfiguration::new();
        for dependency in graph.dependencies(handle) {
            let Some(dep) = graph.resource(dependency) else {
                continue;
            };
            if let Some(endpoint) = planned(dep.name()) {
                config.insert(dep.name(), dep.kind(), endpoint);
            }
        }
        if !config.is_empty() {
            let names: Vec<_> = config.iter().map(|(name, _)| name).collect();
            println!("      references: {}", names.join(", "));
            for (key, value) in config.env_vars() {
                println!("      env: {key}={value}");
            }
        }
    }

    println!();
    println!(
        "  {} resource(s), {} reference(s).",
        graph.len(),
        graph.reference_count()
    );
    Ok(())
}

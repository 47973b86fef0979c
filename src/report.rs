//! Ad-hoc coverage report rendered as simple markup.

use std::fmt::Write as FmtWrite;
use std::sync::Arc;

use crate::coverage::{BundleCoverage, CoverageNode};
use crate::error::Result;
use crate::provider::CoverageSource;
use crate::reset::ensure_providers;
use crate::scope::CoverageScope;

/// Mean of the per-package instruction coverage ratios, as a percentage.
///
/// NaN when the bundle has no packages or a package has no instructions.
pub fn instruction_coverage_percent(bundle: &BundleCoverage) -> f64 {
    let packages = bundle.packages();
    let sum: f64 = packages
        .iter()
        .map(|p| p.instruction_counter().covered_ratio())
        .sum();
    sum / packages.len() as f64 * 100.0
}

/// Renders one provider: a headline with the overall percentage, then one
/// line per package with its instruction and branch ratios.
pub fn render_bundle(name: &str, bundle: &BundleCoverage) -> String {
    let mut out = String::new();
    writeln!(
        out,
        "<h1>{} {:.2}%</h1>",
        name,
        instruction_coverage_percent(bundle)
    )
    .ok();
    for package in bundle.packages() {
        writeln!(
            out,
            "{}: {:.4}, {:.4}<br>",
            package.name(),
            package.instruction_counter().covered_ratio(),
            package.branch_counter().covered_ratio()
        )
        .ok();
    }
    out
}

/// Report over every provider. The first provider that fails aborts it.
pub fn render_report(scope: &CoverageScope, sources: &[Arc<dyn CoverageSource>]) -> Result<String> {
    ensure_providers(sources)?;

    let mut out = String::new();
    for source in sources {
        let bundle = scope.coverage(source.as_ref())?;
        out.push_str(&render_bundle(source.name(), &bundle));
    }
    Ok(out)
}

//! Structural analysis and aggregation.
//!
//! The structural analyzer turns one compiled artifact plus the execution
//! data of the classes it contains into class-level coverage nodes. The
//! aggregation step runs it over every resolved artifact and folds the
//! classes into a single [`BundleCoverage`].
//!
//! The shipped analyzer consumes *structure maps*: JSON descriptions of a
//! class's methods, their instruction blocks, branch sites and the probe
//! guarding each of them.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::coverage::{BundleCoverage, ClassCoverage, Counter, CounterEntity, CounterSet, MethodCoverage};
use crate::error::{CoverageError, Result};
use crate::execdata::{class_id, ExecutionDataStore, ExecutionRecord};

/// External structural analysis contract.
///
/// Implementations return a node for every class in `artifact` that has a
/// matching record in `store`; classes without execution data are skipped.
/// Files the analyzer does not recognize yield an empty list, recognized
/// files that cannot be processed yield [`CoverageError::Analysis`].
pub trait StructuralAnalyzer: Send + Sync {
    fn analyze_artifact(&self, artifact: &Path, store: &ExecutionDataStore) -> Result<Vec<ClassCoverage>>;
}

/// Runs `analyzer` over every artifact (in parallel) and aggregates the
/// resulting classes into one bundle named `name`.
pub fn analyze(
    name: &str,
    store: &ExecutionDataStore,
    artifacts: &[PathBuf],
    analyzer: &dyn StructuralAnalyzer,
) -> Result<BundleCoverage> {
    let per_artifact: Vec<Vec<ClassCoverage>> = artifacts
        .par_iter()
        .map(|artifact| analyzer.analyze_artifact(artifact, store))
        .collect::<Result<_>>()?;

    let classes: Vec<ClassCoverage> = per_artifact.into_iter().flatten().collect();
    debug!(
        "Analyzed {} artifacts for [{}]: {} classes with execution data out of {} records",
        artifacts.len(),
        name,
        classes.len(),
        store.len()
    );
    Ok(BundleCoverage::from_classes(name, classes))
}

/// Contents of one `*.classmap.json` artifact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructureMap {
    pub classes: Vec<ClassStructure>,
}

/// Class identity is either spelled out, or derived from a class file
/// located relative to the structure map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClassIdRepr {
    Number(u64),
    Hex(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassStructure {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ClassIdRepr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_file: Option<PathBuf>,
    /// VM name, e.g. `com/acme/Foo`.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    #[serde(default)]
    pub methods: Vec<MethodStructure>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodStructure {
    pub name: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub instructions: Vec<InstructionBlock>,
    #[serde(default)]
    pub branches: Vec<BranchSite>,
}

/// A straight-line run of instructions guarded by one probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstructionBlock {
    pub probe: usize,
    #[serde(default = "default_instruction_count")]
    pub count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

fn default_instruction_count() -> u64 {
    1
}

/// A decision point; one probe per outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchSite {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    pub probes: Vec<usize>,
}

impl ClassStructure {
    /// Resolves the class id. `base` is the directory of the structure map.
    pub fn resolve_id(&self, base: &Path) -> std::result::Result<u64, String> {
        match (&self.id, &self.class_file) {
            (Some(ClassIdRepr::Number(id)), _) => Ok(*id),
            (Some(ClassIdRepr::Hex(hex)), _) => {
                let digits = hex.trim_start_matches("0x").trim_start_matches("0X");
                u64::from_str_radix(digits, 16)
                    .map_err(|e| format!("invalid id '{hex}' for class {}: {e}", self.name))
            }
            (None, Some(class_file)) => {
                let path = base.join(class_file);
                let bytes = fs::read(&path)
                    .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
                Ok(class_id(&bytes))
            }
            (None, None) => Err(format!("class {} has neither id nor class_file", self.name)),
        }
    }

    /// Cross-references the structure with the probes of `record`.
    pub fn analyze(&self, id: u64, record: &ExecutionRecord) -> ClassCoverage {
        let methods = self
            .methods
            .iter()
            .map(|m| m.analyze(record))
            .collect();
        ClassCoverage::new(id, self.name.clone(), self.source_file.clone(), methods)
    }
}

impl MethodStructure {
    pub fn analyze(&self, record: &ExecutionRecord) -> MethodCoverage {
        let mut counters = CounterSet::default();
        let mut lines: BTreeMap<u32, bool> = BTreeMap::new();

        for block in &self.instructions {
            let hit = record.is_hit(block.probe);
            let counter = if hit {
                Counter::new(block.count, 0)
            } else {
                Counter::new(0, block.count)
            };
            counters.increment(CounterEntity::Instruction, counter);
            if let Some(line) = block.line {
                *lines.entry(line).or_insert(false) |= hit;
            }
        }

        for site in self.branches.iter().filter(|s| s.probes.len() > 1) {
            let total = site.probes.len() as u64;
            let covered = site.probes.iter().filter(|&&p| record.is_hit(p)).count() as u64;
            counters.increment(CounterEntity::Branch, Counter::new(covered, total - covered));

            let complexity_covered = covered.saturating_sub(1);
            let complexity_missed = total.saturating_sub(complexity_covered + 1);
            counters.increment(
                CounterEntity::Complexity,
                Counter::new(complexity_covered, complexity_missed),
            );
        }

        let covered_lines = lines.values().filter(|&&hit| hit).count() as u64;
        counters.set(
            CounterEntity::Line,
            Counter::new(covered_lines, lines.len() as u64 - covered_lines),
        );

        let base = if counters.get(CounterEntity::Instruction).covered() > 0 {
            Counter::COVERED_ONE
        } else {
            Counter::MISSED_ONE
        };
        counters.increment(CounterEntity::Method, base);
        counters.increment(CounterEntity::Complexity, base);

        let first_line = lines.keys().next().copied();
        MethodCoverage::new(self.name.clone(), self.desc.clone(), first_line, counters)
    }
}

/// Analyzer for `*.classmap.json` structure maps.
///
/// Line counters are computed per method and summed upwards like every
/// other counter. A source line claimed by two methods (a lambda on the line
/// of its enclosing method, say) is therefore counted once per method at
/// class level. Maps that need exact per-class line totals must give each
/// line to exactly one method.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructureMapAnalyzer;

impl StructureMapAnalyzer {
    pub const EXTENSION: &'static str = ".classmap.json";

    pub fn is_structure_map(path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(Self::EXTENSION))
    }

    pub fn load(path: &Path) -> Result<StructureMap> {
        let content = fs::read_to_string(path).map_err(|e| CoverageError::analysis(path, e))?;
        serde_json::from_str(&content).map_err(|e| CoverageError::analysis(path, e))
    }
}

impl StructuralAnalyzer for StructureMapAnalyzer {
    fn analyze_artifact(&self, artifact: &Path, store: &ExecutionDataStore) -> Result<Vec<ClassCoverage>> {
        if !Self::is_structure_map(artifact) {
            debug!("Skipping [{}]: not a structure map", artifact.display());
            return Ok(Vec::new());
        }

        let map = Self::load(artifact)?;
        let base = artifact.parent().unwrap_or_else(|| Path::new("."));

        let mut classes = Vec::with_capacity(map.classes.len());
        for class in &map.classes {
            let id = class
                .resolve_id(base)
                .map_err(|reason| CoverageError::analysis(artifact, reason))?;
            match store.get(id) {
                Some(record) => classes.push(class.analyze(id, record)),
                None => debug!("No execution data for class {} ({:016x})", class.name, id),
            }
        }
        Ok(classes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coverage::CoverageNode;

    fn block(probe: usize, count: u64, line: u32) -> InstructionBlock {
        InstructionBlock {
            probe,
            count,
            line: Some(line),
        }
    }

    #[test]
    fn test_method_counters_from_probes() {
        let method = MethodStructure {
            name: "run".into(),
            desc: "()V".into(),
            instructions: vec![block(0, 4, 10), block(1, 2, 11), block(2, 3, 11), block(3, 1, 12)],
            branches: vec![BranchSite {
                line: Some(11),
                probes: vec![1, 2],
            }],
        };
        let record = ExecutionRecord::new(1, "a/A", vec![true, true, false, false]);
        let m = method.analyze(&record);

        assert_eq!(m.counter(CounterEntity::Instruction), Counter::new(6, 4));
        assert_eq!(m.counter(CounterEntity::Branch), Counter::new(1, 1));
        // line 10 hit, line 11 partly hit, line 12 missed
        assert_eq!(m.counter(CounterEntity::Line), Counter::new(2, 1));
        assert_eq!(m.counter(CounterEntity::Method), Counter::COVERED_ONE);
        // one decision with one missed outcome, plus the method itself
        assert_eq!(m.counter(CounterEntity::Complexity), Counter::new(1, 1));
        assert_eq!(m.first_line(), Some(10));
    }

    #[test]
    fn test_shared_line_counts_once_per_method() {
        let class = ClassStructure {
            id: None,
            class_file: None,
            name: "a/A".into(),
            source_file: None,
            methods: vec![
                MethodStructure {
                    name: "outer".into(),
                    desc: "()V".into(),
                    instructions: vec![block(0, 1, 5)],
                    branches: Vec::new(),
                },
                MethodStructure {
                    name: "lambda$outer$0".into(),
                    desc: "()V".into(),
                    instructions: vec![block(1, 1, 5)],
                    branches: Vec::new(),
                },
            ],
        };
        let record = ExecutionRecord::new(1, "a/A", vec![true, false]);
        let c = class.analyze(1, &record);

        assert_eq!(c.methods()[0].counter(CounterEntity::Line), Counter::new(1, 0));
        assert_eq!(c.methods()[1].counter(CounterEntity::Line), Counter::new(0, 1));
        assert_eq!(c.counter(CounterEntity::Line), Counter::new(1, 1));
    }

    #[test]
    fn test_unexecuted_method() {
        let method = MethodStructure {
            name: "idle".into(),
            desc: String::new(),
            instructions: vec![block(0, 5, 3)],
            branches: vec![BranchSite {
                line: Some(3),
                probes: vec![1, 2, 3],
            }],
        };
        let record = ExecutionRecord::new(1, "a/A", vec![false; 4]);
        let m = method.analyze(&record);
        assert_eq!(m.counter(CounterEntity::Method), Counter::MISSED_ONE);
        assert_eq!(m.counter(CounterEntity::Branch), Counter::new(0, 3));
        // 3-way switch: complexity 2 missed, plus the missed method
        assert_eq!(m.counter(CounterEntity::Complexity), Counter::new(0, 3));
    }

    #[test]
    fn test_single_outcome_site_ignored() {
        let method = MethodStructure {
            name: "m".into(),
            desc: String::new(),
            instructions: vec![block(0, 1, 1)],
            branches: vec![BranchSite {
                line: None,
                probes: vec![0],
            }],
        };
        let m = method.analyze(&ExecutionRecord::new(1, "A", vec![true]));
        assert_eq!(m.counter(CounterEntity::Branch), Counter::EMPTY);
    }

    #[test]
    fn test_resolve_id_variants() {
        let mut class = ClassStructure {
            id: Some(ClassIdRepr::Number(17)),
            class_file: None,
            name: "a/A".into(),
            source_file: None,
            methods: vec![],
        };
        assert_eq!(class.resolve_id(Path::new(".")), Ok(17));

        class.id = Some(ClassIdRepr::Hex("0x00000000000000ff".into()));
        assert_eq!(class.resolve_id(Path::new(".")), Ok(255));

        class.id = None;
        assert!(class.resolve_id(Path::new(".")).is_err());
    }

    #[test]
    fn test_map_deserializes_with_defaults() {
        let json = r#"{"classes":[{"id":"ff","name":"a/A","methods":[
            {"name":"m","instructions":[{"probe":0,"line":4}]}]}]}"#;
        let map: StructureMap = serde_json::from_str(json).unwrap();
        let method = &map.classes[0].methods[0];
        assert_eq!(method.instructions[0].count, 1);
        assert!(method.branches.is_empty());
        assert_eq!(map.classes[0].id, Some(ClassIdRepr::Hex("ff".into())));
    }

    #[test]
    fn test_non_map_files_are_ignored() {
        let store = ExecutionDataStore::new();
        let classes = StructureMapAnalyzer
            .analyze_artifact(Path::new("/nowhere/Foo.class"), &store)
            .unwrap();
        assert!(classes.is_empty());
    }

    #[test]
    fn test_unreadable_map_is_analysis_error() {
        let store = ExecutionDataStore::new();
        let err = StructureMapAnalyzer
            .analyze_artifact(Path::new("/nowhere/Foo.classmap.json"), &store)
            .unwrap_err();
        assert!(matches!(err, CoverageError::Analysis { .. }));
    }
}

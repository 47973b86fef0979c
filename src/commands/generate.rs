//! Generate testdata command implementation.
//!
//! Writes a synthetic class tree (one structure map per package) and a
//! matching execution-data file, for trying the exporter without an agent.

use chrono::Utc;
use jacoco_coverage_exporter::analysis::{
    BranchSite, ClassIdRepr, ClassStructure, InstructionBlock, MethodStructure, StructureMap,
    StructureMapAnalyzer,
};
use jacoco_coverage_exporter::execdata::{class_id, encode, SessionInfo};
use jacoco_coverage_exporter::{ExecutionDataStore, ExecutionRecord};
use rand::Rng;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const EXEC_FILE_NAME: &str = "jacoco.exec";
pub const CLASSES_DIR_NAME: &str = "classes";

const MAX_METHODS_PER_CLASS: usize = 5;
const MAX_BLOCKS_PER_METHOD: usize = 4;
const MAX_INSTRUCTIONS_PER_BLOCK: u64 = 12;

/// Generated class plus its probe vector.
struct GeneratedClass {
    structure: ClassStructure,
    record: ExecutionRecord,
}

fn generate_class(
    rng: &mut impl Rng,
    package: &str,
    index: usize,
    hit_ratio: f64,
) -> GeneratedClass {
    let name = format!("{package}/Generated{}", index + 1);
    let id = class_id(name.as_bytes());

    let mut probe = 0usize;
    let mut line = 10u32;
    let mut methods = Vec::new();
    let method_count = rng.gen_range(1..=MAX_METHODS_PER_CLASS);

    for m in 0..method_count {
        let mut instructions = Vec::new();
        for _ in 0..rng.gen_range(1..=MAX_BLOCKS_PER_METHOD) {
            instructions.push(InstructionBlock {
                probe,
                count: rng.gen_range(1..=MAX_INSTRUCTIONS_PER_BLOCK),
                line: Some(line),
            });
            probe += 1;
            line += rng.gen_range(1..=3);
        }

        let mut branches = Vec::new();
        if rng.gen_bool(0.5) {
            // Each outcome gets its own probe.
            let outcomes = rng.gen_range(2..=3);
            branches.push(BranchSite {
                line: Some(line),
                probes: (probe..probe + outcomes).collect(),
            });
            probe += outcomes;
            line += 1;
        }

        methods.push(MethodStructure {
            name: format!("method{}", m + 1),
            desc: "()V".to_string(),
            instructions,
            branches,
        });
        line += 2;
    }

    let probes: Vec<bool> = (0..probe).map(|_| rng.gen_bool(hit_ratio)).collect();

    GeneratedClass {
        structure: ClassStructure {
            id: Some(ClassIdRepr::Number(id)),
            class_file: None,
            name: name.clone(),
            source_file: Some(format!("Generated{}.java", index + 1)),
            methods,
        },
        record: ExecutionRecord::new(id, name, probes),
    }
}

fn write_structure_map(dir: &Path, package: &str, map: &StructureMap) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let file_name = format!("{}{}", package.replace('/', "."), StructureMapAnalyzer::EXTENSION);
    let path = dir.join(file_name);
    fs::write(&path, serde_json::to_string_pretty(map)?)?;
    Ok(path)
}

/// Generates `packages * classes_per_package` classes under `output`.
pub fn command_generate_testdata(
    output: PathBuf,
    packages: usize,
    classes_per_package: usize,
    hit_ratio: f64,
) -> Result<(), Box<dyn std::error::Error>> {
    if !(0.0..=1.0).contains(&hit_ratio) {
        return Err(format!("hit ratio must be between 0 and 1, got {hit_ratio}").into());
    }
    debug!(
        "Generating test data: packages={}, classes_per_package={}, output={}",
        packages,
        classes_per_package,
        output.display()
    );

    let classes_dir = output.join(CLASSES_DIR_NAME);
    fs::create_dir_all(&classes_dir)?;

    let mut rng = rand::thread_rng();
    let mut store = ExecutionDataStore::new();
    let now = Utc::now().timestamp_millis();
    store.add_session(SessionInfo {
        id: "generated".to_string(),
        start: now - 60_000,
        dump: now,
    });

    let mut class_total = 0;
    for p in 0..packages {
        let package = format!("com/example/module{}", p + 1);
        let mut map = StructureMap::default();
        for c in 0..classes_per_package {
            let generated = generate_class(&mut rng, &package, c, hit_ratio);
            store.put(generated.record)?;
            map.classes.push(generated.structure);
            class_total += 1;
        }
        let path = write_structure_map(&classes_dir, &package, &map)?;
        debug!("Wrote {}", path.display());
    }

    let exec_path = output.join(EXEC_FILE_NAME);
    fs::write(&exec_path, encode(&store)?)?;

    println!(
        "✅ Generated {} classes in {} packages under {}",
        class_total,
        packages,
        output.display()
    );
    println!(
        "   Try: jacoco-coverage-exporter test --exec-file {} (with classes_locations: [{}])",
        exec_path.display(),
        classes_dir.display()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use jacoco_coverage_exporter::analysis::analyze;
    use jacoco_coverage_exporter::execdata::decode;
    use jacoco_coverage_exporter::{CounterEntity, CoverageNode};

    #[test]
    fn test_generated_data_analyzes() {
        let dir = tempfile::tempdir().unwrap();
        command_generate_testdata(dir.path().to_path_buf(), 2, 3, 1.0).unwrap();

        let bytes = fs::read(dir.path().join(EXEC_FILE_NAME)).unwrap();
        let store = decode(&bytes).unwrap();
        assert_eq!(store.len(), 6);

        let mut maps: Vec<PathBuf> = fs::read_dir(dir.path().join(CLASSES_DIR_NAME))
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        maps.sort();
        assert_eq!(maps.len(), 2);

        let bundle = analyze("generated", &store, &maps, &StructureMapAnalyzer).unwrap();
        assert_eq!(bundle.packages().len(), 2);
        assert_eq!(bundle.counter(CounterEntity::Class).covered(), 6);
        // Every probe hit
        assert_eq!(bundle.instruction_counter().missed(), 0);
    }
}

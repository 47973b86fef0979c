//! Hierarchical coverage model.
//!
//! A [`BundleCoverage`] owns packages, packages own classes, classes own
//! methods. Every node carries one [`Counter`] per [`CounterEntity`]; parent
//! counters are computed bottom-up from their children at construction time
//! and nodes are immutable afterwards.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};

/// Counter categories, in report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterEntity {
    Instruction,
    Branch,
    Line,
    Complexity,
    Method,
    Class,
}

impl CounterEntity {
    pub const ALL: [CounterEntity; 6] = [
        CounterEntity::Instruction,
        CounterEntity::Branch,
        CounterEntity::Line,
        CounterEntity::Complexity,
        CounterEntity::Method,
        CounterEntity::Class,
    ];

    /// Plural form used in metric names.
    pub fn metric_name(self) -> &'static str {
        match self {
            CounterEntity::Instruction => "instructions",
            CounterEntity::Branch => "branches",
            CounterEntity::Line => "lines",
            CounterEntity::Complexity => "complexity",
            CounterEntity::Method => "methods",
            CounterEntity::Class => "classes",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for CounterEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CounterEntity::Instruction => "instruction",
            CounterEntity::Branch => "branch",
            CounterEntity::Line => "line",
            CounterEntity::Complexity => "complexity",
            CounterEntity::Method => "method",
            CounterEntity::Class => "class",
        };
        f.write_str(s)
    }
}

/// Covered/missed pair for one category. `total` is always derived, so
/// `covered + missed == total` holds by construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Counter {
    covered: u64,
    missed: u64,
}

impl Counter {
    pub const EMPTY: Counter = Counter {
        covered: 0,
        missed: 0,
    };
    pub const COVERED_ONE: Counter = Counter {
        covered: 1,
        missed: 0,
    };
    pub const MISSED_ONE: Counter = Counter {
        covered: 0,
        missed: 1,
    };

    pub fn new(covered: u64, missed: u64) -> Self {
        Self { covered, missed }
    }

    pub fn covered(&self) -> u64 {
        self.covered
    }

    pub fn missed(&self) -> u64 {
        self.missed
    }

    pub fn total(&self) -> u64 {
        self.covered + self.missed
    }

    /// Ratio of covered items, NaN when the counter is empty.
    pub fn covered_ratio(&self) -> f64 {
        self.covered as f64 / self.total() as f64
    }

    pub fn missed_ratio(&self) -> f64 {
        self.missed as f64 / self.total() as f64
    }
}

impl Add for Counter {
    type Output = Counter;

    fn add(self, rhs: Counter) -> Counter {
        Counter {
            covered: self.covered + rhs.covered,
            missed: self.missed + rhs.missed,
        }
    }
}

impl AddAssign for Counter {
    fn add_assign(&mut self, rhs: Counter) {
        self.covered += rhs.covered;
        self.missed += rhs.missed;
    }
}

impl Sum for Counter {
    fn sum<I: Iterator<Item = Counter>>(iter: I) -> Counter {
        iter.fold(Counter::EMPTY, Add::add)
    }
}

/// One counter per category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterSet([Counter; 6]);

impl CounterSet {
    pub fn get(&self, entity: CounterEntity) -> Counter {
        self.0[entity.index()]
    }

    pub fn set(&mut self, entity: CounterEntity, counter: Counter) {
        self.0[entity.index()] = counter;
    }

    pub fn increment(&mut self, entity: CounterEntity, counter: Counter) {
        self.0[entity.index()] += counter;
    }

    pub fn iter(&self) -> impl Iterator<Item = (CounterEntity, Counter)> + '_ {
        CounterEntity::ALL.iter().map(|&e| (e, self.get(e)))
    }
}

impl AddAssign<&CounterSet> for CounterSet {
    fn add_assign(&mut self, rhs: &CounterSet) {
        for entity in CounterEntity::ALL {
            self.increment(entity, rhs.get(entity));
        }
    }
}

/// Level of a node in the coverage tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Bundle,
    Package,
    Class,
    Method,
}

/// Common read access to every level of the tree.
pub trait CoverageNode {
    fn name(&self) -> &str;
    fn element_type(&self) -> ElementType;
    fn counters(&self) -> &CounterSet;

    fn counter(&self, entity: CounterEntity) -> Counter {
        self.counters().get(entity)
    }

    fn instruction_counter(&self) -> Counter {
        self.counter(CounterEntity::Instruction)
    }

    fn branch_counter(&self) -> Counter {
        self.counter(CounterEntity::Branch)
    }

    fn line_counter(&self) -> Counter {
        self.counter(CounterEntity::Line)
    }
}

/// Leaf node. Counters come straight from the structural analyzer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodCoverage {
    name: String,
    desc: String,
    first_line: Option<u32>,
    counters: CounterSet,
}

impl MethodCoverage {
    /// The CLASS counter is meaningless for a method and is always cleared.
    pub fn new(
        name: impl Into<String>,
        desc: impl Into<String>,
        first_line: Option<u32>,
        mut counters: CounterSet,
    ) -> Self {
        counters.set(CounterEntity::Class, Counter::EMPTY);
        Self {
            name: name.into(),
            desc: desc.into(),
            first_line,
            counters,
        }
    }

    pub fn desc(&self) -> &str {
        &self.desc
    }

    pub fn first_line(&self) -> Option<u32> {
        self.first_line
    }

    pub fn is_executed(&self) -> bool {
        self.counters.get(CounterEntity::Instruction).covered() > 0
    }
}

impl CoverageNode for MethodCoverage {
    fn name(&self) -> &str {
        &self.name
    }

    fn element_type(&self) -> ElementType {
        ElementType::Method
    }

    fn counters(&self) -> &CounterSet {
        &self.counters
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassCoverage {
    id: u64,
    name: String,
    source_file: Option<String>,
    methods: Vec<MethodCoverage>,
    counters: CounterSet,
}

impl ClassCoverage {
    /// Sums the method counters; the class itself counts as covered once any
    /// of its methods was executed.
    pub fn new(
        id: u64,
        name: impl Into<String>,
        source_file: Option<String>,
        methods: Vec<MethodCoverage>,
    ) -> Self {
        let mut counters = CounterSet::default();
        for method in &methods {
            counters += method.counters();
        }
        let class_counter = if counters.get(CounterEntity::Method).covered() > 0 {
            Counter::COVERED_ONE
        } else {
            Counter::MISSED_ONE
        };
        counters.set(CounterEntity::Class, class_counter);

        Self {
            id,
            name: name.into(),
            source_file,
            methods,
            counters,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn source_file(&self) -> Option<&str> {
        self.source_file.as_deref()
    }

    pub fn methods(&self) -> &[MethodCoverage] {
        &self.methods
    }

    /// VM package name (`com/acme` for `com/acme/Foo`), empty for the default package.
    pub fn package_name(&self) -> &str {
        match self.name.rfind('/') {
            Some(idx) => &self.name[..idx],
            None => "",
        }
    }
}

impl CoverageNode for ClassCoverage {
    fn name(&self) -> &str {
        &self.name
    }

    fn element_type(&self) -> ElementType {
        ElementType::Class
    }

    fn counters(&self) -> &CounterSet {
        &self.counters
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PackageCoverage {
    name: String,
    classes: Vec<ClassCoverage>,
    counters: CounterSet,
}

impl PackageCoverage {
    pub fn new(name: impl Into<String>, mut classes: Vec<ClassCoverage>) -> Self {
        classes.sort_by(|a, b| a.name.cmp(&b.name));
        let mut counters = CounterSet::default();
        for class in &classes {
            counters += class.counters();
        }
        Self {
            name: name.into(),
            classes,
            counters,
        }
    }

    pub fn classes(&self) -> &[ClassCoverage] {
        &self.classes
    }
}

impl CoverageNode for PackageCoverage {
    fn name(&self) -> &str {
        &self.name
    }

    fn element_type(&self) -> ElementType {
        ElementType::Package
    }

    fn counters(&self) -> &CounterSet {
        &self.counters
    }
}

/// Root of the coverage tree for one provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BundleCoverage {
    name: String,
    packages: Vec<PackageCoverage>,
    counters: CounterSet,
}

impl BundleCoverage {
    pub fn new(name: impl Into<String>, mut packages: Vec<PackageCoverage>) -> Self {
        packages.sort_by(|a, b| a.name.cmp(&b.name));
        let mut counters = CounterSet::default();
        for package in &packages {
            counters += package.counters();
        }
        Self {
            name: name.into(),
            packages,
            counters,
        }
    }

    /// Groups classes into packages by their VM package name. A class id seen
    /// twice (same class reachable from two artifacts) is kept once.
    pub fn from_classes(name: impl Into<String>, classes: Vec<ClassCoverage>) -> Self {
        let mut by_package: BTreeMap<String, BTreeMap<u64, ClassCoverage>> = BTreeMap::new();
        for class in classes {
            by_package
                .entry(class.package_name().to_string())
                .or_default()
                .entry(class.id)
                .or_insert(class);
        }

        let packages = by_package
            .into_iter()
            .map(|(package, classes)| PackageCoverage::new(package, classes.into_values().collect()))
            .collect();

        Self::new(name, packages)
    }

    pub fn packages(&self) -> &[PackageCoverage] {
        &self.packages
    }

    pub fn class_count(&self) -> usize {
        self.packages.iter().map(|p| p.classes.len()).sum()
    }
}

impl CoverageNode for BundleCoverage {
    fn name(&self) -> &str {
        &self.name
    }

    fn element_type(&self) -> ElementType {
        ElementType::Bundle
    }

    fn counters(&self) -> &CounterSet {
        &self.counters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn method(name: &str, instr: (u64, u64), lines: (u64, u64)) -> MethodCoverage {
        let mut counters = CounterSet::default();
        counters.set(CounterEntity::Instruction, Counter::new(instr.0, instr.1));
        counters.set(CounterEntity::Line, Counter::new(lines.0, lines.1));
        let executed = instr.0 > 0;
        counters.set(
            CounterEntity::Method,
            if executed {
                Counter::COVERED_ONE
            } else {
                Counter::MISSED_ONE
            },
        );
        counters.set(
            CounterEntity::Complexity,
            if executed {
                Counter::COVERED_ONE
            } else {
                Counter::MISSED_ONE
            },
        );
        MethodCoverage::new(name, "()V", Some(1), counters)
    }

    #[test]
    fn test_counter_ratio_and_total() {
        let c = Counter::new(3, 1);
        assert_eq!(c.total(), 4);
        assert!((c.covered_ratio() - 0.75).abs() < f64::EPSILON);
        assert!((c.missed_ratio() - 0.25).abs() < f64::EPSILON);
        assert!(Counter::EMPTY.covered_ratio().is_nan());
    }

    #[test]
    fn test_method_class_counter_is_cleared() {
        let mut counters = CounterSet::default();
        counters.set(CounterEntity::Class, Counter::new(1, 0));
        let m = MethodCoverage::new("m", "()V", None, counters);
        assert_eq!(m.counter(CounterEntity::Class), Counter::EMPTY);
    }

    #[test]
    fn test_class_counter_derived_from_methods() {
        let executed = ClassCoverage::new(1, "a/A", None, vec![method("x", (2, 1), (1, 1))]);
        assert_eq!(executed.counter(CounterEntity::Class), Counter::COVERED_ONE);

        let untouched = ClassCoverage::new(2, "a/B", None, vec![method("x", (0, 3), (0, 2))]);
        assert_eq!(untouched.counter(CounterEntity::Class), Counter::MISSED_ONE);
    }

    #[test]
    fn test_package_name() {
        let c = ClassCoverage::new(1, "com/acme/Foo", None, vec![]);
        assert_eq!(c.package_name(), "com/acme");
        let d = ClassCoverage::new(2, "Bar", None, vec![]);
        assert_eq!(d.package_name(), "");
    }

    #[test]
    fn test_bundle_groups_and_sums() {
        let classes = vec![
            ClassCoverage::new(1, "b/Two", None, vec![method("m", (4, 0), (2, 0))]),
            ClassCoverage::new(2, "a/One", None, vec![method("m", (1, 5), (1, 3))]),
            ClassCoverage::new(3, "a/Three", None, vec![method("m", (0, 2), (0, 1))]),
        ];
        let bundle = BundleCoverage::from_classes("app", classes);

        let names: Vec<_> = bundle.packages().iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(bundle.class_count(), 3);

        for entity in CounterEntity::ALL {
            let sum: Counter = bundle.packages().iter().map(|p| p.counter(entity)).sum();
            assert_eq!(bundle.counter(entity), sum, "{entity}");
        }
        assert_eq!(bundle.instruction_counter(), Counter::new(5, 7));
        assert_eq!(bundle.counter(CounterEntity::Class), Counter::new(2, 1));
    }

    #[test]
    fn test_duplicate_class_ids_kept_once() {
        let classes = vec![
            ClassCoverage::new(7, "a/A", None, vec![method("m", (1, 0), (1, 0))]),
            ClassCoverage::new(7, "a/A", None, vec![method("m", (1, 0), (1, 0))]),
        ];
        let bundle = BundleCoverage::from_classes("app", classes);
        assert_eq!(bundle.class_count(), 1);
        assert_eq!(bundle.instruction_counter(), Counter::new(1, 0));
    }
}

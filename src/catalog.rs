//! The fixed, ordered list of test cases the harness runs.

use std::fmt;

/// A named group of consecutive test cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Basic,
    Stats,
    Microbench,
    Conformance,
    ConformanceBn,
    BenchV8,
}

impl Phase {
    /// All phases in execution order.
    pub const ALL: [Phase; 6] = [
        Phase::Basic,
        Phase::Stats,
        Phase::Microbench,
        Phase::Conformance,
        Phase::ConformanceBn,
        Phase::BenchV8,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Phase::Basic => "basic",
            Phase::Stats => "stats",
            Phase::Microbench => "microbench",
            Phase::Conformance => "conformance",
            Phase::ConformanceBn => "conformance-bn",
            Phase::BenchV8 => "bench",
        }
    }

    /// The test cases of this phase, in order.
    pub fn cases(&self) -> Vec<TestCase> {
        match self {
            Phase::Basic => vec![
                TestCase::named("patch_test", "patch_test", ""),
                TestCase::new("qjs", "tests/test_closure.js"),
                TestCase::new("qjs", "tests/test_op.js"),
                TestCase::new("qjs", "tests/test_builtin.js"),
                TestCase::new("qjs", "tests/test_loop.js"),
                TestCase::new("qjs", "-m tests/test_std.js"),
                TestCase::new("qjsbn", "tests/test_closure.js"),
                TestCase::new("qjsbn", "tests/test_op.js"),
                TestCase::new("qjsbn", "tests/test_builtin.js"),
                TestCase::new("qjsbn", "tests/test_loop.js"),
                TestCase::new("qjsbn", "-m tests/test_std.js"),
                TestCase::new("qjsbn", "--qjscalc tests/test_bignum.js"),
            ],
            Phase::Stats => vec![TestCase::new("qjs", "-qd")],
            Phase::Microbench => vec![TestCase::new("qjs", "tests/microbench.js")],
            Phase::Conformance => vec![
                TestCase::new("run-test262", "-m -c test262o.conf"),
                TestCase::new("run-test262", "-u -c test262o.conf"),
                TestCase::new("run-test262", "-m -c test262.conf"),
                TestCase::new("run-test262", "-m -c test262.conf -a"),
                TestCase::new("run-test262", "-u -c test262.conf -a"),
                TestCase::new("run-test262", "-m -c test262.conf -E -a"),
            ],
            Phase::ConformanceBn => vec![
                TestCase::new("run-test262-bn", "-m -c test262bn.conf"),
                TestCase::new("run-test262-bn", "-m -c test262bn.conf -a"),
            ],
            Phase::BenchV8 => vec![TestCase::new("qjs", "-d tests/bench-v8/combined.js")],
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One invocation of a test executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    display_name: String,
    executable: String,
    argument: String,
}

impl TestCase {
    /// A case displayed as `"<executable> <argument>"`.
    pub fn new(executable: &str, argument: &str) -> Self {
        Self::named(&format!("{executable} {argument}"), executable, argument)
    }

    /// A case with an explicit display name.
    pub fn named(display_name: &str, executable: &str, argument: &str) -> Self {
        Self {
            display_name: display_name.to_string(),
            executable: executable.to_string(),
            argument: argument.to_string(),
        }
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Bare executable identifier, resolved to a path elsewhere.
    pub fn executable(&self) -> &str {
        &self.executable
    }

    pub fn argument(&self) -> &str {
        &self.argument
    }
}

/// The full catalog grouped by phase.
pub fn catalog() -> Vec<(Phase, Vec<TestCase>)> {
    Phase::ALL.iter().map(|phase| (*phase, phase.cases())).collect()
}

/// The full catalog as one ordered list.
pub fn flatten(catalog: &[(Phase, Vec<TestCase>)]) -> Vec<TestCase> {
    catalog
        .iter()
        .flat_map(|(_, cases)| cases.iter().cloned())
        .collect()
}

/// Distinct executable names referenced by `catalog`, in first-use order.
pub fn executables(catalog: &[(Phase, Vec<TestCase>)]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for case in catalog.iter().flat_map(|(_, cases)| cases) {
        if !names.iter().any(|n| n == case.executable()) {
            names.push(case.executable().to_string());
        }
    }
    names
}

//! pytest log processing.
//!
//! Reads the console output of a pytest run executed with `-rA` and turns
//! it into [`TestResult`] records.
//!
//! # Log Layout
//!
//! ```text
//! =================================== FAILURES ===================================
//! _________________________________ test_divide __________________________________
//!
//!     def test_divide():
//! >       assert 1 / 1 == 2
//! E       assert 1.0 == 2
//!
//! tests/test_math.py:9: AssertionError
//! ----------------------------- Captured stdout call -----------------------------
//! dividing
//! ==================================== PASSES ====================================
//! =========================== short test summary info ============================
//! PASSED tests/test_math.py::test_add
//! FAILED tests/test_math.py::test_divide - assert 1.0 == 2
//! ```
//!
//! The short test summary supplies the result list and its order. Detail
//! sections under the `FAILURES`, `ERRORS` and `PASSES` banners are attached
//! to the summary entry whose node id they describe.
//!
//! # Test Names
//!
//! Node ids are converted to dotted names:
//!
//! ```text
//! tests/test_math.py::TestCalc::test_add  →  tests.test_math.TestCalc.test_add
//! ```

use std::collections::HashMap;
use std::io::BufRead;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use super::{FrameworkResult, LogProcessor, TestResult};

static BANNER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^=+ (.+?) =+$").expect("banner pattern"));
static TEST_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^_{3,} (.+?) _{3,}$").expect("test header pattern"));
static SUB_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-{3,} (.+?) -{3,}$").expect("sub header pattern"));
static SUMMARY_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(PASSED|FAILED|ERROR|XFAIL|XPASS) (.+?)(?: - .*)?$").expect("summary pattern")
});

/// Log processor for pytest console output captured with `-rA`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PytestLogProcessor;

impl PytestLogProcessor {
    /// Creates a new pytest log processor.
    pub fn new() -> Self {
        Self
    }
}

impl LogProcessor for PytestLogProcessor {
    fn process(&self, log: &mut dyn BufRead) -> FrameworkResult<Vec<TestResult>> {
        let mut parser = Parser::default();
        for line in log.lines() {
            let line = line?;
            parser.feed(line.trim_end_matches('\r'));
        }
        let results = parser.finish();
        debug!("Parsed {} pytest result(s)", results.len());
        Ok(results)
    }

    fn name(&self) -> &'static str {
        "pytest"
    }

    fn label(&self) -> &'static str {
        "Pytest"
    }
}

/// Which banner a detail section was printed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Report {
    Failure,
    Error,
    Pass,
}

impl Report {
    /// The banner a summary outcome's detail section appears under.
    fn for_outcome(outcome: &str) -> Option<Self> {
        match outcome {
            "FAILED" => Some(Report::Failure),
            "ERROR" => Some(Report::Error),
            "PASSED" => Some(Report::Pass),
            _ => None,
        }
    }
}

/// Which part of the log the parser is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
    Other,
    Details(Report),
    Summary,
}

/// Which collection of the current section receives lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Body,
    StdOut,
    Logs,
}

/// One `___ title ___` block under a details banner.
#[derive(Debug)]
struct Section {
    title: String,
    report: Report,
    body: Vec<String>,
    std_out: Vec<String>,
    logs: Vec<String>,
    claimed: bool,
}

impl Section {
    fn new(title: &str, report: Report) -> Self {
        Self {
            title: title.to_string(),
            report,
            body: Vec::new(),
            std_out: Vec::new(),
            logs: Vec::new(),
            claimed: false,
        }
    }

    fn append_to(&mut self, result: &mut TestResult) {
        result.body.append(&mut self.body);
        result.std_out.append(&mut self.std_out);
        result.log_messages.append(&mut self.logs);
        self.claimed = true;
    }
}

#[derive(Debug)]
struct SummaryEntry {
    node_id: String,
    passed: bool,
    report: Option<Report>,
}

#[derive(Debug)]
struct Parser {
    region: Region,
    target: Target,
    current: Option<Section>,
    /// In log order. Distinct tests can share a title.
    sections: Vec<Section>,
    summary: Vec<SummaryEntry>,
}

impl Default for Parser {
    fn default() -> Self {
        Self {
            region: Region::Other,
            target: Target::Body,
            current: None,
            sections: Vec::new(),
            summary: Vec::new(),
        }
    }
}

impl Parser {
    fn feed(&mut self, line: &str) {
        if let Some(caps) = BANNER.captures(line) {
            self.close_section();
            self.region = match caps[1].trim() {
                "FAILURES" => Region::Details(Report::Failure),
                "ERRORS" => Region::Details(Report::Error),
                "PASSES" => Region::Details(Report::Pass),
                "short test summary info" => Region::Summary,
                _ => Region::Other,
            };
            return;
        }

        match self.region {
            Region::Other => {}
            Region::Details(report) => self.feed_detail(line, report),
            Region::Summary => {
                if let Some(caps) = SUMMARY_LINE.captures(line.trim_end()) {
                    let outcome = &caps[1];
                    self.summary.push(SummaryEntry {
                        node_id: caps[2].to_string(),
                        passed: matches!(outcome, "PASSED" | "XPASS" | "XFAIL"),
                        report: Report::for_outcome(outcome),
                    });
                }
            }
        }
    }

    fn feed_detail(&mut self, line: &str, report: Report) {
        if let Some(caps) = TEST_HEADER.captures(line) {
            self.close_section();
            self.current = Some(Section::new(section_title(&caps[1]), report));
            self.target = Target::Body;
            return;
        }

        if let Some(caps) = SUB_HEADER.captures(line) {
            let heading = &caps[1];
            self.target = if heading.starts_with("Captured stdout")
                || heading.starts_with("Captured stderr")
            {
                Target::StdOut
            } else if heading.starts_with("Captured log") {
                Target::Logs
            } else {
                Target::Body
            };
            return;
        }

        if let Some(section) = self.current.as_mut() {
            let lines = match self.target {
                Target::Body => &mut section.body,
                Target::StdOut => &mut section.std_out,
                Target::Logs => &mut section.logs,
            };
            lines.push(line.to_string());
        }
    }

    fn close_section(&mut self) {
        if let Some(mut section) = self.current.take() {
            trim_blank_edges(&mut section.body);
            trim_blank_edges(&mut section.std_out);
            trim_blank_edges(&mut section.logs);
            self.sections.push(section);
        }
        self.target = Target::Body;
    }

    /// Pairs each summary entry with the first unclaimed section of the
    /// same report kind and title. Both are printed in run order, so
    /// same-titled tests from different files pair up in sequence.
    fn finish(mut self) -> Vec<TestResult> {
        self.close_section();

        let mut results: Vec<TestResult> = Vec::new();
        // A test can be reported twice (e.g. PASSED then ERROR at teardown).
        let mut slots: HashMap<String, usize> = HashMap::new();

        for entry in self.summary {
            let slot = match slots.get(&entry.node_id) {
                Some(&slot) => {
                    results[slot].passed &= entry.passed;
                    slot
                }
                None => {
                    results.push(TestResult::new(dotted_name(&entry.node_id), entry.passed));
                    slots.insert(entry.node_id.clone(), results.len() - 1);
                    results.len() - 1
                }
            };

            let Some(report) = entry.report else {
                continue;
            };
            let key = section_key(&entry.node_id);
            if let Some(section) = self
                .sections
                .iter_mut()
                .find(|s| !s.claimed && s.report == report && s.title == key)
            {
                section.append_to(&mut results[slot]);
            }
        }

        for section in self.sections.iter().filter(|s| !s.claimed) {
            warn!("No summary entry for pytest section '{}'", section.title);
        }

        results
    }
}

/// Strips the phase prefix pytest puts on error section titles.
fn section_title(raw: &str) -> &str {
    let raw = raw.trim();
    raw.strip_prefix("ERROR at setup of ")
        .or_else(|| raw.strip_prefix("ERROR at teardown of "))
        .unwrap_or(raw)
}

/// The title pytest uses for a node id's detail section.
///
/// `tests/test_x.py::TestC::test_a` → `TestC.test_a`
fn section_key(node_id: &str) -> String {
    let mut parts = node_id.split("::");
    let file = parts.next().unwrap_or_default();
    let rest: Vec<&str> = parts.collect();
    if rest.is_empty() {
        file.to_string()
    } else {
        rest.join(".")
    }
}

/// Converts a pytest node id to a dotted test name.
///
/// `tests/test_x.py::TestC::test_a` → `tests.test_x.TestC.test_a`
pub fn dotted_name(node_id: &str) -> String {
    let mut parts = node_id.split("::");
    let file = parts.next().unwrap_or_default();
    let module = file
        .strip_suffix(".py")
        .unwrap_or(file)
        .replace(['/', '\\'], ".");

    std::iter::once(module)
        .chain(parts.map(str::to_string))
        .collect::<Vec<_>>()
        .join(".")
}

fn trim_blank_edges(lines: &mut Vec<String>) {
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
    let leading = lines.iter().take_while(|l| l.trim().is_empty()).count();
    lines.drain(..leading);
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_LOG: &str = "\
============================= test session starts ==============================
platform linux -- Python 3.11.4, pytest-7.4.0, pluggy-1.2.0
rootdir: /work
collected 3 items

tests/test_math.py .F.                                                   [100%]

=================================== FAILURES ===================================
_________________________________ test_divide __________________________________

    def test_divide():
        print(\"dividing\")
>       assert 1 / 1 == 2
E       assert 1.0 == 2

tests/test_math.py:9: AssertionError
----------------------------- Captured stdout call -----------------------------
dividing
------------------------------ Captured log call -------------------------------
WARNING  root:test_math.py:8 about to divide
==================================== PASSES ====================================
____________________________ TestCalc.test_multiply ____________________________
----------------------------- Captured stdout call -----------------------------
multiplying
=========================== short test summary info ============================
PASSED tests/test_math.py::test_add
FAILED tests/test_math.py::test_divide - assert 1.0 == 2
PASSED tests/test_math.py::TestCalc::test_multiply
========================= 1 failed, 2 passed in 0.05s ==========================
";

    fn process(log: &str) -> Vec<TestResult> {
        let mut reader = log.as_bytes();
        PytestLogProcessor::new().process(&mut reader).unwrap()
    }

    #[test]
    fn test_dotted_name() {
        assert_eq!(
            dotted_name("tests/test_foo.py::TestClass::test_method"),
            "tests.test_foo.TestClass.test_method"
        );
        assert_eq!(dotted_name("test_foo.py::test_bar"), "test_foo.test_bar");
        assert_eq!(dotted_name("tests/test_bad.py"), "tests.test_bad");
    }

    #[test]
    fn test_section_key() {
        assert_eq!(section_key("tests/test_x.py::TestC::test_a"), "TestC.test_a");
        assert_eq!(section_key("tests/test_x.py::test_p[1.5]"), "test_p[1.5]");
    }

    #[test]
    fn test_results_follow_summary_order() {
        let results = process(SAMPLE_LOG);
        let names: Vec<_> = results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "tests.test_math.test_add",
                "tests.test_math.test_divide",
                "tests.test_math.TestCalc.test_multiply",
            ]
        );
        assert!(results[0].passed);
        assert!(!results[1].passed);
        assert!(results[2].passed);
    }

    #[test]
    fn test_failure_sections_are_split() {
        let results = process(SAMPLE_LOG);
        let divide = &results[1];

        assert_eq!(divide.body.first().map(String::as_str), Some("    def test_divide():"));
        assert_eq!(
            divide.body.last().map(String::as_str),
            Some("tests/test_math.py:9: AssertionError")
        );
        assert_eq!(divide.std_out, vec!["dividing"]);
        assert_eq!(
            divide.log_messages,
            vec!["WARNING  root:test_math.py:8 about to divide"]
        );
    }

    #[test]
    fn test_pass_sections_attach_to_class_methods() {
        let results = process(SAMPLE_LOG);
        let multiply = &results[2];

        assert!(multiply.body.is_empty());
        assert_eq!(multiply.std_out, vec!["multiplying"]);
        assert!(results[0].std_out.is_empty());
    }

    #[test]
    fn test_teardown_error_fails_passed_test() {
        let log = "\
==================================== ERRORS ====================================
_________________________ ERROR at teardown of test_db _________________________
fixture blew up
=========================== short test summary info ============================
PASSED tests/test_db.py::test_db
ERROR tests/test_db.py::test_db - RuntimeError: boom
";
        let results = process(log);
        assert_eq!(results.len(), 1);
        assert!(!results[0].passed);
        assert_eq!(results[0].body, vec!["fixture blew up"]);
    }

    #[test]
    fn test_skipped_and_xfail_lines() {
        let log = "\
=========================== short test summary info ============================
SKIPPED [1] tests/test_a.py:3: not on linux
XFAIL tests/test_a.py::test_known_bug - reason: flaky upstream
XPASS tests/test_a.py::test_fixed
";
        let results = process(log);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.passed));
    }

    #[test]
    fn test_log_without_summary_is_empty() {
        let results = process("collected 0 items\n\n==== no tests ran in 0.01s ====\n");
        assert!(results.is_empty());
    }

    #[test]
    fn test_same_titled_sections_pair_in_order() {
        let log = "\
=================================== FAILURES ===================================
____________________________________ test_x ____________________________________
body from file a
____________________________________ test_x ____________________________________
body from file b
=========================== short test summary info ============================
FAILED tests/test_a.py::test_x - assert False
FAILED tests/test_b.py::test_x - assert False
";
        let results = process(log);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].name, "tests.test_a.test_x");
        assert_eq!(results[0].body, vec!["body from file a"]);
        assert_eq!(results[1].name, "tests.test_b.test_x");
        assert_eq!(results[1].body, vec!["body from file b"]);
    }

    #[test]
    fn test_passes_section_not_taken_by_failure() {
        let log = "\
=================================== FAILURES ===================================
____________________________________ test_x ____________________________________
traceback
==================================== PASSES ====================================
____________________________________ test_x ____________________________________
----------------------------- Captured stdout call -----------------------------
all good
=========================== short test summary info ============================
PASSED tests/test_a.py::test_x
FAILED tests/test_b.py::test_x - assert False
";
        let results = process(log);
        assert_eq!(results[0].name, "tests.test_a.test_x");
        assert!(results[0].body.is_empty());
        assert_eq!(results[0].std_out, vec!["all good"]);
        assert_eq!(results[1].body, vec!["traceback"]);
        assert!(results[1].std_out.is_empty());
    }

    #[test]
    fn test_call_failure_and_teardown_error_merge() {
        let log = "\
==================================== ERRORS ====================================
_______________________ ERROR at teardown of test_conn ________________________
teardown failed
=================================== FAILURES ===================================
___________________________________ test_conn __________________________________
call failed
=========================== short test summary info ============================
FAILED tests/test_db.py::test_conn - assert False
ERROR tests/test_db.py::test_conn - RuntimeError
";
        let results = process(log);
        assert_eq!(results.len(), 1);
        assert!(!results[0].passed);
        assert_eq!(results[0].body, vec!["call failed", "teardown failed"]);
    }

    #[test]
    fn test_parametrized_id_with_spaces() {
        let log = "\
=================================== FAILURES ===================================
_________________________________ test_p[a b] _________________________________
mismatch
=========================== short test summary info ============================
PASSED tests/t.py::test_p[a b]
FAILED tests/t.py::test_p[c d] - assert 'c' == 'd'
FAILED tests/t.py::test_p[a b] - assert 'a' == 'b'
";
        let results = process(log);
        let names: Vec<_> = results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["tests.t.test_p[a b]", "tests.t.test_p[c d]"]);
        assert!(!results[0].passed);
        assert_eq!(results[0].body, vec!["mismatch"]);
        assert!(results[1].body.is_empty());
    }

    #[test]
    fn test_crlf_line_endings() {
        let log = "=== short test summary info ===\r\nPASSED t.py::test_x\r\n";
        let results = process(log);
        assert_eq!(results, vec![TestResult::new("t.test_x", true)]);
    }
}

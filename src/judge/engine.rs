//! Judging engine: evaluate one submission end-to-end
//!
//! The engine compiles once, runs every test case in ordinal order, and
//! classifies per-case and overall verdicts. Verdicts are values; the only
//! `Err` this module produces is transient sandbox trouble, which the queue
//! retries and, at max attempts, finalizes as system_error.

use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::events::{EventMessage, EventPayload, EventSink, Room};
use crate::models::{Problem, ScoringKind, Submission, SubmissionStatus, TestCase};
use crate::sandbox::{CompileOutcome, OutcomeTag, RunLimits, RunOutcome, SandboxExecutor};

use super::compare::outputs_match;

/// Hints only; the exit code stays authoritative
static FAULT_MARKERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)segmentation fault|traceback \(most recent call last\)|exception in thread|core dumped|stack overflow",
    )
    .expect("fault marker regex")
});

/// Per-case judging detail
#[derive(Debug, Clone)]
pub struct CaseDetail {
    pub ordinal: i32,
    pub status: SubmissionStatus,
    pub time_ms: u64,
    pub memory_mb: u64,
    pub is_sample: bool,
}

/// Aggregated result for one submission
#[derive(Debug, Clone)]
pub struct JudgeResult {
    pub status: SubmissionStatus,
    /// Sum of per-case wall times
    pub total_time_ms: i64,
    /// Maximum per-case peak memory
    pub max_memory_mb: i64,
    pub test_cases_run: i32,
    pub test_cases_passed: i32,
    pub total_test_cases: i32,
    pub compile_ms: u64,
    pub compile_stderr: Option<String>,
    /// Hackathon partial-credit points; None under ICPC scoring
    pub points_earned: Option<f64>,
    pub cases: Vec<CaseDetail>,
}

impl JudgeResult {
    /// Compile step failed; never counted as an attempt by scoring
    pub fn compilation_error(compile_stderr: String, compile_ms: u64, total: i32) -> Self {
        Self {
            status: SubmissionStatus::CompilationError,
            total_time_ms: 0,
            max_memory_mb: 0,
            test_cases_run: 0,
            test_cases_passed: 0,
            total_test_cases: total,
            compile_ms,
            compile_stderr: Some(compile_stderr),
            points_earned: None,
            cases: Vec::new(),
        }
    }

    /// Serialized per-case detail stored in submissions.judge_output
    pub fn to_judge_output(&self) -> serde_json::Value {
        json!({
            "compile_ms": self.compile_ms,
            "compile_stderr": self.compile_stderr,
            "cases": self
                .cases
                .iter()
                .map(|c| json!({
                    "ordinal": c.ordinal,
                    "status": c.status.as_str(),
                    "time_ms": c.time_ms,
                    "memory_mb": c.memory_mb,
                    "is_sample": c.is_sample,
                }))
                .collect::<Vec<_>>(),
        })
    }
}

/// Orchestrates one judgment
pub struct JudgingEngine {
    executor: Arc<SandboxExecutor>,
    events: Arc<dyn EventSink>,
}

impl JudgingEngine {
    pub fn new(executor: Arc<SandboxExecutor>, events: Arc<dyn EventSink>) -> Self {
        Self { executor, events }
    }

    /// Judge one submission against its problem's test cases.
    ///
    /// `Err` means transient infrastructure failure (retryable); every
    /// user-code outcome comes back as a `JudgeResult`.
    pub async fn judge(
        &self,
        submission: &Submission,
        problem: &Problem,
        test_cases: &[TestCase],
        scoring: ScoringKind,
    ) -> AppResult<JudgeResult> {
        let total = test_cases.len() as i32;
        let rooms = [Room::Team(submission.team_id), Room::Admins];

        let language = submission.language().ok_or_else(|| {
            AppError::InvalidInput(format!("unsupported language: {}", submission.language))
        })?;

        self.emit_progress(&rooms, submission, SubmissionStatus::Compiling, 0, total);

        let compiled = self
            .executor
            .compile(&submission.source_code, language)
            .await?;

        let (artifact, compile_ms) = match compiled {
            CompileOutcome::Failed {
                compile_stderr,
                compile_ms,
            } => {
                tracing::debug!(submission_id = %submission.id, "compilation failed");
                return Ok(JudgeResult::compilation_error(
                    compile_stderr,
                    compile_ms,
                    total,
                ));
            }
            CompileOutcome::Success {
                artifact,
                compile_ms,
            } => (artifact, compile_ms),
        };

        self.emit_progress(&rooms, submission, SubmissionStatus::Judging, 0, total);

        // Unset problem limits fall back to the sandbox defaults
        let base_time_ms = if problem.time_limit > 0 {
            problem.time_limit as u64
        } else {
            self.executor.default_time_limit_ms()
        };
        let memory_limit_mb = if problem.memory_limit > 0 {
            problem.memory_limit as u64
        } else {
            self.executor.default_memory_limit_mb()
        };

        let limits = RunLimits {
            wall_limit_ms: (base_time_ms as f64 * language.time_multiplier()) as u64,
            memory_limit_mb,
            stdout_cap_bytes: self.executor.stdout_cap_bytes(),
        };

        let mut cases: Vec<CaseDetail> = Vec::with_capacity(test_cases.len());
        let mut total_time_ms: i64 = 0;
        let mut max_memory_mb: i64 = 0;
        let mut passed: i32 = 0;

        for (index, test_case) in test_cases.iter().enumerate() {
            let outcome = self.executor.run(&artifact, &test_case.input, limits).await;

            if outcome.tag == OutcomeTag::SpawnError {
                return Err(AppError::SandboxSpawn(outcome.stderr));
            }

            let status = classify_case(
                &outcome,
                limits.wall_limit_ms,
                limits.memory_limit_mb,
                &test_case.expected_output,
                problem.structured_judging,
                problem.float_tolerance,
            );

            total_time_ms += outcome.wall_ms as i64;
            max_memory_mb = max_memory_mb.max(outcome.mem_peak_mb as i64);
            if status.is_accepted() {
                passed += 1;
            }

            cases.push(CaseDetail {
                ordinal: test_case.ordinal,
                status,
                time_ms: outcome.wall_ms,
                memory_mb: outcome.mem_peak_mb,
                is_sample: test_case.is_sample,
            });

            self.emit_progress(
                &rooms,
                submission,
                SubmissionStatus::Judging,
                (index + 1) as i32,
                total,
            );

            // ICPC stops at the first failure; Hackathon grades every case
            if scoring == ScoringKind::Icpc && !status.is_accepted() {
                break;
            }
        }

        let status = overall_status(&cases, total, scoring);
        let points_earned = match scoring {
            ScoringKind::Hackathon => Some(hackathon_points(&cases, problem.points_value)),
            ScoringKind::Icpc => None,
        };

        Ok(JudgeResult {
            status,
            total_time_ms,
            max_memory_mb,
            test_cases_run: cases.len() as i32,
            test_cases_passed: passed,
            total_test_cases: total,
            compile_ms,
            compile_stderr: None,
            points_earned,
            cases,
        })
    }

    fn emit_progress(
        &self,
        rooms: &[Room],
        submission: &Submission,
        status: SubmissionStatus,
        current: i32,
        total: i32,
    ) {
        self.events.emit_many(
            rooms,
            EventMessage::new(EventPayload::VerdictUpdate {
                submission_id: submission.id,
                status: status.as_str().to_string(),
                current,
                total,
            }),
        );
    }
}

/// Classify one run. Priority order: TLE, MLE, RTE, system error, output
/// comparison.
pub fn classify_case(
    outcome: &RunOutcome,
    wall_limit_ms: u64,
    memory_limit_mb: u64,
    expected_output: &str,
    structured: bool,
    float_tolerance: bool,
) -> SubmissionStatus {
    if outcome.wall_ms > wall_limit_ms || outcome.tag == OutcomeTag::Tle {
        return SubmissionStatus::TimeLimitExceeded;
    }

    if outcome.mem_peak_mb > memory_limit_mb
        || matches!(outcome.tag, OutcomeTag::Mle | OutcomeTag::Oom)
    {
        return SubmissionStatus::MemoryLimitExceeded;
    }

    let nonzero_exit = outcome.exit_code.is_some_and(|c| c != 0);
    if nonzero_exit
        || outcome.signal.is_some()
        || outcome.tag == OutcomeTag::Rte
        || outcome.tag == OutcomeTag::Killed
        || FAULT_MARKERS.is_match(&outcome.stderr)
    {
        return SubmissionStatus::RuntimeError;
    }

    if outcome.tag == OutcomeTag::SpawnError {
        return SubmissionStatus::SystemError;
    }

    if outputs_match(&outcome.stdout, expected_output, structured, float_tolerance) {
        SubmissionStatus::Accepted
    } else {
        SubmissionStatus::WrongAnswer
    }
}

/// Overall verdict from per-case results
fn overall_status(cases: &[CaseDetail], total: i32, scoring: ScoringKind) -> SubmissionStatus {
    let passed = cases.iter().filter(|c| c.status.is_accepted()).count() as i32;

    if passed == total && cases.len() as i32 == total {
        return SubmissionStatus::Accepted;
    }

    match scoring {
        ScoringKind::Icpc => cases
            .iter()
            .find(|c| !c.status.is_accepted())
            .map(|c| c.status)
            .unwrap_or(SubmissionStatus::SystemError),
        ScoringKind::Hackathon => {
            if passed > 0 {
                SubmissionStatus::PartialCredit
            } else {
                modal_failure(cases)
            }
        }
    }
}

/// Most common failure status; ties broken by first occurrence
fn modal_failure(cases: &[CaseDetail]) -> SubmissionStatus {
    let failures: Vec<SubmissionStatus> = cases
        .iter()
        .filter(|c| !c.status.is_accepted())
        .map(|c| c.status)
        .collect();

    let mut best = SubmissionStatus::SystemError;
    let mut best_count = 0usize;
    for status in &failures {
        let count = failures.iter().filter(|s| *s == status).count();
        if count > best_count {
            best = *status;
            best_count = count;
        }
    }
    best
}

/// Partial-credit points: graded (non-sample) cases only, rounded to two
/// decimals
fn hackathon_points(cases: &[CaseDetail], points_value: i32) -> f64 {
    let graded: Vec<&CaseDetail> = cases.iter().filter(|c| !c.is_sample).collect();
    if graded.is_empty() {
        return 0.0;
    }

    let passed = graded.iter().filter(|c| c.status.is_accepted()).count();
    let raw = passed as f64 / graded.len() as f64 * points_value as f64;
    (raw * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(
        exit_code: Option<i32>,
        wall_ms: u64,
        mem_peak_mb: u64,
        tag: OutcomeTag,
        stdout: &str,
        stderr: &str,
    ) -> RunOutcome {
        RunOutcome {
            exit_code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            wall_ms,
            cpu_ms: wall_ms,
            mem_peak_mb,
            overhead_ms: 5,
            signal: None,
            output_overflow: false,
            tag,
        }
    }

    fn case(ordinal: i32, status: SubmissionStatus, is_sample: bool) -> CaseDetail {
        CaseDetail {
            ordinal,
            status,
            time_ms: 10,
            memory_mb: 8,
            is_sample,
        }
    }

    #[test]
    fn test_accepted_and_wrong_answer() {
        let ok = outcome(Some(0), 100, 16, OutcomeTag::Ok, "42\n", "");
        assert_eq!(
            classify_case(&ok, 2000, 256, "42", false, false),
            SubmissionStatus::Accepted
        );

        let wa = outcome(Some(0), 100, 16, OutcomeTag::Ok, "41\n", "");
        assert_eq!(
            classify_case(&wa, 2000, 256, "42", false, false),
            SubmissionStatus::WrongAnswer
        );
    }

    #[test]
    fn test_tle_wins_over_rte() {
        // Exceeds the wall limit AND exits nonzero: TLE takes priority
        let both = outcome(Some(1), 2500, 16, OutcomeTag::Tle, "", "killed");
        assert_eq!(
            classify_case(&both, 2000, 256, "42", false, false),
            SubmissionStatus::TimeLimitExceeded
        );
    }

    #[test]
    fn test_mle_wins_over_rte() {
        let both = outcome(Some(137), 100, 512, OutcomeTag::Oom, "", "");
        assert_eq!(
            classify_case(&both, 2000, 256, "42", false, false),
            SubmissionStatus::MemoryLimitExceeded
        );
    }

    #[test]
    fn test_fault_marker_hints_rte() {
        let segv = outcome(
            Some(0),
            100,
            16,
            OutcomeTag::Ok,
            "42",
            "Segmentation fault (core dumped)",
        );
        assert_eq!(
            classify_case(&segv, 2000, 256, "42", false, false),
            SubmissionStatus::RuntimeError
        );
    }

    #[test]
    fn test_spawn_error_is_system_error() {
        let spawn = RunOutcome::spawn_error("fork failed");
        assert_eq!(
            classify_case(&spawn, 2000, 256, "42", false, false),
            SubmissionStatus::SystemError
        );
    }

    #[test]
    fn test_output_overflow_is_runtime_error() {
        let mut over = outcome(None, 100, 16, OutcomeTag::Rte, "a".repeat(64).as_str(), "");
        over.output_overflow = true;
        over.signal = Some(9);
        assert_eq!(
            classify_case(&over, 2000, 256, "42", false, false),
            SubmissionStatus::RuntimeError
        );
    }

    #[test]
    fn test_overall_icpc_latches_first_failure() {
        let cases = vec![
            case(1, SubmissionStatus::Accepted, false),
            case(2, SubmissionStatus::WrongAnswer, false),
        ];
        assert_eq!(
            overall_status(&cases, 5, ScoringKind::Icpc),
            SubmissionStatus::WrongAnswer
        );
    }

    #[test]
    fn test_overall_hackathon_partial_credit() {
        let cases = vec![
            case(1, SubmissionStatus::Accepted, false),
            case(2, SubmissionStatus::WrongAnswer, false),
            case(3, SubmissionStatus::TimeLimitExceeded, false),
        ];
        assert_eq!(
            overall_status(&cases, 3, ScoringKind::Hackathon),
            SubmissionStatus::PartialCredit
        );
    }

    #[test]
    fn test_overall_hackathon_modal_failure() {
        let cases = vec![
            case(1, SubmissionStatus::WrongAnswer, false),
            case(2, SubmissionStatus::TimeLimitExceeded, false),
            case(3, SubmissionStatus::TimeLimitExceeded, false),
        ];
        assert_eq!(
            overall_status(&cases, 3, ScoringKind::Hackathon),
            SubmissionStatus::TimeLimitExceeded
        );
    }

    #[test]
    fn test_overall_accepted_requires_all_cases_run() {
        let cases = vec![case(1, SubmissionStatus::Accepted, false)];
        assert_eq!(
            overall_status(&cases, 1, ScoringKind::Icpc),
            SubmissionStatus::Accepted
        );
        // One accepted case out of three scheduled is not Accepted
        assert_ne!(
            overall_status(&cases, 3, ScoringKind::Icpc),
            SubmissionStatus::Accepted
        );
    }

    #[test]
    fn test_hackathon_points_exclude_samples() {
        // 5 graded cases, 3 passed, 10 points: 6.00
        let mut cases = vec![case(0, SubmissionStatus::Accepted, true)];
        for i in 1..=3 {
            cases.push(case(i, SubmissionStatus::Accepted, false));
        }
        for i in 4..=5 {
            cases.push(case(i, SubmissionStatus::WrongAnswer, false));
        }

        assert_eq!(hackathon_points(&cases, 10), 6.0);
    }

    #[test]
    fn test_hackathon_points_rounding() {
        // 1 of 3 graded, 10 points: 3.33
        let cases = vec![
            case(1, SubmissionStatus::Accepted, false),
            case(2, SubmissionStatus::WrongAnswer, false),
            case(3, SubmissionStatus::WrongAnswer, false),
        ];
        assert_eq!(hackathon_points(&cases, 10), 3.33);
    }

    #[test]
    fn test_compilation_error_result() {
        let result = JudgeResult::compilation_error("main.cpp:3: error".to_string(), 800, 7);
        assert_eq!(result.status, SubmissionStatus::CompilationError);
        assert_eq!(result.test_cases_run, 0);
        assert_eq!(result.total_test_cases, 7);

        let output = result.to_judge_output();
        assert_eq!(output["compile_ms"], 800);
        assert!(output["cases"].as_array().unwrap().is_empty());
    }
}

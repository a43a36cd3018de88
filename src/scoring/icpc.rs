//! ICPC scoring: all-or-nothing with penalty minutes
//!
//! A problem counts once it has an accepted submission. Its cost is the
//! minutes from contest start to the first accept plus 20 minutes per
//! wrong attempt before it. Compilation errors are not attempts. Unsolved
//! problems cost nothing.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::constants::ICPC_PENALTY_MINUTES;
use crate::db::repositories::{ScoreRepository, SubmissionRepository, TeamRepository};
use crate::error::AppResult;
use crate::models::{
    Contest, ContestResult, ScoringKind, Submission, SubmissionStatus, Team, TeamScore,
};

use super::{assign_ranks, ScoringStrategy};

pub struct IcpcScoring;

#[async_trait]
impl ScoringStrategy for IcpcScoring {
    fn kind(&self) -> ScoringKind {
        ScoringKind::Icpc
    }

    async fn on_submission_finalized(
        &self,
        pool: &PgPool,
        contest: &Contest,
        submission: &Submission,
    ) -> AppResult<()> {
        let all = SubmissionRepository::list_finalized_for_contest(pool, &contest.id).await?;

        let score = team_score_row(contest, submission.team_id, submission.problem_id, &all);
        ScoreRepository::upsert_team_score(pool, &score).await?;

        let teams = TeamRepository::list_for_contest_code(pool, &contest.registration_code).await?;
        let results = self.rank(compute_results(contest, &teams, &all));
        ScoreRepository::write_contest_results(pool, &contest.id, &results).await?;

        Ok(())
    }

    async fn compute_contest_results(
        &self,
        pool: &PgPool,
        contest: &Contest,
    ) -> AppResult<Vec<ContestResult>> {
        let all = SubmissionRepository::list_finalized_for_contest(pool, &contest.id).await?;
        let teams = TeamRepository::list_for_contest_code(pool, &contest.registration_code).await?;

        Ok(self.rank(compute_results(contest, &teams, &all)))
    }

    fn rank(&self, mut results: Vec<ContestResult>) -> Vec<ContestResult> {
        results.sort_by(|a, b| {
            (-a.problems_solved, a.penalty_time)
                .cmp(&(-b.problems_solved, b.penalty_time))
                .then_with(|| order_time(a.last_submission_time).cmp(&order_time(b.last_submission_time)))
                .then_with(|| a.team_name.cmp(&b.team_name))
        });

        assign_ranks(results, |a, b| {
            a.problems_solved == b.problems_solved && a.penalty_time == b.penalty_time
        })
    }
}

fn order_time(t: Option<DateTime<Utc>>) -> DateTime<Utc> {
    t.unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Outcome of one team's history on one problem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProblemOutcome {
    pub solved: bool,
    /// Attempts up to and including the first accept
    pub attempts: i32,
    /// Minutes from start to first accept, plus wrong-attempt penalty
    pub solve_time: Option<i32>,
    /// Wrong-attempt penalty minutes alone
    pub penalty: i32,
    pub first_accept_at: Option<DateTime<Utc>>,
}

/// Walk one (team, problem) history in chronological order. Submissions
/// after the first accept never change the outcome.
pub fn problem_outcome(contest: &Contest, history: &[&Submission]) -> ProblemOutcome {
    let mut wrong_before = 0i32;

    for submission in history {
        let Some(status) = submission.status() else {
            continue;
        };
        if !status.counts_as_attempt() {
            continue;
        }

        if status == SubmissionStatus::Accepted {
            let minutes = contest.minutes_from_start(submission.submission_time) as i32;
            let penalty = (wrong_before as i64 * ICPC_PENALTY_MINUTES) as i32;
            return ProblemOutcome {
                solved: true,
                attempts: wrong_before + 1,
                solve_time: Some(minutes + penalty),
                penalty,
                first_accept_at: Some(submission.submission_time),
            };
        }

        wrong_before += 1;
    }

    ProblemOutcome {
        solved: false,
        attempts: wrong_before,
        solve_time: None,
        penalty: 0,
        first_accept_at: None,
    }
}

/// Build the (team, problem) score row, including the contest-wide
/// first-solve flag: the earliest accepted submission on the problem
/// across all teams earns it, at most once.
pub fn team_score_row(
    contest: &Contest,
    team_id: Uuid,
    problem_id: Uuid,
    all_submissions: &[Submission],
) -> TeamScore {
    let history: Vec<&Submission> = all_submissions
        .iter()
        .filter(|s| s.team_id == team_id && s.problem_id == problem_id)
        .collect();
    let outcome = problem_outcome(contest, &history);

    let earliest_accept_overall = all_submissions
        .iter()
        .filter(|s| s.problem_id == problem_id)
        .filter(|s| s.status() == Some(SubmissionStatus::Accepted))
        .map(|s| (s.submission_time, s.team_id))
        .min();

    let first_solve = matches!(
        (outcome.first_accept_at, earliest_accept_overall),
        (Some(at), Some((earliest, owner))) if owner == team_id && at == earliest
    );

    TeamScore {
        contest_id: contest.id,
        team_id,
        problem_id,
        solved: outcome.solved,
        attempts: outcome.attempts,
        solve_time: outcome.solve_time,
        penalty: outcome.penalty,
        first_solve,
        updated_at: Utc::now(),
    }
}

/// Deterministic results from the full submission history (unranked)
pub fn compute_results(
    contest: &Contest,
    teams: &[Team],
    submissions: &[Submission],
) -> Vec<ContestResult> {
    // Group chronologically per (team, problem); the repository returns
    // submissions in time order already, but resorting keeps this pure
    // function independent of its callers.
    let mut by_team_problem: BTreeMap<(Uuid, Uuid), Vec<&Submission>> = BTreeMap::new();
    for submission in submissions {
        by_team_problem
            .entry((submission.team_id, submission.problem_id))
            .or_default()
            .push(submission);
    }
    for history in by_team_problem.values_mut() {
        history.sort_by_key(|s| s.submission_time);
    }

    let mut results: HashMap<Uuid, ContestResult> = teams
        .iter()
        .map(|t| {
            (
                t.id,
                ContestResult {
                    contest_id: contest.id,
                    team_id: t.id,
                    team_name: t.team_name.clone(),
                    problems_solved: 0,
                    penalty_time: 0,
                    total_points: 0.0,
                    rank: 0,
                    last_submission_time: None,
                    updated_at: Utc::now(),
                },
            )
        })
        .collect();

    for ((team_id, _problem_id), history) in &by_team_problem {
        let Some(result) = results.get_mut(team_id) else {
            // Submission from a team that is no longer registered
            continue;
        };

        let outcome = problem_outcome(contest, history);
        if outcome.solved {
            result.problems_solved += 1;
            result.penalty_time += outcome.solve_time.unwrap_or(0);
        }

        let last_counted = history
            .iter()
            .filter(|s| s.status().is_some_and(|st| st.counts_as_attempt()))
            .map(|s| s.submission_time)
            .max();
        if let Some(last) = last_counted {
            result.last_submission_time = Some(
                result
                    .last_submission_time
                    .map_or(last, |current| current.max(last)),
            );
        }
    }

    let mut rows: Vec<ContestResult> = results.into_values().collect();
    rows.sort_by(|a, b| a.team_name.cmp(&b.team_name));
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::test_support::{contest, submission, team};
    use chrono::Utc;

    #[test]
    fn test_penalty_scenario() {
        // WA at T=5, CE at T=12, AC at T=17: solved, attempts=2,
        // solve_time=17+20=37, penalty=20
        let c = contest("icpc", Utc::now(), 300);
        let t = team("alpha");
        let p = Uuid::new_v4();

        let subs = vec![
            submission(&c, t.id, p, 5, SubmissionStatus::WrongAnswer, None, 0, 3),
            submission(&c, t.id, p, 12, SubmissionStatus::CompilationError, None, 0, 3),
            submission(&c, t.id, p, 17, SubmissionStatus::Accepted, None, 3, 3),
        ];

        let row = team_score_row(&c, t.id, p, &subs);
        assert!(row.solved);
        assert_eq!(row.attempts, 2);
        assert_eq!(row.solve_time, Some(37));
        assert_eq!(row.penalty, 20);
        assert!(row.first_solve);
    }

    #[test]
    fn test_compilation_error_never_changes_scores() {
        let c = contest("icpc", Utc::now(), 300);
        let a = team("alpha");
        let b = team("beta");
        let p = Uuid::new_v4();

        let mut subs = vec![
            submission(&c, a.id, p, 10, SubmissionStatus::Accepted, None, 3, 3),
            submission(&c, b.id, p, 20, SubmissionStatus::Accepted, None, 3, 3),
        ];
        let teams = vec![a.clone(), b.clone()];

        let before = IcpcScoring.rank(compute_results(&c, &teams, &subs));

        subs.push(submission(
            &c,
            b.id,
            p,
            5,
            SubmissionStatus::CompilationError,
            None,
            0,
            3,
        ));
        let after = IcpcScoring.rank(compute_results(&c, &teams, &subs));

        for (x, y) in before.iter().zip(&after) {
            assert_eq!(x.team_id, y.team_id);
            assert_eq!(x.rank, y.rank);
            assert_eq!(x.penalty_time, y.penalty_time);
        }
    }

    #[test]
    fn test_submissions_after_first_accept_are_ignored() {
        let c = contest("icpc", Utc::now(), 300);
        let t = team("alpha");
        let p = Uuid::new_v4();

        let subs = vec![
            submission(&c, t.id, p, 10, SubmissionStatus::Accepted, None, 3, 3),
            submission(&c, t.id, p, 50, SubmissionStatus::WrongAnswer, None, 0, 3),
            submission(&c, t.id, p, 60, SubmissionStatus::Accepted, None, 3, 3),
        ];

        let row = team_score_row(&c, t.id, p, &subs);
        assert_eq!(row.solve_time, Some(10));
        assert_eq!(row.attempts, 1);
        assert_eq!(row.penalty, 0);
    }

    #[test]
    fn test_first_solve_is_contest_wide_and_unique() {
        let c = contest("icpc", Utc::now(), 300);
        let a = team("alpha");
        let b = team("beta");
        let p = Uuid::new_v4();

        let subs = vec![
            submission(&c, b.id, p, 8, SubmissionStatus::Accepted, None, 3, 3),
            submission(&c, a.id, p, 15, SubmissionStatus::Accepted, None, 3, 3),
        ];

        let row_a = team_score_row(&c, a.id, p, &subs);
        let row_b = team_score_row(&c, b.id, p, &subs);
        assert!(row_b.first_solve);
        assert!(!row_a.first_solve);
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let c = contest("icpc", Utc::now(), 300);
        let t = team("alpha");
        let p = Uuid::new_v4();

        let subs = vec![
            submission(&c, t.id, p, 5, SubmissionStatus::WrongAnswer, None, 0, 3),
            submission(&c, t.id, p, 17, SubmissionStatus::Accepted, None, 3, 3),
        ];

        let once = team_score_row(&c, t.id, p, &subs);
        let twice = team_score_row(&c, t.id, p, &subs);
        assert_eq!(once.attempts, twice.attempts);
        assert_eq!(once.solve_time, twice.solve_time);
        assert_eq!(once.penalty, twice.penalty);
        assert_eq!(once.first_solve, twice.first_solve);
    }

    #[test]
    fn test_rank_ordering_and_shared_ranks() {
        let c = contest("icpc", Utc::now(), 300);
        let teams = vec![team("alpha"), team("beta"), team("gamma"), team("delta")];
        let [p1, p2]: [Uuid; 2] = [Uuid::new_v4(), Uuid::new_v4()];

        let subs = vec![
            // alpha: 2 solves, penalty 10 + 20 = 30
            submission(&c, teams[0].id, p1, 10, SubmissionStatus::Accepted, None, 3, 3),
            submission(&c, teams[0].id, p2, 20, SubmissionStatus::Accepted, None, 3, 3),
            // beta: 1 solve at 15
            submission(&c, teams[1].id, p1, 15, SubmissionStatus::Accepted, None, 3, 3),
            // gamma: 1 solve at 15 as well (tie with beta)
            submission(&c, teams[2].id, p1, 15, SubmissionStatus::Accepted, None, 3, 3),
            // delta: no solves
            submission(&c, teams[3].id, p1, 30, SubmissionStatus::WrongAnswer, None, 0, 3),
        ];

        let ranked = IcpcScoring.rank(compute_results(&c, &teams, &subs));

        assert_eq!(ranked[0].team_name, "alpha");
        assert_eq!(ranked[0].rank, 1);

        // beta and gamma share rank 2
        assert_eq!(ranked[1].rank, 2);
        assert_eq!(ranked[2].rank, 2);

        // delta comes after the tie with rank equal to its index + 1
        assert_eq!(ranked[3].team_name, "delta");
        assert_eq!(ranked[3].rank, 4);
    }
}

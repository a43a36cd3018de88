//! Hackathon scoring: partial-credit points
//!
//! Each (team, problem) pair is represented by the team's best submission:
//! highest points_earned, earlier submission breaking ties. Points come
//! from non-sample test cases only. No penalty, no first-solve bonus.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::repositories::{ScoreRepository, SubmissionRepository, TeamRepository};
use crate::error::AppResult;
use crate::models::{
    Contest, ContestResult, ScoringKind, Submission, SubmissionStatus, Team, TeamScore,
};

use super::{assign_ranks, ScoringStrategy};

pub struct HackathonScoring;

#[async_trait]
impl ScoringStrategy for HackathonScoring {
    fn kind(&self) -> ScoringKind {
        ScoringKind::Hackathon
    }

    async fn on_submission_finalized(
        &self,
        pool: &PgPool,
        contest: &Contest,
        submission: &Submission,
    ) -> AppResult<()> {
        let history = SubmissionRepository::list_finalized_for_team_problem(
            pool,
            &submission.team_id,
            &submission.problem_id,
        )
        .await?;

        let score = team_score_row(contest, submission.team_id, submission.problem_id, &history);
        ScoreRepository::upsert_team_score(pool, &score).await?;

        let all = SubmissionRepository::list_finalized_for_contest(pool, &contest.id).await?;
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
            b.total_points
                .partial_cmp(&a.total_points)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.problems_solved.cmp(&a.problems_solved))
                .then_with(|| {
                    order_time(a.last_submission_time).cmp(&order_time(b.last_submission_time))
                })
                .then_with(|| a.team_name.cmp(&b.team_name))
        });

        assign_ranks(results, |a, b| {
            a.total_points == b.total_points && a.problems_solved == b.problems_solved
        })
    }
}

fn order_time(t: Option<DateTime<Utc>>) -> DateTime<Utc> {
    t.unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// The team's best submission: maximize points_earned, break ties by
/// earlier submission time
pub fn best_submission<'a>(history: &[&'a Submission]) -> Option<&'a Submission> {
    history
        .iter()
        .filter(|s| s.status().is_some_and(|st| st.counts_as_attempt()))
        .copied()
        .min_by(|a, b| {
            let pa = a.points_earned.unwrap_or(0.0);
            let pb = b.points_earned.unwrap_or(0.0);
            pb.partial_cmp(&pa)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.submission_time.cmp(&b.submission_time))
        })
}

/// Build the (team, problem) score row from the pair's history
pub fn team_score_row(
    contest: &Contest,
    team_id: Uuid,
    problem_id: Uuid,
    history: &[Submission],
) -> TeamScore {
    let history: Vec<&Submission> = history
        .iter()
        .filter(|s| s.team_id == team_id && s.problem_id == problem_id)
        .collect();

    let attempts = history
        .iter()
        .filter(|s| s.status().is_some_and(|st| st.counts_as_attempt()))
        .count() as i32;
    let best = best_submission(&history);

    let solved = best.is_some_and(|s| s.status() == Some(SubmissionStatus::Accepted));
    let solve_time = best.map(|s| contest.minutes_from_start(s.submission_time) as i32);

    TeamScore {
        contest_id: contest.id,
        team_id,
        problem_id,
        solved,
        attempts,
        solve_time,
        penalty: 0,
        first_solve: false,
        updated_at: Utc::now(),
    }
}

/// Deterministic results from the full submission history (unranked)
pub fn compute_results(
    contest: &Contest,
    teams: &[Team],
    submissions: &[Submission],
) -> Vec<ContestResult> {
    let mut by_team_problem: BTreeMap<(Uuid, Uuid), Vec<&Submission>> = BTreeMap::new();
    for submission in submissions {
        by_team_problem
            .entry((submission.team_id, submission.problem_id))
            .or_default()
            .push(submission);
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
            continue;
        };

        if let Some(best) = best_submission(history) {
            result.total_points += best.points_earned.unwrap_or(0.0);
            if best.status() == Some(SubmissionStatus::Accepted) {
                result.problems_solved += 1;
            }
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
    for row in &mut rows {
        row.total_points = (row.total_points * 100.0).round() / 100.0;
    }
    rows.sort_by(|a, b| a.team_name.cmp(&b.team_name));
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::test_support::{contest, submission, team};
    use chrono::Utc;

    #[test]
    fn test_partial_credit_points() {
        // Best submission passes 3 of 5 graded cases on a 10-point
        // problem: 6.00 points, zero fully-solved contribution
        let c = contest("hackathon", Utc::now(), 300);
        let t = team("beta");
        let p = Uuid::new_v4();

        let subs = vec![
            submission(&c, t.id, p, 10, SubmissionStatus::PartialCredit, Some(4.0), 2, 5),
            submission(&c, t.id, p, 40, SubmissionStatus::PartialCredit, Some(6.0), 3, 5),
        ];
        let teams = vec![t.clone()];

        let results = HackathonScoring.rank(compute_results(&c, &teams, &subs));
        assert_eq!(results[0].total_points, 6.0);
        assert_eq!(results[0].problems_solved, 0);
    }

    #[test]
    fn test_best_submission_tie_prefers_earlier() {
        let c = contest("hackathon", Utc::now(), 300);
        let t = team("beta");
        let p = Uuid::new_v4();

        let subs = vec![
            submission(&c, t.id, p, 30, SubmissionStatus::PartialCredit, Some(6.0), 3, 5),
            submission(&c, t.id, p, 10, SubmissionStatus::PartialCredit, Some(6.0), 3, 5),
        ];
        let refs: Vec<&Submission> = subs.iter().collect();

        let best = best_submission(&refs).unwrap();
        assert_eq!(best.id, subs[1].id);
    }

    #[test]
    fn test_total_points_sum_over_problems() {
        let c = contest("hackathon", Utc::now(), 300);
        let t = team("beta");
        let [p1, p2] = [Uuid::new_v4(), Uuid::new_v4()];

        let subs = vec![
            submission(&c, t.id, p1, 10, SubmissionStatus::Accepted, Some(10.0), 5, 5),
            submission(&c, t.id, p2, 20, SubmissionStatus::PartialCredit, Some(3.33), 1, 3),
        ];
        let teams = vec![t.clone()];

        let results = HackathonScoring.rank(compute_results(&c, &teams, &subs));
        assert_eq!(results[0].total_points, 13.33);
        assert_eq!(results[0].problems_solved, 1);
    }

    #[test]
    fn test_rank_by_points_then_full_solves() {
        let c = contest("hackathon", Utc::now(), 300);
        let a = team("alpha");
        let b = team("beta");
        let g = team("gamma");
        let p = Uuid::new_v4();

        let subs = vec![
            submission(&c, a.id, p, 10, SubmissionStatus::Accepted, Some(10.0), 5, 5),
            submission(&c, b.id, p, 20, SubmissionStatus::PartialCredit, Some(8.0), 4, 5),
            submission(&c, g.id, p, 30, SubmissionStatus::PartialCredit, Some(8.0), 4, 5),
        ];
        let teams = vec![a.clone(), b.clone(), g.clone()];

        let ranked = HackathonScoring.rank(compute_results(&c, &teams, &subs));
        assert_eq!(ranked[0].team_name, "alpha");
        assert_eq!(ranked[0].rank, 1);
        // beta and gamma tie on (points, solves); both rank 2
        assert_eq!(ranked[1].rank, 2);
        assert_eq!(ranked[2].rank, 2);
        // earlier last submission sorts beta ahead of gamma
        assert_eq!(ranked[1].team_name, "beta");
    }

    #[test]
    fn test_team_score_row_attempt_counting() {
        let c = contest("hackathon", Utc::now(), 300);
        let t = team("beta");
        let p = Uuid::new_v4();

        let subs = vec![
            submission(&c, t.id, p, 5, SubmissionStatus::CompilationError, None, 0, 5),
            submission(&c, t.id, p, 10, SubmissionStatus::PartialCredit, Some(2.0), 1, 5),
            submission(&c, t.id, p, 20, SubmissionStatus::Accepted, Some(10.0), 5, 5),
        ];

        let row = team_score_row(&c, t.id, p, &subs);
        assert!(row.solved);
        assert_eq!(row.attempts, 2);
        assert_eq!(row.solve_time, Some(20));
        assert_eq!(row.penalty, 0);
        assert!(!row.first_solve);
    }
}

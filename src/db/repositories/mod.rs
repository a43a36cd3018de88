//! Database repositories

pub mod contest_repo;
pub mod problem_repo;
pub mod score_repo;
pub mod submission_repo;
pub mod team_repo;

pub use contest_repo::ContestRepository;
pub use problem_repo::ProblemRepository;
pub use score_repo::ScoreRepository;
pub use submission_repo::SubmissionRepository;
pub use team_repo::TeamRepository;

//! Vote counting and the rules that turn a tally into a decision.

use chrono::{DateTime, Utc};

use quorum_core::{Edit, EditVote, EngineConfig, VoteType};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub accepts: u32,
    pub rejects: u32,
    pub abstains: u32,
}

impl Tally {
    /// Counts one vote per user. Administrative votes are not counted.
    pub fn from_votes(votes: &[EditVote]) -> Self {
        let mut tally = Tally::default();
        for vote in votes {
            match vote.vote {
                VoteType::Accept => tally.accepts += 1,
                VoteType::Reject => tally.rejects += 1,
                VoteType::Abstain => tally.abstains += 1,
                VoteType::ImmediateAccept | VoteType::ImmediateReject => {}
            }
        }
        tally
    }

    pub fn net(&self) -> i32 {
        self.accepts as i32 - self.rejects as i32
    }

    pub fn decisive(&self) -> u32 {
        self.accepts + self.rejects
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Pending,
    Accept,
    Reject,
}

/// Outcome of a vote on a pending edit.
pub fn decide_on_vote(
    edit: &Edit,
    tally: Tally,
    destructive: bool,
    now: DateTime<Utc>,
    config: &EngineConfig,
) -> Decision {
    let threshold = config.vote_application_threshold;
    if threshold == 0 {
        return Decision::Pending;
    }

    if destructive {
        // Still pending at exactly the minimum age.
        if now - edit.created_at <= config.min_destructive_voting_period() {
            return Decision::Pending;
        }
        if tally.decisive() < threshold {
            return Decision::Pending;
        }
        return if tally.accepts > tally.rejects {
            Decision::Accept
        } else {
            Decision::Reject
        };
    }

    if tally.rejects > 0 {
        Decision::Reject
    } else if tally.accepts >= threshold {
        Decision::Accept
    } else {
        Decision::Pending
    }
}

/// When an untouched pending edit will be closed by the expiry sweep.
/// Edits that reached the vote threshold close after the shorter window.
pub fn voting_ends_at(edit: &Edit, tally: Tally, config: &EngineConfig) -> DateTime<Utc> {
    let start = edit.voting_started_at();
    let threshold = config.vote_application_threshold;
    let period = if threshold > 0 && tally.decisive() >= threshold {
        config.min_destructive_voting_period()
    } else {
        config.voting_period()
    };
    start.checked_add_signed(period).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Outcome of an edit whose voting window has ended.
pub fn decide_on_expiry(tally: Tally, destructive: bool) -> Decision {
    let passes = if destructive {
        tally.net() >= 1
    } else {
        tally.net() >= 0
    };
    if passes { Decision::Accept } else { Decision::Reject }
}
